mod context;
mod error;
mod gather;
mod group;
mod shard;

pub use context::DistContext;
pub use error::{CollectiveErr, Result};
pub use gather::{gather_map, gather_sum};
pub use group::{ProcessGroup, SoloGroup, ThreadGroup};
pub use shard::{ShardSpec, shard_range};
