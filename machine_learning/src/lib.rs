pub mod arch;
pub mod batch;
pub mod dataset;
pub mod error;
pub mod metrics;
pub mod optimization;
mod test;
pub mod training;
pub mod writer;

pub use error::{MlErr, Result};
