use std::ops::Range;

use crate::DistContext;

/// Splits `total` items among `world_size` ranks and returns the shard for `rank`.
///
/// Ranges are contiguous, disjoint and cover `[0..total)`, their sizes differ by at most 1.
pub fn shard_range(total: usize, rank: usize, world_size: usize) -> Range<usize> {
    assert!(world_size > 0);
    assert!(rank < world_size);

    let base = total / world_size;
    let rem = total % world_size;

    let start = rank * base + rank.min(rem);
    let extra = if rank < rem { 1 } else { 0 };
    let end = start + base + extra;

    start..end
}

/// The shard of a dataset owned by one rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardSpec {
    ctx: DistContext,
}

impl ShardSpec {
    pub fn new(ctx: DistContext) -> Self {
        Self { ctx }
    }

    #[inline]
    pub fn range(self, total: usize) -> Range<usize> {
        shard_range(total, self.ctx.rank(), self.ctx.world_size())
    }
}
