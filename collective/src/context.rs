use std::num::NonZeroUsize;

use crate::{CollectiveErr, Result};

/// The identity of one participant in a data-parallel job.
///
/// Components that need to know where they run receive this explicitly instead
/// of reading process-wide state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistContext {
    rank: usize,
    world_size: NonZeroUsize,
}

impl DistContext {
    /// Creates a new `DistContext`.
    ///
    /// # Arguments
    /// * `rank` - The index of this participant, in `0..world_size`.
    /// * `world_size` - The amount of participants in the job.
    ///
    /// # Returns
    /// A new `DistContext` or an error if the rank is out of range.
    pub fn new(rank: usize, world_size: NonZeroUsize) -> Result<Self> {
        if rank >= world_size.get() {
            return Err(CollectiveErr::RankOutOfRange {
                rank,
                world_size: world_size.get(),
            });
        }

        Ok(Self { rank, world_size })
    }

    /// The context of a job that runs on a single process.
    pub fn single() -> Self {
        Self {
            rank: 0,
            world_size: NonZeroUsize::MIN,
        }
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.rank
    }

    #[inline]
    pub fn world_size(&self) -> usize {
        self.world_size.get()
    }

    /// Returns true for the designated process that owns file-system side effects.
    #[inline]
    pub fn is_main(&self) -> bool {
        self.rank == 0
    }

    #[inline]
    pub fn is_distributed(&self) -> bool {
        self.world_size.get() > 1
    }
}

impl Default for DistContext {
    fn default() -> Self {
        Self::single()
    }
}
