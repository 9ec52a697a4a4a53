use std::{
    num::NonZeroUsize,
    sync::{Arc, Barrier},
};

use parking_lot::Mutex;

use crate::{CollectiveErr, DistContext, Result};

/// The collective operations a set of cooperating processes exposes.
///
/// Every operation is a synchronization point: all the participants must reach it,
/// otherwise the ones that did will block forever. There is no timeout, a stalled
/// participant stalls the whole group.
pub trait ProcessGroup {
    /// Returns the context of the participant owning this handle.
    fn context(&self) -> DistContext;

    /// Blocks until every participant has reached this point.
    fn barrier(&self);

    /// Shares `payload` with every participant.
    ///
    /// # Arguments
    /// * `payload` - This participant's serialized contribution.
    ///
    /// # Returns
    /// The contributions of all the participants, ordered by rank.
    fn all_gather(&self, payload: Vec<u8>) -> Result<Vec<Vec<u8>>>;
}

/// The group of a job that runs on a single process, every operation returns immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct SoloGroup;

impl SoloGroup {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessGroup for SoloGroup {
    fn context(&self) -> DistContext {
        DistContext::single()
    }

    fn barrier(&self) {}

    fn all_gather(&self, payload: Vec<u8>) -> Result<Vec<Vec<u8>>> {
        Ok(vec![payload])
    }
}

#[derive(Debug)]
struct Shared {
    barrier: Barrier,
    slots: Mutex<Vec<Option<Vec<u8>>>>,
}

/// A group whose participants are threads of the same process.
///
/// Each rank owns one handle, the handles share the barrier and the exchange slots.
#[derive(Debug, Clone)]
pub struct ThreadGroup {
    ctx: DistContext,
    shared: Arc<Shared>,
}

impl ThreadGroup {
    /// Creates the handles for a new group.
    ///
    /// # Arguments
    /// * `world_size` - The amount of participants.
    ///
    /// # Returns
    /// One handle per rank, the i-th handle belongs to rank i.
    pub fn new(world_size: NonZeroUsize) -> Vec<Self> {
        let n = world_size.get();
        let shared = Arc::new(Shared {
            barrier: Barrier::new(n),
            slots: Mutex::new(vec![None; n]),
        });

        (0..n)
            .map(|rank| Self {
                // every rank is lower than `world_size`.
                ctx: DistContext::new(rank, world_size).unwrap_or_default(),
                shared: Arc::clone(&shared),
            })
            .collect()
    }
}

impl ProcessGroup for ThreadGroup {
    fn context(&self) -> DistContext {
        self.ctx
    }

    fn barrier(&self) {
        self.shared.barrier.wait();
    }

    fn all_gather(&self, payload: Vec<u8>) -> Result<Vec<Vec<u8>>> {
        self.shared.slots.lock()[self.ctx.rank()] = Some(payload);

        // Everyone published.
        self.shared.barrier.wait();

        let gathered = self
            .shared
            .slots
            .lock()
            .iter()
            .enumerate()
            .map(|(rank, slot)| slot.clone().ok_or(CollectiveErr::MissingPayload { rank }))
            .collect();

        // Everyone read, the slots may be overwritten by the next round.
        self.shared.barrier.wait();
        gathered
    }
}
