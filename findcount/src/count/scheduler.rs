use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bounded admission control: at most `capacity` slots are held at once.
///
/// The scheduler knows nothing about the work it gates. Waiters are served in
/// the order they called [`Scheduler::acquire`].
#[derive(Debug, Clone)]
pub struct Scheduler {
    semaphore: Arc<Semaphore>,
    capacity: NonZeroUsize,
}

/// A held slot, freed when dropped
#[derive(Debug)]
pub struct Slot {
    _permit: OwnedSemaphorePermit,
}

impl Slot {
    /// Frees the slot now instead of at the end of scope
    pub fn release(self) {}
}

impl Scheduler {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity.get())),
            capacity,
        }
    }

    /// Waits for a free slot. Returns `None` only if the underlying
    /// semaphore has been closed.
    pub async fn acquire(&self) -> Option<Slot> {
        match self.semaphore.clone().acquire_owned().await {
            Ok(permit) => Some(Slot { _permit: permit }),
            Err(_) => None,
        }
    }

    /// Takes a slot only if one is free right now
    pub fn try_acquire(&self) -> Option<Slot> {
        self.semaphore
            .clone()
            .try_acquire_owned()
            .ok()
            .map(|permit| Slot { _permit: permit })
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Number of slots free right now
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}
