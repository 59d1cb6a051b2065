use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Tracks worker activity for one run
#[derive(Debug, Clone)]
pub struct EngineMetrics {
    // Dispatch metrics
    dispatched: Arc<AtomicU64>,
    completed: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,

    // Concurrency metrics
    in_flight: Arc<AtomicU64>,
    peak_in_flight: Arc<AtomicU64>,
}

impl EngineMetrics {
    /// Creates a new EngineMetrics instance
    pub fn new() -> Self {
        Self {
            dispatched: Arc::new(AtomicU64::new(0)),
            completed: Arc::new(AtomicU64::new(0)),
            failed: Arc::new(AtomicU64::new(0)),
            in_flight: Arc::new(AtomicU64::new(0)),
            peak_in_flight: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Records a target handed to a worker
    pub fn record_dispatch(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a worker starting its target
    pub fn record_worker_started(&self) {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let mut peak = self.peak_in_flight.load(Ordering::SeqCst);
        while current > peak {
            match self.peak_in_flight.compare_exchange_weak(
                peak,
                current,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break,
                Err(actual) => peak = actual,
            }
        }
        debug!("Worker started, {} in flight", current);
    }

    /// Records a worker finishing its target
    pub fn record_worker_finished(&self, failed: bool) {
        let current = self.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
        self.completed.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        debug!("Worker finished, {} in flight", current);
    }

    /// Gets current statistics
    pub fn get_stats(&self) -> EngineStats {
        EngineStats {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::SeqCst),
            peak_in_flight: self.peak_in_flight.load(Ordering::SeqCst),
        }
    }

    /// Logs current statistics
    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Worker stats:\n\
             Dispatched: {}\n\
             Completed/failed: {}/{}\n\
             In flight: {} (peak {})",
            stats.dispatched,
            stats.completed,
            stats.failed,
            stats.in_flight,
            stats.peak_in_flight
        );
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of worker activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub dispatched: u64,
    pub completed: u64,
    pub failed: u64,
    pub in_flight: u64,
    pub peak_in_flight: u64,
}
