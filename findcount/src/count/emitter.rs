use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::task::TaskTracker;
use tracing::{debug, trace, warn};

use super::scheduler::Scheduler;
use super::worker::Worker;
use crate::cancel::CancelSignal;
use crate::errors::CountError;
use crate::metrics::EngineMetrics;
use crate::results::TargetCount;

/// Reads targets line by line and starts one worker per target.
///
/// Each worker is spawned on the shared [`TaskTracker`] only after it holds a
/// scheduler slot, and gives the slot back before it is untracked. Reading
/// stops at end of input, at the first blank line, at the first unreadable
/// line, or once the cancel signal fires.
pub struct Emitter {
    scheduler: Scheduler,
    tracker: TaskTracker,
    worker: Worker,
    cancel: CancelSignal,
    metrics: EngineMetrics,
}

impl Emitter {
    pub fn new(
        scheduler: Scheduler,
        tracker: TaskTracker,
        worker: Worker,
        cancel: CancelSignal,
        metrics: EngineMetrics,
    ) -> Self {
        Self {
            scheduler,
            tracker,
            worker,
            cancel,
            metrics,
        }
    }

    pub async fn run<R>(self, mut input: R)
    where
        R: AsyncBufRead + Unpin,
    {
        let mut line = Vec::new();
        loop {
            line.clear();
            let read = tokio::select! {
                biased;
                _ = self.cancel.fired() => {
                    debug!("Emitter stopped by cancellation");
                    return;
                }
                read = input.read_until(b'\n', &mut line) => read,
            };

            match read {
                Ok(0) => {
                    debug!("Input exhausted");
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    self.input_failed(&line, e).await;
                    return;
                }
            }

            let target = match std::str::from_utf8(&line) {
                Ok(text) => text.trim().to_string(),
                Err(e) => {
                    self.input_failed(&line, io::Error::new(io::ErrorKind::InvalidData, e))
                        .await;
                    return;
                }
            };

            // A blank line ends the input even if more targets follow
            if target.is_empty() {
                debug!("Blank line, no further targets are read");
                return;
            }

            let slot = tokio::select! {
                biased;
                _ = self.cancel.fired() => {
                    debug!("Emitter stopped by cancellation");
                    return;
                }
                slot = self.scheduler.acquire() => slot,
            };
            let Some(slot) = slot else {
                warn!("Scheduler closed, no further targets are dispatched");
                return;
            };

            trace!("Dispatching {}", target);
            self.metrics.record_dispatch();
            let worker = self.worker.clone();
            self.tracker.spawn(async move {
                worker.run(target).await;
                slot.release();
            });
        }
    }

    async fn input_failed(&self, fragment: &[u8], err: io::Error) {
        let fragment = String::from_utf8_lossy(fragment).trim().to_string();
        warn!("Failed to read target list: {}", err);
        self.worker
            .deliver(TargetCount::failed(fragment, 0, CountError::InputParse(err)))
            .await;
    }
}
