use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::matcher::SubstringMatcher;
use crate::errors::CountError;
use crate::metrics::EngineMetrics;
use crate::results::TargetCount;
use crate::source::SourceGateway;

/// Counts one target at a time and sends exactly one result per target.
///
/// Cloning is cheap; every clone shares the matcher, the gateway and the
/// result channel.
#[derive(Clone)]
pub struct Worker {
    matcher: Arc<SubstringMatcher>,
    source: Arc<dyn SourceGateway>,
    results: mpsc::Sender<TargetCount>,
    metrics: EngineMetrics,
}

impl Worker {
    pub fn new(
        matcher: Arc<SubstringMatcher>,
        source: Arc<dyn SourceGateway>,
        results: mpsc::Sender<TargetCount>,
        metrics: EngineMetrics,
    ) -> Self {
        Self {
            matcher,
            source,
            results,
            metrics,
        }
    }

    /// Counts `target` and sends its result
    pub async fn run(&self, target: String) {
        self.metrics.record_worker_started();

        let result = match AssertUnwindSafe(self.count_target(&target))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(_) => {
                warn!("Worker for {} panicked", target);
                TargetCount::failed(target.as_str(), 0, CountError::worker_panicked(&target))
            }
        };

        self.metrics.record_worker_finished(result.is_err());
        self.deliver(result).await;
    }

    /// Sends a result to the driver. A closed channel means the driver has
    /// stopped listening, so the result is dropped.
    pub async fn deliver(&self, result: TargetCount) {
        if let Err(unsent) = self.results.send(result).await {
            debug!(
                "Driver no longer listening, dropping result for {}",
                unsent.0.target
            );
        }
    }

    async fn count_target(&self, target: &str) -> TargetCount {
        // The stream is dropped, and so closed, on every path out of here
        let stream = match self.source.open(target).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("{}", e);
                return TargetCount::failed(target, 0, e);
            }
        };

        match self.matcher.count(stream).await {
            Ok(count) => {
                debug!("Count for {}: {}", target, count);
                TargetCount::ok(target, count)
            }
            Err(e) => {
                warn!("Reading {} failed: {}", target, e);
                TargetCount::failed(target, e.partial, CountError::stream_read(target, e.source))
            }
        }
    }
}
