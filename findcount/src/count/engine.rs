use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::emitter::Emitter;
use super::matcher::SubstringMatcher;
use super::scheduler::Scheduler;
use super::worker::Worker;
use crate::cancel::CancelSignal;
use crate::config::{CountConfig, EncodingMode, ErrorPolicy};
use crate::metrics::EngineMetrics;
use crate::results::{CountReport, TargetCount};
use crate::source::SourceGateway;

/// Counts a substring across every target named on an input stream.
///
/// One call to [`SubstringCounter::count_total`] is one run: the emitter and
/// all workers are tracked together, results are written as they arrive, and
/// the run ends when either all work is done or the cancel signal fires.
pub struct SubstringCounter {
    substring: String,
    matcher: Arc<SubstringMatcher>,
    source: Arc<dyn SourceGateway>,
    pool_size: NonZeroUsize,
    error_policy: ErrorPolicy,
}

impl SubstringCounter {
    pub fn new(substring: &str, pool_size: NonZeroUsize, source: Arc<dyn SourceGateway>) -> Self {
        Self {
            substring: substring.to_string(),
            matcher: Arc::new(SubstringMatcher::new(substring)),
            source,
            pool_size,
            error_policy: ErrorPolicy::default(),
        }
    }

    /// Builds a counter with the gateway named by `config.source_type`
    pub fn from_config(config: &CountConfig) -> Self {
        Self::new(
            &config.substring,
            config.pool_size,
            config.source_type.gateway(),
        )
        .with_error_policy(config.error_policy)
        .with_encoding(config.encoding_mode)
    }

    pub fn with_error_policy(mut self, error_policy: ErrorPolicy) -> Self {
        self.error_policy = error_policy;
        self
    }

    pub fn with_encoding(mut self, encoding_mode: EncodingMode) -> Self {
        self.matcher = Arc::new(SubstringMatcher::with_encoding(
            &self.substring,
            encoding_mode,
        ));
        self
    }

    /// Reads targets from `input`, writes `Count for <target>: <n>` lines to
    /// `output` in completion order, and returns the run's report.
    ///
    /// On cancellation the report is returned immediately. Results still in
    /// flight or already queued are discarded and running workers finish in
    /// the background.
    ///
    /// Worker statistics are collected per call and returned in
    /// [`CountReport::stats`].
    pub async fn count_total<R, W>(
        &self,
        cancel: &CancelSignal,
        input: R,
        output: &mut W,
    ) -> CountReport
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Unpin,
    {
        info!(
            "Counting {:?} with pool size {}",
            self.substring, self.pool_size
        );

        let metrics = EngineMetrics::new();
        let (tx, mut rx) = mpsc::channel(self.pool_size.get());
        let tracker = TaskTracker::new();
        let worker = Worker::new(
            self.matcher.clone(),
            self.source.clone(),
            tx,
            metrics.clone(),
        );
        let emitter = Emitter::new(
            Scheduler::new(self.pool_size),
            tracker.clone(),
            worker,
            cancel.clone(),
            metrics.clone(),
        );
        tracker.spawn(emitter.run(BufReader::new(input)));
        // Workers may still be spawned after close; wait() needs both
        // closed and empty.
        tracker.close();

        let mut report = CountReport::new();
        let all_done = tracker.wait();
        tokio::pin!(all_done);

        // Cancellation is checked first so that nothing queued behind it is
        // consumed.
        let mut report = loop {
            tokio::select! {
                biased;
                reason = cancel.fired() => {
                    warn!("Stopping before all targets finished: {}", reason);
                    break report.cancel(reason);
                }
                Some(result) = rx.recv() => {
                    self.consume(&mut report, result, output).await;
                }
                _ = &mut all_done => {
                    // Everything has finished, so whatever is queued is all
                    // that is left.
                    while let Ok(result) = rx.try_recv() {
                        if let Some(reason) = cancel.reason() {
                            warn!("Stopping before all results were consumed: {}", reason);
                            break;
                        }
                        self.consume(&mut report, result, output).await;
                    }
                    match cancel.reason() {
                        Some(reason) => break report.cancel(reason),
                        None => {
                            debug!("All targets finished");
                            break report.complete();
                        }
                    }
                }
            }
        };
        report.stats = metrics.get_stats();

        info!(
            "Counting finished with total {} over {} targets ({} failed)",
            report.total, report.targets, report.failed
        );
        metrics.log_stats();
        report
    }

    async fn consume<W>(&self, report: &mut CountReport, result: TargetCount, output: &mut W)
    where
        W: AsyncWrite + Unpin,
    {
        let line = format!("{}\n", result);
        let written = match output.write_all(line.as_bytes()).await {
            Ok(()) => output.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            warn!("Failed to write result for {}: {}", result.target, e);
        }
        report.record(result, self.error_policy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelReason;
    use crate::errors::{CountError, CountResult};
    use crate::results::Outcome;
    use crate::source::SourceStream;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;

    /// Serves fixed contents per target; unknown targets fail to open
    struct MapSource(HashMap<&'static str, &'static str>);

    #[async_trait]
    impl SourceGateway for MapSource {
        async fn open(&self, target: &str) -> CountResult<SourceStream> {
            match self.0.get(target) {
                Some(contents) => Ok(Box::new(contents.as_bytes())),
                None => Err(CountError::source_open(
                    target,
                    io::Error::new(io::ErrorKind::NotFound, "no such file or directory"),
                )),
            }
        }
    }

    /// Every open waits for `delay` before serving `contents`
    struct SlowSource {
        delay: Duration,
        contents: &'static str,
    }

    #[async_trait]
    impl SourceGateway for SlowSource {
        async fn open(&self, _target: &str) -> CountResult<SourceStream> {
            tokio::time::sleep(self.delay).await;
            Ok(Box::new(self.contents.as_bytes()))
        }
    }

    fn counter(substring: &str, pool: usize, source: impl SourceGateway + 'static) -> SubstringCounter {
        SubstringCounter::new(substring, NonZeroUsize::new(pool).unwrap(), Arc::new(source))
    }

    fn sorted_lines(output: &[u8]) -> Vec<String> {
        let mut lines: Vec<String> = String::from_utf8_lossy(output)
            .lines()
            .map(str::to_string)
            .collect();
        lines.sort();
        lines
    }

    #[tokio::test]
    async fn test_counts_and_prints_each_target() {
        let source = MapSource(HashMap::from([
            ("a.txt", "Golang Go"),
            ("b.txt", "nothing here"),
        ]));
        let counter = counter("Go", 2, source);
        let mut output = Vec::new();

        let report = counter
            .count_total(&CancelSignal::new(), "a.txt\nb.txt\n".as_bytes(), &mut output)
            .await;

        assert_eq!(report.outcome, Outcome::AllComplete);
        assert_eq!(report.total, 2);
        assert_eq!(report.targets, 2);
        assert!(report.error.is_none());
        assert_eq!(
            sorted_lines(&output),
            vec!["Count for a.txt: 2", "Count for b.txt: 0"]
        );
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let source = MapSource(HashMap::from([("a.txt", "GoGoGo")]));
        let counter = counter("Go", 4, source);
        let mut output = Vec::new();

        let report = counter
            .count_total(
                &CancelSignal::new(),
                "/some-place\na.txt\n".as_bytes(),
                &mut output,
            )
            .await;

        assert_eq!(report.outcome, Outcome::AllComplete);
        assert_eq!(report.total, 3);
        assert_eq!(report.failed, 1);
        assert_eq!(
            sorted_lines(&output),
            vec!["Count for /some-place: 0", "Count for a.txt: 3"]
        );
        match report.into_result() {
            Err(CountError::SourceOpen { target, .. }) => assert_eq!(target, "/some-place"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_zero_targets() {
        let counter = counter("Go", 2, MapSource(HashMap::new()));
        let mut output = Vec::new();

        let report = counter
            .count_total(&CancelSignal::new(), "".as_bytes(), &mut output)
            .await;

        assert_eq!(report.outcome, Outcome::AllComplete);
        assert_eq!(report.total, 0);
        assert_eq!(report.targets, 0);
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_deadline_cuts_run_short() {
        let counter = counter(
            "Go",
            2,
            SlowSource {
                delay: Duration::from_secs(1),
                contents: "Go",
            },
        );
        let cancel = CancelSignal::new();
        cancel.arm_deadline(Duration::from_millis(1));
        let mut output = Vec::new();

        let started = std::time::Instant::now();
        let report = counter
            .count_total(&cancel, "slow\n".as_bytes(), &mut output)
            .await;

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(report.outcome, Outcome::Cancelled(CancelReason::DeadlineExceeded));
        assert_eq!(report.total, 0);
        assert!(output.is_empty());
        assert!(matches!(
            report.into_result(),
            Err(CountError::Cancelled(CancelReason::DeadlineExceeded))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_pool_size_bounds_workers() {
        for (pool, targets) in [(1, 5), (4, 23), (90, 23)] {
            let counter = counter(
                "Go",
                pool,
                SlowSource {
                    delay: Duration::from_millis(10),
                    contents: "Go",
                },
            );
            let input: String = (0..targets).map(|i| format!("t{}\n", i)).collect();
            let mut output = Vec::new();

            let report = counter
                .count_total(&CancelSignal::new(), std::io::Cursor::new(input), &mut output)
                .await;

            let stats = report.stats;
            assert_eq!(report.total, targets);
            assert_eq!(stats.dispatched, targets as u64);
            assert_eq!(
                stats.peak_in_flight as usize,
                pool.min(targets),
                "pool {}: peak {}",
                pool,
                stats.peak_in_flight
            );
            assert_eq!(stats.in_flight, 0);
        }
    }

    #[tokio::test]
    async fn test_stats_are_per_run() {
        let source = MapSource(HashMap::from([("a.txt", "Go"), ("b.txt", "Go")]));
        let counter = counter("Go", 2, source);

        for _ in 0..2 {
            let mut output = Vec::new();
            let report = counter
                .count_total(&CancelSignal::new(), "a.txt\nb.txt\n".as_bytes(), &mut output)
                .await;
            assert_eq!(report.stats.dispatched, 2);
            assert_eq!(report.stats.completed, 2);
        }
    }

    /// Fires the cancel signal the first time anything is written to it
    struct CancellingWriter {
        cancel: CancelSignal,
        written: Vec<u8>,
    }

    impl AsyncWrite for CancellingWriter {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            self.cancel.fire(CancelReason::Interrupted);
            self.written.extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_queued_results_dropped_after_cancel() {
        let counter = counter(
            "Go",
            4,
            SlowSource {
                delay: Duration::from_millis(50),
                contents: "Go",
            },
        );
        let cancel = CancelSignal::new();
        let mut output = CancellingWriter {
            cancel: cancel.clone(),
            written: Vec::new(),
        };

        let report = counter
            .count_total(&cancel, "a\nb\nc\nd\n".as_bytes(), &mut output)
            .await;

        assert_eq!(report.outcome, Outcome::Cancelled(CancelReason::Interrupted));
        assert_eq!(report.targets, 1);
        assert_eq!(report.total, 1);
        assert_eq!(String::from_utf8_lossy(&output.written).lines().count(), 1);
    }
}
