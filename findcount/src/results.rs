use std::fmt;

use crate::cancel::CancelReason;
use crate::config::ErrorPolicy;
use crate::errors::CountError;
use crate::metrics::EngineStats;

/// Outcome of counting one target
#[derive(Debug)]
pub struct TargetCount {
    /// Number of matches found (partial if `error` is set)
    pub count: usize,
    /// The target as read from the input
    pub target: String,
    /// What went wrong for this target, if anything
    pub error: Option<CountError>,
}

impl TargetCount {
    pub fn ok(target: impl Into<String>, count: usize) -> Self {
        Self {
            count,
            target: target.into(),
            error: None,
        }
    }

    pub fn failed(target: impl Into<String>, count: usize, error: CountError) -> Self {
        Self {
            count,
            target: target.into(),
            error: Some(error),
        }
    }

    pub fn is_err(&self) -> bool {
        self.error.is_some()
    }
}

/// The per-target output line
impl fmt::Display for TargetCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Count for {}: {}", self.target, self.count)
    }
}

/// How a run ended. A run leaves `Running` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The emitter and every worker finished
    AllComplete,
    /// The cancellation signal fired first
    Cancelled(CancelReason),
}

/// Summary of a whole run
#[derive(Debug)]
pub struct CountReport {
    /// Sum of all consumed counts
    pub total: usize,
    /// Number of results consumed
    pub targets: usize,
    /// Number of consumed results that carried an error
    pub failed: usize,
    /// How the run ended
    pub outcome: Outcome,
    /// The error to report: the cancellation error, or the remembered
    /// per-target error for a completed run
    pub error: Option<CountError>,
    /// Worker activity of this run, taken when the run ended
    pub stats: EngineStats,
}

impl CountReport {
    pub(crate) fn new() -> Self {
        Self {
            total: 0,
            targets: 0,
            failed: 0,
            outcome: Outcome::AllComplete,
            error: None,
            stats: EngineStats::default(),
        }
    }

    /// Adds one result, keeping its error according to `policy`
    pub(crate) fn record(&mut self, result: TargetCount, policy: ErrorPolicy) {
        self.total += result.count;
        self.targets += 1;
        if let Some(err) = result.error {
            self.failed += 1;
            match policy {
                ErrorPolicy::First if self.error.is_some() => {}
                _ => self.error = Some(err),
            }
        }
    }

    pub(crate) fn complete(mut self) -> Self {
        self.outcome = Outcome::AllComplete;
        self
    }

    pub(crate) fn cancel(mut self, reason: CancelReason) -> Self {
        self.outcome = Outcome::Cancelled(reason);
        self.error = Some(CountError::Cancelled(reason));
        self
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.outcome, Outcome::Cancelled(_))
    }

    /// Converts the report into the total or the error to report
    pub fn into_result(self) -> Result<usize, CountError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.total),
        }
    }
}
