//! Process-wide, single-shot cancellation signal.
//!
//! A [`CancelSignal`] fires at most once, either because the run's time budget
//! ran out ([`CancelSignal::arm_deadline`]) or because the process was
//! interrupted ([`CancelSignal::arm_interrupt`]). The first reason wins and is
//! kept; firing again only cancels an already cancelled token.
//!
//! The signal is observed by the driver's termination race and by the emitter.
//! Reads already in progress inside a worker are not interrupted.

use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::signals::wait_for_interrupt;

/// Why a run was cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The configured time limit elapsed
    DeadlineExceeded,
    /// The process received an interrupt request
    Interrupted,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::DeadlineExceeded => write!(f, "deadline exceeded"),
            CancelReason::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// Shared stop condition. Clones observe and fire the same signal.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    token: CancellationToken,
    reason: Arc<OnceLock<CancelReason>>,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the signal. Returns `true` if this call was the one that fired it.
    pub fn fire(&self, reason: CancelReason) -> bool {
        // The reason must be visible before any waiter wakes up.
        let first = self.reason.set(reason).is_ok();
        self.token.cancel();
        if first {
            info!("Cancellation fired: {}", reason);
        }
        first
    }

    pub fn is_fired(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> Option<CancelReason> {
        self.reason.get().copied()
    }

    /// Waits until the signal fires and returns the reason it fired with
    pub async fn fired(&self) -> CancelReason {
        self.token.cancelled().await;
        self.reason().unwrap_or(CancelReason::Interrupted)
    }

    /// Fires [`CancelReason::DeadlineExceeded`] once `limit` has elapsed
    pub fn arm_deadline(&self, limit: Duration) -> JoinHandle<()> {
        let signal = self.clone();
        debug!("Deadline armed for {}", humantime::format_duration(limit));
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(limit) => {
                    signal.fire(CancelReason::DeadlineExceeded);
                }
                _ = signal.token.cancelled() => {}
            }
        })
    }

    /// Fires [`CancelReason::Interrupted`] when the process receives an
    /// interrupt request
    pub fn arm_interrupt(&self) -> JoinHandle<()> {
        let signal = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                res = wait_for_interrupt() => match res {
                    Ok(()) => {
                        signal.fire(CancelReason::Interrupted);
                    }
                    Err(e) => warn!("Interrupt handler unavailable: {}", e),
                },
                _ = signal.token.cancelled() => {}
            }
        })
    }
}
