//! The counting pipeline.
//!
//! ```text
//!   input lines ──► Emitter ──acquire slot──► Worker ... Worker   (at most pool_size at once)
//!                     │                          │          │
//!                     └──────── TaskTracker ◄────┴──────────┘     (join: emitter + all workers)
//!                                                │          │
//!                                  mpsc::Sender<TargetCount> (one result per target)
//!                                                ▼
//!   SubstringCounter::count_total ── select! { result | cancel fired | all done }
//!        │
//!        └──► "Count for <target>: <n>" lines, CountReport
//! ```
//!
//! - [`matcher`] counts overlapping substring matches over a UTF-8 byte stream.
//! - [`scheduler`] is the counting semaphore that bounds concurrent workers.
//! - [`worker`] opens one target, runs the matcher, and sends one result.
//! - [`emitter`] reads targets and dispatches workers through the scheduler.
//! - [`engine`] drives a run and decides how it ends.
pub mod emitter;
pub mod engine;
pub mod matcher;
pub mod scheduler;
pub mod worker;

pub use engine::SubstringCounter;
pub use matcher::{MatchError, SubstringMatcher};
pub use scheduler::{Scheduler, Slot};
