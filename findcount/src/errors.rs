//! Error types for the counting engine.
//!
//! Every failure path of a run ends up as a [`CountError`] value. Errors that
//! belong to a single target (open, read, panic) travel inside that target's
//! [`TargetCount`](crate::results::TargetCount) and never stop sibling targets.
//! Only [`CountError::InputParse`] and [`CountError::Cancelled`] end a run early.
//!
//! ```rust,ignore
//! match report.into_result() {
//!     Ok(total) => println!("Total: {}", total),
//!     Err(CountError::Cancelled(reason)) => eprintln!("stopped: {}", reason),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```
use thiserror::Error;

use crate::cancel::CancelReason;

/// Result type for counting operations
pub type CountResult<T> = Result<T, CountError>;

/// Errors that can occur while counting
#[derive(Error, Debug)]
pub enum CountError {
    #[error("open {target}: {source}")]
    SourceOpen {
        target: String,
        source: std::io::Error,
    },
    #[error("get {target}: {source}")]
    Http {
        target: String,
        source: reqwest::Error,
    },
    #[error("Unsupported data source type: {0}")]
    UnsupportedSource(String),
    #[error("read {target}: {source}")]
    StreamRead {
        target: String,
        source: std::io::Error,
    },
    #[error("Input error: {0}")]
    InputParse(std::io::Error),
    #[error("Counting cancelled: {0}")]
    Cancelled(CancelReason),
    #[error("Worker for {target} panicked")]
    WorkerPanicked { target: String },
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl CountError {
    pub fn source_open(target: impl Into<String>, source: std::io::Error) -> Self {
        Self::SourceOpen {
            target: target.into(),
            source,
        }
    }

    pub fn http(target: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Http {
            target: target.into(),
            source,
        }
    }

    pub fn unsupported_source(kind: impl Into<String>) -> Self {
        Self::UnsupportedSource(kind.into())
    }

    pub fn stream_read(target: impl Into<String>, source: std::io::Error) -> Self {
        Self::StreamRead {
            target: target.into(),
            source,
        }
    }

    pub fn worker_panicked(target: impl Into<String>) -> Self {
        Self::WorkerPanicked {
            target: target.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}
