//! Source gateways: turn a target string into a readable byte stream.
//!
//! The engine only knows the [`SourceGateway`] trait. Two gateways ship with
//! the crate, [`FileSource`] for local paths and [`HttpSource`] for URLs.
//! Streams are closed when dropped, so a worker releases its source on every
//! exit path without an explicit close call.

use async_trait::async_trait;
use futures_util::TryStreamExt;
use reqwest::Client;
use serde::Deserialize;
use std::fmt;
use std::io;
use std::str::FromStr;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;
use tracing::trace;

use crate::errors::{CountError, CountResult};

/// A readable byte stream for one target, closed on drop
pub type SourceStream = Box<dyn AsyncRead + Send + Unpin>;

/// Opens targets for reading
#[async_trait]
pub trait SourceGateway: Send + Sync {
    async fn open(&self, target: &str) -> CountResult<SourceStream>;
}

/// Supported source types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Url,
    File,
}

impl SourceKind {
    /// Builds the gateway for this kind
    pub fn gateway(self) -> Arc<dyn SourceGateway> {
        match self {
            SourceKind::Url => Arc::new(HttpSource::new()),
            SourceKind::File => Arc::new(FileSource),
        }
    }
}

impl FromStr for SourceKind {
    type Err = CountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "url" => Ok(SourceKind::Url),
            "file" => Ok(SourceKind::File),
            other => Err(CountError::unsupported_source(other)),
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Url => write!(f, "url"),
            SourceKind::File => write!(f, "file"),
        }
    }
}

/// Reads targets as local file paths
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSource;

#[async_trait]
impl SourceGateway for FileSource {
    async fn open(&self, target: &str) -> CountResult<SourceStream> {
        trace!("Opening file: {}", target);
        let file = tokio::fs::File::open(target)
            .await
            .map_err(|e| CountError::source_open(target, e))?;
        Ok(Box::new(file))
    }
}

/// Fetches targets with an HTTP GET and streams the response body.
///
/// The response status is not inspected: an error page is counted like any
/// other body.
#[derive(Debug, Clone, Default)]
pub struct HttpSource {
    client: Client,
}

impl HttpSource {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourceGateway for HttpSource {
    async fn open(&self, target: &str) -> CountResult<SourceStream> {
        trace!("Fetching URL: {}", target);
        let response = self
            .client
            .get(target)
            .send()
            .await
            .map_err(|e| CountError::http(target, e))?;
        trace!("{} responded with {}", target, response.status());

        let body = Box::pin(
            response
                .bytes_stream()
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e)),
        );
        Ok(Box::new(StreamReader::new(body)))
    }
}
