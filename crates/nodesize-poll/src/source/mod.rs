//! Job queue sources.
//!
//! Both sources accept either a bare JSON array of job records or the
//! list envelope `{"items": [...]}`. Individual records never fail to
//! decode (see [`QueuedJob::from_value`]); only a document that is not JSON
//! or has neither shape is an error.

pub mod file;
pub mod http;

use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use nodesize_core::{QueuedJob, SourceConfig};

use crate::fetch::Fetcher;

pub use file::FileSource;
pub use http::HttpSource;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("queue document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("queue document must be an array or an object with an \"items\" array")]
    Shape,

    #[error("invalid queue URL {0:?}")]
    InvalidUrl(String),

    #[error("request to {url} failed: {reason}")]
    Http { url: String, reason: String },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },
}

/// Decode a queue document into jobs, preserving order.
pub fn parse_queue(bytes: &[u8]) -> Result<Vec<QueuedJob>, SourceError> {
    let doc: Value = serde_json::from_slice(bytes)?;
    let items = match &doc {
        Value::Array(items) => items,
        Value::Object(obj) => match obj.get("items") {
            Some(Value::Array(items)) => items,
            _ => return Err(SourceError::Shape),
        },
        _ => return Err(SourceError::Shape),
    };
    Ok(items.iter().map(QueuedJob::from_value).collect())
}

/// A configured queue source.
#[derive(Debug, Clone)]
pub enum QueueSource {
    File(FileSource),
    Http(HttpSource),
}

impl QueueSource {
    pub fn from_config(config: &SourceConfig) -> Result<Self, SourceError> {
        match config {
            SourceConfig::File { path } => Ok(QueueSource::File(FileSource::new(path.clone()))),
            SourceConfig::Http { url, .. } => {
                // Config validation has already parsed the timeout.
                let timeout = config.timeout().unwrap_or(Duration::from_secs(5));
                Ok(QueueSource::Http(HttpSource::new(url, timeout)?))
            }
        }
    }

    /// Human-readable location, for logs.
    pub fn location(&self) -> String {
        match self {
            QueueSource::File(f) => f.path().display().to_string(),
            QueueSource::Http(h) => h.url().to_string(),
        }
    }
}

impl Fetcher for QueueSource {
    type Output = Vec<QueuedJob>;

    async fn fetch(&self) -> anyhow::Result<Vec<QueuedJob>> {
        match self {
            QueueSource::File(f) => f.fetch().await,
            QueueSource::Http(h) => h.fetch().await,
        }
    }
}
