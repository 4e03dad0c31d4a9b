//! Error types for catalog construction and configuration loading.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Errors raised while building a [`SizeCatalog`](crate::SizeCatalog).
#[derive(Debug, Error, PartialEq)]
pub enum CatalogError {
    #[error("catalog does not list any node sizes")]
    Empty,

    #[error("node size {0:?} is listed more than once")]
    DuplicateSize(String),

    #[error("node size {id:?} has invalid cost {cost}")]
    InvalidCost { id: String, cost: f64 },
}

/// Errors raised while loading or validating a config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid duration for {field}: {value:?}")]
    InvalidDuration { field: &'static str, value: String },

    #[error("invalid catalog: {0}")]
    Catalog(#[from] CatalogError),

    #[error("no queues configured")]
    NoQueues,

    #[error("queue {0:?} is configured more than once")]
    DuplicateQueue(String),

    #[error("{0}")]
    Invalid(String),
}
