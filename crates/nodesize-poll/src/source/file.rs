//! Queue source backed by a JSON file, re-read on every fetch.

use std::path::{Path, PathBuf};

use nodesize_core::QueuedJob;

use super::{SourceError, parse_queue};
use crate::fetch::Fetcher;

#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn read(&self) -> Result<Vec<QueuedJob>, SourceError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|source| SourceError::Read {
                path: self.path.clone(),
                source,
            })?;
        parse_queue(&bytes)
    }
}

impl Fetcher for FileSource {
    type Output = Vec<QueuedJob>;

    async fn fetch(&self) -> anyhow::Result<Vec<QueuedJob>> {
        Ok(self.read().await?)
    }
}
