//! Remote model artifacts and their local cache

pub mod fetcher;

pub use fetcher::{ArtifactFetcher, FetchError, FetchOutcome};

use serde::Deserialize;
use std::path::PathBuf;

/// One downloadable model artifact.
///
/// `local_path` doubles as the cache key: if a file exists there it is used
/// as-is, without checksumming or staleness checks.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ArtifactSpec {
    /// Identifier understood by the remote file host
    #[serde(default)]
    pub remote_id: String,
    /// Destination on the local filesystem
    pub local_path: PathBuf,
}

impl ArtifactSpec {
    pub fn new(remote_id: impl Into<String>, local_path: impl Into<PathBuf>) -> Self {
        Self {
            remote_id: remote_id.into(),
            local_path: local_path.into(),
        }
    }

    /// Whether the artifact is already cached locally
    pub fn is_cached(&self) -> bool {
        self.local_path.exists()
    }
}
