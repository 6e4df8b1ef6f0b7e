//! Artifact download with confirmation-page handling
//!
//! Large files on the default host are served behind an interstitial warning
//! page. The first response then carries a `download_warning*` cookie whose
//! value must be echoed back as the `confirm` parameter to get the real
//! content. Small files come back directly on the first request.

use super::ArtifactSpec;
use crate::config::ArtifactsConfig;
use futures::{Stream, StreamExt};
use reqwest::{Client, Response};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

const DEFAULT_CONFIRM_COOKIE_PREFIX: &str = "download_warning";
const DEFAULT_CHUNK_SIZE: usize = 32 * 1024;

/// Errors raised while making an artifact available locally
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request for artifact {remote_id} failed: {source}")]
    Request {
        remote_id: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("remote host returned status {status} for artifact {remote_id}")]
    Status { remote_id: String, status: u16 },

    #[error("cannot write artifact to {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// What `ensure_local` had to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The file was already present; no network I/O happened
    Cached,
    /// The file was downloaded
    Downloaded {
        bytes: u64,
        /// Whether the confirmation-token follow-up request was needed
        confirmed: bool,
    },
}

/// Downloads artifacts from the remote file host into their local paths
pub struct ArtifactFetcher {
    client: Client,
    base_url: String,
    confirm_cookie_prefix: String,
    chunk_size: usize,
}

impl ArtifactFetcher {
    /// Create a fetcher for the given download endpoint with default settings
    pub fn new(base_url: impl Into<String>) -> Result<Self, FetchError> {
        let client = Client::builder()
            .cookie_store(true)
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            confirm_cookie_prefix: DEFAULT_CONFIRM_COOKIE_PREFIX.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        })
    }

    /// Create a fetcher from the artifacts configuration section
    pub fn from_config(config: &ArtifactsConfig) -> Result<Self, FetchError> {
        Ok(Self::new(config.base_url.clone())?
            .with_confirm_cookie_prefix(config.confirm_cookie_prefix.clone())
            .with_chunk_size(config.chunk_size))
    }

    pub fn with_confirm_cookie_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.confirm_cookie_prefix = prefix.into();
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Make sure `spec.local_path` exists, downloading it if absent.
    ///
    /// On failure nothing is left at `local_path`: the body is streamed to a
    /// sibling `.part` file that is renamed into place only once complete.
    pub async fn ensure_local(&self, spec: &ArtifactSpec) -> Result<FetchOutcome, FetchError> {
        if spec.is_cached() {
            debug!(
                remote_id = %spec.remote_id,
                path = %spec.local_path.display(),
                "Artifact already present, skipping download"
            );
            return Ok(FetchOutcome::Cached);
        }

        info!(
            remote_id = %spec.remote_id,
            path = %spec.local_path.display(),
            "Downloading artifact"
        );

        let first = self.request(&spec.remote_id, None).await?;
        let (response, confirmed) = match self.confirmation_token(&first) {
            Some(token) => {
                debug!(remote_id = %spec.remote_id, "Confirmation page detected, retrying with token");
                drop(first);
                (self.request(&spec.remote_id, Some(&token)).await?, true)
            }
            None => (first, false),
        };

        let bytes = self.stream_to_disk(response, spec).await?;

        info!(
            remote_id = %spec.remote_id,
            path = %spec.local_path.display(),
            bytes = bytes,
            confirmed = confirmed,
            "Artifact downloaded"
        );

        Ok(FetchOutcome::Downloaded { bytes, confirmed })
    }

    async fn request(&self, remote_id: &str, token: Option<&str>) -> Result<Response, FetchError> {
        let mut params = vec![("export", "download"), ("id", remote_id)];
        if let Some(token) = token {
            params.push(("confirm", token));
        }

        let response = self
            .client
            .get(&self.base_url)
            .query(&params)
            .send()
            .await
            .map_err(|source| FetchError::Request {
                remote_id: remote_id.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                remote_id: remote_id.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response)
    }

    fn confirmation_token(&self, response: &Response) -> Option<String> {
        response
            .cookies()
            .find(|cookie| cookie.name().starts_with(&self.confirm_cookie_prefix))
            .map(|cookie| cookie.value().to_string())
    }

    async fn stream_to_disk(&self, response: Response, spec: &ArtifactSpec) -> Result<u64, FetchError> {
        let target = &spec.local_path;
        let parent = target.parent().filter(|p| !p.as_os_str().is_empty());
        let created_root = parent.and_then(first_missing_ancestor);

        let result = self.write_artifact(response, spec, parent).await;
        if result.is_err() {
            if let Some(root) = &created_root {
                discard_dir(root).await;
            }
        }
        result
    }

    async fn write_artifact(
        &self,
        response: Response,
        spec: &ArtifactSpec,
        parent: Option<&Path>,
    ) -> Result<u64, FetchError> {
        let target = &spec.local_path;
        if let Some(parent) = parent {
            fs::create_dir_all(parent).await.map_err(|source| FetchError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let part_path = partial_path(target);
        let written = match self
            .write_body(response.bytes_stream(), &spec.remote_id, &part_path)
            .await
        {
            Ok(written) => written,
            Err(e) => {
                discard(&part_path).await;
                return Err(e);
            }
        };

        if let Err(source) = fs::rename(&part_path, target).await {
            discard(&part_path).await;
            return Err(FetchError::Io {
                path: target.clone(),
                source,
            });
        }

        Ok(written)
    }

    async fn write_body<S, B>(
        &self,
        stream: S,
        remote_id: &str,
        part_path: &Path,
    ) -> Result<u64, FetchError>
    where
        S: Stream<Item = Result<B, reqwest::Error>>,
        B: AsRef<[u8]>,
    {
        let io_err = |source: std::io::Error| FetchError::Io {
            path: part_path.to_path_buf(),
            source,
        };

        let file = File::create(part_path).await.map_err(io_err)?;
        let mut writer = BufWriter::with_capacity(self.chunk_size, file);
        let mut written: u64 = 0;
        futures::pin_mut!(stream);

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|source| FetchError::Request {
                remote_id: remote_id.to_string(),
                source,
            })?;
            let chunk = chunk.as_ref();
            // keep-alive frames
            if chunk.is_empty() {
                continue;
            }
            writer.write_all(chunk).await.map_err(io_err)?;
            written += chunk.len() as u64;
        }

        writer.flush().await.map_err(io_err)?;
        writer.into_inner().sync_all().await.map_err(io_err)?;

        Ok(written)
    }
}

/// Outermost directory of `dir` that does not exist yet
fn first_missing_ancestor(dir: &Path) -> Option<PathBuf> {
    dir.ancestors()
        .filter(|p| !p.as_os_str().is_empty())
        .take_while(|p| !p.exists())
        .last()
        .map(Path::to_path_buf)
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = OsString::from(target.as_os_str());
    name.push(".part");
    PathBuf::from(name)
}

async fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove partial download");
        }
    }
}

async fn discard_dir(path: &Path) {
    if let Err(e) = fs::remove_dir_all(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove artifact directory");
        }
    }
}
