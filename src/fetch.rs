//! Page retrieval from the catalog source.
//!
//! [`HttpFetcher`] does one GET per call with a bounded timeout and returns the
//! body verbatim; it never retries. [`SnapshotCache`] keeps the raw listing of
//! a semester on disk so repeated runs read the same markup without hitting
//! the source again.

use crate::error::FetchError;
use crate::models::SemesterCode;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::fs;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Retrieves raw markup for a URL.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<String, FetchError>;
}

/// Network fetcher backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Build a fetcher whose requests give up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Http`] if the TLS backend cannot be initialised.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn fetch(&self, url: &Url) -> Result<String, FetchError> {
        let t0 = Instant::now();
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "Catalog source answered with an error status");
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response.text().await?;
        debug!(bytes = body.len(), elapsed_ms = t0.elapsed().as_millis() as u64, "Fetched page");
        Ok(body)
    }
}

/// One file per semester holding the raw listing markup.
///
/// Not safe for concurrent writers on the same semester; the run registry
/// keeps at most one run per semester alive.
#[derive(Debug, Clone)]
pub struct SnapshotCache {
    dir: PathBuf,
}

impl SnapshotCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, semester: &SemesterCode) -> PathBuf {
        self.dir.join(format!("{semester}.html"))
    }

    /// The stored snapshot, or `None` when this semester was never fetched.
    pub async fn load(&self, semester: &SemesterCode) -> Result<Option<String>, FetchError> {
        let path = self.path_for(semester);
        match fs::read_to_string(&path).await {
            Ok(markup) => {
                debug!(path = %path.display(), bytes = markup.len(), "Snapshot cache hit");
                Ok(Some(markup))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write (or overwrite) the snapshot for a semester.
    pub async fn store(&self, semester: &SemesterCode, markup: &str) -> Result<(), FetchError> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(semester);
        write_atomically(&path, markup).await?;
        info!(path = %path.display(), bytes = markup.len(), "Stored listing snapshot");
        Ok(())
    }
}

async fn write_atomically(path: &Path, contents: &str) -> std::io::Result<()> {
    let tmp = path.with_extension("html.tmp");
    fs::write(&tmp, contents).await?;
    fs::rename(&tmp, path).await
}
