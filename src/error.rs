//! Error types for each stage of a crawl.
//!
//! Run-level errors ([`FetchError`] on the listing page,
//! [`ExtractError::Mismatch`]) abort a run. Everything else is turned into an
//! [`ItemFailureReason`](crate::models::ItemFailureReason) and the run moves
//! on to the next candidate.

use thiserror::Error;

/// Failure retrieving a page from the catalog source or the snapshot cache.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },
    #[error("snapshot cache: {0}")]
    Cache(#[from] std::io::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("cancelled")]
    Cancelled,
}

impl FetchError {
    /// Whether the caller may reasonably try the same request again.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Http(e) => {
                e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
            }
            FetchError::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Failure turning markup into course records.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    /// Identifier and title rules matched a different number of times on the listing.
    #[error(
        "course numbers and names are not equal in length ({identifiers} numbers, {titles} names)"
    )]
    Mismatch { identifiers: usize, titles: usize },
    #[error("no course title found on detail page")]
    TitleNotFound,
}

/// Failure talking to the catalog store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Failure delivering a notification. Never aborts a run.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("webhook answered with status {0}")]
    Status(u16),
    #[error("could not encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Invalid or unreadable crawler configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid {field} url {value:?}: {source}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        source: url::ParseError,
    },
    #[error("min_fetch_interval must be greater than zero")]
    ZeroInterval,
    #[error("invalid semester code {0:?}")]
    InvalidSemester(String),
}

/// Rejected trigger.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TriggerError {
    #[error("a crawl for semester {0} is already running")]
    AlreadyRunning(String),
}
