//! Crawler configuration.
//!
//! A [`CrawlerConfig`] is built once in `main` (YAML file, then CLI/env
//! overrides) and handed to the orchestrator. Nothing below `main` reads the
//! process environment.

use crate::error::ConfigError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, instrument};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://www.vvz.ethz.ch/Vorlesungsverzeichnis/";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Base of the catalog source; listing and detail endpoints are joined onto it.
    pub source_base_url: String,
    /// Webhook for run notifications. Notifications are skipped when unset.
    pub notify_target: Option<String>,
    /// Catalog language passed to the listing endpoint.
    pub language: String,
    /// Directory for per-semester listing snapshots. No caching when unset.
    pub cache_dir: Option<PathBuf>,
    /// Directory for the per-semester result logs.
    pub result_dir: PathBuf,
    #[serde(with = "secs")]
    pub min_fetch_interval: Duration,
    #[serde(with = "secs")]
    pub request_timeout: Duration,
    /// Extra attempts for the listing page after the first one fails.
    pub listing_retries: usize,
    pub database_url: String,
    pub notifier_username: String,
    pub notifier_avatar_url: Option<String>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            source_base_url: DEFAULT_BASE_URL.to_string(),
            notify_target: None,
            language: "de".to_string(),
            cache_dir: None,
            result_dir: PathBuf::from("vvzScrapeResults"),
            min_fetch_interval: Duration::from_secs(1),
            request_timeout: Duration::from_secs(120),
            listing_retries: 2,
            database_url: "sqlite://courses.db".to_string(),
            notifier_username: "VVZ Scrape-Inator 6000".to_string(),
            notifier_avatar_url: None,
        }
    }
}

impl CrawlerConfig {
    /// Load from a YAML file, or fall back to defaults when no path is given.
    #[instrument(level = "info")]
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)?;
        let config: CrawlerConfig = serde_yaml::from_str(&raw)?;
        info!(path = %path.display(), "Loaded crawler configuration");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.base_url()?;
        if let Some(target) = &self.notify_target {
            Url::parse(target).map_err(|source| ConfigError::InvalidUrl {
                field: "notify_target",
                value: target.clone(),
                source,
            })?;
        }
        if self.min_fetch_interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(())
    }

    /// The source base URL, normalised to end in `/` so relative joins keep the path.
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let mut raw = self.source_base_url.clone();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        Url::parse(&raw).map_err(|source| ConfigError::InvalidUrl {
            field: "source_base_url",
            value: self.source_base_url.clone(),
            source,
        })
    }
}

/// Durations are written as (fractional) seconds in the config file.
mod secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = CrawlerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.min_fetch_interval, Duration::from_secs(1));
        assert_eq!(config.request_timeout, Duration::from_secs(120));
        assert!(config.notify_target.is_none());
    }

    #[test]
    fn test_load_yaml_with_partial_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "language: en\n\
             min_fetch_interval: 2.5\n\
             notify_target: https://hooks.example.com/abc\n\
             cache_dir: /tmp/vvz"
        )
        .unwrap();

        let config = CrawlerConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.language, "en");
        assert_eq!(config.min_fetch_interval, Duration::from_millis(2500));
        assert_eq!(config.cache_dir, Some(PathBuf::from("/tmp/vvz")));
        assert_eq!(config.request_timeout, Duration::from_secs(120));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = CrawlerConfig {
            source_base_url: "not a url".to_string(),
            ..CrawlerConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidUrl { .. })));

        let config = CrawlerConfig {
            min_fetch_interval: Duration::ZERO,
            ..CrawlerConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroInterval)));
    }

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let config = CrawlerConfig {
            source_base_url: "http://localhost:8080/vvz".to_string(),
            ..CrawlerConfig::default()
        };
        assert_eq!(config.base_url().unwrap().as_str(), "http://localhost:8080/vvz/");
    }
}
