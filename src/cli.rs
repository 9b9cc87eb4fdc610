//! Command-line interface definitions for the catalog crawler.
//!
//! Every option can also come from an environment variable or the YAML file
//! passed with `--config`; flags win over the file.

use crate::config::CrawlerConfig;
use crate::models::SemesterCode;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Command-line arguments for the catalog crawler.
///
/// # Examples
///
/// ```sh
/// # Crawl one semester with the defaults
/// vvz_crawler --semester 2025S
///
/// # Two semesters, notifications on, re-fetching the cached listing
/// DISCORD_WEBHOOK_URL=https://discord.com/api/webhooks/... \
///     vvz_crawler -s 2025S -s 2024W --refresh --cache-dir ./vvzCache
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Semester code to crawl, e.g. 2025S (repeatable)
    #[arg(short, long = "semester", required = true, num_args = 1..)]
    pub semesters: Vec<SemesterCode>,

    /// Ignore the cached listing snapshot and fetch it again
    #[arg(long)]
    pub refresh: bool,

    /// Optional path to a config.yaml file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Base URL of the course catalog
    #[arg(long, env = "VVZ_BASE_URL")]
    pub source_base_url: Option<String>,

    /// Webhook receiving run notifications
    #[arg(long, env = "DISCORD_WEBHOOK_URL")]
    pub notify_target: Option<String>,

    /// Catalog language
    #[arg(long, env = "VVZ_LANGUAGE")]
    pub language: Option<String>,

    /// Directory for listing snapshots
    #[arg(long, env = "VVZ_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Directory for per-semester result logs
    #[arg(long, env = "VVZ_RESULT_DIR")]
    pub result_dir: Option<PathBuf>,

    /// Minimum seconds between detail page requests
    #[arg(long, value_parser = parse_interval)]
    pub min_fetch_interval: Option<Duration>,

    /// Course catalog database
    #[arg(long, env = "DB_URL")]
    pub database_url: Option<String>,

    /// Create the courses table if it is missing (local databases only)
    #[arg(long)]
    pub init_schema: bool,
}

/// Parse a positive, finite number of seconds.
fn parse_interval(raw: &str) -> Result<Duration, String> {
    let secs: f64 = raw.parse().map_err(|e| format!("{raw:?} is not a number: {e}"))?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err(format!("{raw:?} must be a positive number of seconds"));
    }
    Duration::try_from_secs_f64(secs).map_err(|e| e.to_string())
}

impl Cli {
    /// Overlay the flags that were given on top of `config`.
    pub fn apply_to(&self, config: &mut CrawlerConfig) {
        if let Some(url) = &self.source_base_url {
            config.source_base_url = url.clone();
        }
        if let Some(target) = &self.notify_target {
            config.notify_target = Some(target.clone());
        }
        if let Some(language) = &self.language {
            config.language = language.clone();
        }
        if let Some(dir) = &self.cache_dir {
            config.cache_dir = Some(dir.clone());
        }
        if let Some(dir) = &self.result_dir {
            config.result_dir = dir.clone();
        }
        if let Some(interval) = self.min_fetch_interval {
            config.min_fetch_interval = interval;
        }
        if let Some(url) = &self.database_url {
            config.database_url = url.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from(["vvz_crawler", "--semester", "2025S", "--refresh"]);
        assert_eq!(cli.semesters.len(), 1);
        assert_eq!(cli.semesters[0].as_str(), "2025S");
        assert!(cli.refresh);
    }

    #[test]
    fn test_cli_short_flags_and_repeats() {
        let cli = Cli::parse_from([
            "vvz_crawler",
            "-s",
            "2025S",
            "-s",
            "2024W",
            "-c",
            "/etc/vvz.yaml",
        ]);
        let codes: Vec<_> = cli.semesters.iter().map(|s| s.as_str()).collect();
        assert_eq!(codes, ["2025S", "2024W"]);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/vvz.yaml")));
    }

    #[test]
    fn test_cli_rejects_bad_semester() {
        assert!(Cli::try_parse_from(["vvz_crawler", "-s", "../2025S"]).is_err());
        assert!(Cli::try_parse_from(["vvz_crawler"]).is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from([
            "vvz_crawler",
            "-s",
            "2025S",
            "--language",
            "en",
            "--min-fetch-interval",
            "2",
            "--cache-dir",
            "/tmp/snapshots",
        ]);
        let mut config = CrawlerConfig::default();
        cli.apply_to(&mut config);
        assert_eq!(config.language, "en");
        assert_eq!(config.min_fetch_interval, Duration::from_secs(2));
        assert_eq!(config.cache_dir, Some(PathBuf::from("/tmp/snapshots")));
    }

    #[test]
    fn test_rejects_invalid_fetch_interval() {
        for bad in ["-1", "0", "NaN", "inf", "soon"] {
            let arg = format!("--min-fetch-interval={bad}");
            assert!(
                Cli::try_parse_from(["vvz_crawler", "-s", "2025S", arg.as_str()]).is_err(),
                "{bad} should be rejected"
            );
        }
        let cli = Cli::parse_from(["vvz_crawler", "-s", "2025S", "--min-fetch-interval=0.5"]);
        assert_eq!(cli.min_fetch_interval, Some(Duration::from_millis(500)));
    }
}
