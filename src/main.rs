//! # VVZ Crawler
//!
//! Keeps the course review catalog in sync with the ETH course catalog
//! ("Vorlesungsverzeichnis"). Each invocation crawls one or more semesters,
//! inserts the courses the database does not know yet and reports progress
//! to a webhook.
//!
//! ## Usage
//!
//! ```sh
//! vvz_crawler --semester 2025S
//! ```
//!
//! ## Architecture
//!
//! Every semester is one bounded, cancellable run:
//! 1. **Fetching**: Listing page from the snapshot cache or the catalog source
//! 2. **Extracting**: Course numbers and titles pulled out of the table rows
//! 3. **Processing**: Per course, catalog lookup, throttled detail fetch when
//!    the title is missing, insert
//! 4. **Reporting**: Result log appended and completion notification sent
//!
//! Runs for different semesters execute concurrently; Ctrl-C cancels all of them.

use clap::Parser;
use futures::future::join_all;
use std::error::Error;
use std::sync::Arc;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod catalog;
mod cli;
mod config;
mod crawl;
mod error;
mod fetch;
mod models;
mod notify;
mod outputs;
mod registry;
mod report;
mod retry;
mod scrapers;
mod throttle;
mod utils;

#[cfg(test)]
mod testing;

use catalog::SqlCatalogStore;
use cli::Cli;
use config::CrawlerConfig;
use crawl::{Collaborators, CrawlOrchestrator, RunOptions};
use fetch::HttpFetcher;
use models::{RunOutcome, RunReport};
use notify::{NoopNotifier, Notifier, WebhookNotifier};
use registry::RunRegistry;
use scrapers::vvz::{VvzExtractor, VvzUrls};
use utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("vvz_crawler starting up");

    let args = Cli::parse();
    let mut config = CrawlerConfig::load(args.config.as_deref())?;
    args.apply_to(&mut config);
    config.validate()?;
    info!(
        source = %config.source_base_url,
        language = %config.language,
        cache_dir = ?config.cache_dir,
        result_dir = %config.result_dir.display(),
        interval = ?config.min_fetch_interval,
        "Configuration resolved"
    );

    // Fail before crawling if results could not be written at the end.
    if let Err(e) = ensure_writable_dir(&config.result_dir).await {
        error!(path = %config.result_dir.display(), error = %e, "Result directory is not writable");
        return Err(e);
    }

    let notifier: Arc<dyn Notifier> = match &config.notify_target {
        Some(target) => Arc::new(WebhookNotifier::new(
            target.clone(),
            config.notifier_username.clone(),
            config.notifier_avatar_url.clone(),
        )?),
        None => {
            warn!("No notification target configured; run notifications are disabled");
            Arc::new(NoopNotifier)
        }
    };
    let store = SqlCatalogStore::connect(&config.database_url).await?;
    if args.init_schema {
        store.ensure_schema().await?;
    }

    let parts = Collaborators {
        fetcher: Arc::new(HttpFetcher::new(config.request_timeout)?),
        extractor: Arc::new(VvzExtractor),
        urls: Arc::new(VvzUrls::new(config.base_url()?, config.language.clone())),
        store: Arc::new(store),
        notifier,
    };
    let orchestrator = Arc::new(CrawlOrchestrator::new(&config, parts)?);

    let shutdown = CancellationToken::new();
    let registry = RunRegistry::new(orchestrator, shutdown.clone());

    let options = RunOptions {
        refresh: args.refresh,
    };
    let mut handles = Vec::new();
    for semester in args.semesters {
        match registry.trigger(semester, options) {
            Ok(handle) => {
                info!(semester = %handle.semester, "Crawl running in background");
                handles.push(handle);
            }
            Err(e) => warn!(error = %e, "Skipping duplicate semester"),
        }
    }

    let ctrl_c = {
        let registry = registry.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received; cancelling active crawls");
                registry.cancel_all();
            }
        })
    };

    let results = join_all(handles.into_iter().map(|h| h.wait())).await;
    ctrl_c.abort();

    let fatal = log_reports(results);
    let elapsed = start_time.elapsed();
    info!(?elapsed, fatal, "Execution complete");
    if fatal > 0 {
        return Err(format!("{fatal} crawl(s) failed").into());
    }
    Ok(())
}

/// Log how every run ended.
///
/// # Returns
///
/// The number of runs that ended fatally or whose task panicked. Cancelled
/// runs do not count as failures.
fn log_reports(results: Vec<Result<RunReport, JoinError>>) -> usize {
    let mut fatal = 0usize;
    for result in results {
        match result {
            Ok(report) => {
                let secs = (report.finished_at - report.started_at).num_seconds();
                match &report.outcome {
                    RunOutcome::Fatal(reason) => {
                        fatal += 1;
                        error!(semester = %report.semester, %reason, secs, "Crawl failed");
                    }
                    outcome => info!(
                        semester = %report.semester,
                        ?outcome,
                        new_courses = report.new_count,
                        failures = report.failures.len(),
                        secs,
                        "Crawl ended"
                    ),
                }
            }
            Err(e) => {
                fatal += 1;
                error!(error = %e, "Crawl task panicked");
            }
        }
    }
    fatal
}
