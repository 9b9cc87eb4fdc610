//! One bounded crawl of the catalog for a single semester.
//!
//! ```text
//! Idle → Fetching → Extracting → ProcessingCandidates → Reporting → Done
//!           │           │                 │                  │
//!           ├───────────┴─→ FatalError    └─→ (cancel) ──────┴─→ Cancelled
//!           └─→ (cancel) ─→ Reporting ─→ Cancelled
//! ```
//!
//! The run is strictly sequential: candidates are handled one by one in
//! listing order. A listing that cannot be fetched or paired aborts the run
//! before anything is written. Failures on a single candidate are recorded
//! and the run moves on.

use crate::catalog::{CatalogStore, DedupFilter, Persister};
use crate::config::CrawlerConfig;
use crate::error::{ConfigError, FetchError};
use crate::fetch::{PageFetcher, SnapshotCache};
use crate::models::{
    Candidate, CourseRecord, ItemFailureReason, RunOutcome, RunReport, ScrapeRun, SemesterCode,
};
use crate::notify::Notifier;
use crate::outputs::results::ResultSink;
use crate::report::RunReporter;
use crate::retry::RetryFetch;
use crate::scrapers::{RecordExtractor, SourceUrls};
use crate::throttle::Throttle;
use itertools::Itertools;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Where a run currently is. Logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlState {
    Idle,
    Fetching,
    Extracting,
    ProcessingCandidates,
    Reporting,
    Done,
    Cancelled,
    FatalError,
}

impl CrawlState {
    fn is_terminal(self) -> bool {
        matches!(self, CrawlState::Done | CrawlState::Cancelled | CrawlState::FatalError)
    }
}

struct StateTracker<'a> {
    semester: &'a SemesterCode,
    state: CrawlState,
}

impl StateTracker<'_> {
    fn advance(&mut self, next: CrawlState) {
        debug_assert!(!self.state.is_terminal(), "run already finished");
        debug!(semester = %self.semester, from = ?self.state, to = ?next, "Crawl state transition");
        self.state = next;
    }
}

/// Per-trigger switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Ignore the listing snapshot and overwrite it with a fresh fetch.
    pub refresh: bool,
}

/// External collaborators a crawl is assembled from.
#[derive(Clone)]
pub struct Collaborators {
    pub fetcher: Arc<dyn PageFetcher>,
    pub extractor: Arc<dyn RecordExtractor>,
    pub urls: Arc<dyn SourceUrls>,
    pub store: Arc<dyn CatalogStore>,
    pub notifier: Arc<dyn Notifier>,
}

/// Result of handling one candidate.
enum Step {
    Known,
    Inserted(CourseRecord),
    Failed(ItemFailureReason),
    Cancelled,
}

pub struct CrawlOrchestrator {
    parts: Collaborators,
    cache: Option<SnapshotCache>,
    result_dir: PathBuf,
    min_fetch_interval: Duration,
    listing_retries: usize,
    retry_base_delay: Duration,
}

impl CrawlOrchestrator {
    /// Assemble an orchestrator from a validated configuration.
    ///
    /// # Arguments
    ///
    /// * `config` - Resolved crawler configuration; validated again here
    /// * `parts` - Fetcher, extractor, URL scheme, store and notifier to use
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `config` fails validation.
    pub fn new(config: &CrawlerConfig, parts: Collaborators) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            parts,
            cache: config.cache_dir.clone().map(SnapshotCache::new),
            result_dir: config.result_dir.clone(),
            min_fetch_interval: config.min_fetch_interval,
            listing_retries: config.listing_retries,
            retry_base_delay: Duration::from_secs(1),
        })
    }

    /// Run one crawl to completion, cancellation or fatal error.
    ///
    /// # Arguments
    ///
    /// * `semester` - Semester whose listing is crawled
    /// * `options` - Per-trigger switches such as `refresh`
    /// * `cancel` - Token that stops the run at the next checkpoint
    ///
    /// # Returns
    ///
    /// The finalized [`RunReport`]. Never an error: every way a run can end is
    /// described by the report and was already announced through the notifier.
    #[instrument(level = "info", skip_all, fields(%semester, refresh = options.refresh))]
    pub async fn run(
        &self,
        semester: SemesterCode,
        options: RunOptions,
        cancel: CancellationToken,
    ) -> RunReport {
        let mut state = StateTracker {
            semester: &semester,
            state: CrawlState::Idle,
        };
        let mut run = ScrapeRun::start(semester.clone());
        let mut reporter = RunReporter::new(
            self.parts.notifier.as_ref(),
            ResultSink::new(&self.result_dir, semester.clone()),
        );

        info!("Crawl started");
        state.advance(CrawlState::Fetching);
        reporter.report_start(&semester).await;

        let markup = match self.fetch_listing(&semester, options, &cancel).await {
            Ok(markup) => markup,
            Err(FetchError::Cancelled) => {
                state.advance(CrawlState::Reporting);
                reporter.report_cancelled(&run).await;
                state.advance(CrawlState::Cancelled);
                return run.finish(RunOutcome::Cancelled);
            }
            Err(e) => {
                let reason = format!("Error visiting URL: {e}");
                state.advance(CrawlState::FatalError);
                reporter.report_fatal(&semester, &reason).await;
                return run.finish(RunOutcome::Fatal(reason));
            }
        };

        state.advance(CrawlState::Extracting);
        let candidates = match self.parts.extractor.extract_listing(&markup) {
            Ok(candidates) => candidates,
            Err(e) => {
                let reason = e.to_string();
                state.advance(CrawlState::FatalError);
                reporter.report_fatal(&semester, &reason).await;
                return run.finish(RunOutcome::Fatal(reason));
            }
        };
        let extracted = candidates.len();
        let candidates: Vec<Candidate> = candidates
            .into_iter()
            .unique_by(|c| c.identifier.clone())
            .collect();
        info!(extracted, unique = candidates.len(), "Listing extracted");

        state.advance(CrawlState::ProcessingCandidates);
        let dedup = DedupFilter::new(self.parts.store.as_ref());
        let persister = Persister::new(self.parts.store.as_ref());
        let mut throttle = Throttle::new(self.min_fetch_interval);
        let mut cancelled = false;

        for candidate in candidates {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            let step = self
                .process_candidate(
                    &semester,
                    &candidate,
                    &dedup,
                    &persister,
                    &mut throttle,
                    &cancel,
                )
                .await;
            match step {
                Step::Known => debug!(course = %candidate.identifier, "Already in catalog"),
                Step::Inserted(record) => {
                    run.new_count += 1;
                    reporter.record_new(&record);
                }
                Step::Failed(reason) => {
                    reporter
                        .report_item_failure(&mut run, &candidate.identifier, reason)
                        .await;
                }
                Step::Cancelled => {
                    cancelled = true;
                    break;
                }
            }
        }

        state.advance(CrawlState::Reporting);
        if cancelled {
            info!(new_count = run.new_count, "Crawl cancelled");
            reporter.report_cancelled(&run).await;
            state.advance(CrawlState::Cancelled);
            run.finish(RunOutcome::Cancelled)
        } else {
            info!(new_count = run.new_count, failures = run.failures.len(), "Crawl finished");
            reporter.report_end(&run).await;
            state.advance(CrawlState::Done);
            run.finish(RunOutcome::Completed)
        }
    }

    /// Listing markup from the snapshot cache, or from the source with retries.
    async fn fetch_listing(
        &self,
        semester: &SemesterCode,
        options: RunOptions,
        cancel: &CancellationToken,
    ) -> Result<String, FetchError> {
        if let Some(cache) = &self.cache
            && !options.refresh
        {
            match cache.load(semester).await {
                Ok(Some(markup)) => {
                    info!(path = %cache.path_for(semester).display(), "Using listing snapshot");
                    return Ok(markup);
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Unreadable listing snapshot; fetching from source"),
            }
        }

        let url = self.parts.urls.listing_url(semester)?;
        info!(%url, "Fetching listing");
        let fetcher = RetryFetch::new(
            self.parts.fetcher.as_ref(),
            self.listing_retries,
            self.retry_base_delay,
            cancel.clone(),
        );
        let markup = fetcher.fetch(&url).await?;

        if let Some(cache) = &self.cache
            && let Err(e) = cache.store(semester, &markup).await
        {
            warn!(error = %e, "Could not store listing snapshot");
        }
        Ok(markup)
    }

    async fn process_candidate(
        &self,
        semester: &SemesterCode,
        candidate: &Candidate,
        dedup: &DedupFilter<'_>,
        persister: &Persister<'_>,
        throttle: &mut Throttle,
        cancel: &CancellationToken,
    ) -> Step {
        let id = &candidate.identifier;
        match dedup.is_known(id).await {
            Ok(true) => return Step::Known,
            Ok(false) => {}
            Err(e) => return Step::Failed(ItemFailureReason::Lookup(e.to_string())),
        }

        let title = match &candidate.title {
            Some(title) => title.clone(),
            None => {
                if throttle.wait_turn(cancel).await.is_err() {
                    return Step::Cancelled;
                }
                let url = match self.parts.urls.detail_url(semester, id) {
                    Ok(url) => url,
                    Err(e) => return Step::Failed(ItemFailureReason::DetailFetch(e.to_string())),
                };
                let page = tokio::select! {
                    _ = cancel.cancelled() => return Step::Cancelled,
                    page = self.parts.fetcher.fetch(&url) => page,
                };
                let markup = match page {
                    Ok(markup) => markup,
                    Err(e) => return Step::Failed(ItemFailureReason::DetailFetch(e.to_string())),
                };
                match self.parts.extractor.extract_title(&markup) {
                    Ok(title) => title,
                    Err(_) => return Step::Failed(ItemFailureReason::TitleNotFound),
                }
            }
        };

        if cancel.is_cancelled() {
            return Step::Cancelled;
        }
        let record = CourseRecord {
            identifier: id.clone(),
            title,
        };
        match persister.insert(&record).await {
            Ok(()) => Step::Inserted(record),
            Err(e) => Step::Failed(ItemFailureReason::Insert(e.to_string())),
        }
    }
}
