//! Caller-side retry for page fetches.
//!
//! [`PageFetcher`] implementations never retry on their own. The orchestrator
//! wraps the listing fetch in [`RetryFetch`] so a flaky catalog source gets a
//! few more chances before the run is declared failed. Detail pages are not
//! retried; a failed detail page only costs one candidate.
//!
//! # Retry Strategy
//!
//! - Only errors that [`FetchError::is_retryable`] reports are retried
//! - Exponential backoff starting at `base_delay`, capped at 30 seconds
//! - Random jitter (0-250ms) added to every delay
//! - Waiting is abandoned as soon as the run is cancelled

use crate::error::FetchError;
use crate::fetch::PageFetcher;
use async_trait::async_trait;
use rand::{Rng, rng};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, instrument, warn};
use url::Url;

/// Decorator that retries any [`PageFetcher`] with exponential backoff.
///
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetryFetch<'a> {
    inner: &'a dyn PageFetcher,
    max_retries: usize,
    base_delay: Duration,
    max_delay: Duration,
    cancel: CancellationToken,
}

impl<'a> RetryFetch<'a> {
    /// Wrap an existing [`PageFetcher`].
    ///
    /// # Arguments
    ///
    /// * `inner` - Fetcher doing the actual request
    /// * `max_retries` - Extra attempts after the first failure (0 disables retrying)
    /// * `base_delay` - Delay before the first retry, doubled for each further one
    /// * `cancel` - Abandons the request or backoff when fired
    ///
    /// # Example
    ///
    /// ```ignore
    /// let fetcher = HttpFetcher::new(Duration::from_secs(120))?;
    /// let retrying = RetryFetch::new(&fetcher, 2, Duration::from_secs(1), cancel);
    /// let markup = retrying.fetch(&listing_url).await?;
    /// ```
    pub fn new(
        inner: &'a dyn PageFetcher,
        max_retries: usize,
        base_delay: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: Duration::from_secs(30),
            cancel,
        }
    }

    fn delay_for(&self, attempt: usize) -> Duration {
        let shift = (attempt.saturating_sub(1)).min(16) as u32;
        let delay = self.base_delay.saturating_mul(1 << shift).min(self.max_delay);
        let jitter_ms: u64 = rng().random_range(0..=250);
        delay + Duration::from_millis(jitter_ms)
    }
}

impl fmt::Debug for RetryFetch<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

#[async_trait]
impl PageFetcher for RetryFetch<'_> {
    #[instrument(level = "info", skip_all, fields(%url))]
    async fn fetch(&self, url: &Url) -> Result<String, FetchError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            if self.cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }
            let result = tokio::select! {
                _ = self.cancel.cancelled() => return Err(FetchError::Cancelled),
                r = self.inner.fetch(url) => r,
            };
            let e = match result {
                Ok(body) => return Ok(body),
                Err(e) => e,
            };

            attempt += 1;
            let total_ms = total_t0.elapsed().as_millis() as u64;
            if attempt > self.max_retries || !e.is_retryable() {
                error!(
                    attempt,
                    max = self.max_retries,
                    elapsed_ms_total = total_ms,
                    error = %e,
                    "fetch() giving up"
                );
                return Err(e);
            }

            let delay = self.delay_for(attempt);
            warn!(
                attempt,
                max = self.max_retries,
                elapsed_ms_total = total_ms,
                ?delay,
                error = %e,
                "fetch() attempt failed; backing off"
            );
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(FetchError::Cancelled),
                _ = sleep(delay) => {}
            }
        }
    }
}
