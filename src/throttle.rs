//! Minimum spacing between outbound detail-page fetches.

use std::time::Duration;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Returned when the run was cancelled while waiting for a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

/// Spaces fetches at least `min_interval` apart.
///
/// Each run owns its own throttle; the listing fetch does not go through it.
#[derive(Debug)]
pub struct Throttle {
    min_interval: Duration,
    last_turn: Option<Instant>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_turn: None,
        }
    }

    /// Wait until `min_interval` has passed since the previous turn.
    ///
    /// The first turn is granted immediately. A granted turn is stamped when
    /// the wait ends, so the caller should fetch right after this returns.
    pub async fn wait_turn(&mut self, cancel: &CancellationToken) -> Result<(), Cancelled> {
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }
        if let Some(last) = self.last_turn {
            let ready_at = last + self.min_interval;
            let wait = ready_at.saturating_duration_since(Instant::now());
            trace!(?wait, "Waiting for fetch turn");
            tokio::select! {
                _ = cancel.cancelled() => return Err(Cancelled),
                _ = sleep_until(ready_at) => {}
            }
        }
        self.last_turn = Some(Instant::now());
        Ok(())
    }
}
