//! Trigger entry point and the registry of active runs.
//!
//! Triggering spawns the run as its own task and returns at once. At most one
//! run per semester is active; a second trigger for the same semester is
//! rejected until the first one has finished.

use crate::crawl::{CrawlOrchestrator, RunOptions};
use crate::error::TriggerError;
use crate::models::{RunReport, SemesterCode};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

type ActiveRuns = Arc<Mutex<HashMap<SemesterCode, CancellationToken>>>;

/// Acknowledgement of a trigger; lets the caller cancel or await the run.
#[derive(Debug)]
pub struct RunHandle {
    pub semester: SemesterCode,
    cancel: CancellationToken,
    join: JoinHandle<RunReport>,
}

impl RunHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn wait(self) -> Result<RunReport, JoinError> {
        self.join.await
    }
}

#[derive(Clone)]
pub struct RunRegistry {
    orchestrator: Arc<CrawlOrchestrator>,
    active: ActiveRuns,
    shutdown: CancellationToken,
}

/// Removes the registry entry when the run task ends, however it ends.
struct Deregister {
    active: ActiveRuns,
    semester: SemesterCode,
}

impl Drop for Deregister {
    fn drop(&mut self) {
        if let Ok(mut active) = self.active.lock() {
            active.remove(&self.semester);
        }
    }
}

impl RunRegistry {
    /// Runs are cancelled when `shutdown` fires.
    pub fn new(orchestrator: Arc<CrawlOrchestrator>, shutdown: CancellationToken) -> Self {
        Self {
            orchestrator,
            active: Arc::default(),
            shutdown,
        }
    }

    /// Start a run for `semester` in the background.
    ///
    /// # Arguments
    ///
    /// * `semester` - Semester to crawl
    /// * `options` - Passed through to [`CrawlOrchestrator::run`]
    ///
    /// # Returns
    ///
    /// A [`RunHandle`] as soon as the task is spawned, or
    /// [`TriggerError::AlreadyRunning`] when a run for `semester` is active.
    pub fn trigger(
        &self,
        semester: SemesterCode,
        options: RunOptions,
    ) -> Result<RunHandle, TriggerError> {
        let cancel = {
            let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
            if active.contains_key(&semester) {
                warn!(%semester, "Rejecting trigger; run already active");
                return Err(TriggerError::AlreadyRunning(semester.to_string()));
            }
            let cancel = self.shutdown.child_token();
            active.insert(semester.clone(), cancel.clone());
            cancel
        };

        let guard = Deregister {
            active: self.active.clone(),
            semester: semester.clone(),
        };
        let orchestrator = self.orchestrator.clone();
        let run_semester = semester.clone();
        let run_cancel = cancel.clone();
        let join = tokio::spawn(async move {
            let _guard = guard;
            orchestrator.run(run_semester, options, run_cancel).await
        });

        info!(%semester, refresh = options.refresh, "Crawl triggered");
        Ok(RunHandle {
            semester,
            cancel,
            join,
        })
    }

    pub fn is_active(&self, semester: &SemesterCode) -> bool {
        self.active
            .lock()
            .map(|active| active.contains_key(semester))
            .unwrap_or(false)
    }

    /// Cancel the active run for `semester`. Returns `false` if there was none.
    pub fn cancel(&self, semester: &SemesterCode) -> bool {
        let active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        match active.get(semester) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        self.shutdown.cancel();
    }
}
