//! Run progress reporting.
//!
//! [`RunReporter`] turns run milestones into [`NotificationEvent`]s and keeps
//! the run's result log. A notification that cannot be delivered is logged and
//! otherwise ignored.

use crate::models::{
    Attachment, CourseId, CourseRecord, ItemFailure, ItemFailureReason, NotificationEvent,
    ScrapeRun, SemesterCode, Severity,
};
use crate::notify::Notifier;
use crate::outputs::results::ResultSink;
use tracing::{error, info, warn};

pub struct RunReporter<'a> {
    notifier: &'a dyn Notifier,
    sink: ResultSink,
}

impl<'a> RunReporter<'a> {
    pub fn new(notifier: &'a dyn Notifier, sink: ResultSink) -> Self {
        Self { notifier, sink }
    }

    async fn send(&self, event: NotificationEvent) {
        if let Err(e) = self.notifier.notify(&event).await {
            warn!(title = %event.title, error = %e, "Failed to deliver notification; continuing");
        }
    }

    pub async fn report_start(&self, semester: &SemesterCode) {
        self.send(NotificationEvent::new(
            format!("Scraping new courses of {semester}"),
            "",
            Severity::Info,
        ))
        .await;
    }

    /// Record a skipped candidate on the run and announce it.
    pub async fn report_item_failure(
        &self,
        run: &mut ScrapeRun,
        identifier: &CourseId,
        reason: ItemFailureReason,
    ) {
        warn!(semester = %run.semester, course = %identifier, %reason, "Skipping candidate");
        let description = format!("{identifier}: {reason} caused an issue");
        run.failures.push(ItemFailure {
            identifier: identifier.clone(),
            reason,
        });
        self.send(NotificationEvent::new("uh-oh", description, Severity::Error))
            .await;
    }

    /// Add an inserted course to the run's result log.
    pub fn record_new(&mut self, record: &CourseRecord) {
        self.sink.record(record);
    }

    pub async fn report_fatal(&self, semester: &SemesterCode, reason: &str) {
        error!(%semester, %reason, "Crawl aborted");
        self.send(NotificationEvent::new(
            "uh-oh",
            format!("{reason} caused an issue"),
            Severity::Error,
        ))
        .await;
    }

    /// Flush the result log and send the completion message, with the run's
    /// summary attached when anything new was inserted.
    pub async fn report_end(mut self, run: &ScrapeRun) {
        let attachment = self.flush_results(run).await;
        let mut event = NotificationEvent::new(
            format!("Finished scraping {} new courses of {}", run.new_count, run.semester),
            failure_summary(run),
            Severity::Success,
        );
        if run.new_count > 0
            && let Some(attachment) = attachment
        {
            event = event.with_attachment(attachment);
        }
        self.send(event).await;
    }

    /// Like [`report_end`](Self::report_end), but for a run stopped early.
    /// Cancellation is not an error and is not reported as one.
    pub async fn report_cancelled(mut self, run: &ScrapeRun) {
        let attachment = self.flush_results(run).await;
        let mut event = NotificationEvent::new(
            format!("Scraping of {} cancelled after {} new courses", run.semester, run.new_count),
            failure_summary(run),
            Severity::Info,
        );
        if let Some(attachment) = attachment {
            event = event.with_attachment(attachment);
        }
        self.send(event).await;
    }

    async fn flush_results(&mut self, run: &ScrapeRun) -> Option<Attachment> {
        let path = self.sink.path();
        let lines = self.sink.line_count();
        match self.sink.flush().await {
            Ok(attachment) => {
                info!(semester = %run.semester, lines, "Result log flushed");
                attachment
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to write result log");
                None
            }
        }
    }
}

fn failure_summary(run: &ScrapeRun) -> String {
    match run.failures.len() {
        0 => String::new(),
        n => format!("{n} courses could not be processed"),
    }
}
