//! Data models shared by every crawl stage.
//!
//! - [`CourseId`] / [`CourseRecord`]: a catalog entry and its natural key
//! - [`SemesterCode`]: the term a run is scoped to
//! - [`Candidate`]: what the listing page told us before we checked the store
//! - [`ScrapeRun`] / [`RunReport`]: per-run bookkeeping, mutable and finalized
//! - [`NotificationEvent`]: what gets sent to the notification channel

use crate::error::ConfigError;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

static COURSE_ID_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{3}-\d{4}-[A-Za-z0-9]{3}$").unwrap());

/// Catalog course number, e.g. `252-0027-00L`.
///
/// Only constructible through [`CourseId::parse`], so holding one means the
/// value has the canonical 3-4-3 shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CourseId(String);

impl CourseId {
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        COURSE_ID_SHAPE.is_match(raw).then(|| CourseId(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CourseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A course as stored in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CourseRecord {
    pub identifier: CourseId,
    pub title: String,
}

impl CourseRecord {
    /// The line written to the result log and the end-of-run artifact.
    pub fn summary_line(&self) -> String {
        format!("{} - {}", self.identifier, self.title)
    }
}

/// A course found on the listing page. `title` is `None` when the listing
/// only carried the identifier and the detail page has to be consulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub identifier: CourseId,
    pub title: Option<String>,
}

/// Term key used by the catalog source, e.g. `2025S`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(try_from = "String")]
pub struct SemesterCode(String);

impl SemesterCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for SemesterCode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.len() > 16 || !s.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ConfigError::InvalidSemester(s.to_string()));
        }
        Ok(SemesterCode(s.to_string()))
    }
}

impl TryFrom<String> for SemesterCode {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for SemesterCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a single candidate was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemFailureReason {
    Lookup(String),
    Insert(String),
    DetailFetch(String),
    TitleNotFound,
}

impl fmt::Display for ItemFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemFailureReason::Lookup(e) => write!(f, "catalog lookup failed: {e}"),
            ItemFailureReason::Insert(e) => write!(f, "catalog insert failed: {e}"),
            ItemFailureReason::DetailFetch(e) => write!(f, "detail page fetch failed: {e}"),
            ItemFailureReason::TitleNotFound => f.write_str("no title on detail page"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub identifier: CourseId,
    pub reason: ItemFailureReason,
}

/// Bookkeeping for one run while it is in progress.
///
/// Owned by the orchestrator for the duration of the run and consumed by
/// [`ScrapeRun::finish`].
#[derive(Debug)]
pub struct ScrapeRun {
    pub semester: SemesterCode,
    pub started_at: DateTime<Utc>,
    pub new_count: usize,
    pub failures: Vec<ItemFailure>,
}

impl ScrapeRun {
    pub fn start(semester: SemesterCode) -> Self {
        Self {
            semester,
            started_at: Utc::now(),
            new_count: 0,
            failures: Vec::new(),
        }
    }

    pub fn finish(self, outcome: RunOutcome) -> RunReport {
        RunReport {
            semester: self.semester,
            started_at: self.started_at,
            finished_at: Utc::now(),
            new_count: self.new_count,
            failures: self.failures,
            outcome,
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Cancelled,
    Fatal(String),
}

/// A finished run. Nothing mutates it after [`ScrapeRun::finish`].
#[derive(Debug, Clone)]
pub struct RunReport {
    pub semester: SemesterCode,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub new_count: usize,
    pub failures: Vec<ItemFailure>,
    pub outcome: RunOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Error,
}

impl Severity {
    /// Embed color understood by Discord-style webhooks.
    pub fn color(self) -> u32 {
        match self {
            Severity::Info => 1651554,
            Severity::Success => 5763719,
            Severity::Error => 6428441,
        }
    }
}

/// Small text file attached to a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub content: String,
}

/// A message for the notification channel. Sent, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEvent {
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub attachment: Option<Attachment>,
}

impl NotificationEvent {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        severity: Severity,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            severity,
            attachment: None,
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }
}
