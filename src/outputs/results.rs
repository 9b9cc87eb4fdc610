//! Run-scoped result log.
//!
//! A [`ResultSink`] collects one line per course inserted during a run and,
//! when the run ends, appends them to `{result_dir}/{semester}.txt`. The
//! lines of this run double as the artifact attached to the end notification.
//!
//! # Append vs Replace
//!
//! The log file is append-only so repeated runs for a semester build up its
//! full history; the attachment only ever contains the current run's lines.

use crate::models::{Attachment, CourseRecord, SemesterCode};
use std::error::Error;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument};

#[derive(Debug)]
pub struct ResultSink {
    dir: PathBuf,
    semester: SemesterCode,
    lines: Vec<String>,
}

impl ResultSink {
    pub fn new(dir: impl Into<PathBuf>, semester: SemesterCode) -> Self {
        Self {
            dir: dir.into(),
            semester,
            lines: Vec::new(),
        }
    }

    fn file_name(&self) -> String {
        format!("{}.txt", self.semester)
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(self.file_name())
    }

    pub fn record(&mut self, record: &CourseRecord) {
        self.lines.push(record.summary_line());
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Append the recorded lines to the log and hand them back as an attachment.
    /// The sink is empty afterwards.
    ///
    /// Returns `Ok(None)` without touching the file system when nothing was
    /// recorded.
    #[instrument(
        level = "info",
        skip_all,
        fields(semester = %self.semester, lines = self.lines.len())
    )]
    pub async fn flush(&mut self) -> Result<Option<Attachment>, Box<dyn Error + Send + Sync>> {
        if self.lines.is_empty() {
            return Ok(None);
        }

        let mut content = String::new();
        for line in &self.lines {
            content.push_str(line);
            content.push('\n');
        }

        fs::create_dir_all(&self.dir).await?;
        let path = self.path();
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        info!(path = %path.display(), "Appended run results");
        self.lines.clear();

        Ok(Some(Attachment {
            file_name: self.file_name(),
            content,
        }))
    }
}
