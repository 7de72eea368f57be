use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{IngestError, IngestResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobSource {
    Text,
    Upload,
}

impl JobSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobSource::Text => "text",
            JobSource::Upload => "upload",
        }
    }
}

/// Tracking record of one asynchronous ingestion.
///
/// Uploaded bytes travel only on the queue message; submitted text is kept
/// here so an operator can inspect or resubmit it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestJob {
    pub job_id: String,
    pub status: JobStatus,
    pub source: JobSource,
    #[serde(default)]
    pub document_id: Option<String>,
    #[serde(default)]
    pub document_title: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    pub max_triplets: usize,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub triplets_extracted: Option<usize>,
    #[serde(default)]
    pub triplets_written: Option<usize>,
}

impl IngestJob {
    pub fn new(source: JobSource, max_triplets: usize, now: DateTime<Utc>) -> Self {
        Self {
            job_id: format!("job-{}", Uuid::new_v4()),
            status: JobStatus::Pending,
            source,
            document_id: None,
            document_title: None,
            filename: None,
            user_id: None,
            max_triplets,
            context: None,
            text: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            error_message: None,
            triplets_extracted: None,
            triplets_written: None,
        }
    }

    /// `pending -> processing`. Re-entering `processing` (a redelivered
    /// message) keeps the original `started_at`.
    pub fn mark_processing(&mut self, now: DateTime<Utc>) -> IngestResult<()> {
        self.ensure_open("processing")?;
        self.status = JobStatus::Processing;
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
        Ok(())
    }

    pub fn mark_completed(
        &mut self,
        document_id: String,
        triplets_extracted: usize,
        triplets_written: usize,
        now: DateTime<Utc>,
    ) -> IngestResult<()> {
        self.ensure_processing("completed")?;
        self.status = JobStatus::Completed;
        self.document_id = Some(document_id);
        self.triplets_extracted = Some(triplets_extracted);
        self.triplets_written = Some(triplets_written);
        self.error_message = None;
        self.completed_at = Some(now);
        Ok(())
    }

    /// Failure is accepted from `pending` too, covering jobs whose message
    /// never made it onto the queue.
    pub fn mark_failed(&mut self, message: impl Into<String>, now: DateTime<Utc>) -> IngestResult<()> {
        self.ensure_open("failed")?;
        let message = message.into();
        self.status = JobStatus::Failed;
        self.error_message = Some(if message.trim().is_empty() {
            "unknown failure".to_string()
        } else {
            message
        });
        self.completed_at = Some(now);
        Ok(())
    }

    fn ensure_open(&self, target: &str) -> IngestResult<()> {
        if self.status.is_terminal() {
            return Err(IngestError::InvalidRequest(format!(
                "job {} is already {} and cannot become {target}",
                self.job_id,
                self.status.as_str()
            )));
        }
        Ok(())
    }

    fn ensure_processing(&self, target: &str) -> IngestResult<()> {
        if self.status != JobStatus::Processing {
            return Err(IngestError::InvalidRequest(format!(
                "job {} is {} and cannot become {target}",
                self.job_id,
                self.status.as_str()
            )));
        }
        Ok(())
    }
}
