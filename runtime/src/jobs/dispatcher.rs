use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};

use crate::{
    error::{IngestError, IngestResult},
    pipeline::{DocumentPayload, IngestRequest},
};

use super::{
    model::{IngestJob, JobSource},
    queue::{IngestMessage, JobQueue},
    tracker::JobTracker,
};

/// Accepts asynchronous ingestion requests: records a pending job, then
/// hands the work to the queue.
#[derive(Clone)]
pub struct JobDispatcher {
    tracker: JobTracker,
    queue: Arc<dyn JobQueue>,
}

impl JobDispatcher {
    pub fn new(tracker: JobTracker, queue: Arc<dyn JobQueue>) -> Self {
        Self { tracker, queue }
    }

    pub async fn submit(&self, request: IngestRequest) -> IngestResult<IngestJob> {
        let job = self.tracker.create(pending_job(&request)).await?;

        let message = IngestMessage {
            job_id: job.job_id.clone(),
            request,
        };
        if let Err(err) = self.queue.publish(message).await {
            error!(job_id = %job.job_id, error = %format!("{err:#}"), "failed to enqueue job");
            if let Err(mark_err) = self
                .tracker
                .mark_failed(&job.job_id, &format!("failed to enqueue: {err:#}"))
                .await
            {
                error!(job_id = %job.job_id, error = %mark_err, "failed to record enqueue failure");
            }
            return Err(IngestError::queue(&err));
        }

        info!(job_id = %job.job_id, source = ?job.source, "job queued");
        Ok(job)
    }
}

fn pending_job(request: &IngestRequest) -> IngestJob {
    let source = match request.payload {
        DocumentPayload::Text { .. } => JobSource::Text,
        DocumentPayload::File { .. } => JobSource::Upload,
    };
    let mut job = IngestJob::new(source, request.max_triplets, Utc::now());
    job.document_id = request.document_id.clone();
    job.document_title = request.title.clone();
    job.user_id = request.user_id.clone();
    job.context = request.context.clone();
    match &request.payload {
        DocumentPayload::Text { text } => job.text = Some(text.clone()),
        DocumentPayload::File { filename, .. } => job.filename = filename.clone(),
    }
    job
}
