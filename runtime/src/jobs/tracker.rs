use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::error::{IngestError, IngestResult};

use super::{model::IngestJob, store::JobStore};

/// Status bookkeeping for asynchronous ingestion jobs. Every transition is a
/// read-modify-write of the whole record, which also refreshes its TTL.
#[derive(Clone)]
pub struct JobTracker {
    store: Arc<dyn JobStore>,
}

impl JobTracker {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    pub async fn create(&self, job: IngestJob) -> IngestResult<IngestJob> {
        self.store
            .put(job.clone())
            .await
            .map_err(|err| IngestError::tracking(&err))?;
        debug!(job_id = %job.job_id, source = ?job.source, "job recorded");
        Ok(job)
    }

    pub async fn get(&self, job_id: &str) -> IngestResult<IngestJob> {
        self.store
            .get(job_id)
            .await
            .map_err(|err| IngestError::tracking(&err))?
            .ok_or_else(|| IngestError::not_found("job", job_id))
    }

    pub async fn list(&self, user_id: Option<&str>) -> IngestResult<Vec<IngestJob>> {
        self.store
            .list(user_id)
            .await
            .map_err(|err| IngestError::tracking(&err))
    }

    pub async fn mark_processing(&self, job_id: &str) -> IngestResult<IngestJob> {
        self.transition(job_id, |job| job.mark_processing(Utc::now()))
            .await
    }

    pub async fn mark_completed(
        &self,
        job_id: &str,
        document_id: String,
        triplets_extracted: usize,
        triplets_written: usize,
    ) -> IngestResult<IngestJob> {
        self.transition(job_id, |job| {
            job.mark_completed(document_id, triplets_extracted, triplets_written, Utc::now())
        })
        .await
    }

    pub async fn mark_failed(&self, job_id: &str, message: &str) -> IngestResult<IngestJob> {
        self.transition(job_id, |job| job.mark_failed(message, Utc::now()))
            .await
    }

    async fn transition<F>(&self, job_id: &str, apply: F) -> IngestResult<IngestJob>
    where
        F: FnOnce(&mut IngestJob) -> IngestResult<()>,
    {
        let mut job = self.get(job_id).await?;
        let from = job.status;
        if let Err(err) = apply(&mut job) {
            warn!(job_id, from = from.as_str(), error = %err, "rejected job transition");
            return Err(err);
        }
        self.store
            .put(job.clone())
            .await
            .map_err(|err| IngestError::tracking(&err))?;
        debug!(job_id, from = from.as_str(), to = job.status.as_str(), "job transitioned");
        Ok(job)
    }
}
