use std::{sync::Arc, time::Duration};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    error::{IngestError, IngestResult},
    pipeline::{IngestOutcome, IngestService},
};

use super::{
    model::{IngestJob, JobStatus},
    queue::{Delivery, IngestMessage, JobQueue},
    tracker::JobTracker,
};

const CONSUME_BACKOFF: Duration = Duration::from_secs(1);
const REQUEUE_BACKOFF: Duration = Duration::from_millis(500);
const TRACKING_ATTEMPTS: u32 = 3;
const TRACKING_BACKOFF: Duration = Duration::from_millis(100);

/// What happened to one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Handled {
    Finished(JobStatus),
    Skipped,
    /// The job record could not be updated; the message goes back on the
    /// queue so the job is not left without an owner.
    Requeue,
}

/// Single-message-at-a-time consumer. A delivery is acknowledged once its
/// job reaches a terminal state (or is skipped); failures live on the job
/// record, not on the queue. Only a job store that cannot be written puts the
/// message back.
pub struct Worker {
    id: usize,
    queue: Arc<dyn JobQueue>,
    tracker: JobTracker,
    ingest: Arc<IngestService>,
}

impl Worker {
    pub fn new(
        id: usize,
        queue: Arc<dyn JobQueue>,
        tracker: JobTracker,
        ingest: Arc<IngestService>,
    ) -> Self {
        Self {
            id,
            queue,
            tracker,
            ingest,
        }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        info!(worker = self.id, "ingest worker started");
        loop {
            let delivery = tokio::select! {
                _ = shutdown.cancelled() => break,
                delivery = self.queue.consume() => delivery,
            };
            match delivery {
                Ok(delivery) => self.handle(delivery).await,
                Err(err) => {
                    error!(worker = self.id, error = %format!("{err:#}"), "failed to consume job");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(CONSUME_BACKOFF) => {}
                    }
                }
            }
        }
        info!(worker = self.id, "ingest worker stopped");
    }

    pub async fn handle(&self, delivery: Delivery) {
        let Delivery {
            tag,
            message,
            redelivered,
        } = delivery;
        let job_id = message.job_id.clone();
        if redelivered {
            warn!(worker = self.id, %job_id, "processing redelivered job");
        }

        let settled = match self.process(message).await {
            Handled::Finished(status) => {
                info!(worker = self.id, %job_id, status = status.as_str(), "job finished");
                self.queue.ack(tag).await
            }
            Handled::Skipped => self.queue.ack(tag).await,
            Handled::Requeue => {
                warn!(worker = self.id, %job_id, "job record unavailable; requeueing");
                tokio::time::sleep(REQUEUE_BACKOFF).await;
                self.queue.nack(tag, true).await
            }
        };
        if let Err(err) = settled {
            error!(worker = self.id, %job_id, tag, error = %format!("{err:#}"), "failed to settle delivery");
        }
    }

    async fn process(&self, message: IngestMessage) -> Handled {
        let IngestMessage { job_id, request } = message;

        match self.tracker.mark_processing(&job_id).await {
            Ok(_) => {}
            Err(IngestError::InvalidRequest(reason)) => {
                warn!(worker = self.id, %job_id, %reason, "skipping finished job");
                return Handled::Skipped;
            }
            Err(IngestError::NotFound { .. }) => {
                warn!(worker = self.id, %job_id, "job record expired; dropping message");
                return Handled::Skipped;
            }
            Err(err) => {
                error!(worker = self.id, %job_id, error = %err, "failed to mark job processing");
                return Handled::Requeue;
            }
        }

        let result = self.ingest.ingest(request).await;
        if let Err(err) = &result {
            warn!(worker = self.id, %job_id, error = %err, "ingestion failed");
        }
        self.settle(&job_id, result).await
    }

    /// Records the terminal state, retrying the store a few times. A
    /// completion that cannot be recorded falls back to `failed` so pollers
    /// still see a terminal status.
    async fn settle(&self, job_id: &str, result: IngestResult<IngestOutcome>) -> Handled {
        let mut last_error = None;
        for attempt in 1..=TRACKING_ATTEMPTS {
            match self.record(job_id, &result).await {
                Ok(job) => return Handled::Finished(job.status),
                Err(IngestError::InvalidRequest(reason)) => {
                    warn!(worker = self.id, job_id, %reason, "job already settled");
                    return Handled::Skipped;
                }
                Err(IngestError::NotFound { .. }) => return Handled::Skipped,
                Err(err) => {
                    warn!(worker = self.id, job_id, attempt, error = %err, "failed to record job outcome");
                    last_error = Some(err);
                    tokio::time::sleep(TRACKING_BACKOFF).await;
                }
            }
        }

        if result.is_ok() {
            let reason = match last_error {
                Some(err) => format!("failed to record job completion: {err}"),
                None => "failed to record job completion".to_string(),
            };
            if let Ok(job) = self.tracker.mark_failed(job_id, &reason).await {
                return Handled::Finished(job.status);
            }
        }
        Handled::Requeue
    }

    async fn record(
        &self,
        job_id: &str,
        result: &IngestResult<IngestOutcome>,
    ) -> IngestResult<IngestJob> {
        match result {
            Ok(outcome) => {
                self.tracker
                    .mark_completed(
                        job_id,
                        outcome.document_id.clone(),
                        outcome.triplets_extracted,
                        outcome.triplets_written,
                    )
                    .await
            }
            Err(err) => self.tracker.mark_failed(job_id, &err.to_string()).await,
        }
    }
}

pub fn spawn_workers(
    count: usize,
    queue: Arc<dyn JobQueue>,
    tracker: JobTracker,
    ingest: Arc<IngestService>,
    shutdown: CancellationToken,
) -> Vec<JoinHandle<()>> {
    (0..count.max(1))
        .map(|id| {
            let worker = Worker::new(id, queue.clone(), tracker.clone(), ingest.clone());
            tokio::spawn(worker.run(shutdown.clone()))
        })
        .collect()
}
