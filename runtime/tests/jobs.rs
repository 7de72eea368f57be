mod common;

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use common::{
    FlakyJobStore, Harness, ScriptedExtractor, open_jobs, open_queue, temp_working_dir, text_request, vemurafenib,
};
use kg_runtime::{
    IngestError,
    graph::GraphStore,
    jobs::{IngestJob, IngestMessage, JobQueue, JobSource, JobStatus, JobStore, Worker},
};

#[tokio::test]
async fn queued_job_runs_to_completion() -> anyhow::Result<()> {
    let harness = Harness::new(ScriptedExtractor::returning(vec![vemurafenib()])).await?;

    let job = harness
        .state
        .dispatcher
        .submit(text_request("Vemurafenib targets BRAF V600E.", Some("doc-melanoma")))
        .await?;
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.source, JobSource::Text);
    assert_eq!(harness.queue.depth().await, 1);

    let delivery = harness.queue.consume().await?;
    assert_eq!(delivery.message.job_id, job.job_id);
    harness.worker().handle(delivery).await;

    let done = harness.tracker.get(&job.job_id).await?;
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.document_id.as_deref(), Some("doc-melanoma"));
    assert_eq!(done.triplets_extracted, Some(1));
    assert_eq!(done.triplets_written, Some(1));
    assert!(done.started_at.is_some());
    assert!(done.completed_at >= done.started_at);
    assert_eq!(harness.queue.depth().await, 0);
    Ok(())
}

#[tokio::test]
async fn extraction_failure_marks_job_failed_and_acks() -> anyhow::Result<()> {
    let harness = Harness::new(ScriptedExtractor::failing("provider unavailable")).await?;

    let job = harness
        .state
        .dispatcher
        .submit(text_request("MEK activates ERK.", None))
        .await?;
    let delivery = harness.queue.consume().await?;
    harness.worker().handle(delivery).await;

    let failed = harness.tracker.get(&job.job_id).await?;
    assert_eq!(failed.status, JobStatus::Failed);
    let message = failed.error_message.unwrap_or_default();
    assert!(message.contains("provider unavailable"), "{message}");

    // acked: a restarted queue has nothing left to deliver
    let reopened = open_queue(&harness.dir).await?;
    assert_eq!(reopened.depth().await, 0);
    assert!(harness.graph.relationships().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn job_store_outage_before_start_requeues_message() -> anyhow::Result<()> {
    let harness = Harness::with_job_store(ScriptedExtractor::returning(vec![vemurafenib()]), |jobs| {
        Arc::new(FlakyJobStore::new(jobs, JobStatus::Processing, 1)) as Arc<dyn JobStore>
    })
    .await?;
    let job = harness
        .state
        .dispatcher
        .submit(text_request("Vemurafenib targets BRAF V600E.", None))
        .await?;

    let delivery = harness.queue.consume().await?;
    harness.worker().handle(delivery).await;

    let stalled = harness.tracker.get(&job.job_id).await?;
    assert_eq!(stalled.status, JobStatus::Pending);
    assert_eq!(harness.queue.depth().await, 1);
    assert_eq!(harness.extractor.calls(), 0);

    let retry = harness.queue.consume().await?;
    assert!(retry.redelivered);
    harness.worker().handle(retry).await;

    let done = harness.tracker.get(&job.job_id).await?;
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(harness.queue.depth().await, 0);
    Ok(())
}

#[tokio::test]
async fn unrecordable_completion_falls_back_to_failed() -> anyhow::Result<()> {
    let harness = Harness::with_job_store(ScriptedExtractor::returning(vec![vemurafenib()]), |jobs| {
        Arc::new(FlakyJobStore::new(jobs, JobStatus::Completed, usize::MAX)) as Arc<dyn JobStore>
    })
    .await?;
    let job = harness
        .state
        .dispatcher
        .submit(text_request("Vemurafenib targets BRAF V600E.", None))
        .await?;

    let delivery = harness.queue.consume().await?;
    harness.worker().handle(delivery).await;

    let failed = harness.tracker.get(&job.job_id).await?;
    assert_eq!(failed.status, JobStatus::Failed);
    let message = failed.error_message.unwrap_or_default();
    assert!(message.contains("failed to record job completion"), "{message}");
    assert_eq!(harness.queue.depth().await, 0);
    // the graph write itself went through
    assert_eq!(harness.graph.relationships().await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn redelivered_terminal_job_is_skipped() -> anyhow::Result<()> {
    let harness = Harness::new(ScriptedExtractor::returning(vec![vemurafenib()])).await?;
    let request = text_request("Vemurafenib targets BRAF V600E.", None);
    let job = harness.state.dispatcher.submit(request.clone()).await?;

    let delivery = harness.queue.consume().await?;
    harness.worker().handle(delivery).await;
    let first = harness.tracker.get(&job.job_id).await?;
    assert_eq!(harness.extractor.calls(), 1);

    harness
        .queue
        .publish(IngestMessage {
            job_id: job.job_id.clone(),
            request,
        })
        .await?;
    let duplicate = harness.queue.consume().await?;
    harness.worker().handle(duplicate).await;

    assert_eq!(harness.extractor.calls(), 1);
    assert_eq!(harness.tracker.get(&job.job_id).await?, first);
    assert_eq!(harness.queue.depth().await, 0);
    Ok(())
}

#[tokio::test]
async fn processing_keeps_the_first_start_time() -> anyhow::Result<()> {
    let harness = Harness::new(ScriptedExtractor::returning(Vec::new())).await?;
    let job = harness
        .state
        .dispatcher
        .submit(text_request("Nothing to see.", None))
        .await?;

    let first = harness.tracker.mark_processing(&job.job_id).await?;
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = harness.tracker.mark_processing(&job.job_id).await?;
    assert_eq!(first.started_at, second.started_at);

    harness
        .tracker
        .mark_completed(&job.job_id, "doc-x".into(), 0, 0)
        .await?;
    assert!(matches!(
        harness.tracker.mark_processing(&job.job_id).await,
        Err(IngestError::InvalidRequest(_))
    ));
    assert!(matches!(
        harness.tracker.get("job-unknown").await,
        Err(IngestError::NotFound { kind: "job", .. })
    ));
    Ok(())
}

#[tokio::test]
async fn unacked_messages_are_redelivered_after_restart() -> anyhow::Result<()> {
    let harness = Harness::new(ScriptedExtractor::returning(vec![vemurafenib()])).await?;
    let job = harness
        .state
        .dispatcher
        .submit(text_request("Vemurafenib targets BRAF V600E.", None))
        .await?;
    let lost = harness.queue.consume().await?;
    assert_eq!(lost.message.job_id, job.job_id);

    // crash before ack
    let restarted = open_queue(&harness.dir).await?;
    assert_eq!(restarted.depth().await, 1);
    let again = restarted.consume().await?;
    assert_eq!(again.message.job_id, job.job_id);

    let worker = Worker::new(
        1,
        restarted.clone(),
        harness.tracker.clone(),
        harness.ingest.clone(),
    );
    worker.handle(again).await;
    assert_eq!(
        harness.tracker.get(&job.job_id).await?.status,
        JobStatus::Completed
    );
    Ok(())
}

#[tokio::test]
async fn nack_with_requeue_puts_message_back_in_front() -> anyhow::Result<()> {
    let dir = temp_working_dir();
    let queue = open_queue(&dir).await?;
    for id in ["job-1", "job-2"] {
        queue
            .publish(IngestMessage {
                job_id: id.into(),
                request: text_request("text", None),
            })
            .await?;
    }

    let first = queue.consume().await?;
    queue.nack(first.tag, true).await?;
    let again = queue.consume().await?;
    assert_eq!(again.message.job_id, "job-1");
    assert!(again.redelivered);

    queue.nack(again.tag, false).await?;
    let next = queue.consume().await?;
    assert_eq!(next.message.job_id, "job-2");
    assert!(queue.ack(next.tag).await.is_ok());
    assert!(queue.ack(next.tag).await.is_err());
    Ok(())
}

#[tokio::test]
async fn worker_loop_stops_on_shutdown() -> anyhow::Result<()> {
    let harness = Harness::new(ScriptedExtractor::returning(vec![vemurafenib()])).await?;
    let shutdown = tokio_util::sync::CancellationToken::new();
    let handle = tokio::spawn(harness.worker().run(shutdown.clone()));

    let job = harness
        .state
        .dispatcher
        .submit(text_request("Vemurafenib targets BRAF V600E.", None))
        .await?;

    let mut status = JobStatus::Pending;
    for _ in 0..100 {
        status = harness.tracker.get(&job.job_id).await?.status;
        if status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(status, JobStatus::Completed);

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle).await??;
    Ok(())
}

#[tokio::test]
async fn job_records_expire_after_ttl() -> anyhow::Result<()> {
    let dir = temp_working_dir();
    let store = open_jobs(&dir, chrono::Duration::milliseconds(20)).await?;
    let job = IngestJob::new(JobSource::Text, 5, Utc::now());
    store.put(job.clone()).await?;
    assert!(store.get(&job.job_id).await?.is_some());

    tokio::time::sleep(Duration::from_millis(40)).await;
    assert!(store.get(&job.job_id).await?.is_none());
    assert_eq!(store.purge_expired().await?, 1);

    let reopened = open_jobs(&dir, chrono::Duration::hours(1)).await?;
    assert!(reopened.get(&job.job_id).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn jobs_list_newest_first_per_user() -> anyhow::Result<()> {
    let dir = temp_working_dir();
    let store = open_jobs(&dir, chrono::Duration::hours(1)).await?;
    let now = Utc::now();

    let mut older = IngestJob::new(JobSource::Text, 5, now - chrono::Duration::minutes(5));
    older.user_id = Some("alice".into());
    let mut newer = IngestJob::new(JobSource::Upload, 5, now);
    newer.user_id = Some("alice".into());
    let mut other = IngestJob::new(JobSource::Text, 5, now);
    other.user_id = Some("bob".into());
    for job in [older.clone(), newer.clone(), other] {
        store.put(job).await?;
    }

    let alice: Vec<String> = store
        .list(Some("alice"))
        .await?
        .into_iter()
        .map(|j| j.job_id)
        .collect();
    assert_eq!(alice, vec![newer.job_id, older.job_id]);
    assert_eq!(store.list(None).await?.len(), 3);
    Ok(())
}
