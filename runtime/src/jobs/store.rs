use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering as AtomicOrdering},
    },
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::storage::{
    StorageResult,
    io::{ensure_parent_dir, load_or_default, write_json_file},
};

use super::model::IngestJob;

/// Key-value store for job records with a per-record time-to-live.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn initialize(&self) -> StorageResult<()>;
    async fn finalize(&self) -> StorageResult<()>;

    /// Writes the record and restarts its time-to-live.
    async fn put(&self, job: IngestJob) -> StorageResult<()>;
    async fn get(&self, job_id: &str) -> StorageResult<Option<IngestJob>>;
    /// Live records, newest first, optionally restricted to one user.
    async fn list(&self, user_id: Option<&str>) -> StorageResult<Vec<IngestJob>>;

    async fn purge_expired(&self) -> StorageResult<usize>;
    async fn sync_if_dirty(&self) -> StorageResult<()>;
}

#[derive(Clone, Debug)]
pub struct JsonJobStoreConfig {
    pub working_dir: PathBuf,
    pub namespace: String,
    pub workspace: Option<String>,
    pub ttl: Duration,
}

pub struct JsonJobStore {
    final_namespace: String,
    file_path: PathBuf,
    ttl: Duration,
    data: Arc<RwLock<HashMap<String, JobRecord>>>,
    dirty: AtomicBool,
    write_lock: Mutex<()>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct JobRecord {
    job: IngestJob,
    expires_at: DateTime<Utc>,
}

impl JobRecord {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

impl JsonJobStore {
    pub fn new(config: JsonJobStoreConfig) -> Self {
        let JsonJobStoreConfig {
            working_dir,
            namespace,
            workspace,
            ttl,
        } = config;

        let (workspace_prefix, workspace_dir) = match workspace.as_deref() {
            Some(ws) if !ws.is_empty() => (ws.to_string(), working_dir.join(ws)),
            _ => ("_".to_string(), working_dir.clone()),
        };

        let final_namespace = format!("{}_{}", workspace_prefix, namespace);
        let file_path = workspace_dir.join(format!("job_store_{}.json", namespace));

        Self {
            final_namespace,
            file_path,
            ttl,
            data: Arc::new(RwLock::new(HashMap::new())),
            dirty: AtomicBool::new(false),
            write_lock: Mutex::new(()),
        }
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, AtomicOrdering::SeqCst);
    }

    fn evict_expired(records: &mut HashMap<String, JobRecord>, now: DateTime<Utc>) -> usize {
        let before = records.len();
        records.retain(|_, record| record.is_live(now));
        before - records.len()
    }
}

#[async_trait]
impl JobStore for JsonJobStore {
    async fn initialize(&self) -> Result<()> {
        ensure_parent_dir(&self.file_path).await?;
        let mut data: HashMap<String, JobRecord> = load_or_default(&self.file_path).await?;
        let evicted = Self::evict_expired(&mut data, Utc::now());
        *self.data.write().await = data;
        self.dirty.store(evicted > 0, AtomicOrdering::SeqCst);
        if evicted > 0 {
            debug!(namespace = %self.final_namespace, evicted, "dropped expired job records");
        }
        self.sync_if_dirty().await
    }

    async fn finalize(&self) -> Result<()> {
        self.sync_if_dirty().await
    }

    async fn put(&self, job: IngestJob) -> Result<()> {
        let now = Utc::now();
        let job_id = job.job_id.clone();
        let previous = {
            let mut guard = self.data.write().await;
            Self::evict_expired(&mut guard, now);
            guard.insert(
                job_id.clone(),
                JobRecord {
                    job,
                    expires_at: now + self.ttl,
                },
            )
        };
        self.mark_dirty();
        if let Err(err) = self.sync_if_dirty().await {
            // Memory must not run ahead of what the caller was told failed.
            let mut guard = self.data.write().await;
            match previous {
                Some(record) => guard.insert(job_id, record),
                None => guard.remove(&job_id),
            };
            return Err(err);
        }
        Ok(())
    }

    async fn get(&self, job_id: &str) -> Result<Option<IngestJob>> {
        let now = Utc::now();
        let guard = self.data.read().await;
        Ok(guard
            .get(job_id)
            .filter(|record| record.is_live(now))
            .map(|record| record.job.clone()))
    }

    async fn list(&self, user_id: Option<&str>) -> Result<Vec<IngestJob>> {
        let now = Utc::now();
        let guard = self.data.read().await;
        let mut jobs: Vec<IngestJob> = guard
            .values()
            .filter(|record| record.is_live(now))
            .filter(|record| match user_id {
                Some(user) => record.job.user_id.as_deref() == Some(user),
                None => true,
            })
            .map(|record| record.job.clone())
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.job_id.cmp(&b.job_id)));
        Ok(jobs)
    }

    async fn purge_expired(&self) -> Result<usize> {
        let evicted = {
            let mut guard = self.data.write().await;
            Self::evict_expired(&mut guard, Utc::now())
        };
        if evicted > 0 {
            self.mark_dirty();
            self.sync_if_dirty().await?;
        }
        Ok(evicted)
    }

    async fn sync_if_dirty(&self) -> Result<()> {
        let _write = self.write_lock.lock().await;
        if !self.dirty.swap(false, AtomicOrdering::SeqCst) {
            return Ok(());
        }

        let snapshot = {
            let guard = self.data.read().await;
            guard.clone()
        };

        if let Err(err) = write_json_file(&self.file_path, &snapshot).await {
            self.mark_dirty();
            return Err(err)
                .with_context(|| format!("failed to write job store {}", self.final_namespace));
        }
        Ok(())
    }
}
