use std::{
    collections::{HashMap, VecDeque},
    path::PathBuf,
};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify};
use tracing::debug;

use crate::{
    pipeline::IngestRequest,
    storage::{
        StorageResult,
        io::{ensure_parent_dir, load_or_default, write_json_file},
    },
};

/// Queue payload for one asynchronous ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestMessage {
    pub job_id: String,
    pub request: IngestRequest,
}

#[derive(Debug, Clone)]
pub struct Delivery {
    pub tag: u64,
    pub message: IngestMessage,
    pub redelivered: bool,
}

/// Durable FIFO with explicit acknowledgement. A consumed message stays
/// owned by its consumer until acked or nacked; unacknowledged messages are
/// delivered again after a restart.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn initialize(&self) -> StorageResult<()>;
    async fn finalize(&self) -> StorageResult<()>;

    async fn publish(&self, message: IngestMessage) -> StorageResult<()>;
    /// Waits for the next message. Cancel-safe: dropping the future never
    /// loses a message.
    async fn consume(&self) -> StorageResult<Delivery>;
    async fn ack(&self, tag: u64) -> StorageResult<()>;
    async fn nack(&self, tag: u64, requeue: bool) -> StorageResult<()>;

    /// Messages waiting to be consumed.
    async fn depth(&self) -> usize;
}

#[derive(Clone, Debug)]
pub struct LocalQueueConfig {
    pub working_dir: PathBuf,
    pub name: String,
    pub workspace: Option<String>,
}

pub struct LocalQueue {
    name: String,
    file_path: PathBuf,
    state: Mutex<QueueState>,
    ready_signal: Notify,
    persist_lock: Mutex<()>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Envelope {
    message: IngestMessage,
    #[serde(default)]
    deliveries: u32,
}

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<Envelope>,
    unacked: HashMap<u64, Envelope>,
    next_tag: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct QueueSnapshot {
    messages: Vec<Envelope>,
}

impl QueueState {
    fn snapshot(&self) -> QueueSnapshot {
        let mut in_flight: Vec<(&u64, &Envelope)> = self.unacked.iter().collect();
        in_flight.sort_by_key(|(tag, _)| **tag);
        let messages = in_flight
            .into_iter()
            .map(|(_, envelope)| envelope.clone())
            .chain(self.ready.iter().cloned())
            .collect();
        QueueSnapshot { messages }
    }
}

impl LocalQueue {
    pub fn new(config: LocalQueueConfig) -> Self {
        let LocalQueueConfig {
            working_dir,
            name,
            workspace,
        } = config;

        let queue_dir = match workspace.as_deref() {
            Some(ws) if !ws.is_empty() => working_dir.join(ws),
            _ => working_dir,
        };
        let file_path = queue_dir.join(format!("queue_{}.json", name));

        Self {
            name,
            file_path,
            state: Mutex::new(QueueState::default()),
            ready_signal: Notify::new(),
            persist_lock: Mutex::new(()),
        }
    }

    async fn persist(&self) -> Result<()> {
        let _write = self.persist_lock.lock().await;
        let snapshot = {
            let state = self.state.lock().await;
            state.snapshot()
        };
        write_json_file(&self.file_path, &snapshot)
            .await
            .with_context(|| format!("failed to persist queue {}", self.name))
    }
}

#[async_trait]
impl JobQueue for LocalQueue {
    async fn initialize(&self) -> Result<()> {
        ensure_parent_dir(&self.file_path).await?;
        let snapshot: QueueSnapshot = load_or_default(&self.file_path)
            .await
            .with_context(|| format!("failed to load queue {}", self.name))?;
        let recovered = snapshot.messages.len();
        {
            let mut state = self.state.lock().await;
            state.unacked.clear();
            state.ready = snapshot.messages.into();
        }
        if recovered > 0 {
            debug!(queue = %self.name, recovered, "recovered queued messages");
            self.ready_signal.notify_one();
        }
        Ok(())
    }

    async fn finalize(&self) -> Result<()> {
        self.persist().await
    }

    async fn publish(&self, message: IngestMessage) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            state.ready.push_back(Envelope {
                message,
                deliveries: 0,
            });
        }
        self.persist().await?;
        self.ready_signal.notify_one();
        Ok(())
    }

    async fn consume(&self) -> Result<Delivery> {
        loop {
            {
                let mut state = self.state.lock().await;
                if let Some(mut envelope) = state.ready.pop_front() {
                    envelope.deliveries += 1;
                    state.next_tag += 1;
                    let tag = state.next_tag;
                    let delivery = Delivery {
                        tag,
                        message: envelope.message.clone(),
                        redelivered: envelope.deliveries > 1,
                    };
                    state.unacked.insert(tag, envelope);
                    if !state.ready.is_empty() {
                        self.ready_signal.notify_one();
                    }
                    return Ok(delivery);
                }
            }
            self.ready_signal.notified().await;
        }
    }

    async fn ack(&self, tag: u64) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            state
                .unacked
                .remove(&tag)
                .ok_or_else(|| anyhow!("unknown delivery tag {tag} on queue {}", self.name))?;
        }
        self.persist().await
    }

    async fn nack(&self, tag: u64, requeue: bool) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            let envelope = state
                .unacked
                .remove(&tag)
                .ok_or_else(|| anyhow!("unknown delivery tag {tag} on queue {}", self.name))?;
            if requeue {
                state.ready.push_front(envelope);
            }
        }
        self.persist().await?;
        if requeue {
            self.ready_signal.notify_one();
        }
        Ok(())
    }

    async fn depth(&self) -> usize {
        self.state.lock().await.ready.len()
    }
}
