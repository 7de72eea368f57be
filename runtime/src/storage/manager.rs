use std::sync::Arc;

use crate::{
    graph::GraphStore,
    jobs::{JobQueue, JobStore},
};

use super::StorageResult;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StoragesStatus {
    #[default]
    Created,
    Initialized,
}

enum ManagedStorage {
    Graph(Arc<dyn GraphStore>),
    Jobs(Arc<dyn JobStore>),
    Queue(Arc<dyn JobQueue>),
}

impl ManagedStorage {
    async fn initialize(&self) -> StorageResult<()> {
        match self {
            ManagedStorage::Graph(storage) => storage.initialize().await,
            ManagedStorage::Jobs(storage) => storage.initialize().await,
            ManagedStorage::Queue(storage) => storage.initialize().await,
        }
    }

    async fn finalize(&self) -> StorageResult<()> {
        match self {
            ManagedStorage::Graph(storage) => storage.finalize().await,
            ManagedStorage::Jobs(storage) => storage.finalize().await,
            ManagedStorage::Queue(storage) => storage.finalize().await,
        }
    }
}

/// sequentially initializes registered backends to avoid deadlocks
#[derive(Default)]
pub struct StorageManager {
    status: StoragesStatus,
    storages: Vec<ManagedStorage>,
}

impl StorageManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> StoragesStatus {
        self.status
    }

    pub fn register_graph(&mut self, storage: Arc<dyn GraphStore>) {
        self.storages.push(ManagedStorage::Graph(storage));
    }

    pub fn register_jobs(&mut self, storage: Arc<dyn JobStore>) {
        self.storages.push(ManagedStorage::Jobs(storage));
    }

    pub fn register_queue(&mut self, queue: Arc<dyn JobQueue>) {
        self.storages.push(ManagedStorage::Queue(queue));
    }

    pub async fn initialize_all(&mut self) -> StorageResult<()> {
        if self.status == StoragesStatus::Initialized {
            return Ok(());
        }

        for storage in &self.storages {
            storage.initialize().await?;
        }

        self.status = StoragesStatus::Initialized;
        Ok(())
    }

    pub async fn finalize_all(&self) -> StorageResult<()> {
        for storage in &self.storages {
            storage.finalize().await?;
        }
        Ok(())
    }
}
