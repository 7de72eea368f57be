//! Asynchronous ingestion: job records with a TTL, a durable work queue and
//! the workers draining it.

pub mod dispatcher;
pub mod model;
pub mod queue;
pub mod store;
pub mod tracker;
pub mod worker;

pub use dispatcher::JobDispatcher;
pub use model::{IngestJob, JobSource, JobStatus};
pub use queue::{Delivery, IngestMessage, JobQueue, LocalQueue, LocalQueueConfig};
pub use store::{JobStore, JsonJobStore, JsonJobStoreConfig};
pub use tracker::JobTracker;
pub use worker::{Worker, spawn_workers};
