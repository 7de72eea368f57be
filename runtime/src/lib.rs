//! Triplet ingestion and entity resolution for a knowledge graph: candidate
//! triplets are sanitized, validated and merged idempotently into a property
//! graph, duplicate entities are consolidated, and merged edges go through
//! human review.

use std::sync::Arc;

pub mod ai;
pub mod config;
pub mod error;
pub mod graph;
pub mod jobs;
pub mod pipeline;
pub mod routes;
pub mod storage;
pub mod triplets;

use graph::{Consolidator, GraphStore, ReviewService};
use jobs::{JobDispatcher, JobTracker};
use pipeline::IngestService;

pub use error::{IngestError, IngestResult};

/// Shared handles behind the HTTP surface.
#[derive(Clone)]
pub struct AppState {
    pub ingest: Arc<IngestService>,
    pub dispatcher: JobDispatcher,
    pub tracker: JobTracker,
    pub review: Arc<ReviewService>,
    pub consolidator: Arc<Consolidator>,
    pub graph: Arc<dyn GraphStore>,
    /// Body limit applied to the multipart upload routes.
    pub max_upload_bytes: usize,
}
