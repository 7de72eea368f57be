pub mod consolidation;
pub mod error;
pub mod graph;
pub mod ingest;
pub mod jobs;
pub mod review;

pub mod types;

use std::sync::Arc;

use axum::{Router, routing::get};

use crate::AppState;

pub use consolidation::consolidation_routes;
pub use error::AppError;
pub use graph::graph_routes;
pub use ingest::ingest_routes;
pub use jobs::job_routes;
pub use review::review_routes;

pub fn router(state: Arc<AppState>) -> Router {
    let upload_limit = state.max_upload_bytes;
    Router::new()
        .route("/health", get(health))
        .merge(ingest_routes(upload_limit))
        .merge(job_routes(upload_limit))
        .merge(review_routes())
        .merge(consolidation_routes())
        .merge(graph_routes())
        .with_state(state)
}

#[inline]
async fn health() -> &'static str {
    "ok"
}
