use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use tracing::info;

use super::{
    error::AppError,
    types::{
        ConsolidationResponse, ConsolidationRunRequest, DuplicateListResponse,
        MergeEntitiesRequest,
    },
};
use crate::AppState;

pub fn consolidation_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/consolidation/duplicates", get(list_duplicates))
        .route("/consolidation/run", post(run))
        .route("/consolidation/merge", post(merge))
}

async fn list_duplicates(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DuplicateListResponse>, AppError> {
    let groups = state.consolidator.find_duplicate_entities().await?;
    Ok(Json(DuplicateListResponse {
        total: groups.len(),
        groups: groups.into_iter().map(Into::into).collect(),
    }))
}

async fn run(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ConsolidationRunRequest>,
) -> Result<Json<ConsolidationResponse>, AppError> {
    state.review.ensure_admin(&body.actor)?;
    let summary = state.consolidator.consolidate_identical_entities().await?;
    info!(actor = %body.actor, groups = summary.groups_merged, "manual consolidation run");
    Ok(Json(summary.into()))
}

async fn merge(
    State(state): State<Arc<AppState>>,
    Json(body): Json<MergeEntitiesRequest>,
) -> Result<Json<ConsolidationResponse>, AppError> {
    state.review.ensure_admin(&body.actor)?;
    let summary = state
        .consolidator
        .merge_specific_entities(&body.entity_ids)
        .await?;
    info!(actor = %body.actor, ids = body.entity_ids.len(), "manual entity merge");
    Ok(Json(summary.into()))
}
