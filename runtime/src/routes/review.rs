use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::post,
};

use super::{
    error::AppError,
    types::{EditRequest, FlagRequest, RelationshipResponse, ReviewerRequest},
};
use crate::AppState;

pub fn review_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/relationships/{id}/confirm", post(confirm))
        .route("/relationships/{id}/flag", post(flag))
        .route("/relationships/{id}/edit", post(edit))
}

async fn confirm(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ReviewerRequest>,
) -> Result<Json<RelationshipResponse>, AppError> {
    let edge = state.review.confirm(&id, &body.reviewer).await?;
    Ok(Json(edge.into()))
}

async fn flag(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<FlagRequest>,
) -> Result<Json<RelationshipResponse>, AppError> {
    let edge = state.review.flag(&id, &body.reviewer, &body.reason).await?;
    Ok(Json(edge.into()))
}

async fn edit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<EditRequest>,
) -> Result<Json<RelationshipResponse>, AppError> {
    let edge = state.review.edit(&id, &body.reviewer, body.edit).await?;
    Ok(Json(edge.into()))
}
