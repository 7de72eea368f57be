use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};

use super::{error::AppError, types::DocumentGraphResponse};
use crate::{AppState, error::IngestError};

pub fn graph_routes() -> Router<Arc<AppState>> {
    Router::new().route("/documents/{id}/graph", get(get_document_graph))
}

async fn get_document_graph(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DocumentGraphResponse>, AppError> {
    let graph = state
        .graph
        .document_graph(&id)
        .await
        .map_err(|err| IngestError::store(&err))?
        .ok_or_else(|| IngestError::not_found("document", &id))?;
    Ok(Json(graph.into()))
}
