use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State},
    routing::post,
};
use tracing::info;

use super::{
    error::AppError,
    types::{IngestResponse, IngestTextRequest},
};
use crate::{
    AppState,
    pipeline::{DocumentPayload, IngestRequest},
};

pub fn ingest_routes(upload_limit: usize) -> Router<Arc<AppState>> {
    Router::new()
        .route("/ingest/text", post(ingest_text))
        .route(
            "/ingest/upload",
            post(ingest_upload).layer(DefaultBodyLimit::max(upload_limit)),
        )
}

async fn ingest_text(
    State(state): State<Arc<AppState>>,
    Json(body): Json<IngestTextRequest>,
) -> Result<Json<IngestResponse>, AppError> {
    let request = text_request(&state, body)?;
    let outcome = state.ingest.ingest(request).await?;
    Ok(Json(outcome.into()))
}

async fn ingest_upload(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<IngestResponse>, AppError> {
    let request = upload_request(&state, multipart).await?;
    let outcome = state.ingest.ingest(request).await?;
    Ok(Json(outcome.into()))
}

pub(super) fn text_request(
    state: &AppState,
    body: IngestTextRequest,
) -> Result<IngestRequest, AppError> {
    if body.text.trim().is_empty() {
        return Err(AppError::bad_request("text must not be empty"));
    }
    Ok(IngestRequest {
        payload: DocumentPayload::Text { text: body.text },
        document_id: body.document_id,
        title: body.title,
        user_id: body.user_id,
        max_triplets: resolve_max_triplets(state, body.max_triplets)?,
        context: body.context,
    })
}

/// Multipart form with a required `file` part and optional `document_id`,
/// `title`, `user_id`, `max_triplets` and `context` text parts.
pub(super) async fn upload_request(
    state: &AppState,
    mut multipart: Multipart,
) -> Result<IngestRequest, AppError> {
    let mut file: Option<(Option<String>, Vec<u8>)> = None;
    let mut document_id = None;
    let mut title = None;
    let mut user_id = None;
    let mut max_triplets = None;
    let mut context = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(format!("invalid multipart payload: {err}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let filename = field.file_name().map(str::to_string);
            let data = field
                .bytes()
                .await
                .map_err(|err| AppError::bad_request(format!("failed to read upload field: {err}")))?;
            file = Some((filename, data.to_vec()));
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|err| AppError::bad_request(format!("failed to read field {name}: {err}")))?;
        let value = Some(value.trim().to_string()).filter(|v| !v.is_empty());
        match name.as_str() {
            "document_id" => document_id = value,
            "title" => title = value,
            "user_id" => user_id = value,
            "context" => context = value,
            "max_triplets" => {
                max_triplets = value
                    .map(|v| v.parse::<usize>())
                    .transpose()
                    .map_err(|_| AppError::bad_request("max_triplets must be a positive integer"))?
            }
            _ => {}
        }
    }

    let (filename, bytes) =
        file.ok_or_else(|| AppError::bad_request("missing file field in multipart payload"))?;
    if bytes.is_empty() {
        return Err(AppError::bad_request("uploaded file is empty"));
    }
    info!(filename = filename.as_deref().unwrap_or("-"), size = bytes.len(), "upload received");

    Ok(IngestRequest {
        payload: DocumentPayload::File { filename, bytes },
        document_id,
        title,
        user_id,
        max_triplets: resolve_max_triplets(state, max_triplets)?,
        context,
    })
}

fn resolve_max_triplets(state: &AppState, requested: Option<usize>) -> Result<usize, AppError> {
    match requested {
        Some(0) => Err(AppError::bad_request("max_triplets must be at least 1")),
        Some(n) => Ok(n),
        None => Ok(state.ingest.config().max_triplets),
    }
}
