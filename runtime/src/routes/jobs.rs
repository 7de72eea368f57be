use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};

use super::{
    error::AppError,
    ingest::{text_request, upload_request},
    types::{IngestTextRequest, JobListQuery, JobListResponse, JobResponse},
};
use crate::AppState;

pub fn job_routes(upload_limit: usize) -> Router<Arc<AppState>> {
    Router::new()
        .route("/jobs", get(list_jobs))
        .route("/jobs/text", post(submit_text))
        .route(
            "/jobs/upload",
            post(submit_upload).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/jobs/{job_id}", get(get_job))
}

async fn submit_text(
    State(state): State<Arc<AppState>>,
    Json(body): Json<IngestTextRequest>,
) -> Result<(StatusCode, Json<JobResponse>), AppError> {
    let request = text_request(&state, body)?;
    let job = state.dispatcher.submit(request).await?;
    Ok((StatusCode::ACCEPTED, Json(job.into())))
}

async fn submit_upload(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<JobResponse>), AppError> {
    let request = upload_request(&state, multipart).await?;
    let job = state.dispatcher.submit(request).await?;
    Ok((StatusCode::ACCEPTED, Json(job.into())))
}

async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<JobResponse>, AppError> {
    let job = state.tracker.get(&job_id).await?;
    Ok(Json(job.into()))
}

async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<JobListQuery>,
) -> Result<Json<JobListResponse>, AppError> {
    let user_id = query.user_id.as_deref().filter(|id| !id.trim().is_empty());
    let jobs: Vec<JobResponse> = state
        .tracker
        .list(user_id)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();
    Ok(Json(JobListResponse {
        total: jobs.len(),
        jobs,
    }))
}
