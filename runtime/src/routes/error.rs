use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::error::IngestError;

use super::types::ErrorResponse;

/// HTTP face of [`IngestError`].
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "invalid_request",
            message: message.into(),
        }
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        let (status, code) = match &err {
            IngestError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            IngestError::PermissionDenied(_) => (StatusCode::FORBIDDEN, "permission_denied"),
            IngestError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_failed"),
            IngestError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            IngestError::Extraction(_) => (StatusCode::BAD_GATEWAY, "extraction_failed"),
            IngestError::StoreTransaction(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "store_transaction_failed")
            }
            IngestError::Queue(_) => (StatusCode::INTERNAL_SERVER_ERROR, "queue_failed"),
            IngestError::Tracking(_) => (StatusCode::INTERNAL_SERVER_ERROR, "tracking_failed"),
        };
        Self {
            status,
            code,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            code: self.code.to_string(),
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}
