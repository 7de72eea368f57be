use thiserror::Error;

pub type IngestResult<T> = Result<T, IngestError>;

/// Failure taxonomy shared by the ingestion, review and consolidation paths.
///
/// Storage and collaborator plumbing reports `anyhow::Error`; those are folded
/// into one of these variants at the component boundary, keeping the full
/// cause chain in the message.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("graph transaction failed: {0}")]
    StoreTransaction(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("queue failure: {0}")]
    Queue(String),

    #[error("job tracking failure: {0}")]
    Tracking(String),
}

impl IngestError {
    pub fn extraction(err: &anyhow::Error) -> Self {
        Self::Extraction(format!("{err:#}"))
    }

    pub fn store(err: &anyhow::Error) -> Self {
        Self::StoreTransaction(format!("{err:#}"))
    }

    pub fn queue(err: &anyhow::Error) -> Self {
        Self::Queue(format!("{err:#}"))
    }

    pub fn tracking(err: &anyhow::Error) -> Self {
        Self::Tracking(format!("{err:#}"))
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }
}
