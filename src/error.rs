//! Error taxonomy shared across the library.
//!
//! Validation errors are raised before any mutation; provider errors degrade
//! ingest but abort queries; index errors distinguish the normal "nothing
//! indexed yet" case from unreadable persisted state.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid range {start}..{end} for text of length {len}")]
    InvalidRange {
        start: usize,
        end: usize,
        len: usize,
    },

    #[error("provider error: {0}")]
    Provider(String),

    #[error("input of {chars} chars exceeds provider limit of {max}")]
    InputTooLarge { chars: usize, max: usize },

    #[error("no persisted index for project {project_id}")]
    IndexNotFound { project_id: String },

    #[error("persisted index unreadable: {0}")]
    IndexCorruption(String),

    #[error("project not found: {0}")]
    ProjectNotFound(String),

    #[error("document not found: {0}")]
    DocumentNotFound(String),

    #[error("extraction failed: {0}")]
    Extract(String),

    #[error(transparent)]
    Db(#[from] sqlx::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
