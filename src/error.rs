//! Error types for studio-storage

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StudioError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    #[error("Unknown record kind: {0}")]
    UnknownKind(String),

    #[error("No field '{field}' on record kind '{kind}'")]
    UnknownField { kind: String, field: String },

    #[error("No media kind '{media_kind}' on record kind '{kind}'")]
    UnknownMediaKind { kind: String, media_kind: String },

    #[error("Media id {id} is not in the '{media_kind}' order")]
    MediaNotAttached { media_kind: String, id: String },

    #[error("Source index {index} is out of bounds for the '{media_kind}' order")]
    OrderIndexOutOfBounds { media_kind: String, index: usize },

    #[error("Soft delete is only supported against the draft store")]
    SoftDeleteOutsideDraft,

    #[error("Commit failed for change {change_id}: {reason}")]
    CommitFailed { change_id: i64, reason: String },

    #[error("Revert is not implemented")]
    RevertUnsupported,

    #[error("Database error: {0}")]
    Database(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for StudioError {
    fn from(e: rusqlite::Error) -> Self {
        StudioError::Database(e.to_string())
    }
}
