/// Unified error types for Inari
use thiserror::Error;

/// Main error type for the event log and its read models
#[derive(Error, Debug)]
pub enum InariError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration errors
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Blob storage errors
    #[error("Blob storage error: {0}")]
    BlobStorage(String),

    /// Malformed or unrecognised event payloads
    #[error("Decode error: {0}")]
    Decode(String),

    /// Domain validation errors (e.g. an unparsable `published` timestamp)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// JSON encoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl InariError {
    /// Errors caused by the content of a single event rather than by a store.
    ///
    /// Replay drops the offending event and carries on when this is true.
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            InariError::Decode(_) | InariError::Validation(_) | InariError::Json(_)
        )
    }
}

/// Result type alias for Inari operations
pub type InariResult<T> = Result<T, InariError>;
