use thiserror::Error;

/// Error taxonomy for the storage layer.
///
/// `Validation` failures are raised before anything touches the database, so
/// a rejected write leaves prior state intact. `NotFound` covers dangling
/// id references. Everything else wraps the underlying engine and is
/// surfaced to callers as a retryable failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        StoreError::Validation(message.into())
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            kind,
            id: id.into(),
        }
    }
}
