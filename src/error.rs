use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Document conflict: {0}")]
    Conflict(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error("Blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Invalid application slug: {0:?}")]
    InvalidSlug(String),

    #[error("Invalid version: {0:?}")]
    InvalidVersion(String),

    #[error("Invalid channel: {0:?}")]
    InvalidChannel(String),

    #[error("Application not found: {0}")]
    AppNotFound(String),

    #[error("Version not found: {0}")]
    VersionNotFound(String),

    #[error("Document store unavailable: {0}")]
    BackendUnavailable(#[from] StoreError),

    #[error("Malformed document {id}: {source}")]
    MalformedDocument {
        id: String,
        #[source]
        source: serde_json::Error,
    },
}
