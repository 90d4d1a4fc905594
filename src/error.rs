//! Error types for the playback engine.

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Session store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Errors loading an authored sequence.
///
/// Individual malformed steps never fail a load; only a document that is not
/// a JSON array does.
#[derive(Debug, thiserror::Error)]
pub enum SequenceError {
    #[error("Sequence is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Sequence must be a JSON array of steps, got {found}")]
    NotAnArray { found: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
