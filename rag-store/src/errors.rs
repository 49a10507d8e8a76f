//! Unified error types for the crate.

use thiserror::Error;

/// Top-level error for rag-store operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// Invalid or unsupported configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Database / driver errors.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Embedding dimensionality differs from the configured one.
    #[error("vector size mismatch: got {got}, want {want}")]
    VectorSizeMismatch { got: usize, want: usize },

    /// The embedding provider failed.
    #[error("embedding error: {0}")]
    Embedding(String),
}
