//! Common error types for simcat

use thiserror::Error;

/// Common result type for simcat operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the similarity core
///
/// All variants are the caller's fault and none are retryable: the core
/// performs no I/O.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmbeddingError {
    /// A required feature is absent, non-finite, or has the wrong length
    #[error("Invalid feature '{name}': {reason}")]
    InvalidFeature { name: String, reason: String },

    /// Externally sourced vector does not have the configured dimension
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Query vector is malformed for the ranker it was handed to
    #[error("Malformed query vector: expected {expected} components, got {actual}")]
    EmptyQuery { expected: usize, actual: usize },

    /// Embedding layout configuration is unusable
    #[error("Invalid embedding layout: {0}")]
    InvalidLayout(String),

    /// Category rule table configuration is unusable
    #[error("Invalid rule table: {0}")]
    InvalidRuleTable(String),
}

/// Common error types across simcat binaries
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Embedding construction, validation or ranking error
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}
