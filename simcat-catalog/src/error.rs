//! Error types for simcat-catalog

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use simcat_common::EmbeddingError;
use thiserror::Error;

use crate::services::book_service::BookError;
use crate::services::text_embedder::EmbedderError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),


    /// Dependency not configured or not reachable (503)
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Embedding construction or validation rejected the input (400)
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    /// Text-embedding provider failure
    #[error("Text embedding failed: {0}")]
    Embedder(#[from] EmbedderError),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// simcat-common error
    #[error("Common error: {0}")]
    Common(simcat_common::Error),
}

impl From<simcat_common::Error> for ApiError {
    fn from(err: simcat_common::Error) -> Self {
        match err {
            simcat_common::Error::NotFound(msg) => ApiError::NotFound(msg),
            simcat_common::Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            simcat_common::Error::Embedding(e) => ApiError::Embedding(e),
            simcat_common::Error::Database(e) => ApiError::Database(e),
            other => ApiError::Common(other),
        }
    }
}

impl From<BookError> for ApiError {
    fn from(err: BookError) -> Self {
        match err {
            BookError::Common(e) => e.into(),
            BookError::Embedder(e) => ApiError::Embedder(e),
            BookError::EmbedderUnavailable => {
                ApiError::Unavailable("Text embedding provider is not configured".to_string())
            }
        }
    }
}

impl ApiError {
    /// HTTP status and machine-readable error code
    pub fn status(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::Embedding(_) => (StatusCode::BAD_REQUEST, "INVALID_EMBEDDING"),
            ApiError::Embedder(EmbedderError::EmptyText) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Embedder(EmbedderError::InvalidApiKey) => {
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE")
            }
            ApiError::Embedder(_) => (StatusCode::BAD_GATEWAY, "EMBEDDING_PROVIDER_ERROR"),
            ApiError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
            ApiError::Common(_) => (StatusCode::INTERNAL_SERVER_ERROR, "COMMON_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.status();
        let message = match self {
            ApiError::NotFound(msg)
            | ApiError::BadRequest(msg)
            | ApiError::Unavailable(msg)
            | ApiError::Internal(msg) => msg,
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
