//! Text-embedding provider
//!
//! The provider is a black box: text in, fixed-length vector out. Vectors
//! returned here are raw; the caller validates them with the
//! `ExternalVectorAdapter` before they become embeddings.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use simcat_common::config::TextConfig;
use std::num::NonZeroU32;
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = concat!("simcat-catalog/", env!("CARGO_PKG_VERSION"));

/// Text-embedding provider errors
#[derive(Debug, Error)]
pub enum EmbedderError {
    #[error("Text to embed is empty")]
    EmptyText,

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid API key")]
    InvalidApiKey,
}

/// Capability: embed a text into a fixed-length vector
#[async_trait]
pub trait TextEmbedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError>;

    /// Length of every vector this provider returns
    fn dimensions(&self) -> usize;
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// OpenAI-compatible `/embeddings` client
pub struct OpenAiEmbedder {
    http_client: reqwest::Client,
    rate_limiter: governor::RateLimiter<
        governor::state::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
    endpoint: String,
    model: String,
    api_key: String,
    dimensions: usize,
}

impl OpenAiEmbedder {
    pub fn new(config: &TextConfig, api_key: String) -> Result<Self, EmbedderError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| EmbedderError::NetworkError(e.to_string()))?;

        let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = governor::RateLimiter::direct(governor::Quota::per_second(per_second));

        Ok(Self {
            http_client,
            rate_limiter,
            endpoint: format!("{}/embeddings", config.api_base.trim_end_matches('/')),
            model: config.model.clone(),
            api_key,
            dimensions: config.target_dim,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl TextEmbedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EmbedderError::EmptyText);
        }

        self.rate_limiter.until_ready().await;

        tracing::debug!(model = %self.model, chars = text.len(), "Requesting text embedding");

        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: text,
            })
            .send()
            .await
            .map_err(|e| EmbedderError::NetworkError(e.to_string()))?;

        let status = response.status();

        if status == 401 {
            return Err(EmbedderError::InvalidApiKey);
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(EmbedderError::ApiError(status.as_u16(), error_text));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbedderError::ParseError(e.to_string()))?;

        body.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| EmbedderError::ParseError("response contained no embedding".to_string()))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::HeaderMap, http::StatusCode, routing::post, Json, Router};
    use serde_json::{json, Value};

    async fn fake_provider(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        let authorized = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            == Some("Bearer good-key");
        if !authorized {
            return (StatusCode::UNAUTHORIZED, Json(json!({"error": "bad key"})));
        }
        let len = body["input"].as_str().map(str::len).unwrap_or(0) as f32;
        (
            StatusCode::OK,
            Json(json!({"data": [{"index": 0, "embedding": [len, 0.0, 1.0]}]})),
        )
    }

    async fn spawn_provider() -> String {
        let app = Router::new().route("/v1/embeddings", post(fake_provider));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/v1", addr)
    }

    fn config(api_base: String) -> TextConfig {
        TextConfig {
            target_dim: 3,
            api_base,
            requests_per_second: 50,
            ..TextConfig::default()
        }
    }

    #[tokio::test]
    async fn test_embed_posts_model_and_input() {
        let base = spawn_provider().await;
        let embedder = OpenAiEmbedder::new(&config(base), "good-key".to_string()).unwrap();

        let vector = embedder.embed("  hello  ").await.unwrap();

        // Input is trimmed before sending
        assert_eq!(vector, vec![5.0, 0.0, 1.0]);
        assert_eq!(embedder.dimensions(), 3);
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_invalid_key() {
        let base = spawn_provider().await;
        let embedder = OpenAiEmbedder::new(&config(base), "wrong".to_string()).unwrap();

        assert!(matches!(
            embedder.embed("hello").await,
            Err(EmbedderError::InvalidApiKey)
        ));
    }

    #[tokio::test]
    async fn test_blank_text_rejected_before_request() {
        // Nothing listens here; a request would fail with NetworkError
        let embedder =
            OpenAiEmbedder::new(&config("http://127.0.0.1:9".to_string()), "k".to_string())
                .unwrap();

        assert!(matches!(
            embedder.embed("   ").await,
            Err(EmbedderError::EmptyText)
        ));
    }
}
