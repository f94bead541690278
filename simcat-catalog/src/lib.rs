//! simcat-catalog library interface
//!
//! Track and book catalog with embedding-based similarity search, served
//! as a JSON HTTP API. Exposed as a library for integration testing.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use simcat_common::config::CatalogConfig;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

use crate::services::{BookService, TextEmbedder, TrackService};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub tracks: Arc<TrackService>,
    pub books: Arc<BookService>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last server-side error for diagnostics
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    /// Build the services from a validated configuration
    ///
    /// `embedder` is `None` when no text-embedding API key is available.
    pub fn new(
        db: SqlitePool,
        config: &CatalogConfig,
        embedder: Option<Arc<dyn TextEmbedder>>,
    ) -> simcat_common::Result<Self> {
        let tracks = TrackService::new(
            db.clone(),
            config.audio.layout()?,
            config.rule_table()?,
            config.search.clone(),
        )?;
        let books = BookService::new(
            db.clone(),
            config.text.adapter()?,
            embedder,
            config.search.clone(),
        );

        Ok(Self {
            db,
            tracks: Arc::new(tracks),
            books: Arc::new(books),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        })
    }

    /// Convert to an [`ApiError`], remembering it when it is a server fault
    pub fn record<E: Into<ApiError>>(&self, err: E) -> ApiError {
        let err = err.into();
        let (status, _) = err.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "Request failed: {}", err);
            // Skipped while a health check holds the lock
            if let Ok(mut last) = self.last_error.try_write() {
                *last = Some(err.to_string());
            }
        }
        err
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::track_routes())
        .merge(api::book_routes())
        .merge(api::search_routes())
        .merge(api::stats_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
