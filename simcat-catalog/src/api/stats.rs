//! Catalog statistics endpoints

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::db::stats::{self, CatalogTable, EmbeddingCoverage, ListeningStats, MoodCount, TopArtists};
use crate::{ApiError, ApiResult, AppState};

const DEFAULT_TOP_ARTISTS: i64 = 5;
const MAX_TOP_ARTISTS: i64 = 50;

#[derive(Debug, Serialize)]
pub struct EmbeddingStatsResponse {
    pub tracks: EmbeddingCoverage,
    pub books: EmbeddingCoverage,
}

/// GET /api/v1/stats/embeddings
pub async fn embedding_stats(
    State(state): State<AppState>,
) -> ApiResult<Json<EmbeddingStatsResponse>> {
    let tracks = stats::embedding_coverage(&state.db, CatalogTable::Tracks)
        .await
        .map_err(|e| state.record(e))?;
    let books = stats::embedding_coverage(&state.db, CatalogTable::Books)
        .await
        .map_err(|e| state.record(e))?;
    Ok(Json(EmbeddingStatsResponse { tracks, books }))
}

#[derive(Debug, Serialize)]
pub struct MoodStatsResponse {
    pub moods: Vec<MoodCount>,
}

/// GET /api/v1/stats/moods
pub async fn mood_stats(State(state): State<AppState>) -> ApiResult<Json<MoodStatsResponse>> {
    let moods = stats::mood_distribution(&state.db)
        .await
        .map_err(|e| state.record(e))?;
    Ok(Json(MoodStatsResponse { moods }))
}

/// GET /api/v1/stats/listening
pub async fn listening_stats(State(state): State<AppState>) -> ApiResult<Json<ListeningStats>> {
    let listening = stats::listening_stats(&state.db)
        .await
        .map_err(|e| state.record(e))?;
    Ok(Json(listening))
}

#[derive(Debug, Deserialize)]
pub struct TopArtistsQuery {
    pub limit: Option<i64>,
}

/// GET /api/v1/stats/top-artists?limit=
pub async fn top_artists(
    State(state): State<AppState>,
    Query(query): Query<TopArtistsQuery>,
) -> ApiResult<Json<TopArtists>> {
    let limit = query.limit.unwrap_or(DEFAULT_TOP_ARTISTS);
    if !(1..=MAX_TOP_ARTISTS).contains(&limit) {
        return Err(ApiError::BadRequest(format!(
            "limit must be between 1 and {}",
            MAX_TOP_ARTISTS
        )));
    }

    let top = stats::top_artists(&state.db, Utc::now(), limit)
        .await
        .map_err(|e| state.record(e))?;
    Ok(Json(top))
}

pub fn stats_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/stats/embeddings", get(embedding_stats))
        .route("/api/v1/stats/moods", get(mood_stats))
        .route("/api/v1/stats/listening", get(listening_stats))
        .route("/api/v1/stats/top-artists", get(top_artists))
}
