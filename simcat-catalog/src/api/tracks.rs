//! Track endpoints
//!
//! CRUD over listened tracks. Embeddings are never returned in full; a
//! response only reports whether the track has one.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::tracks::Track;
use crate::services::track_service::{NewTrack, TrackListQuery, TrackUpdate};
use crate::{ApiResult, AppState};

/// Track as returned by the API
#[derive(Debug, Serialize)]
pub struct TrackResponse {
    pub id: Uuid,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub mood: Option<String>,
    pub tags: Vec<String>,
    pub source: String,
    pub played_at: DateTime<Utc>,
    pub duration_seconds: Option<f64>,
    pub has_embedding: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Track> for TrackResponse {
    fn from(track: Track) -> Self {
        Self {
            id: track.id,
            title: track.title,
            artist: track.artist,
            album: track.album,
            mood: track.mood,
            tags: track.tags,
            source: track.source,
            played_at: track.played_at,
            duration_seconds: track.duration_seconds,
            has_embedding: track.embedding.is_some(),
            created_at: track.created_at,
            updated_at: track.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TrackListResponse {
    pub tracks: Vec<TrackResponse>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub id: Uuid,
    pub deleted: bool,
}

/// POST /api/v1/tracks
pub async fn create_track(
    State(state): State<AppState>,
    Json(body): Json<NewTrack>,
) -> ApiResult<(StatusCode, Json<TrackResponse>)> {
    let track = state.tracks.create(body).await.map_err(|e| state.record(e))?;
    Ok((StatusCode::CREATED, Json(track.into())))
}

/// GET /api/v1/tracks?mood=&artist=&limit=&skip=
pub async fn list_tracks(
    State(state): State<AppState>,
    Query(query): Query<TrackListQuery>,
) -> ApiResult<Json<TrackListResponse>> {
    let tracks: Vec<TrackResponse> = state
        .tracks
        .list(query)
        .await
        .map_err(|e| state.record(e))?
        .into_iter()
        .map(TrackResponse::from)
        .collect();

    Ok(Json(TrackListResponse {
        count: tracks.len(),
        tracks,
    }))
}

/// GET /api/v1/tracks/:id
pub async fn get_track(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<TrackResponse>> {
    let track = state.tracks.get(id).await.map_err(|e| state.record(e))?;
    Ok(Json(track.into()))
}

/// PATCH /api/v1/tracks/:id
pub async fn update_track(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<TrackUpdate>,
) -> ApiResult<Json<TrackResponse>> {
    let track = state
        .tracks
        .update(id, body)
        .await
        .map_err(|e| state.record(e))?;
    Ok(Json(track.into()))
}

/// DELETE /api/v1/tracks/:id
pub async fn delete_track(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DeletedResponse>> {
    state.tracks.delete(id).await.map_err(|e| state.record(e))?;
    Ok(Json(DeletedResponse { id, deleted: true }))
}

#[derive(Debug, Deserialize)]
pub struct CountQuery {
    pub mood: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: i64,
}

/// GET /api/v1/tracks/count?mood=
pub async fn count_tracks(
    State(state): State<AppState>,
    Query(query): Query<CountQuery>,
) -> ApiResult<Json<CountResponse>> {
    let count = state
        .tracks
        .count(query.mood.as_deref())
        .await
        .map_err(|e| state.record(e))?;
    Ok(Json(CountResponse { count }))
}

#[derive(Debug, Serialize)]
pub struct MoodsResponse {
    pub moods: Vec<String>,
}

/// GET /api/v1/moods
///
/// Labels in rule-table order, which is also the tie-break order.
pub async fn list_moods(State(state): State<AppState>) -> Json<MoodsResponse> {
    Json(MoodsResponse {
        moods: state.tracks.moods(),
    })
}

pub fn track_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/tracks", get(list_tracks).post(create_track))
        .route("/api/v1/tracks/count", get(count_tracks))
        .route(
            "/api/v1/tracks/:id",
            get(get_track).patch(update_track).delete(delete_track),
        )
        .route("/api/v1/moods", get(list_moods))
}
