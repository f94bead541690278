//! Similarity search endpoints
//!
//! Each request names exactly one query source: a stored item id or an
//! ad-hoc query (a feature bundle for tracks, free text for books).

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use simcat_common::FeatureBundle;
use uuid::Uuid;

use crate::services::book_service::SimilarBook;
use crate::services::track_service::SimilarTrack;
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct TrackSearchRequest {
    pub track_id: Option<Uuid>,
    pub features: Option<FeatureBundle>,
    pub limit: Option<i64>,
    pub mood: Option<String>,
}

/// Negative counts read as zero, so a negative limit gets the same 400 as
/// `limit: 0` and a negative breadth falls back to the result count.
fn non_negative(value: Option<i64>) -> Option<usize> {
    value.map(|v| usize::try_from(v).unwrap_or(0))
}

/// Echo of the stored item a by-id query started from
#[derive(Debug, Serialize)]
pub struct QueryItem {
    pub id: Uuid,
    pub title: String,
    /// Artist for tracks, author for books
    pub creator: String,
}

#[derive(Debug, Serialize)]
pub struct TrackSearchResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_track: Option<QueryItem>,
    pub similar_tracks: Vec<SimilarTrack>,
    pub count: usize,
}

/// POST /api/v1/search/tracks
pub async fn search_tracks(
    State(state): State<AppState>,
    Json(body): Json<TrackSearchRequest>,
) -> ApiResult<Json<TrackSearchResponse>> {
    let limit = non_negative(body.limit);
    let (query_track, similar) = match (body.track_id, body.features) {
        (Some(id), None) => {
            let (track, similar) = state
                .tracks
                .similar_to_track(id, limit, body.mood)
                .await
                .map_err(|e| state.record(e))?;
            let query = QueryItem {
                id: track.id,
                title: track.title,
                creator: track.artist,
            };
            (Some(query), similar)
        }
        (None, Some(features)) => {
            let similar = state
                .tracks
                .similar_to_features(&features, limit, body.mood)
                .await
                .map_err(|e| state.record(e))?;
            (None, similar)
        }
        _ => {
            return Err(ApiError::BadRequest(
                "Exactly one of track_id or features is required".to_string(),
            ))
        }
    };

    Ok(Json(TrackSearchResponse {
        query_track,
        count: similar.len(),
        similar_tracks: similar,
    }))
}

#[derive(Debug, Deserialize)]
pub struct BookSearchRequest {
    pub book_id: Option<Uuid>,
    pub text: Option<String>,
    pub limit: Option<i64>,
    pub genre: Option<String>,
    pub search_breadth: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct BookSearchResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_book: Option<QueryItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    pub similar_books: Vec<SimilarBook>,
    pub count: usize,
    pub search_breadth: usize,
}

/// POST /api/v1/search/books
pub async fn search_books(
    State(state): State<AppState>,
    Json(body): Json<BookSearchRequest>,
) -> ApiResult<Json<BookSearchResponse>> {
    let limit = non_negative(body.limit);
    let breadth = non_negative(body.search_breadth);
    let (query_book, query, matches) = match (body.book_id, body.text) {
        (Some(id), None) => {
            let (book, matches) = state
                .books
                .similar_to_book(id, limit, body.genre, breadth)
                .await
                .map_err(|e| state.record(e))?;
            let query = QueryItem {
                id: book.id,
                title: book.title,
                creator: book.author,
            };
            (Some(query), None, matches)
        }
        (None, Some(text)) => {
            let matches = state
                .books
                .similar_to_text(&text, limit, body.genre, breadth)
                .await
                .map_err(|e| state.record(e))?;
            (None, Some(text.trim().to_string()), matches)
        }
        _ => {
            return Err(ApiError::BadRequest(
                "Exactly one of book_id or text is required".to_string(),
            ))
        }
    };

    Ok(Json(BookSearchResponse {
        query_book,
        query,
        count: matches.similar.len(),
        search_breadth: matches.bounds.search_breadth,
        similar_books: matches.similar,
    }))
}

pub fn search_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/search/tracks", post(search_tracks))
        .route("/api/v1/search/books", post(search_books))
}
