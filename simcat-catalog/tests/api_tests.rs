//! HTTP API integration tests
//!
//! Drive the full router with `oneshot` against an in-memory database and
//! a deterministic text embedder.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use simcat_catalog::db::init_memory_pool;
use simcat_catalog::services::{EmbedderError, TextEmbedder};
use simcat_catalog::{build_router, AppState};
use simcat_common::config::CatalogConfig;
use simcat_common::FeatureSpec;

const TEXT_DIM: usize = 4;
const KEYWORDS: [&str; TEXT_DIM] = ["space", "love", "crime", "war"];

/// Counts keyword occurrences, normalized
struct KeywordEmbedder;

#[async_trait]
impl TextEmbedder for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        if text.trim().is_empty() {
            return Err(EmbedderError::EmptyText);
        }
        let text = text.to_lowercase();
        let mut v: Vec<f32> = KEYWORDS.iter().map(|k| text.matches(k).count() as f32).collect();
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(v)
    }

    fn dimensions(&self) -> usize {
        TEXT_DIM
    }
}

fn test_config() -> CatalogConfig {
    let mut config = CatalogConfig::default();
    config.text.target_dim = TEXT_DIM;
    config.audio.target_dim = 4;
    config.audio.features = vec![
        FeatureSpec::vector("timbre", 2),
        FeatureSpec::scalar("tempo", 200.0),
    ];
    config
}

async fn app_with(embedder: Option<Arc<dyn TextEmbedder>>) -> Router {
    let pool = init_memory_pool().await.unwrap();
    let state = AppState::new(pool, &test_config(), embedder).unwrap();
    build_router(state)
}

async fn app() -> Router {
    app_with(Some(Arc::new(KeywordEmbedder))).await
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn create_track(app: &Router, body: Value) -> String {
    let (status, track) = send(app, "POST", "/api/v1/tracks", Some(body)).await;
    assert_eq!(status, StatusCode::CREATED, "{}", track);
    track["id"].as_str().unwrap().to_string()
}

async fn create_book(app: &Router, title: &str, description: &str, genre: &str) -> String {
    let (status, book) = send(
        app,
        "POST",
        "/api/v1/books",
        Some(json!({
            "title": title,
            "author": "Someone",
            "description": description,
            "genre": genre,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", book);
    book["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health() {
    let app = app().await;
    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "simcat-catalog");
    assert_eq!(body["text_embedding_available"], true);
    assert!(!body["git_hash"].as_str().unwrap().is_empty());
    let built = body["build_timestamp"].as_str().unwrap();
    assert!(built.ends_with('Z'), "{}", built);
    chrono::DateTime::parse_from_rfc3339(built).unwrap();

    let degraded = app_with(None).await;
    let (_, body) = send(&degraded, "GET", "/health", None).await;
    assert_eq!(body["status"], "degraded");
}

#[tokio::test]
async fn test_track_crud_and_mood_inference() {
    let app = app().await;

    let id = create_track(
        &app,
        json!({
            "title": "Deep Work",
            "artist": "Ambient Collective",
            "tags": ["Study", "instrumental"],
            "features": {"timbre": [3.0, 4.0], "tempo": 0.0},
        }),
    )
    .await;

    let (status, track) = send(&app, "GET", &format!("/api/v1/tracks/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(track["mood"], "focus");
    assert_eq!(track["source"], "manual");
    assert_eq!(track["has_embedding"], true);
    assert!(track.get("embedding").is_none());

    let (status, track) = send(
        &app,
        "PATCH",
        &format!("/api/v1/tracks/{}", id),
        Some(json!({"tags": ["party"]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(track["mood"], "energetic");

    let (_, count) = send(&app, "GET", "/api/v1/tracks/count?mood=energetic", None).await;
    assert_eq!(count["count"], 1);

    let (status, _) = send(&app, "DELETE", &format!("/api/v1/tracks/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = send(&app, "GET", &format!("/api/v1/tracks/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_track_validation() {
    let app = app().await;

    let (status, _) = send(
        &app,
        "POST",
        "/api/v1/tracks",
        Some(json!({"title": "  ", "artist": "X"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/tracks",
        Some(json!({"title": "T", "artist": "X", "features": {"timbre": [1.0], "tempo": 1.0}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_EMBEDDING");

    let (status, _) = send(&app, "GET", "/api/v1/tracks?limit=500", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_track_search() {
    let app = app().await;
    let query = create_track(
        &app,
        json!({"title": "A", "artist": "X", "mood": "chill", "features": {"timbre": [1.0, 0.0], "tempo": 0.0}}),
    )
    .await;
    let near = create_track(
        &app,
        json!({"title": "B", "artist": "Y", "mood": "chill", "features": {"timbre": [0.9, 0.1], "tempo": 0.0}}),
    )
    .await;
    let far = create_track(
        &app,
        json!({"title": "C", "artist": "Z", "mood": "happy", "features": {"timbre": [0.0, 1.0], "tempo": 0.0}}),
    )
    .await;
    create_track(&app, json!({"title": "D", "artist": "W"})).await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/search/tracks",
        Some(json!({"track_id": query, "limit": 10})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["query_track"]["title"], "A");
    assert_eq!(body["count"], 2);
    assert_eq!(body["similar_tracks"][0]["track_id"], near);
    assert_eq!(body["similar_tracks"][1]["track_id"], far);

    let (_, body) = send(
        &app,
        "POST",
        "/api/v1/search/tracks",
        Some(json!({"features": {"timbre": [0.0, 2.0], "tempo": 0.0}, "mood": "happy"})),
    )
    .await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["similar_tracks"][0]["track_id"], far);
    assert!((body["similar_tracks"][0]["similarity_score"].as_f64().unwrap() - 1.0).abs() < 1e-5);

    let (status, _) = send(
        &app,
        "POST",
        "/api/v1/search/tracks",
        Some(json!({"track_id": query, "features": {"timbre": [1.0, 0.0], "tempo": 0.0}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "POST",
        "/api/v1/search/tracks",
        Some(json!({"track_id": query, "limit": 0})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_track_without_embedding_is_not_searchable_by_id() {
    let app = app().await;
    let id = create_track(&app, json!({"title": "Plain", "artist": "X"})).await;

    let (status, _) = send(
        &app,
        "POST",
        "/api/v1/search/tracks",
        Some(json!({"track_id": id})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_book_crud_and_search() {
    let app = app().await;
    let dune = create_book(&app, "Dune", "Politics and war in space", "scifi").await;
    let foundation = create_book(&app, "Foundation", "An empire in space falls", "scifi").await;
    create_book(&app, "Emma", "A matchmaker learns about love", "classic").await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/search/books",
        Some(json!({"book_id": dune, "limit": 2, "search_breadth": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["query_book"]["title"], "Dune");
    assert_eq!(body["similar_books"][0]["book_id"], foundation);
    assert_eq!(body["search_breadth"], 2);
    assert!(body["similar_books"]
        .as_array()
        .unwrap()
        .iter()
        .all(|b| b["book_id"] != dune.as_str()));

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/search/books",
        Some(json!({"text": "  a love story  ", "genre": "classic"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["query"], "a love story");
    assert_eq!(body["count"], 1);
    assert_eq!(body["similar_books"][0]["book"]["title"], "Emma");

    let (status, _) = send(
        &app,
        "PATCH",
        &format!("/api/v1/books/{}", dune),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, book) = send(
        &app,
        "PATCH",
        &format!("/api/v1/books/{}", dune),
        Some(json!({"publish_year": 1965})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(book["publish_year"], 1965);
    assert_eq!(book["language"], "English");

    let (_, list) = send(&app, "GET", "/api/v1/books?genre=scifi", None).await;
    assert_eq!(list["count"], 2);
}

#[tokio::test]
async fn test_negative_search_bounds_are_bad_requests() {
    let app = app().await;
    let track = create_track(
        &app,
        json!({"title": "A", "artist": "X", "features": {"timbre": [1.0, 0.0], "tempo": 0.0}}),
    )
    .await;
    let book = create_book(&app, "Dune", "Politics and war in space", "scifi").await;
    create_book(&app, "Foundation", "An empire in space falls", "scifi").await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/search/tracks",
        Some(json!({"track_id": track, "limit": -1})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/search/books",
        Some(json!({"text": "space", "limit": -5})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    // Breadth below the result count is raised to it
    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/search/books",
        Some(json!({"book_id": book, "limit": 1, "search_breadth": -3})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["search_breadth"], 1);
    assert_eq!(body["count"], 1);
}

#[tokio::test]
async fn test_book_import_reports_failures() {
    let app = app().await;

    let (status, report) = send(
        &app,
        "POST",
        "/api/v1/books/import",
        Some(json!({"books": [
            {"title": "Dune", "author": "Frank Herbert", "description": "Politics and war in space"},
            {"title": "Untold", "description": "No author was given for this one"},
            {"title": "Emma", "author": "Jane Austen", "description": "A matchmaker learns about love", "genre": "classic"},
        ]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", report);
    assert_eq!(report["total"], 3);
    assert_eq!(report["inserted"], 2);
    assert_eq!(report["failed"], 1);
    assert_eq!(report["failures"][0]["index"], 1);
    assert_eq!(report["failures"][0]["title"], "Untold");

    let (_, list) = send(&app, "GET", "/api/v1/books", None).await;
    assert_eq!(list["count"], 2);

    let unavailable = app_with(None).await;
    let (status, _) = send(
        &unavailable,
        "POST",
        "/api/v1/books/import",
        Some(json!({"books": []})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_books_need_a_text_embedder() {
    let app = app_with(None).await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/books",
        Some(json!({"title": "T", "author": "A", "description": "Long enough text"})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "SERVICE_UNAVAILABLE");

    let (status, _) = send(
        &app,
        "POST",
        "/api/v1/search/books",
        Some(json!({"text": "anything at all"})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_stats_and_moods() {
    let app = app().await;
    create_track(
        &app,
        json!({"title": "A", "artist": "X", "mood": "focus", "duration_seconds": 120.0,
               "features": {"timbre": [1.0, 0.0], "tempo": 0.0}}),
    )
    .await;
    create_track(&app, json!({"title": "B", "artist": "X", "duration_seconds": 60.0})).await;
    create_book(&app, "Dune", "Politics and war in space", "scifi").await;

    let (_, moods) = send(&app, "GET", "/api/v1/moods", None).await;
    assert_eq!(
        moods["moods"],
        json!(["focus", "energetic", "chill", "melancholic", "happy"])
    );

    let (status, coverage) = send(&app, "GET", "/api/v1/stats/embeddings", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(coverage["tracks"]["total"], 2);
    assert_eq!(coverage["tracks"]["coverage_percentage"], 50.0);
    assert_eq!(coverage["books"]["with_embeddings"], 1);

    let (_, distribution) = send(&app, "GET", "/api/v1/stats/moods", None).await;
    assert_eq!(distribution["moods"].as_array().unwrap().len(), 2);

    let (_, listening) = send(&app, "GET", "/api/v1/stats/listening", None).await;
    assert_eq!(listening["total_tracks"], 2);
    assert_eq!(listening["average_duration_seconds"], 90.0);

    let (status, top) = send(&app, "GET", "/api/v1/stats/top-artists", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(top["top_artists"][0]["artist"], "X");
    assert_eq!(top["top_artists"][0]["play_count"], 2);

    let (status, _) = send(&app, "GET", "/api/v1/stats/top-artists?limit=0", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
