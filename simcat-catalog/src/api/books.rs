//! Book endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::tracks::{CountResponse, DeletedResponse};
use crate::db::books::Book;
use crate::services::book_service::{BookListQuery, BookUpdate, ImportReport, NewBook};
use crate::{ApiResult, AppState};

/// Book as returned by the API
#[derive(Debug, Serialize)]
pub struct BookResponse {
    pub id: Uuid,
    pub title: String,
    pub author: String,
    pub description: String,
    pub genre: Option<String>,
    pub isbn: Option<String>,
    pub publish_year: Option<i64>,
    pub publisher: Option<String>,
    pub page_count: Option<i64>,
    pub language: String,
    pub has_embedding: bool,
    pub added_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Book> for BookResponse {
    fn from(book: Book) -> Self {
        Self {
            id: book.id,
            title: book.title,
            author: book.author,
            description: book.description,
            genre: book.genre,
            isbn: book.isbn,
            publish_year: book.publish_year,
            publisher: book.publisher,
            page_count: book.page_count,
            language: book.language,
            has_embedding: book.embedding.is_some(),
            added_at: book.added_at,
            created_at: book.created_at,
            updated_at: book.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BookListResponse {
    pub books: Vec<BookResponse>,
    pub count: usize,
}

/// POST /api/v1/books
///
/// Fails with 503 when no text-embedding provider is configured, and with
/// 502 when the provider rejects the request.
pub async fn create_book(
    State(state): State<AppState>,
    Json(body): Json<NewBook>,
) -> ApiResult<(StatusCode, Json<BookResponse>)> {
    let book = state.books.create(body).await.map_err(|e| state.record(e))?;
    Ok((StatusCode::CREATED, Json(book.into())))
}

/// GET /api/v1/books?genre=&author=&limit=&skip=
pub async fn list_books(
    State(state): State<AppState>,
    Query(query): Query<BookListQuery>,
) -> ApiResult<Json<BookListResponse>> {
    let books: Vec<BookResponse> = state
        .books
        .list(query)
        .await
        .map_err(|e| state.record(e))?
        .into_iter()
        .map(BookResponse::from)
        .collect();

    Ok(Json(BookListResponse {
        count: books.len(),
        books,
    }))
}

pub async fn get_book(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<BookResponse>> {
    let book = state.books.get(id).await.map_err(|e| state.record(e))?;
    Ok(Json(book.into()))
}

/// PATCH /api/v1/books/:id
///
/// An empty body is rejected with 400.
pub async fn update_book(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<BookUpdate>,
) -> ApiResult<Json<BookResponse>> {
    let book = state
        .books
        .update(id, body)
        .await
        .map_err(|e| state.record(e))?;
    Ok(Json(book.into()))
}

pub async fn delete_book(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DeletedResponse>> {
    state.books.delete(id).await.map_err(|e| state.record(e))?;
    Ok(Json(DeletedResponse { id, deleted: true }))
}

#[derive(Debug, Deserialize)]
pub struct CountQuery {
    pub genre: Option<String>,
}

/// GET /api/v1/books/count?genre=
pub async fn count_books(
    State(state): State<AppState>,
    Query(query): Query<CountQuery>,
) -> ApiResult<Json<CountResponse>> {
    let count = state
        .books
        .count(query.genre.as_deref())
        .await
        .map_err(|e| state.record(e))?;
    Ok(Json(CountResponse { count }))
}

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    pub books: Vec<NewBook>,
}

/// POST /api/v1/books/import
///
/// Items are created one at a time; the report lists the ones that failed
/// and why. Answers 503 up front when no text-embedding provider is
/// configured.
pub async fn import_books(
    State(state): State<AppState>,
    Json(body): Json<ImportRequest>,
) -> ApiResult<Json<ImportReport>> {
    let report = state
        .books
        .import(body.books)
        .await
        .map_err(|e| state.record(e))?;
    Ok(Json(report))
}

pub fn book_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/books", get(list_books).post(create_book))
        .route("/api/v1/books/count", get(count_books))
        .route("/api/v1/books/import", post(import_books))
        .route(
            "/api/v1/books/:id",
            get(get_book).patch(update_book).delete(delete_book),
        )
}
