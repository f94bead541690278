//! Book catalog operations
//!
//! A book's embedding comes from the text-embedding provider, computed on
//! `"{title}. {description}"` and validated against the configured text
//! dimension before it is stored or used as a query.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use simcat_common::config::SearchConfig;
use simcat_common::{Embedding, EmbeddingError, ExternalVectorAdapter, RankedItem, SimilarityRanker};
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::books::{self, Book, BookFilter, BookSummary};
use crate::services::similarity::{rank_stored, resolve_bounds, MetadataFilter, SearchBounds};
use crate::services::text_embedder::{EmbedderError, TextEmbedder};
use crate::services::track_service::{page_limit, page_skip};

/// Characters of description kept in similarity results
pub const DESCRIPTION_PREVIEW_CHARS: usize = 200;

const MIN_DESCRIPTION_CHARS: usize = 10;
const MIN_QUERY_CHARS: usize = 3;
const MAX_QUERY_CHARS: usize = 500;

/// Book operation errors
#[derive(Debug, Error)]
pub enum BookError {
    #[error(transparent)]
    Common(#[from] simcat_common::Error),

    #[error("Text embedding provider is not configured")]
    EmbedderUnavailable,

    #[error(transparent)]
    Embedder(#[from] EmbedderError),
}

impl From<sqlx::Error> for BookError {
    fn from(err: sqlx::Error) -> Self {
        BookError::Common(err.into())
    }
}

impl From<EmbeddingError> for BookError {
    fn from(err: EmbeddingError) -> Self {
        BookError::Common(err.into())
    }
}

fn invalid(message: impl Into<String>) -> BookError {
    BookError::Common(simcat_common::Error::InvalidInput(message.into()))
}

fn not_found(message: impl Into<String>) -> BookError {
    BookError::Common(simcat_common::Error::NotFound(message.into()))
}

pub type BookResult<T> = std::result::Result<T, BookError>;

/// Body of a book creation request
///
/// Missing required fields deserialize as blank and are rejected by
/// validation, so one bad item in an import does not reject the batch.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewBook {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub isbn: Option<String>,
    #[serde(default)]
    pub publish_year: Option<i64>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub page_count: Option<i64>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub added_at: Option<DateTime<Utc>>,
}

/// Partial book update; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookUpdate {
    pub title: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
    pub genre: Option<String>,
    pub isbn: Option<String>,
    pub publish_year: Option<i64>,
    pub publisher: Option<String>,
    pub page_count: Option<i64>,
    pub language: Option<String>,
}

impl BookUpdate {
    fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.author.is_none()
            && self.description.is_none()
            && self.genre.is_none()
            && self.isbn.is_none()
            && self.publish_year.is_none()
            && self.publisher.is_none()
            && self.page_count.is_none()
            && self.language.is_none()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookListQuery {
    pub genre: Option<String>,
    pub author: Option<String>,
    pub limit: Option<i64>,
    pub skip: Option<i64>,
}

/// One similarity hit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarBook {
    pub book_id: String,
    pub similarity_score: f32,
    pub book: BookSummaryView,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookSummaryView {
    pub title: String,
    pub author: String,
    /// First 200 characters, with "..." when cut
    pub description: String,
    pub genre: Option<String>,
    pub publish_year: Option<i64>,
    pub isbn: Option<String>,
}

impl From<RankedItem<BookSummary>> for SimilarBook {
    fn from(item: RankedItem<BookSummary>) -> Self {
        let summary = item.metadata;
        Self {
            book_id: item.id,
            similarity_score: item.score,
            book: BookSummaryView {
                title: summary.title,
                author: summary.author,
                description: preview(&summary.description),
                genre: summary.genre,
                publish_year: summary.publish_year,
                isbn: summary.isbn,
            },
        }
    }
}

/// Outcome of a bulk import
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportReport {
    pub total: usize,
    pub inserted: usize,
    pub failed: usize,
    pub failures: Vec<ImportFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportFailure {
    /// Position in the submitted list
    pub index: usize,
    pub title: String,
    pub error: String,
}

/// Ranked books plus the bounds the query ran with
#[derive(Debug, Clone, PartialEq)]
pub struct BookMatches {
    pub similar: Vec<SimilarBook>,
    pub bounds: SearchBounds,
}

fn preview(description: &str) -> String {
    match description.char_indices().nth(DESCRIPTION_PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &description[..cut]),
        None => description.to_string(),
    }
}

/// Book catalog backed by the SQLite store and a text-embedding provider
pub struct BookService {
    db: SqlitePool,
    embedder: Option<Arc<dyn TextEmbedder>>,
    adapter: ExternalVectorAdapter,
    ranker: SimilarityRanker,
    search: SearchConfig,
}

impl BookService {
    /// `embedder` is `None` when no API key is configured; creation and
    /// text search then fail with [`BookError::EmbedderUnavailable`]
    pub fn new(
        db: SqlitePool,
        adapter: ExternalVectorAdapter,
        embedder: Option<Arc<dyn TextEmbedder>>,
        search: SearchConfig,
    ) -> Self {
        if let Some(embedder) = &embedder {
            if embedder.dimensions() != adapter.target_dim() {
                warn!(
                    provider = embedder.dimensions(),
                    configured = adapter.target_dim(),
                    "Text embedder dimension differs from configured dimension; its vectors will be rejected"
                );
            }
        }
        Self {
            db,
            embedder,
            ranker: SimilarityRanker::new(adapter.target_dim()),
            adapter,
            search,
        }
    }

    pub fn embedder_available(&self) -> bool {
        self.embedder.is_some()
    }

    /// Embed text through the provider and validate the vector
    async fn embed_text(&self, text: &str) -> BookResult<Embedding> {
        let embedder = self.embedder.as_ref().ok_or(BookError::EmbedderUnavailable)?;
        let vector = embedder.embed(text).await?;
        Ok(self.adapter.accept(vector)?)
    }

    pub async fn create(&self, input: NewBook) -> BookResult<Book> {
        let title = required(&input.title, "title", 500)?;
        let author = required(&input.author, "author", 200)?;
        let description = description(&input.description)?;

        let mut book = Book::new(title, author, description);
        book.genre = optional(input.genre, "genre", 100)?;
        book.isbn = optional(input.isbn, "isbn", 20)?;
        book.publish_year = check_year(input.publish_year)?;
        book.publisher = optional(input.publisher, "publisher", 200)?;
        book.page_count = check_pages(input.page_count)?;
        if let Some(language) = optional(input.language, "language", 50)? {
            book.language = language;
        }
        if let Some(added_at) = input.added_at {
            book.added_at = added_at;
        }

        book.embedding = match self.embed_text(&book.embedding_text()).await {
            Ok(embedding) => Some(embedding),
            Err(e) => {
                error!(title = %book.title, error = %e, "Failed to create book embedding");
                return Err(e);
            }
        };

        books::insert_book(&self.db, &book).await?;

        info!(book_id = %book.id, "Created book: {} by {}", book.title, book.author);
        Ok(book)
    }

    pub async fn get(&self, id: Uuid) -> BookResult<Book> {
        books::load_book(&self.db, id, &self.adapter)
            .await?
            .ok_or_else(|| not_found(format!("Book not found: {}", id)))
    }

    pub async fn list(&self, query: BookListQuery) -> BookResult<Vec<Book>> {
        let filter = BookFilter {
            genre: query.genre.filter(|g| !g.trim().is_empty()),
            author: query.author.filter(|a| !a.trim().is_empty()),
            limit: page_limit(query.limit)?,
            skip: page_skip(query.skip)?,
        };
        let found = books::list_books(&self.db, &filter, &self.adapter).await?;
        tracing::debug!(count = found.len(), ?filter, "Listed books");
        Ok(found)
    }

    /// Apply a partial update
    ///
    /// A title or description change recomputes the embedding. When the
    /// provider fails, the update is still applied and the previous
    /// embedding is kept.
    pub async fn update(&self, id: Uuid, update: BookUpdate) -> BookResult<Book> {
        if update.is_empty() {
            return Err(invalid("No fields to update"));
        }
        let mut book = self.get(id).await?;
        let mut text_changed = false;

        if let Some(title) = update.title {
            let title = required(&title, "title", 500)?;
            text_changed |= title != book.title;
            book.title = title;
        }
        if let Some(desc) = update.description {
            let desc = description(&desc)?;
            text_changed |= desc != book.description;
            book.description = desc;
        }
        if let Some(author) = update.author {
            book.author = required(&author, "author", 200)?;
        }
        if update.genre.is_some() {
            book.genre = optional(update.genre, "genre", 100)?;
        }
        if update.isbn.is_some() {
            book.isbn = optional(update.isbn, "isbn", 20)?;
        }
        if update.publish_year.is_some() {
            book.publish_year = check_year(update.publish_year)?;
        }
        if update.publisher.is_some() {
            book.publisher = optional(update.publisher, "publisher", 200)?;
        }
        if update.page_count.is_some() {
            book.page_count = check_pages(update.page_count)?;
        }
        if let Some(language) = optional(update.language, "language", 50)? {
            book.language = language;
        }

        if text_changed {
            match self.embed_text(&book.embedding_text()).await {
                Ok(embedding) => {
                    book.embedding = Some(embedding);
                    info!(book_id = %id, "Recomputed book embedding");
                }
                Err(e) => {
                    error!(book_id = %id, error = %e, "Failed to update embedding; keeping previous one");
                }
            }
        }
        book.updated_at = Utc::now();

        if !books::update_book(&self.db, &book).await? {
            return Err(not_found(format!("Book not found: {}", id)));
        }

        info!(book_id = %id, "Updated book");
        Ok(book)
    }

    pub async fn delete(&self, id: Uuid) -> BookResult<()> {
        if !books::delete_book(&self.db, id).await? {
            return Err(not_found(format!("Book not found: {}", id)));
        }
        info!(book_id = %id, "Deleted book");
        Ok(())
    }

    /// Create books one by one, continuing past items that fail
    ///
    /// Each item goes through [`BookService::create`]. Without a configured
    /// embedder nothing is attempted.
    pub async fn import(&self, books: Vec<NewBook>) -> BookResult<ImportReport> {
        if self.embedder.is_none() {
            return Err(BookError::EmbedderUnavailable);
        }

        let total = books.len();
        info!("Importing {} books", total);

        let mut report = ImportReport {
            total,
            ..ImportReport::default()
        };
        for (index, book) in books.into_iter().enumerate() {
            let title = book.title.trim().to_string();
            match self.create(book).await {
                Ok(created) => {
                    report.inserted += 1;
                    tracing::debug!(
                        book_id = %created.id,
                        "[{}/{}] Imported {}",
                        index + 1,
                        total,
                        created.title
                    );
                }
                Err(BookError::Common(simcat_common::Error::Database(e))) => {
                    // Storage failures abort the whole import
                    return Err(e.into());
                }
                Err(e) => {
                    warn!("[{}/{}] Failed to import '{}': {}", index + 1, total, title, e);
                    report.failed += 1;
                    report.failures.push(ImportFailure {
                        index,
                        title,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            inserted = report.inserted,
            failed = report.failed,
            "Book import complete"
        );
        Ok(report)
    }

    pub async fn count(&self, genre: Option<&str>) -> BookResult<i64> {
        Ok(books::count_books(&self.db, genre).await?)
    }

    /// Books similar to a stored book, which is left out of its own results
    pub async fn similar_to_book(
        &self,
        id: Uuid,
        limit: Option<usize>,
        genre: Option<String>,
        search_breadth: Option<usize>,
    ) -> BookResult<(Book, BookMatches)> {
        let book = self.get(id).await?;
        let query = book
            .embedding
            .clone()
            .ok_or_else(|| not_found(format!("Book {} has no embedding", id)))?;

        info!(
            book_id = %id,
            "Searching for books similar to: {} by {}",
            book.title,
            book.author
        );

        let matches = self
            .rank(query, limit, Some(id.to_string()), genre, search_breadth)
            .await?;
        Ok((book, matches))
    }

    /// Books similar to free text
    pub async fn similar_to_text(
        &self,
        text: &str,
        limit: Option<usize>,
        genre: Option<String>,
        search_breadth: Option<usize>,
    ) -> BookResult<BookMatches> {
        let text = text.trim();
        let chars = text.chars().count();
        if !(MIN_QUERY_CHARS..=MAX_QUERY_CHARS).contains(&chars) {
            return Err(invalid(format!(
                "text must be between {} and {} characters",
                MIN_QUERY_CHARS, MAX_QUERY_CHARS
            )));
        }
        // Validate bounds before paying for a provider call
        resolve_bounds(&self.search, limit, search_breadth)?;

        let query = self.embed_text(text).await?;
        let matches = self.rank(query, limit, None, genre, search_breadth).await?;

        info!(results = matches.similar.len(), "Text search for '{}'", text);
        Ok(matches)
    }

    async fn rank(
        &self,
        query: Embedding,
        limit: Option<usize>,
        exclude_id: Option<String>,
        genre: Option<String>,
        search_breadth: Option<usize>,
    ) -> BookResult<BookMatches> {
        let bounds = resolve_bounds(&self.search, limit, search_breadth)?;
        let filter: Option<MetadataFilter<BookSummary>> = genre
            .filter(|g| !g.trim().is_empty())
            .map(|genre| -> MetadataFilter<BookSummary> {
                Arc::new(move |summary: &BookSummary| summary.genre.as_deref() == Some(genre.as_str()))
            });

        let candidates = books::load_book_vectors(&self.db, &self.adapter).await?;
        let ranked = rank_stored(
            self.ranker,
            query,
            candidates,
            bounds.k,
            exclude_id,
            filter,
            self.search.partition_size,
        )
        .await?;

        Ok(BookMatches {
            similar: ranked.into_iter().map(SimilarBook::from).collect(),
            bounds,
        })
    }
}

fn required(value: &str, field: &str, max_len: usize) -> BookResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(invalid(format!("Missing required field: {}", field)));
    }
    if value.chars().count() > max_len {
        return Err(invalid(format!("{} must be at most {} characters", field, max_len)));
    }
    Ok(value.to_string())
}

fn optional(value: Option<String>, field: &str, max_len: usize) -> BookResult<Option<String>> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => required(v, field, max_len).map(Some),
    }
}

fn description(value: &str) -> BookResult<String> {
    let value = required(value, "description", usize::MAX)?;
    if value.chars().count() < MIN_DESCRIPTION_CHARS {
        return Err(invalid(format!(
            "description must be at least {} characters",
            MIN_DESCRIPTION_CHARS
        )));
    }
    Ok(value)
}

fn check_year(year: Option<i64>) -> BookResult<Option<i64>> {
    match year {
        Some(y) if !(1000..=2100).contains(&y) => {
            Err(invalid("publish_year must be between 1000 and 2100"))
        }
        other => Ok(other),
    }
}

fn check_pages(pages: Option<i64>) -> BookResult<Option<i64>> {
    match pages {
        Some(p) if p <= 0 => Err(invalid("page_count must be positive")),
        other => Ok(other),
    }
}
