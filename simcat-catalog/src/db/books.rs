//! Book database operations

use chrono::{DateTime, Utc};
use simcat_common::{Embedding, ExternalVectorAdapter};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{decode_embedding, encode_embedding, format_timestamp, like_pattern, parse_timestamp, StoredVector};

/// Catalogued book
#[derive(Debug, Clone, PartialEq)]
pub struct Book {
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
    pub embedding: Option<Embedding>,
    pub added_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Book {
    pub fn new(title: String, author: String, description: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title,
            author,
            description,
            genre: None,
            isbn: None,
            publish_year: None,
            publisher: None,
            page_count: None,
            language: "English".to_string(),
            embedding: None,
            added_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    /// Text the book's embedding is computed from
    pub fn embedding_text(&self) -> String {
        format!("{}. {}", self.title, self.description)
    }
}

/// Metadata carried through similarity ranking
#[derive(Debug, Clone, PartialEq)]
pub struct BookSummary {
    pub title: String,
    pub author: String,
    pub genre: Option<String>,
    pub description: String,
    pub publish_year: Option<i64>,
    pub isbn: Option<String>,
}

/// List filters; `author` is a case-insensitive substring
#[derive(Debug, Clone, Default)]
pub struct BookFilter {
    pub genre: Option<String>,
    pub author: Option<String>,
    pub limit: i64,
    pub skip: i64,
}

const BOOK_COLUMNS: &str = "id, title, author, description, genre, isbn, publish_year, publisher, \
                            page_count, language, embedding, added_at, created_at, updated_at";

fn book_from_row(row: &SqliteRow, adapter: &ExternalVectorAdapter) -> Result<Book, sqlx::Error> {
    let id_str: String = row.get("id");
    let embedding_json: Option<String> = row.get("embedding");
    let added_at: String = row.get("added_at");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(Book {
        id: Uuid::parse_str(&id_str).map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
        title: row.get("title"),
        author: row.get("author"),
        description: row.get("description"),
        genre: row.get("genre"),
        isbn: row.get("isbn"),
        publish_year: row.get("publish_year"),
        publisher: row.get("publisher"),
        page_count: row.get("page_count"),
        language: row.get("language"),
        embedding: decode_embedding(&id_str, embedding_json.as_deref(), adapter),
        added_at: parse_timestamp(&added_at)?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

/// Save new book to database
pub async fn insert_book(pool: &SqlitePool, book: &Book) -> Result<(), sqlx::Error> {
    let embedding = book.embedding.as_ref().map(encode_embedding).transpose()?;

    sqlx::query(
        r#"
        INSERT INTO books (
            id, title, author, description, genre, isbn, publish_year, publisher,
            page_count, language, embedding, added_at, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(book.id.to_string())
    .bind(&book.title)
    .bind(&book.author)
    .bind(&book.description)
    .bind(&book.genre)
    .bind(&book.isbn)
    .bind(book.publish_year)
    .bind(&book.publisher)
    .bind(book.page_count)
    .bind(&book.language)
    .bind(embedding)
    .bind(format_timestamp(book.added_at))
    .bind(format_timestamp(book.created_at))
    .bind(format_timestamp(book.updated_at))
    .execute(pool)
    .await?;

    Ok(())
}

/// Load book by id
pub async fn load_book(
    pool: &SqlitePool,
    id: Uuid,
    adapter: &ExternalVectorAdapter,
) -> Result<Option<Book>, sqlx::Error> {
    let row = sqlx::query(&format!("SELECT {} FROM books WHERE id = ?", BOOK_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.map(|r| book_from_row(&r, adapter)).transpose()
}

/// List books, most recently added first
pub async fn list_books(
    pool: &SqlitePool,
    filter: &BookFilter,
    adapter: &ExternalVectorAdapter,
) -> Result<Vec<Book>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {}
        FROM books
        WHERE (?1 IS NULL OR genre = ?1)
          AND (?2 IS NULL OR author LIKE ?2 ESCAPE '\')
        ORDER BY added_at DESC, id ASC
        LIMIT ?3 OFFSET ?4
        "#,
        BOOK_COLUMNS
    ))
    .bind(&filter.genre)
    .bind(filter.author.as_deref().map(like_pattern))
    .bind(filter.limit)
    .bind(filter.skip)
    .fetch_all(pool)
    .await?;

    rows.iter().map(|r| book_from_row(r, adapter)).collect()
}

/// Overwrite every mutable column of an existing book
///
/// Returns false when no book has this id.
pub async fn update_book(pool: &SqlitePool, book: &Book) -> Result<bool, sqlx::Error> {
    let embedding = book.embedding.as_ref().map(encode_embedding).transpose()?;

    let result = sqlx::query(
        r#"
        UPDATE books SET
            title = ?, author = ?, description = ?, genre = ?, isbn = ?,
            publish_year = ?, publisher = ?, page_count = ?, language = ?,
            embedding = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&book.title)
    .bind(&book.author)
    .bind(&book.description)
    .bind(&book.genre)
    .bind(&book.isbn)
    .bind(book.publish_year)
    .bind(&book.publisher)
    .bind(book.page_count)
    .bind(&book.language)
    .bind(embedding)
    .bind(format_timestamp(book.updated_at))
    .bind(book.id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Delete book and its embedding
pub async fn delete_book(pool: &SqlitePool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM books WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn count_books(pool: &SqlitePool, genre: Option<&str>) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM books WHERE (?1 IS NULL OR genre = ?1)")
        .bind(genre)
        .fetch_one(pool)
        .await
}

/// Every book that has a stored embedding, for a full-scan ranking
pub async fn load_book_vectors(
    pool: &SqlitePool,
    adapter: &ExternalVectorAdapter,
) -> Result<Vec<StoredVector<BookSummary>>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT id, title, author, genre, description, publish_year, isbn, embedding
        FROM books
        WHERE embedding IS NOT NULL
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| {
            let id: String = row.get("id");
            let embedding_json: Option<String> = row.get("embedding");
            let embedding = decode_embedding(&id, embedding_json.as_deref(), adapter);
            StoredVector {
                id,
                embedding,
                metadata: BookSummary {
                    title: row.get("title"),
                    author: row.get("author"),
                    genre: row.get("genre"),
                    description: row.get("description"),
                    publish_year: row.get("publish_year"),
                    isbn: row.get("isbn"),
                },
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_pool;
    use chrono::Duration;

    fn adapter() -> ExternalVectorAdapter {
        ExternalVectorAdapter::new(3).unwrap()
    }

    fn book(title: &str, author: &str, genre: Option<&str>, days_ago: i64) -> Book {
        let mut b = Book::new(
            title.to_string(),
            author.to_string(),
            format!("About {}", title),
        );
        b.genre = genre.map(str::to_string);
        b.added_at = Utc::now() - Duration::days(days_ago);
        b
    }

    #[tokio::test]
    async fn test_insert_load_defaults() {
        let pool = init_memory_pool().await.unwrap();
        let mut b = book("Dune", "Frank Herbert", Some("scifi"), 0);
        b.embedding = Some(adapter().accept(vec![0.0, 1.0, 0.0]).unwrap());
        b.publish_year = Some(1965);
        insert_book(&pool, &b).await.unwrap();

        let loaded = load_book(&pool, b.id, &adapter()).await.unwrap().unwrap();
        assert_eq!(loaded.language, "English");
        assert_eq!(loaded.publish_year, Some(1965));
        assert_eq!(loaded.embedding, b.embedding);
        assert_eq!(loaded.embedding_text(), "Dune. About Dune");
    }

    #[tokio::test]
    async fn test_list_update_delete_count() {
        let pool = init_memory_pool().await.unwrap();
        let older = book("Foundation", "Isaac Asimov", Some("scifi"), 10);
        let newer = book("Emma", "Jane Austen", Some("classic"), 1);
        insert_book(&pool, &older).await.unwrap();
        insert_book(&pool, &newer).await.unwrap();

        let all = list_books(
            &pool,
            &BookFilter { limit: 50, ..BookFilter::default() },
            &adapter(),
        )
        .await
        .unwrap();
        assert_eq!(all[0].title, "Emma");

        let asimov = list_books(
            &pool,
            &BookFilter {
                author: Some("ASIMOV".to_string()),
                limit: 50,
                ..BookFilter::default()
            },
            &adapter(),
        )
        .await
        .unwrap();
        assert_eq!(asimov.len(), 1);

        let mut changed = older.clone();
        changed.genre = Some("classic".to_string());
        assert!(update_book(&pool, &changed).await.unwrap());
        assert_eq!(count_books(&pool, Some("classic")).await.unwrap(), 2);

        assert!(delete_book(&pool, newer.id).await.unwrap());
        assert_eq!(count_books(&pool, None).await.unwrap(), 1);
        assert_eq!(load_book_vectors(&pool, &adapter()).await.unwrap().len(), 0);
    }
}
