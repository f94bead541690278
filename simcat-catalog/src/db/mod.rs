//! Catalog store
//!
//! SQLite tables for tracks and books. Embeddings are kept as JSON arrays
//! in a TEXT column and revalidated on load; a row whose stored vector no
//! longer passes validation is treated as having no embedding.

pub mod books;
pub mod stats;
pub mod tracks;

use chrono::{DateTime, SecondsFormat, Utc};
use simcat_common::{Embedding, ExternalVectorAdapter};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;

/// Stored item as offered to a full-scan ranking
#[derive(Debug, Clone)]
pub struct StoredVector<M> {
    pub id: String,
    pub embedding: Option<Embedding>,
    pub metadata: M,
}

/// Initialize database connection pool
///
/// Creates the database file and its parent folder on first run.
pub async fn init_database_pool(db_path: &Path) -> anyhow::Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let options = SqliteConnectOptions::from_str(&db_url)?
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .busy_timeout(std::time::Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Single-connection in-memory database with tables created
///
/// One connection only: every pooled connection to `sqlite::memory:` would
/// otherwise see its own empty database.
pub async fn init_memory_pool() -> Result<SqlitePool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    init_tables(&pool).await?;
    Ok(pool)
}

/// Create catalog tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tracks (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            artist TEXT NOT NULL,
            album TEXT,
            mood TEXT,
            tags TEXT NOT NULL DEFAULT '[]',
            source TEXT NOT NULL DEFAULT 'manual',
            played_at TEXT NOT NULL,
            duration_seconds REAL,
            embedding TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tracks_played_at ON tracks(played_at)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tracks_mood ON tracks(mood)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS books (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            author TEXT NOT NULL,
            description TEXT NOT NULL,
            genre TEXT,
            isbn TEXT,
            publish_year INTEGER,
            publisher TEXT,
            page_count INTEGER,
            language TEXT NOT NULL DEFAULT 'English',
            embedding TEXT,
            added_at TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_books_genre ON books(genre)")
        .execute(pool)
        .await?;

    tracing::info!("Database tables initialized (tracks, books)");

    Ok(())
}

/// Timestamp format for stored TEXT columns
///
/// Fixed width with a `Z` suffix, so lexical order equals time order.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

/// Serialize an embedding for the TEXT column
pub fn encode_embedding(embedding: &Embedding) -> Result<String, sqlx::Error> {
    serde_json::to_string(embedding).map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

/// Revalidate a stored embedding
///
/// Returns `None` (and logs) for unparseable JSON or a vector that no
/// longer matches the configured dimension.
pub fn decode_embedding(
    item_id: &str,
    stored: Option<&str>,
    adapter: &ExternalVectorAdapter,
) -> Option<Embedding> {
    let stored = stored?;
    let vector: Vec<f32> = match serde_json::from_str(stored) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(item_id, error = %e, "Stored embedding is not valid JSON; ignoring");
            return None;
        }
    };
    match adapter.accept(vector) {
        Ok(embedding) => Some(embedding),
        Err(e) => {
            tracing::warn!(item_id, error = %e, "Stored embedding failed validation; ignoring");
            None
        }
    }
}

/// Escape `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` pattern
pub(crate) fn like_pattern(fragment: &str) -> String {
    let mut escaped = String::with_capacity(fragment.len() + 2);
    escaped.push('%');
    for c in fragment.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_init_tables_is_idempotent() {
        let pool = init_memory_pool().await.unwrap();
        init_tables(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn test_database_file_created() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("simcat.db");

        let pool = init_database_pool(&db_path).await.unwrap();
        pool.close().await;

        assert!(db_path.exists());
    }

    #[test]
    fn test_timestamps_sort_lexically() {
        let early = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 11, 2, 3, 4, 5).unwrap();
        assert!(format_timestamp(early) < format_timestamp(late));
        assert_eq!(parse_timestamp(&format_timestamp(late)).unwrap(), late);
    }

    #[test]
    fn test_decode_embedding_rejects_bad_rows() {
        let adapter = ExternalVectorAdapter::new(3).unwrap();
        assert!(decode_embedding("a", None, &adapter).is_none());
        assert!(decode_embedding("a", Some("not json"), &adapter).is_none());
        assert!(decode_embedding("a", Some("[1.0, 0.0]"), &adapter).is_none());

        let embedding = decode_embedding("a", Some("[0.6, 0.8, 0.0]"), &adapter).unwrap();
        assert_eq!(embedding.as_slice(), &[0.6, 0.8, 0.0]);
        assert_eq!(
            encode_embedding(&embedding).unwrap(),
            serde_json::to_string(&[0.6_f32, 0.8, 0.0]).unwrap()
        );
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("abc"), "%abc%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }
}
