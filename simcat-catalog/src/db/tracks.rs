//! Track database operations

use chrono::{DateTime, Utc};
use simcat_common::{Embedding, ExternalVectorAdapter};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{decode_embedding, encode_embedding, format_timestamp, like_pattern, parse_timestamp, StoredVector};

/// Listened track
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub id: Uuid,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub mood: Option<String>,
    pub tags: Vec<String>,
    pub source: String,
    pub played_at: DateTime<Utc>,
    pub duration_seconds: Option<f64>,
    pub embedding: Option<Embedding>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Track {
    /// New manually added track played now, without embedding
    pub fn new(title: String, artist: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title,
            artist,
            album: None,
            mood: None,
            tags: Vec::new(),
            source: "manual".to_string(),
            played_at: now,
            duration_seconds: None,
            embedding: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Metadata carried through similarity ranking
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSummary {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub mood: Option<String>,
}

/// List filters; `artist` is a case-insensitive substring
#[derive(Debug, Clone, Default)]
pub struct TrackFilter {
    pub mood: Option<String>,
    pub artist: Option<String>,
    pub limit: i64,
    pub skip: i64,
}

const TRACK_COLUMNS: &str = "id, title, artist, album, mood, tags, source, played_at, \
                             duration_seconds, embedding, created_at, updated_at";

fn track_from_row(row: &SqliteRow, adapter: &ExternalVectorAdapter) -> Result<Track, sqlx::Error> {
    let id_str: String = row.get("id");
    let tags_json: String = row.get("tags");
    let embedding_json: Option<String> = row.get("embedding");
    let played_at: String = row.get("played_at");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(Track {
        id: Uuid::parse_str(&id_str).map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
        title: row.get("title"),
        artist: row.get("artist"),
        album: row.get("album"),
        mood: row.get("mood"),
        tags: serde_json::from_str(&tags_json).map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
        source: row.get("source"),
        played_at: parse_timestamp(&played_at)?,
        duration_seconds: row.get("duration_seconds"),
        embedding: decode_embedding(&id_str, embedding_json.as_deref(), adapter),
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

/// Save new track to database
pub async fn insert_track(pool: &SqlitePool, track: &Track) -> Result<(), sqlx::Error> {
    let tags = serde_json::to_string(&track.tags).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
    let embedding = track.embedding.as_ref().map(encode_embedding).transpose()?;

    sqlx::query(
        r#"
        INSERT INTO tracks (
            id, title, artist, album, mood, tags, source, played_at,
            duration_seconds, embedding, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(track.id.to_string())
    .bind(&track.title)
    .bind(&track.artist)
    .bind(&track.album)
    .bind(&track.mood)
    .bind(tags)
    .bind(&track.source)
    .bind(format_timestamp(track.played_at))
    .bind(track.duration_seconds)
    .bind(embedding)
    .bind(format_timestamp(track.created_at))
    .bind(format_timestamp(track.updated_at))
    .execute(pool)
    .await?;

    Ok(())
}

/// Load track by id
pub async fn load_track(
    pool: &SqlitePool,
    id: Uuid,
    adapter: &ExternalVectorAdapter,
) -> Result<Option<Track>, sqlx::Error> {
    let row = sqlx::query(&format!("SELECT {} FROM tracks WHERE id = ?", TRACK_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.map(|r| track_from_row(&r, adapter)).transpose()
}

/// List tracks, most recently played first
pub async fn list_tracks(
    pool: &SqlitePool,
    filter: &TrackFilter,
    adapter: &ExternalVectorAdapter,
) -> Result<Vec<Track>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {}
        FROM tracks
        WHERE (?1 IS NULL OR mood = ?1)
          AND (?2 IS NULL OR artist LIKE ?2 ESCAPE '\')
        ORDER BY played_at DESC, id ASC
        LIMIT ?3 OFFSET ?4
        "#,
        TRACK_COLUMNS
    ))
    .bind(&filter.mood)
    .bind(filter.artist.as_deref().map(like_pattern))
    .bind(filter.limit)
    .bind(filter.skip)
    .fetch_all(pool)
    .await?;

    rows.iter().map(|r| track_from_row(r, adapter)).collect()
}

/// Overwrite every mutable column of an existing track
///
/// Returns false when no track has this id.
pub async fn update_track(pool: &SqlitePool, track: &Track) -> Result<bool, sqlx::Error> {
    let tags = serde_json::to_string(&track.tags).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
    let embedding = track.embedding.as_ref().map(encode_embedding).transpose()?;

    let result = sqlx::query(
        r#"
        UPDATE tracks SET
            title = ?, artist = ?, album = ?, mood = ?, tags = ?, source = ?,
            played_at = ?, duration_seconds = ?, embedding = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&track.title)
    .bind(&track.artist)
    .bind(&track.album)
    .bind(&track.mood)
    .bind(tags)
    .bind(&track.source)
    .bind(format_timestamp(track.played_at))
    .bind(track.duration_seconds)
    .bind(embedding)
    .bind(format_timestamp(track.updated_at))
    .bind(track.id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Delete track and its embedding
pub async fn delete_track(pool: &SqlitePool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM tracks WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn count_tracks(pool: &SqlitePool, mood: Option<&str>) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM tracks WHERE (?1 IS NULL OR mood = ?1)")
        .bind(mood)
        .fetch_one(pool)
        .await
}

/// Every track that has a stored embedding, for a full-scan ranking
pub async fn load_track_vectors(
    pool: &SqlitePool,
    adapter: &ExternalVectorAdapter,
) -> Result<Vec<StoredVector<TrackSummary>>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT id, title, artist, album, mood, embedding FROM tracks WHERE embedding IS NOT NULL",
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
                metadata: TrackSummary {
                    title: row.get("title"),
                    artist: row.get("artist"),
                    album: row.get("album"),
                    mood: row.get("mood"),
                },
            }
        })
        .collect())
}
