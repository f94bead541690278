//! Aggregate statistics over the catalog

use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use super::format_timestamp;

/// Embedding coverage of one table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbeddingCoverage {
    pub total: i64,
    pub with_embeddings: i64,
    pub without_embeddings: i64,
    pub coverage_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MoodCount {
    pub mood: String,
    pub count: i64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListeningStats {
    pub total_tracks: i64,
    pub unique_artists: i64,
    pub unique_albums: i64,
    pub total_duration_seconds: f64,
    pub average_duration_seconds: f64,
    pub total_duration_hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtistStat {
    pub artist: String,
    pub play_count: i64,
    pub sample_tracks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopArtists {
    pub range: StatsRange,
    pub top_artists: Vec<ArtistStat>,
}

/// Sample titles listed per artist
const SAMPLE_TRACKS: i64 = 3;

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn percentage(part: i64, total: i64) -> f64 {
    if total > 0 {
        round2(part as f64 / total as f64 * 100.0)
    } else {
        0.0
    }
}

/// Coverage for the `tracks` or `books` table
pub async fn embedding_coverage(
    pool: &SqlitePool,
    table: CatalogTable,
) -> Result<EmbeddingCoverage, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT COUNT(*) AS total, COUNT(embedding) AS with_embeddings FROM {}",
        table.name()
    ))
    .fetch_one(pool)
    .await?;

    let total: i64 = row.get("total");
    let with_embeddings: i64 = row.get("with_embeddings");

    Ok(EmbeddingCoverage {
        total,
        with_embeddings,
        without_embeddings: total - with_embeddings,
        coverage_percentage: percentage(with_embeddings, total),
    })
}

/// Tables that carry embeddings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogTable {
    Tracks,
    Books,
}

impl CatalogTable {
    fn name(self) -> &'static str {
        match self {
            CatalogTable::Tracks => "tracks",
            CatalogTable::Books => "books",
        }
    }
}

/// Track count per mood, largest first; tracks without a mood are "unspecified"
pub async fn mood_distribution(pool: &SqlitePool) -> Result<Vec<MoodCount>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT COALESCE(mood, 'unspecified') AS mood, COUNT(*) AS count
        FROM tracks
        GROUP BY COALESCE(mood, 'unspecified')
        ORDER BY count DESC, mood ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    let counts: Vec<(String, i64)> = rows
        .iter()
        .map(|r| (r.get("mood"), r.get("count")))
        .collect();
    let total: i64 = counts.iter().map(|(_, c)| c).sum();

    tracing::debug!(moods = counts.len(), total, "Computed mood distribution");

    Ok(counts
        .into_iter()
        .map(|(mood, count)| MoodCount {
            mood,
            count,
            percentage: percentage(count, total),
        })
        .collect())
}

pub async fn listening_stats(pool: &SqlitePool) -> Result<ListeningStats, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT
            COUNT(*) AS total_tracks,
            COUNT(DISTINCT artist) AS unique_artists,
            COUNT(DISTINCT album) AS unique_albums,
            COALESCE(SUM(duration_seconds), 0.0) AS total_duration,
            COALESCE(AVG(duration_seconds), 0.0) AS average_duration
        FROM tracks
        "#,
    )
    .fetch_one(pool)
    .await?;

    let total_duration: f64 = row.get("total_duration");
    let average_duration: f64 = row.get("average_duration");

    Ok(ListeningStats {
        total_tracks: row.get("total_tracks"),
        unique_artists: row.get("unique_artists"),
        unique_albums: row.get("unique_albums"),
        total_duration_seconds: round2(total_duration),
        average_duration_seconds: round2(average_duration),
        total_duration_hours: round2(total_duration / 3600.0),
    })
}

/// First instant of the calendar month containing `now` (UTC)
pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

/// Most played artists between the start of the current month and `now`
///
/// Ties on play count are ordered by artist name. Sample titles are the
/// artist's most recent plays in the range.
pub async fn top_artists(
    pool: &SqlitePool,
    now: DateTime<Utc>,
    limit: i64,
) -> Result<TopArtists, sqlx::Error> {
    let from = month_start(now);
    let from_str = format_timestamp(from);
    let to_str = format_timestamp(now);

    let rows = sqlx::query(
        r#"
        SELECT artist, COUNT(*) AS play_count
        FROM tracks
        WHERE played_at >= ? AND played_at <= ?
        GROUP BY artist
        ORDER BY play_count DESC, artist ASC
        LIMIT ?
        "#,
    )
    .bind(&from_str)
    .bind(&to_str)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    let mut top = Vec::with_capacity(rows.len());
    for row in rows {
        let artist: String = row.get("artist");
        let sample_tracks: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT title
            FROM tracks
            WHERE artist = ? AND played_at >= ? AND played_at <= ?
            ORDER BY played_at DESC, id ASC
            LIMIT ?
            "#,
        )
        .bind(&artist)
        .bind(&from_str)
        .bind(&to_str)
        .bind(SAMPLE_TRACKS)
        .fetch_all(pool)
        .await?;

        top.push(ArtistStat {
            artist,
            play_count: row.get("play_count"),
            sample_tracks,
        });
    }

    tracing::info!(
        artists = top.len(),
        from = %from_str,
        "Retrieved top artists for current month"
    );

    Ok(TopArtists {
        range: StatsRange { from, to: now },
        top_artists: top,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::books::{insert_book, Book};
    use crate::db::init_memory_pool;
    use crate::db::tracks::{insert_track, Track};
    use chrono::Duration;
    use simcat_common::ExternalVectorAdapter;

    fn track(title: &str, artist: &str, album: Option<&str>, mood: Option<&str>, played_at: DateTime<Utc>) -> Track {
        let mut t = Track::new(title.to_string(), artist.to_string());
        t.album = album.map(str::to_string);
        t.mood = mood.map(str::to_string);
        t.played_at = played_at;
        t
    }

    #[tokio::test]
    async fn test_empty_catalog() {
        let pool = init_memory_pool().await.unwrap();

        let coverage = embedding_coverage(&pool, CatalogTable::Books).await.unwrap();
        assert_eq!(coverage.total, 0);
        assert_eq!(coverage.coverage_percentage, 0.0);

        assert!(mood_distribution(&pool).await.unwrap().is_empty());

        let listening = listening_stats(&pool).await.unwrap();
        assert_eq!(listening.total_tracks, 0);
        assert_eq!(listening.average_duration_seconds, 0.0);
    }

    #[tokio::test]
    async fn test_coverage_rounds_to_two_decimals() {
        let pool = init_memory_pool().await.unwrap();
        let adapter = ExternalVectorAdapter::new(2).unwrap();
        for i in 0..3 {
            let mut b = Book::new(format!("Book {}", i), "Author".into(), "Text".into());
            if i == 0 {
                b.embedding = Some(adapter.accept(vec![1.0, 0.0]).unwrap());
            }
            insert_book(&pool, &b).await.unwrap();
        }

        let coverage = embedding_coverage(&pool, CatalogTable::Books).await.unwrap();
        assert_eq!(coverage.with_embeddings, 1);
        assert_eq!(coverage.without_embeddings, 2);
        assert_eq!(coverage.coverage_percentage, 33.33);
    }

    #[tokio::test]
    async fn test_mood_distribution_and_listening() {
        let pool = init_memory_pool().await.unwrap();
        let now = Utc::now();
        let mut a = track("A", "X", Some("Album 1"), Some("focus"), now);
        a.duration_seconds = Some(100.0);
        let mut b = track("B", "X", Some("Album 1"), Some("focus"), now);
        b.duration_seconds = Some(200.0);
        let c = track("C", "Y", None, None, now);
        for t in [&a, &b, &c] {
            insert_track(&pool, t).await.unwrap();
        }

        let moods = mood_distribution(&pool).await.unwrap();
        assert_eq!(moods[0].mood, "focus");
        assert_eq!(moods[0].count, 2);
        assert_eq!(moods[0].percentage, 66.67);
        assert_eq!(moods[1].mood, "unspecified");

        let listening = listening_stats(&pool).await.unwrap();
        assert_eq!(listening.total_tracks, 3);
        assert_eq!(listening.unique_artists, 2);
        assert_eq!(listening.unique_albums, 1);
        assert_eq!(listening.total_duration_seconds, 300.0);
        assert_eq!(listening.average_duration_seconds, 150.0);
        assert_eq!(listening.total_duration_hours, 0.08);
    }

    #[tokio::test]
    async fn test_top_artists_current_month_only() {
        let pool = init_memory_pool().await.unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 20, 12, 0, 0).unwrap();
        let last_month = Utc.with_ymd_and_hms(2024, 2, 28, 12, 0, 0).unwrap();

        for (i, title) in ["One", "Two", "Three", "Four"].iter().enumerate() {
            let played = now - Duration::hours(i as i64 + 1);
            insert_track(&pool, &track(title, "Busy", None, None, played)).await.unwrap();
        }
        insert_track(&pool, &track("Once", "Rare", None, None, now - Duration::days(1)))
            .await
            .unwrap();
        for _ in 0..10 {
            insert_track(&pool, &track("Old", "Past", None, None, last_month)).await.unwrap();
        }

        let top = top_artists(&pool, now, 5).await.unwrap();
        assert_eq!(top.range.from, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
        assert_eq!(top.top_artists.len(), 2);
        assert_eq!(top.top_artists[0].artist, "Busy");
        assert_eq!(top.top_artists[0].play_count, 4);
        assert_eq!(top.top_artists[0].sample_tracks, vec!["One", "Two", "Three"]);
        assert_eq!(top.top_artists[1].artist, "Rare");

        let limited = top_artists(&pool, now, 1).await.unwrap();
        assert_eq!(limited.top_artists.len(), 1);
    }
}
