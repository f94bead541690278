//! Track catalog operations
//!
//! Tracks carry an audio embedding built from a feature bundle supplied by
//! an external extractor. The mood label is inferred from tags when the
//! caller does not set one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use simcat_common::{
    CategoryClassifier, Embedding, EmbeddingBuilder, EmbeddingLayout, Error, ExternalVectorAdapter,
    FeatureBundle, RankedItem, Result, RuleTable, SimilarityRanker,
};
use simcat_common::config::SearchConfig;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::tracks::{self, Track, TrackFilter, TrackSummary};
use crate::services::similarity::{rank_stored, resolve_bounds, MetadataFilter};

const MAX_TITLE_LEN: usize = 200;
const MAX_SOURCE_LEN: usize = 50;

/// Default and maximum page size for listings
pub const DEFAULT_LIST_LIMIT: i64 = 50;
pub const MAX_LIST_LIMIT: i64 = 200;

/// Body of a track creation request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTrack {
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default)]
    pub mood: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub played_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_seconds: Option<f64>,
    /// Extracted audio features; no embedding when absent
    #[serde(default)]
    pub features: Option<FeatureBundle>,
}

/// Partial track update; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrackUpdate {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub mood: Option<String>,
    pub tags: Option<Vec<String>>,
    pub duration_seconds: Option<f64>,
    pub features: Option<FeatureBundle>,
}

/// Listing parameters as received from the query string
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrackListQuery {
    pub mood: Option<String>,
    pub artist: Option<String>,
    pub limit: Option<i64>,
    pub skip: Option<i64>,
}

/// One similarity hit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarTrack {
    pub track_id: String,
    pub similarity_score: f32,
    pub track: TrackSummaryView,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackSummaryView {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub mood: Option<String>,
}

impl From<RankedItem<TrackSummary>> for SimilarTrack {
    fn from(item: RankedItem<TrackSummary>) -> Self {
        Self {
            track_id: item.id,
            similarity_score: item.score,
            track: TrackSummaryView {
                title: item.metadata.title,
                artist: item.metadata.artist,
                album: item.metadata.album,
                mood: item.metadata.mood,
            },
        }
    }
}

/// Track catalog backed by the SQLite store
pub struct TrackService {
    db: SqlitePool,
    builder: EmbeddingBuilder,
    adapter: ExternalVectorAdapter,
    ranker: SimilarityRanker,
    classifier: CategoryClassifier,
    search: SearchConfig,
}

impl TrackService {
    pub fn new(
        db: SqlitePool,
        layout: EmbeddingLayout,
        rules: RuleTable,
        search: SearchConfig,
    ) -> Result<Self> {
        let dimensions = layout.target_dim();
        Ok(Self {
            db,
            builder: EmbeddingBuilder::new(layout),
            adapter: ExternalVectorAdapter::new(dimensions)?,
            ranker: SimilarityRanker::new(dimensions),
            classifier: CategoryClassifier::new(rules),
            search,
        })
    }

    /// Configured mood labels in tie-break order
    pub fn moods(&self) -> Vec<String> {
        self.classifier.table().labels().map(str::to_string).collect()
    }

    pub fn dimensions(&self) -> usize {
        self.ranker.dimensions()
    }

    /// Build an audio embedding, warning when the feature set overflows
    /// the configured dimension
    pub fn build_embedding(&self, features: &FeatureBundle) -> Result<Embedding> {
        let report = self.builder.build_report(features)?;
        if report.truncated() {
            warn!(
                concatenated = report.concatenated_len,
                target_dim = self.builder.layout().target_dim(),
                "Audio features exceed embedding dimension; truncating (feature layout and dimension have drifted)"
            );
        }
        Ok(report.embedding)
    }

    pub async fn create(&self, input: NewTrack) -> Result<Track> {
        let title = required(&input.title, "title", MAX_TITLE_LEN)?;
        let artist = required(&input.artist, "artist", MAX_TITLE_LEN)?;

        let mut track = Track::new(title, artist);
        track.album = optional(input.album, "album", MAX_TITLE_LEN)?;
        track.tags = clean_tags(input.tags);
        track.mood = match input.mood {
            Some(mood) => Some(self.check_mood(mood)?),
            None => self.infer_mood(&track.tags),
        };
        if let Some(source) = optional(input.source, "source", MAX_SOURCE_LEN)? {
            track.source = source;
        }
        if let Some(played_at) = input.played_at {
            track.played_at = played_at;
        }
        track.duration_seconds = check_duration(input.duration_seconds)?;
        if let Some(features) = &input.features {
            track.embedding = Some(self.build_embedding(features)?);
        }

        tracks::insert_track(&self.db, &track).await?;

        info!(
            track_id = %track.id,
            mood = track.mood.as_deref().unwrap_or("none"),
            embedded = track.embedding.is_some(),
            "Created track: {} by {}",
            track.title,
            track.artist
        );

        Ok(track)
    }

    pub async fn get(&self, id: Uuid) -> Result<Track> {
        tracks::load_track(&self.db, id, &self.adapter)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Track not found: {}", id)))
    }

    pub async fn list(&self, query: TrackListQuery) -> Result<Vec<Track>> {
        let filter = TrackFilter {
            mood: query.mood.as_deref().and_then(normalize_mood),
            artist: query.artist.filter(|a| !a.trim().is_empty()),
            limit: page_limit(query.limit)?,
            skip: page_skip(query.skip)?,
        };
        let found = tracks::list_tracks(&self.db, &filter, &self.adapter).await?;
        tracing::debug!(count = found.len(), ?filter, "Listed tracks");
        Ok(found)
    }

    pub async fn update(&self, id: Uuid, update: TrackUpdate) -> Result<Track> {
        let mut track = self.get(id).await?;

        if let Some(title) = update.title {
            track.title = required(&title, "title", MAX_TITLE_LEN)?;
        }
        if let Some(artist) = update.artist {
            track.artist = required(&artist, "artist", MAX_TITLE_LEN)?;
        }
        if update.album.is_some() {
            track.album = optional(update.album, "album", MAX_TITLE_LEN)?;
        }
        let tags_changed = update.tags.is_some();
        if let Some(tags) = update.tags {
            track.tags = clean_tags(tags);
        }
        match update.mood {
            Some(mood) => track.mood = Some(self.check_mood(mood)?),
            None if tags_changed => track.mood = self.infer_mood(&track.tags),
            None => {}
        }
        if update.duration_seconds.is_some() {
            track.duration_seconds = check_duration(update.duration_seconds)?;
        }
        if let Some(features) = &update.features {
            // Replaced wholesale, never patched
            track.embedding = Some(self.build_embedding(features)?);
        }
        track.updated_at = Utc::now();

        if !tracks::update_track(&self.db, &track).await? {
            return Err(Error::NotFound(format!("Track not found: {}", id)));
        }

        info!(track_id = %id, "Updated track");
        Ok(track)
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        if !tracks::delete_track(&self.db, id).await? {
            return Err(Error::NotFound(format!("Track not found: {}", id)));
        }
        info!(track_id = %id, "Deleted track");
        Ok(())
    }

    pub async fn count(&self, mood: Option<&str>) -> Result<i64> {
        let mood = mood.and_then(normalize_mood);
        Ok(tracks::count_tracks(&self.db, mood.as_deref()).await?)
    }

    /// Tracks similar to a stored track, which is left out of its own results
    pub async fn similar_to_track(
        &self,
        id: Uuid,
        limit: Option<usize>,
        mood: Option<String>,
    ) -> Result<(Track, Vec<SimilarTrack>)> {
        let track = self.get(id).await?;
        let query = track
            .embedding
            .clone()
            .ok_or_else(|| Error::NotFound(format!("Track {} has no embedding", id)))?;

        info!(track_id = %id, "Searching for tracks similar to: {}", track.title);

        let similar = self
            .rank(query, limit, Some(id.to_string()), mood)
            .await?;
        Ok((track, similar))
    }

    /// Tracks similar to a submitted feature bundle
    pub async fn similar_to_features(
        &self,
        features: &FeatureBundle,
        limit: Option<usize>,
        mood: Option<String>,
    ) -> Result<Vec<SimilarTrack>> {
        let query = self.build_embedding(features)?;
        self.rank(query, limit, None, mood).await
    }

    async fn rank(
        &self,
        query: Embedding,
        limit: Option<usize>,
        exclude_id: Option<String>,
        mood: Option<String>,
    ) -> Result<Vec<SimilarTrack>> {
        let bounds = resolve_bounds(&self.search, limit, None)?;
        let filter = match mood {
            Some(mood) => Some(self.mood_filter(self.check_mood(mood)?)),
            None => None,
        };

        let candidates = tracks::load_track_vectors(&self.db, &self.adapter).await?;
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

        Ok(ranked.into_iter().map(SimilarTrack::from).collect())
    }

    fn mood_filter(&self, mood: String) -> MetadataFilter<TrackSummary> {
        Arc::new(move |summary: &TrackSummary| summary.mood.as_deref() == Some(mood.as_str()))
    }

    fn infer_mood(&self, tags: &[String]) -> Option<String> {
        self.classifier.classify(tags).map(str::to_string)
    }

    fn check_mood(&self, mood: String) -> Result<String> {
        let mood = mood.trim().to_lowercase();
        if self.classifier.table().contains_label(&mood) {
            Ok(mood)
        } else {
            Err(Error::InvalidInput(format!(
                "Mood must be one of: {}",
                self.moods().join(", ")
            )))
        }
    }
}

/// Mood labels are stored lowercased; blank means no filter
fn normalize_mood(mood: &str) -> Option<String> {
    let mood = mood.trim();
    (!mood.is_empty()).then(|| mood.to_lowercase())
}

fn required(value: &str, field: &str, max_len: usize) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::InvalidInput(format!("Missing required field: {}", field)));
    }
    if value.chars().count() > max_len {
        return Err(Error::InvalidInput(format!(
            "{} must be at most {} characters",
            field, max_len
        )));
    }
    Ok(value.to_string())
}

/// Blank optional text is stored as absent
fn optional(value: Option<String>, field: &str, max_len: usize) -> Result<Option<String>> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => required(v, field, max_len).map(Some),
    }
}

fn clean_tags(tags: Vec<String>) -> Vec<String> {
    tags.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

fn check_duration(duration: Option<f64>) -> Result<Option<f64>> {
    match duration {
        Some(d) if !d.is_finite() || d < 0.0 => Err(Error::InvalidInput(
            "duration_seconds must be a non-negative number".to_string(),
        )),
        other => Ok(other),
    }
}

pub(crate) fn page_limit(limit: Option<i64>) -> Result<i64> {
    match limit {
        None => Ok(DEFAULT_LIST_LIMIT),
        Some(l) if (1..=MAX_LIST_LIMIT).contains(&l) => Ok(l),
        Some(_) => Err(Error::InvalidInput(format!(
            "limit must be between 1 and {}",
            MAX_LIST_LIMIT
        ))),
    }
}

pub(crate) fn page_skip(skip: Option<i64>) -> Result<i64> {
    match skip {
        None => Ok(0),
        Some(s) if s >= 0 => Ok(s),
        Some(_) => Err(Error::InvalidInput("skip must not be negative".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_pool;
    use simcat_common::FeatureSpec;

    fn layout() -> EmbeddingLayout {
        EmbeddingLayout::new(
            4,
            vec![FeatureSpec::vector("chroma", 3), FeatureSpec::scalar("tempo", 200.0)],
        )
        .unwrap()
    }

    async fn service() -> TrackService {
        let pool = init_memory_pool().await.unwrap();
        TrackService::new(pool, layout(), RuleTable::default_moods(), SearchConfig::default()).unwrap()
    }

    fn features(chroma: [f32; 3], tempo: f32) -> FeatureBundle {
        FeatureBundle::new()
            .with_vector("chroma", chroma.to_vec())
            .with_scalar("tempo", tempo)
    }

    fn new_track(title: &str, mood: Option<&str>, f: Option<FeatureBundle>) -> NewTrack {
        NewTrack {
            title: title.to_string(),
            artist: "Artist".to_string(),
            mood: mood.map(str::to_string),
            features: f,
            ..NewTrack::default()
        }
    }

    #[tokio::test]
    async fn test_create_infers_mood_and_builds_embedding() {
        let service = service().await;
        let track = service
            .create(NewTrack {
                tags: vec![" lofi ".into(), "study".into(), "".into()],
                ..new_track("Late Night", None, Some(features([1.0, 0.0, 0.0], 0.0)))
            })
            .await
            .unwrap();

        assert_eq!(track.mood.as_deref(), Some("focus"));
        assert_eq!(track.tags, vec!["lofi", "study"]);
        assert_eq!(track.source, "manual");
        assert_eq!(track.embedding.unwrap().as_slice(), &[1.0, 0.0, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn test_mixed_case_configured_mood_is_usable() {
        let pool = init_memory_pool().await.unwrap();
        let rules = RuleTable::new([("Focus", vec!["lofi"]), ("Party", vec!["dance"])]).unwrap();
        let service = TrackService::new(pool, layout(), rules, SearchConfig::default()).unwrap();

        let inferred = service
            .create(NewTrack {
                tags: vec!["lofi".into()],
                ..new_track("Inferred", None, Some(features([1.0, 0.0, 0.0], 0.0)))
            })
            .await
            .unwrap();
        assert_eq!(inferred.mood.as_deref(), Some("focus"));

        let explicit = service
            .create(new_track("Explicit", Some("Focus"), Some(features([0.9, 0.1, 0.0], 0.0))))
            .await
            .unwrap();
        assert_eq!(explicit.mood.as_deref(), Some("focus"));

        let similar = service
            .similar_to_features(&features([1.0, 0.0, 0.0], 0.0), Some(5), Some("FOCUS".into()))
            .await
            .unwrap();
        assert_eq!(similar.len(), 2);

        assert_eq!(service.count(Some("Focus")).await.unwrap(), 2);
        let listed = service
            .list(TrackListQuery {
                mood: Some("Focus".into()),
                ..TrackListQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(service.moods(), vec!["focus", "party"]);
    }

    #[tokio::test]
    async fn test_create_validation() {
        let service = service().await;
        assert!(matches!(
            service.create(new_track("  ", None, None)).await,
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            service.create(new_track("Song", Some("grumpy"), None)).await,
            Err(Error::InvalidInput(_))
        ));
        // Missing feature is the caller's fault
        let partial = FeatureBundle::new().with_vector("chroma", vec![1.0, 0.0, 0.0]);
        assert!(matches!(
            service.create(new_track("Song", None, Some(partial))).await,
            Err(Error::Embedding(_))
        ));
        assert_eq!(service.count(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_reinfers_mood_and_replaces_embedding() {
        let service = service().await;
        let track = service
            .create(new_track("Song", None, Some(features([1.0, 0.0, 0.0], 0.0))))
            .await
            .unwrap();
        assert_eq!(track.mood, None);

        let updated = service
            .update(
                track.id,
                TrackUpdate {
                    tags: Some(vec!["sad".into(), "dark".into()]),
                    features: Some(features([0.0, 0.0, 0.0], 200.0)),
                    ..TrackUpdate::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.mood.as_deref(), Some("melancholic"));
        assert_eq!(updated.embedding.as_ref().unwrap().as_slice(), &[0.0, 0.0, 0.0, 1.0]);
        assert!(updated.updated_at >= track.updated_at);
        let stored = service.get(track.id).await.unwrap();
        assert_eq!(stored.mood, updated.mood);
        assert_eq!(stored.embedding, updated.embedding);

        // Explicit mood wins over tags
        let explicit = service
            .update(
                track.id,
                TrackUpdate {
                    mood: Some("Happy".into()),
                    tags: Some(vec!["sad".into()]),
                    ..TrackUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(explicit.mood.as_deref(), Some("happy"));
    }

    #[tokio::test]
    async fn test_missing_track_is_not_found() {
        let service = service().await;
        let id = Uuid::new_v4();
        assert!(matches!(service.get(id).await, Err(Error::NotFound(_))));
        assert!(matches!(service.delete(id).await, Err(Error::NotFound(_))));
        assert!(matches!(
            service.update(id, TrackUpdate::default()).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_similar_to_track_excludes_itself_and_filters_mood() {
        let service = service().await;
        let query = service
            .create(new_track("Query", Some("chill"), Some(features([1.0, 0.0, 0.0], 0.0))))
            .await
            .unwrap();
        let near = service
            .create(new_track("Near", Some("chill"), Some(features([1.0, 0.1, 0.0], 0.0))))
            .await
            .unwrap();
        service
            .create(new_track("Same but focus", Some("focus"), Some(features([1.0, 0.0, 0.0], 0.0))))
            .await
            .unwrap();
        service
            .create(new_track("No embedding", Some("chill"), None))
            .await
            .unwrap();

        let (found, similar) = service
            .similar_to_track(query.id, Some(10), None)
            .await
            .unwrap();
        assert_eq!(found.id, query.id);
        assert_eq!(similar.len(), 2);
        assert_eq!(similar[0].track.title, "Same but focus");
        assert!((similar[0].similarity_score - 1.0).abs() < 1e-6);

        let (_, chill) = service
            .similar_to_track(query.id, Some(10), Some("chill".into()))
            .await
            .unwrap();
        assert_eq!(chill.len(), 1);
        assert_eq!(chill[0].track_id, near.id.to_string());
    }

    #[tokio::test]
    async fn test_similar_requires_embedding() {
        let service = service().await;
        let bare = service.create(new_track("Bare", None, None)).await.unwrap();

        assert!(matches!(
            service.similar_to_track(bare.id, None, None).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_similar_to_features_and_limit() {
        let service = service().await;
        for i in 0..5 {
            service
                .create(new_track(&format!("T{}", i), None, Some(features([1.0, i as f32, 0.0], 0.0))))
                .await
                .unwrap();
        }

        let similar = service
            .similar_to_features(&features([1.0, 0.0, 0.0], 0.0), Some(2), None)
            .await
            .unwrap();
        let titles: Vec<&str> = similar.iter().map(|s| s.track.title.as_str()).collect();
        assert_eq!(titles, vec!["T0", "T1"]);

        assert!(matches!(
            service
                .similar_to_features(&features([1.0, 0.0, 0.0], 0.0), Some(0), None)
                .await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_page_bounds() {
        assert_eq!(page_limit(None).unwrap(), 50);
        assert_eq!(page_limit(Some(200)).unwrap(), 200);
        assert!(page_limit(Some(201)).is_err());
        assert!(page_limit(Some(0)).is_err());
        assert_eq!(page_skip(None).unwrap(), 0);
        assert!(page_skip(Some(-1)).is_err());
    }
}
