//! Similarity query orchestration
//!
//! Resolves query bounds and runs a full-scan ranking of stored vectors:
//! the candidates are split into partitions, each partition is ranked on
//! the blocking pool, and the partial results are merged. Ranking and
//! merging use the same score-then-id order, so the result is identical to
//! ranking everything in one pass.

use simcat_common::config::SearchConfig;
use simcat_common::ranking::merge_ranked;
use simcat_common::{Candidate, Embedding, EmbeddingError, Error, RankedItem, Result, SimilarityRanker};
use std::num::NonZeroUsize;
use std::sync::Arc;

use crate::db::StoredVector;

/// Metadata predicate shared across ranking tasks
pub type MetadataFilter<M> = Arc<dyn Fn(&M) -> bool + Send + Sync>;

/// Result count and candidate breadth for one query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchBounds {
    pub k: NonZeroUsize,
    /// Candidates an index-backed search would examine; always >= k
    pub search_breadth: usize,
}

/// Apply defaults and limits to a requested result count and breadth
///
/// `limit` must be in `1..=max_limit`. The breadth is clamped to
/// `max_search_breadth` and then raised to at least `k`.
pub fn resolve_bounds(
    config: &SearchConfig,
    limit: Option<usize>,
    search_breadth: Option<usize>,
) -> Result<SearchBounds> {
    let limit = limit.unwrap_or(config.default_limit);
    if limit > config.max_limit {
        return Err(Error::InvalidInput(format!(
            "limit must be between 1 and {}",
            config.max_limit
        )));
    }
    let k = NonZeroUsize::new(limit).ok_or_else(|| {
        Error::InvalidInput(format!("limit must be between 1 and {}", config.max_limit))
    })?;

    let breadth = search_breadth
        .unwrap_or(config.default_search_breadth)
        .min(config.max_search_breadth)
        .max(k.get());

    Ok(SearchBounds {
        k,
        search_breadth: breadth,
    })
}

/// Rank stored vectors against `query` and keep the best `k`
///
/// Items are ranked in partitions of `partition_size` on the blocking
/// pool. The query item itself is dropped via `exclude_id`.
pub async fn rank_stored<M>(
    ranker: SimilarityRanker,
    query: Embedding,
    items: Vec<StoredVector<M>>,
    k: NonZeroUsize,
    exclude_id: Option<String>,
    filter: Option<MetadataFilter<M>>,
    partition_size: usize,
) -> Result<Vec<RankedItem<M>>>
where
    M: Clone + Send + Sync + 'static,
{
    // Fail before spawning anything when the query cannot be ranked
    if query.dimensions() != ranker.dimensions() {
        return Err(EmbeddingError::EmptyQuery {
            expected: ranker.dimensions(),
            actual: query.dimensions(),
        }
        .into());
    }

    let total = items.len();
    let partition_size = partition_size.max(1);
    let items = Arc::new(items);
    let query = Arc::new(query);

    let mut tasks = Vec::with_capacity(total.div_ceil(partition_size));
    for start in (0..total).step_by(partition_size) {
        let end = (start + partition_size).min(total);
        let items = Arc::clone(&items);
        let query = Arc::clone(&query);
        let exclude_id = exclude_id.clone();
        let filter = filter.clone();

        tasks.push(tokio::task::spawn_blocking(move || {
            rank_partition(
                ranker,
                &query,
                &items[start..end],
                k,
                exclude_id.as_deref(),
                filter.as_deref(),
            )
        }));
    }

    let partitions = tasks.len();
    let mut partial = Vec::with_capacity(partitions);
    for task in tasks {
        let ranked = task
            .await
            .map_err(|e| Error::Internal(format!("Ranking task failed: {}", e)))??;
        partial.push(ranked);
    }

    let merged = merge_ranked(partial, k);
    tracing::debug!(
        candidates = total,
        partitions,
        k = k.get(),
        results = merged.len(),
        "Ranked stored vectors"
    );
    Ok(merged)
}

fn rank_partition<M: Clone>(
    ranker: SimilarityRanker,
    query: &Embedding,
    partition: &[StoredVector<M>],
    k: NonZeroUsize,
    exclude_id: Option<&str>,
    filter: Option<&(dyn Fn(&M) -> bool + Send + Sync)>,
) -> std::result::Result<Vec<RankedItem<M>>, EmbeddingError> {
    // Rank by index into the partition; metadata is cloned for survivors only
    let accept: &dyn Fn(&usize) -> bool =
        &|index| filter.map_or(true, |f| f(&partition[*index].metadata));

    let candidates = partition.iter().enumerate().map(|(index, item)| Candidate {
        id: item.id.as_str(),
        embedding: item.embedding.as_ref(),
        metadata: index,
    });

    let ranked = ranker.rank(query, candidates, k, exclude_id, Some(accept))?;

    Ok(ranked
        .into_iter()
        .map(|r| RankedItem {
            metadata: partition[r.metadata].metadata.clone(),
            id: r.id,
            score: r.score,
        })
        .collect())
}
