//! Cosine-similarity ranking over in-memory candidates
//!
//! [`SimilarityRanker::rank`] is the brute-force nearest-neighbour search
//! used when the store has no native vector index, and the final ordering
//! step when it does: the same code ranks a full scan or an index-narrowed
//! candidate set.
//!
//! Ordering is score descending, then id ascending. The order is total, so
//! the result does not depend on candidate order, and ranking disjoint
//! partitions separately then combining them with [`merge_ranked`] gives the
//! same top-k as ranking everything at once.

use crate::embedding::Embedding;
use crate::error::EmbeddingError;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::num::NonZeroUsize;

/// One stored item offered to the ranker
///
/// Items without an embedding are carried with `embedding: None` and
/// skipped silently.
#[derive(Debug, Clone)]
pub struct Candidate<'a, M> {
    pub id: &'a str,
    pub embedding: Option<&'a Embedding>,
    pub metadata: M,
}

/// Ranked result: id, similarity score, caller metadata
#[derive(Debug, Clone, PartialEq)]
pub struct RankedItem<M> {
    pub id: String,
    pub score: f32,
    pub metadata: M,
}

/// Cosine similarity of two equal-length vectors
///
/// A zero-norm side scores 0 instead of dividing by zero. The result is not
/// clamped: opposite vectors score negative.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    // + 0.0 folds a negative zero into positive zero
    (dot / (norm_a.sqrt() * norm_b.sqrt())) as f32 + 0.0
}

/// `Less` when `a` ranks ahead of `b`
fn rank_order(a_score: f32, a_id: &str, b_score: f32, b_id: &str) -> Ordering {
    b_score.total_cmp(&a_score).then_with(|| a_id.cmp(b_id))
}

/// Heap entry ordered by rank: the heap's maximum is the worst kept item
struct Ranked<M>(RankedItem<M>);

impl<M> PartialEq for Ranked<M> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<M> Eq for Ranked<M> {}

impl<M> PartialOrd for Ranked<M> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<M> Ord for Ranked<M> {
    fn cmp(&self, other: &Self) -> Ordering {
        rank_order(self.0.score, &self.0.id, other.0.score, &other.0.id)
    }
}

/// Top-k selector for a fixed embedding dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimilarityRanker {
    dimensions: usize,
}

impl SimilarityRanker {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Rank candidates against `query` and keep the best `k`
    ///
    /// `exclude_id` is dropped unconditionally (typically the query item
    /// itself); `filter` drops candidates whose metadata it rejects.
    /// Candidates with no embedding, or an embedding of another dimension,
    /// are not part of the population. Fewer than `k` eligible candidates
    /// is not an error: all of them are returned.
    ///
    /// # Errors
    /// `EmptyQuery` when the query does not have this ranker's dimension.
    pub fn rank<'a, M, I>(
        &self,
        query: &Embedding,
        candidates: I,
        k: NonZeroUsize,
        exclude_id: Option<&str>,
        filter: Option<&dyn Fn(&M) -> bool>,
    ) -> Result<Vec<RankedItem<M>>, EmbeddingError>
    where
        I: IntoIterator<Item = Candidate<'a, M>>,
    {
        if query.dimensions() != self.dimensions {
            return Err(EmbeddingError::EmptyQuery {
                expected: self.dimensions,
                actual: query.dimensions(),
            });
        }

        let k = k.get();
        let mut heap: BinaryHeap<Ranked<M>> = BinaryHeap::with_capacity(k + 1);

        for candidate in candidates {
            let Some(embedding) = candidate.embedding else {
                continue;
            };
            if embedding.dimensions() != self.dimensions {
                continue;
            }
            if exclude_id == Some(candidate.id) {
                continue;
            }
            if let Some(accept) = filter {
                if !accept(&candidate.metadata) {
                    continue;
                }
            }

            let score = cosine_similarity(query.as_slice(), embedding.as_slice());

            if heap.len() == k {
                let Some(worst) = heap.peek() else {
                    continue;
                };
                if rank_order(score, candidate.id, worst.0.score, &worst.0.id)
                    != Ordering::Less
                {
                    continue;
                }
                heap.pop();
            }

            heap.push(Ranked(RankedItem {
                id: candidate.id.to_string(),
                score,
                metadata: candidate.metadata,
            }));
        }

        Ok(heap.into_sorted_vec().into_iter().map(|r| r.0).collect())
    }
}

/// Merge independently ranked lists into one top-k list
///
/// Each input is a `rank` result over a disjoint slice of the candidates,
/// produced with the same query, exclusion and filter.
pub fn merge_ranked<M, I>(lists: I, k: NonZeroUsize) -> Vec<RankedItem<M>>
where
    I: IntoIterator<Item = Vec<RankedItem<M>>>,
{
    let mut merged: Vec<RankedItem<M>> = lists.into_iter().flatten().collect();
    merged.sort_by(|a, b| rank_order(a.score, &a.id, b.score, &b.id));
    merged.truncate(k.get());
    merged
}
