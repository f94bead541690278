//! Fixed-dimension, L2-normalized item fingerprints
//!
//! An [`Embedding`] can only be obtained from the [`builder::EmbeddingBuilder`]
//! (audio features) or the [`external::ExternalVectorAdapter`] (vectors from a
//! text-embedding provider). Both validate dimension and finiteness, so every
//! `Embedding` in the process satisfies those invariants.

pub mod builder;
pub mod external;

use serde::Serialize;

/// Immutable embedding vector
///
/// Components are finite and the Euclidean norm is either ~1 or exactly 0
/// (the degenerate all-zero vector). Replaced wholesale when the source
/// content changes; never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    /// Wrap components that the caller has already validated
    pub(crate) fn from_validated(components: Vec<f32>) -> Self {
        Self(components)
    }

    /// Vector components
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Number of components
    pub fn dimensions(&self) -> usize {
        self.0.len()
    }

    /// Euclidean norm
    pub fn norm(&self) -> f32 {
        l2_norm(&self.0)
    }

    /// True for the degenerate all-zero embedding
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&c| c == 0.0)
    }

    /// Consume into the raw component vector (for persistence)
    pub fn into_vec(self) -> Vec<f32> {
        self.0
    }
}

impl AsRef<[f32]> for Embedding {
    fn as_ref(&self) -> &[f32] {
        &self.0
    }
}

/// Euclidean norm, accumulated in f64 so large finite components cannot
/// overflow the intermediate sum
pub fn l2_norm(values: &[f32]) -> f32 {
    values
        .iter()
        .map(|&v| f64::from(v) * f64::from(v))
        .sum::<f64>()
        .sqrt() as f32
}

/// Scale `values` to unit norm in place
///
/// Returns `false` and leaves the slice untouched when the norm is zero.
pub fn normalize_l2_in_place(values: &mut [f32]) -> bool {
    let norm = values
        .iter()
        .map(|&v| f64::from(v) * f64::from(v))
        .sum::<f64>()
        .sqrt();
    if norm == 0.0 {
        return false;
    }
    for value in values.iter_mut() {
        *value = (f64::from(*value) / norm) as f32;
    }
    true
}
