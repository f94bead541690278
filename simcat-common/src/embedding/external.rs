//! Acceptance of externally produced embeddings
//!
//! Vectors from a text-embedding provider arrive already normalized by
//! their source. They are checked for dimension and finiteness and wrapped
//! as-is; no renormalization happens here.

use super::Embedding;
use crate::error::EmbeddingError;

/// Default text embedding dimension (text-embedding-3-small)
pub const TEXT_EMBEDDING_DIM: usize = 1536;

/// Validates provider vectors against a fixed dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternalVectorAdapter {
    target_dim: usize,
}

impl ExternalVectorAdapter {
    pub fn new(target_dim: usize) -> Result<Self, EmbeddingError> {
        if target_dim == 0 {
            return Err(EmbeddingError::InvalidLayout(
                "target dimension must be positive".to_string(),
            ));
        }
        Ok(Self { target_dim })
    }

    pub fn target_dim(&self) -> usize {
        self.target_dim
    }

    /// Accept a provider vector as an [`Embedding`]
    ///
    /// # Errors
    /// - `DimensionMismatch` when the length differs from the target dimension
    /// - `InvalidFeature` when any component is NaN or infinite
    pub fn accept(&self, vector: Vec<f32>) -> Result<Embedding, EmbeddingError> {
        if vector.len() != self.target_dim {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.target_dim,
                actual: vector.len(),
            });
        }
        if let Some(index) = vector.iter().position(|v| !v.is_finite()) {
            return Err(EmbeddingError::InvalidFeature {
                name: "external_vector".to_string(),
                reason: format!("component {} is not finite", index),
            });
        }
        Ok(Embedding::from_validated(vector))
    }
}
