//! # simcat common library
//!
//! Similarity core shared by the simcat binaries:
//! - Embedding construction from extracted audio features
//! - Validation of externally produced (text) embeddings
//! - Tag-based category classification
//! - Cosine-similarity ranking with deterministic tie-breaking
//! - Configuration loading and root folder resolution
//!
//! Everything outside `config` is pure in-memory computation: no I/O,
//! no logging, no shared mutable state.

pub mod category;
pub mod config;
pub mod embedding;
pub mod error;
pub mod ranking;

pub use category::{CategoryClassifier, RuleTable};
pub use embedding::builder::{EmbeddingBuilder, EmbeddingLayout, FeatureBundle, FeatureKind, FeatureSpec};
pub use embedding::external::ExternalVectorAdapter;
pub use embedding::Embedding;
pub use error::{EmbeddingError, Error, Result};
pub use ranking::{Candidate, RankedItem, SimilarityRanker};
