//! Embedding construction from extracted audio features
//!
//! Turns a [`FeatureBundle`] (named scalars and sub-vectors produced by an
//! external feature extractor) into a fixed-length, L2-normalized
//! [`Embedding`]:
//!
//! 1. Features are concatenated in the order declared by the
//!    [`EmbeddingLayout`]. The order is part of the stored format; changing
//!    it invalidates every embedding built with the previous order.
//! 2. Scalars are divided by their configured divisor before concatenation
//!    so they stay commensurate with the vector features.
//! 3. The result is right-padded with zeros, or truncated, to `target_dim`.
//!    Truncation means the layout and the dimension have drifted apart;
//!    [`BuildReport::truncated`] lets the caller log it.
//! 4. The vector is divided by its Euclidean norm. An all-zero vector is
//!    left as is and is a valid (degenerate) embedding.

use super::{normalize_l2_in_place, Embedding};
use crate::error::EmbeddingError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// One extracted feature value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Scalar(f32),
    Vector(Vec<f32>),
}

/// Named feature values from one extraction pass
///
/// Serializes as a plain JSON object: `{"tempo": 120.0, "chroma": [..]}`.
/// Extra features not named by the layout are ignored by the builder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureBundle {
    values: BTreeMap<String, FeatureValue>,
}

impl FeatureBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style scalar insert
    pub fn with_scalar(mut self, name: impl Into<String>, value: f32) -> Self {
        self.insert_scalar(name, value);
        self
    }

    /// Builder-style vector insert
    pub fn with_vector(mut self, name: impl Into<String>, values: Vec<f32>) -> Self {
        self.insert_vector(name, values);
        self
    }

    pub fn insert_scalar(&mut self, name: impl Into<String>, value: f32) {
        self.values.insert(name.into(), FeatureValue::Scalar(value));
    }

    pub fn insert_vector(&mut self, name: impl Into<String>, values: Vec<f32>) {
        self.values.insert(name.into(), FeatureValue::Vector(values));
    }

    pub fn get(&self, name: &str) -> Option<&FeatureValue> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Shape and normalization of a single feature slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeatureKind {
    /// Sub-vector with a fixed number of components
    Vector { len: usize },
    /// Scalar divided by `divisor` before concatenation
    Scalar {
        #[serde(default = "unit_divisor")]
        divisor: f32,
    },
}

fn unit_divisor() -> f32 {
    1.0
}

impl FeatureKind {
    /// Number of embedding components this slot contributes
    pub fn width(&self) -> usize {
        match self {
            FeatureKind::Vector { len } => *len,
            FeatureKind::Scalar { .. } => 1,
        }
    }
}

/// A named slot in the concatenation order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub name: String,
    #[serde(flatten)]
    pub kind: FeatureKind,
}

impl FeatureSpec {
    pub fn vector(name: impl Into<String>, len: usize) -> Self {
        Self {
            name: name.into(),
            kind: FeatureKind::Vector { len },
        }
    }

    pub fn scalar(name: impl Into<String>, divisor: f32) -> Self {
        Self {
            name: name.into(),
            kind: FeatureKind::Scalar { divisor },
        }
    }
}

/// Default audio embedding dimension
pub const AUDIO_EMBEDDING_DIM: usize = 128;

/// Typical upper bound of the spectral centroid in Hz
pub const SPECTRAL_CENTROID_DIVISOR: f32 = 5000.0;

/// Typical upper bound of the detected tempo in BPM
pub const TEMPO_DIVISOR: f32 = 200.0;

/// Validated concatenation layout and target dimension
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingLayout {
    target_dim: usize,
    features: Vec<FeatureSpec>,
}

impl EmbeddingLayout {
    /// Validate and create a layout
    ///
    /// Rejects a zero dimension, an empty or duplicated feature list,
    /// zero-length vectors, and divisors that are not finite and positive.
    pub fn new(target_dim: usize, features: Vec<FeatureSpec>) -> Result<Self, EmbeddingError> {
        if target_dim == 0 {
            return Err(EmbeddingError::InvalidLayout(
                "target dimension must be positive".to_string(),
            ));
        }
        if features.is_empty() {
            return Err(EmbeddingError::InvalidLayout(
                "feature order is empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for spec in &features {
            if spec.name.trim().is_empty() {
                return Err(EmbeddingError::InvalidLayout(
                    "feature name cannot be blank".to_string(),
                ));
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(EmbeddingError::InvalidLayout(format!(
                    "feature '{}' appears more than once",
                    spec.name
                )));
            }
            match spec.kind {
                FeatureKind::Vector { len } if len == 0 => {
                    return Err(EmbeddingError::InvalidLayout(format!(
                        "vector feature '{}' has zero length",
                        spec.name
                    )));
                }
                FeatureKind::Scalar { divisor } if !(divisor.is_finite() && divisor > 0.0) => {
                    return Err(EmbeddingError::InvalidLayout(format!(
                        "scalar feature '{}' has divisor {}, expected a positive finite value",
                        spec.name, divisor
                    )));
                }
                _ => {}
            }
        }

        Ok(Self {
            target_dim,
            features,
        })
    }

    /// Audio layout used by the stock feature extractor
    ///
    /// 20 MFCC means, 12 chroma means, 7 spectral contrast bands, then
    /// spectral centroid / 5000, zero-crossing rate, tempo / 200. The 42
    /// components are zero-padded to 128.
    pub fn audio_default() -> Self {
        Self {
            target_dim: AUDIO_EMBEDDING_DIM,
            features: default_audio_features(),
        }
    }

    pub fn target_dim(&self) -> usize {
        self.target_dim
    }

    pub fn features(&self) -> &[FeatureSpec] {
        &self.features
    }

    /// Length of the concatenation before padding/truncation
    pub fn concatenated_len(&self) -> usize {
        self.features.iter().map(|f| f.kind.width()).sum()
    }
}

/// Feature order of [`EmbeddingLayout::audio_default`]
pub fn default_audio_features() -> Vec<FeatureSpec> {
    vec![
        FeatureSpec::vector("mfccs", 20),
        FeatureSpec::vector("chroma", 12),
        FeatureSpec::vector("spectral_contrast", 7),
        FeatureSpec::scalar("spectral_centroid", SPECTRAL_CENTROID_DIVISOR),
        FeatureSpec::scalar("zcr", 1.0),
        FeatureSpec::scalar("tempo", TEMPO_DIVISOR),
    ]
}

/// Result of a build together with what happened to its length
#[derive(Debug, Clone, PartialEq)]
pub struct BuildReport {
    pub embedding: Embedding,
    /// Number of components produced by concatenation
    pub concatenated_len: usize,
}

impl BuildReport {
    /// Concatenation was longer than the target and got cut
    pub fn truncated(&self) -> bool {
        self.concatenated_len > self.embedding.dimensions()
    }

    /// Number of trailing zeros added
    pub fn padding(&self) -> usize {
        self.embedding
            .dimensions()
            .saturating_sub(self.concatenated_len)
    }
}

/// Pure feature-bundle → embedding function, configured by a layout
#[derive(Debug, Clone)]
pub struct EmbeddingBuilder {
    layout: EmbeddingLayout,
}

impl EmbeddingBuilder {
    pub fn new(layout: EmbeddingLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &EmbeddingLayout {
        &self.layout
    }

    /// Build an embedding from a feature bundle
    pub fn build(&self, bundle: &FeatureBundle) -> Result<Embedding, EmbeddingError> {
        self.build_report(bundle).map(|report| report.embedding)
    }

    /// Build an embedding and report the pre-padding length
    pub fn build_report(&self, bundle: &FeatureBundle) -> Result<BuildReport, EmbeddingError> {
        let target_dim = self.layout.target_dim;
        let mut components =
            Vec::with_capacity(self.layout.concatenated_len().max(target_dim));

        for spec in &self.layout.features {
            let value = bundle
                .get(&spec.name)
                .ok_or_else(|| invalid(&spec.name, "required feature is missing"))?;

            match (&spec.kind, value) {
                (FeatureKind::Vector { len }, FeatureValue::Vector(values)) => {
                    if values.len() != *len {
                        return Err(invalid(
                            &spec.name,
                            format!("expected {} components, got {}", len, values.len()),
                        ));
                    }
                    if let Some(index) = values.iter().position(|v| !v.is_finite()) {
                        return Err(invalid(
                            &spec.name,
                            format!("component {} is not finite", index),
                        ));
                    }
                    components.extend_from_slice(values);
                }
                (FeatureKind::Scalar { divisor }, FeatureValue::Scalar(value)) => {
                    if !value.is_finite() {
                        return Err(invalid(&spec.name, "value is not finite"));
                    }
                    let scaled = value / divisor;
                    if !scaled.is_finite() {
                        return Err(invalid(&spec.name, "value overflows after scaling"));
                    }
                    components.push(scaled);
                }
                (FeatureKind::Vector { len }, FeatureValue::Scalar(_)) => {
                    return Err(invalid(
                        &spec.name,
                        format!("expected a vector of {} components, got a scalar", len),
                    ));
                }
                (FeatureKind::Scalar { .. }, FeatureValue::Vector(_)) => {
                    return Err(invalid(&spec.name, "expected a scalar, got a vector"));
                }
            }
        }

        let concatenated_len = components.len();
        components.resize(target_dim, 0.0);
        normalize_l2_in_place(&mut components);

        Ok(BuildReport {
            embedding: Embedding::from_validated(components),
            concatenated_len,
        })
    }
}

fn invalid(name: &str, reason: impl Into<String>) -> EmbeddingError {
    EmbeddingError::InvalidFeature {
        name: name.to_string(),
        reason: reason.into(),
    }
}
