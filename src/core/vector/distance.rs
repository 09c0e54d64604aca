//! Distance metrics
//!
//! Both metrics are distances: smaller is closer. `L2` is the squared
//! euclidean distance (no square root); `Cosine` is `1 - cos(a, b)`, with
//! zero vectors pinned to distance 1.0.

use crate::core::common::PolystoreError;
use serde::{Deserialize, Serialize};

/// Supported distance metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Metric {
    /// Squared euclidean distance: Σ(aᵢ−bᵢ)².
    L2,
    /// One minus cosine similarity.
    Cosine,
}

impl Metric {
    /// Calculate the distance between two vectors using this metric.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> Result<f32, PolystoreError> {
        match self {
            Self::L2 => l2_squared(a, b),
            Self::Cosine => cosine_one_minus(a, b),
        }
    }

    /// The name of the metric.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::L2 => "l2",
            Self::Cosine => "cosine",
        }
    }

    /// Parse a metric name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "l2" => Some(Self::L2),
            "cosine" => Some(Self::Cosine),
            _ => None,
        }
    }
}

fn check_dims(a: &[f32], b: &[f32]) -> Result<(), PolystoreError> {
    if a.len() != b.len() {
        return Err(PolystoreError::VectorDimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    Ok(())
}

/// Squared euclidean distance between two vectors.
pub fn l2_squared(a: &[f32], b: &[f32]) -> Result<f32, PolystoreError> {
    check_dims(a, b)?;
    Ok(a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum())
}

/// One-minus-cosine distance. Zero-magnitude vectors yield distance 1.0
/// (no direction, no similarity).
pub fn cosine_one_minus(a: &[f32], b: &[f32]) -> Result<f32, PolystoreError> {
    check_dims(a, b)?;
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(1.0);
    }
    Ok(1.0 - dot / (norm_a * norm_b))
}

/// Scale a vector to unit L2 norm in place. Zero vectors are left unchanged.
pub fn normalize_l2(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v {
            *x /= norm;
        }
    }
}
