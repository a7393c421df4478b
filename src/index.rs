// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exact nearest-neighbour index over embedding vectors.
//!
//! The index is a flat table of `(id, vector)` rows scanned on every query,
//! the same shape as a flat L2 index wrapped in an id map. It is built once
//! from a full corpus snapshot and is read-only afterwards; reflecting corpus
//! changes means building a new index.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;

use crate::errors::{FaqError, Result};

/// Below this many rows the scan stays on the calling thread.
const PARALLEL_SCAN_THRESHOLD: usize = 4096;

/// Distance metric for comparing vectors. Lower is always closer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Squared Euclidean distance.
    #[default]
    L2,
    /// Cosine distance, `1 - cos(a, b)`.
    Cosine,
}

impl Metric {
    /// Distance between two equal-length vectors. NaN becomes `f32::INFINITY`.
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        let distance: f32 = match self {
            Metric::L2 => a
                .iter()
                .zip(b)
                .map(|(x, y)| {
                    let d = x - y;
                    d * d
                })
                .sum(),
            Metric::Cosine => 1.0 - cosine_similarity(a, b),
        };
        if distance.is_nan() {
            f32::INFINITY
        } else {
            distance
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Metric::L2 => write!(f, "l2"),
            Metric::Cosine => write!(f, "cosine"),
        }
    }
}

impl std::str::FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "l2" | "euclidean" => Ok(Metric::L2),
            "cosine" | "cos" => Ok(Metric::Cosine),
            _ => Err(format!("Unknown metric: {}", s)),
        }
    }
}

/// One query hit: corpus identifier and its distance from the query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Neighbor {
    pub id: i64,
    pub distance: f32,
}

/// Ascending distance, then ascending id.
fn neighbor_order(a: &Neighbor, b: &Neighbor) -> Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then_with(|| a.id.cmp(&b.id))
}

/// Immutable flat vector index keyed by corpus identifiers.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    metric: Metric,
    dimension: Option<usize>,
    ids: Vec<i64>,
    // Row-major, `ids.len() * dimension` values.
    data: Vec<f32>,
}

impl VectorIndex {
    /// Builds an L2 index from `(id, vector)` pairs.
    pub fn build<I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (i64, Vec<f32>)>,
    {
        Self::build_with_metric(pairs, Metric::L2)
    }

    /// Builds an index using `metric`.
    ///
    /// The first vector fixes the dimensionality. Fails with
    /// `DimensionMismatch` on any later vector of a different length and with
    /// `DuplicateIdentifier` if an id repeats.
    pub fn build_with_metric<I>(pairs: I, metric: Metric) -> Result<Self>
    where
        I: IntoIterator<Item = (i64, Vec<f32>)>,
    {
        let mut dimension: Option<usize> = None;
        let mut ids = Vec::new();
        let mut data = Vec::new();
        let mut seen = HashSet::new();

        for (id, vector) in pairs {
            let expected = *dimension.get_or_insert(vector.len());
            if expected == 0 {
                return Err(FaqError::InvalidArgument(
                    "cannot index zero-length vectors".to_string(),
                ));
            }
            if vector.len() != expected {
                return Err(FaqError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
            if !seen.insert(id) {
                return Err(FaqError::DuplicateIdentifier(id));
            }
            ids.push(id);
            data.extend_from_slice(&vector);
        }

        Ok(Self {
            metric,
            dimension,
            ids,
            data,
        })
    }

    /// Returns up to `k` nearest neighbours of `vector`, closest first.
    ///
    /// When the index holds fewer than `k` rows every row is returned. Equal
    /// distances are ordered by ascending id.
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if k == 0 {
            return Err(FaqError::InvalidArgument("k must be positive".to_string()));
        }
        let Some(dimension) = self.dimension else {
            return Ok(Vec::new());
        };
        if vector.len() != dimension {
            return Err(FaqError::DimensionMismatch {
                expected: dimension,
                actual: vector.len(),
            });
        }

        let score = |(row, id): (&[f32], &i64)| Neighbor {
            id: *id,
            distance: self.metric.distance(vector, row),
        };
        let mut scored: Vec<Neighbor> = if self.ids.len() >= PARALLEL_SCAN_THRESHOLD {
            self.data
                .par_chunks_exact(dimension)
                .zip(self.ids.par_iter())
                .map(score)
                .collect()
        } else {
            self.data
                .chunks_exact(dimension)
                .zip(self.ids.iter())
                .map(score)
                .collect()
        };

        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, neighbor_order);
            scored.truncate(k);
        }
        scored.sort_unstable_by(neighbor_order);

        Ok(scored)
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Fixed vector length, or None for an index built from nothing.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Cosine similarity in `[-1, 1]`; zero when either vector has no magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    (dot_product / (magnitude_a * magnitude_b)).clamp(-1.0, 1.0)
}
