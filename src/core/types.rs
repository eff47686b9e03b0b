/*
 * Copyright 2025 Vijaykumar Singh
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Core data model: embeddings, items and the records that flow between
//! the index, the metadata store and callers.

use serde::{Deserialize, Serialize};

use crate::compute::distance::l2_norm;
use crate::core::error::{SearchError, SearchResult};

/// Tolerance on `|norm - 1.0|` for every stored or queried embedding.
pub const UNIT_NORM_TOLERANCE: f32 = 1e-4;

/// Insertion sequence number of an entry, shared by the vector index and the
/// metadata store as their only join key.
pub type Ordinal = usize;

/// A unit-norm feature vector.
///
/// The only ways to obtain an `Embedding` normalize the input, so every value
/// of this type satisfies `|norm - 1.0| < UNIT_NORM_TOLERANCE`. Deserialization
/// goes through [`Embedding::from_unit`] as well.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct Embedding(Vec<f32>);

impl Embedding {
    /// Normalize a raw feature vector to unit length.
    ///
    /// Fails with `NoSignal` when the vector is empty or has zero norm and
    /// with `InvalidEmbedding` when a component is NaN or infinite.
    pub fn new(raw: Vec<f32>) -> SearchResult<Self> {
        if let Some(pos) = raw.iter().position(|v| !v.is_finite()) {
            return Err(SearchError::InvalidEmbedding(format!(
                "component {} is not finite",
                pos
            )));
        }

        // Scale into [-1, 1] first so squaring neither overflows nor underflows
        let scale = raw.iter().fold(0.0f32, |max, v| max.max(v.abs()));
        if raw.is_empty() || scale == 0.0 {
            return Err(SearchError::NoSignal);
        }
        let mut scaled: Vec<f32> = raw.into_iter().map(|v| v / scale).collect();

        let norm = l2_norm(&scaled);
        if norm == 0.0 || !norm.is_finite() {
            return Err(SearchError::NoSignal);
        }
        scaled.iter_mut().for_each(|v| *v /= norm);
        Ok(Self(scaled))
    }

    /// Accept a vector that is expected to be unit-norm already, re-normalizing
    /// it if floating-point drift pushed it outside the tolerance.
    pub fn from_unit(raw: Vec<f32>) -> SearchResult<Self> {
        let norm = l2_norm(&raw);
        if norm.is_finite()
            && (norm - 1.0).abs() < UNIT_NORM_TOLERANCE
            && raw.iter().all(|v| v.is_finite())
        {
            return Ok(Self(raw));
        }
        Self::new(raw)
    }

    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn norm(&self) -> f32 {
        l2_norm(&self.0)
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }
}

impl TryFrom<Vec<f32>> for Embedding {
    type Error = SearchError;

    fn try_from(raw: Vec<f32>) -> SearchResult<Self> {
        Embedding::from_unit(raw)
    }
}

impl From<Embedding> for Vec<f32> {
    fn from(embedding: Embedding) -> Self {
        embedding.0
    }
}

impl AsRef<[f32]> for Embedding {
    fn as_ref(&self) -> &[f32] {
        &self.0
    }
}

/// A stored item. Immutable once ingested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Locator of the source image (usually a URL)
    pub source_reference: String,
    /// Free-text description, possibly empty
    #[serde(default)]
    pub description: String,
}

impl Item {
    pub fn new(source_reference: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            source_reference: source_reference.into(),
            description: description.into(),
        }
    }
}

/// One (ordinal, score) pair produced by the vector index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    pub ordinal: Ordinal,
    /// Inner product with the query (cosine similarity for unit vectors)
    pub score: f32,
}

/// Items and scores returned to a search caller, positionally aligned.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RankedResults {
    pub results: Vec<Item>,
    pub scores: Vec<f32>,
    pub total_items: usize,
}

impl RankedResults {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Outcome of a successful ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReceipt {
    pub ordinal: Ordinal,
    pub total_items: usize,
}

/// State of the durable backing store as seen by diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BackingStoreHealth {
    /// Persistence is disabled; nothing survives a restart
    InMemory,
    Healthy,
    Degraded { reason: String },
}

impl BackingStoreHealth {
    pub fn is_healthy(&self) -> bool {
        !matches!(self, BackingStoreHealth::Degraded { .. })
    }
}

/// Diagnostic snapshot of the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsReport {
    pub total_items: usize,
    pub dimension: usize,
    pub metadata_count: usize,
    pub backing_store_health: BackingStoreHealth,
    /// `false` when `total_items != metadata_count`
    pub consistent: bool,
}
