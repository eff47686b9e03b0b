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

//! Exact flat vector index
//!
//! Append-only, row-major storage of unit-norm embeddings searched by brute
//! force inner product. A search costs O(n * D); exactness is preferred over
//! sub-linear approximate structures.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::compute::distance::dot_product;
use crate::core::error::{SearchError, SearchResult};
use crate::core::types::{Embedding, Ordinal, SearchHit};

/// Flat inner-product index over embeddings of a fixed dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    dimension: usize,
    /// `len() * dimension` floats, one row per ordinal
    data: Vec<f32>,
}

impl VectorIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    pub fn with_capacity(dimension: usize, capacity: usize) -> Self {
        Self {
            dimension,
            data: Vec::with_capacity(dimension.saturating_mul(capacity)),
        }
    }

    /// Rebuild from row-major data. Callers guarantee that `data.len()` is a
    /// multiple of `dimension` and that every row is unit-norm.
    pub(crate) fn from_raw_parts(dimension: usize, data: Vec<f32>) -> Self {
        debug_assert!(dimension > 0 && data.len() % dimension == 0);
        Self { dimension, data }
    }

    pub(crate) fn as_raw(&self) -> &[f32] {
        &self.data
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn check_dimension(&self, actual: usize) -> SearchResult<()> {
        if actual != self.dimension {
            return Err(SearchError::DimensionMismatch {
                expected: self.dimension,
                actual,
            });
        }
        Ok(())
    }

    /// Append an embedding and return its ordinal (the size before the append).
    pub fn add(&mut self, embedding: &Embedding) -> SearchResult<Ordinal> {
        self.check_dimension(embedding.dimension())?;
        let ordinal = self.len();
        self.data.extend_from_slice(embedding.as_slice());
        Ok(ordinal)
    }

    /// Stored vector for an ordinal.
    pub fn get(&self, ordinal: Ordinal) -> SearchResult<&[f32]> {
        let size = self.len();
        if ordinal >= size {
            return Err(SearchError::OutOfRange { ordinal, size });
        }
        let start = ordinal * self.dimension;
        Ok(&self.data[start..start + self.dimension])
    }

    /// Rows in ordinal order.
    pub fn iter(&self) -> impl Iterator<Item = &[f32]> + '_ {
        self.data.chunks_exact(self.dimension.max(1))
    }

    /// Drop every entry at or after `len`. Only used to undo a paired append
    /// whose metadata half failed.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.data.truncate(len.saturating_mul(self.dimension));
    }

    /// Exact top-k by inner product.
    ///
    /// Results are ordered by descending score; equal scores keep the lower
    /// ordinal first. Returns at most `min(k, len())` hits and an empty vector
    /// for an empty index or `k == 0`.
    pub fn search(&self, query: &Embedding, k: usize) -> SearchResult<Vec<SearchHit>> {
        self.check_dimension(query.dimension())?;

        let limit = k.min(self.len());
        if limit == 0 {
            return Ok(Vec::new());
        }

        let query = query.as_slice();
        let mut heap: BinaryHeap<Reverse<RankedHit>> = BinaryHeap::with_capacity(limit + 1);
        for (ordinal, row) in self.iter().enumerate() {
            heap.push(Reverse(RankedHit {
                score: dot_product(row, query),
                ordinal,
            }));
            if heap.len() > limit {
                // Evicts the currently worst candidate
                heap.pop();
            }
        }

        // Ascending order of Reverse(..) is best-first
        Ok(heap
            .into_sorted_vec()
            .into_iter()
            .map(|Reverse(hit)| SearchHit {
                ordinal: hit.ordinal,
                score: hit.score,
            })
            .collect())
    }
}

/// Heap entry ordered so that "greater" means "ranks higher": larger score,
/// then smaller ordinal.
#[derive(Debug, Clone, Copy)]
struct RankedHit {
    score: f32,
    ordinal: Ordinal,
}

impl PartialEq for RankedHit {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RankedHit {}

impl PartialOrd for RankedHit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RankedHit {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.ordinal.cmp(&self.ordinal))
    }
}

/// Sort hits best-first with the same rule the index uses.
pub fn sort_hits(hits: &mut [SearchHit]) {
    hits.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.ordinal.cmp(&b.ordinal))
    });
}
