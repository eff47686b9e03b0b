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

//! Error taxonomy for the search engine and its durable backing store

use thiserror::Error;

use crate::core::types::Ordinal;

pub type SearchResult<T> = std::result::Result<T, SearchError>;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("No usable image or text signal to form an embedding")]
    NoSignal,

    #[error("Invalid embedding: {0}")]
    InvalidEmbedding(String),

    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Ordinal {ordinal} out of range (size {size})")]
    OutOfRange { ordinal: Ordinal, size: usize },

    #[error("Persistence fault: {0}")]
    Persistence(#[from] StorageError),
}

impl SearchError {
    /// Errors caused by the caller's input rather than by the engine.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            SearchError::DimensionMismatch { .. }
                | SearchError::NoSignal
                | SearchError::InvalidEmbedding(_)
                | SearchError::EmbeddingUnavailable(_)
        )
    }

    /// Stable machine-readable code used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            SearchError::DimensionMismatch { .. } => "dimension_mismatch",
            SearchError::NoSignal => "no_signal",
            SearchError::InvalidEmbedding(_) => "invalid_embedding",
            SearchError::EmbeddingUnavailable(_) => "embedding_unavailable",
            SearchError::OutOfRange { .. } => "out_of_range",
            SearchError::Persistence(_) => "persistence_fault",
        }
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Disk I/O error: {0}")]
    DiskIO(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Unsupported snapshot format version {0}")]
    UnsupportedVersion(u16),

    #[error("Snapshot dimension mismatch: expected {expected}, found {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
