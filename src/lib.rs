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


//! # ProximaLens - Multimodal Similarity Search
//!
//! ProximaLens indexes items described by an image and optional text and
//! answers "what looks like this?" queries over them.
//!
//! ## Architecture
//!
//! - **Fusion**: image and text embeddings are combined into one unit-norm
//!   vector with a fixed weighting ([`FusionPolicy::DEFAULT`])
//! - **Index**: exact brute-force inner-product search ([`VectorIndex`])
//! - **Metadata**: item records aligned 1:1 with index ordinals
//! - **Persistence**: write-ahead log plus atomic, versioned snapshots
//! - **Coordinator**: the lock-guarded aggregate every request goes through
//!   ([`SearchCoordinator`])
//!
//! ```no_run
//! use proximalens::{Embedding, FusionPolicy, Item, SearchCoordinator, SearchLimits};
//!
//! let engine = SearchCoordinator::in_memory(2, FusionPolicy::DEFAULT, SearchLimits::default());
//! let image = Embedding::new(vec![1.0, 0.0])?;
//! engine.ingest(Item::new("http://img/shoe.png", "red shoe"), Some(&image), None)?;
//! let ranked = engine.search(Some(&image), None, 5)?;
//! assert_eq!(ranked.results[0].description, "red shoe");
//! # Ok::<(), proximalens::SearchError>(())
//! ```

pub mod api;
pub mod compute;
pub mod core;
pub mod index;
pub mod server;
pub mod services;
pub mod storage;

pub use crate::core::*;
pub use compute::FusionPolicy;
pub use index::VectorIndex;
pub use services::{Embedder, HttpEmbedder, SearchCoordinator, SearchLimits};
pub use storage::{MetadataStore, PersistenceManager};
