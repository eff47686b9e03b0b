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


//! Engine services: the shared search aggregate, its background
//! checkpointer and the embedding boundary.

pub mod checkpoint;
pub mod embedder;
pub mod search_coordinator;

pub use checkpoint::Checkpointer;
pub use embedder::{Embedder, HttpEmbedder};
pub use search_coordinator::{SearchCoordinator, SearchLimits};
