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


pub mod metadata;
pub mod persistence;
pub mod snapshot;
pub mod wal;

pub use metadata::MetadataStore;
pub use persistence::{CheckpointPermit, CheckpointTicket, PersistenceManager, Recovered};
pub use snapshot::Snapshot;
pub use wal::{WalConfig, WalEntry, WalManager};
pub use crate::core::StorageError;

pub type Result<T> = std::result::Result<T, StorageError>;
