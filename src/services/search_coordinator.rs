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


//! Search Coordinator - the engine's single shared aggregate
//!
//! Owns the (VectorIndex, MetadataStore) pair behind one reader/writer lock:
//! ingestion takes the write side for its paired append, searches share the
//! read side and may run in parallel. Persistence, when enabled, is driven
//! from here so the WAL append happens inside the same critical section.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::futures::Notified;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::compute::fusion::FusionPolicy;
use crate::core::config::{Config, IndexConfig};
use crate::core::error::{SearchError, SearchResult};
use crate::core::types::{
    BackingStoreHealth, Embedding, IngestReceipt, Item, Ordinal, RankedResults, SearchHit,
    StatsReport,
};
use crate::index::{sort_hits, VectorIndex};
use crate::storage::{MetadataStore, PersistenceManager, Recovered};

/// Candidate breadth versus advertised result count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchLimits {
    /// Ordinals scanned out of the index per query, at least `k`
    pub breadth: usize,
    /// Maximum number of results handed back to a caller
    pub result_limit: usize,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            breadth: 10,
            result_limit: 5,
        }
    }
}

impl From<&IndexConfig> for SearchLimits {
    fn from(config: &IndexConfig) -> Self {
        Self {
            breadth: config.search_breadth,
            result_limit: config.result_limit,
        }
    }
}

/// The lock-guarded pair. Lengths are equal whenever the lock is released.
#[derive(Debug)]
struct Catalog {
    index: VectorIndex,
    metadata: MetadataStore,
}

impl Catalog {
    /// Restore equal lengths if the halves ever drifted apart.
    fn realign(&mut self) {
        let (vectors, items) = (self.index.len(), self.metadata.len());
        if vectors != items {
            let aligned = vectors.min(items);
            error!(
                "Consistency fault: {} vectors vs {} items; truncating both to {}",
                vectors, items, aligned
            );
            self.index.truncate(aligned);
            self.metadata.truncate(aligned);
        }
    }

    fn append(&mut self, embedding: &Embedding, item: Item) -> SearchResult<Ordinal> {
        // The fallible half goes first so a failure leaves nothing to undo
        let ordinal = self.index.add(embedding)?;
        let paired = self.metadata.append(item);
        debug_assert_eq!(ordinal, paired);
        Ok(ordinal)
    }
}

pub struct SearchCoordinator {
    catalog: RwLock<Catalog>,
    fusion: FusionPolicy,
    limits: SearchLimits,
    persistence: Option<PersistenceManager>,
    checkpoint_every_inserts: u64,
    inserts_since_checkpoint: AtomicU64,
    checkpoint_wanted: Notify,
}

impl SearchCoordinator {
    /// A volatile engine; nothing survives the process.
    pub fn in_memory(dimension: usize, fusion: FusionPolicy, limits: SearchLimits) -> Self {
        Self::assemble(
            VectorIndex::new(dimension),
            MetadataStore::new(),
            fusion,
            limits,
            None,
            0,
        )
    }

    /// Wrap state recovered by `persistence`. Takes a checkpoint right away
    /// when recovery replayed WAL records or had to discard data.
    pub fn with_persistence(
        recovered: Recovered,
        persistence: PersistenceManager,
        fusion: FusionPolicy,
        limits: SearchLimits,
        checkpoint_every_inserts: u64,
    ) -> Self {
        let needs_checkpoint = recovered.needs_checkpoint();
        let coordinator = Self::assemble(
            recovered.index,
            recovered.metadata,
            fusion,
            limits,
            Some(persistence),
            checkpoint_every_inserts,
        );

        if needs_checkpoint {
            if let Err(e) = coordinator.checkpoint() {
                warn!("Post-recovery checkpoint failed: {}", e);
            }
        }
        coordinator
    }

    /// Build the engine described by `config`, recovering persisted state
    /// when persistence is enabled.
    pub fn open(config: &Config) -> SearchResult<Self> {
        let fusion = FusionPolicy::try_from(config.fusion)?;
        let limits = SearchLimits::from(&config.index);
        let dimension = config.index.dimension;

        if !config.persistence.enabled {
            warn!("Persistence disabled; the index lives in memory only");
            return Ok(Self::in_memory(dimension, fusion, limits));
        }

        let persistence = PersistenceManager::open(&config.persistence, dimension, fusion)?;
        let recovered = persistence.load();
        Ok(Self::with_persistence(
            recovered,
            persistence,
            fusion,
            limits,
            config.persistence.checkpoint_every_inserts,
        ))
    }

    fn assemble(
        index: VectorIndex,
        metadata: MetadataStore,
        fusion: FusionPolicy,
        limits: SearchLimits,
        persistence: Option<PersistenceManager>,
        checkpoint_every_inserts: u64,
    ) -> Self {
        let mut catalog = Catalog { index, metadata };
        catalog.realign();
        Self {
            catalog: RwLock::new(catalog),
            fusion,
            limits,
            persistence,
            checkpoint_every_inserts,
            inserts_since_checkpoint: AtomicU64::new(0),
            checkpoint_wanted: Notify::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.catalog.read().index.dimension()
    }

    pub fn len(&self) -> usize {
        self.catalog.read().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn fusion(&self) -> FusionPolicy {
        self.fusion
    }

    pub fn limits(&self) -> SearchLimits {
        self.limits
    }

    pub fn is_persistent(&self) -> bool {
        self.persistence.is_some()
    }

    /// Resolves once enough inserts accumulated to warrant a checkpoint.
    pub fn checkpoint_requested(&self) -> Notified<'_> {
        self.checkpoint_wanted.notified()
    }

    /// Fuse the signals and append the item as one atomic unit.
    pub fn ingest(
        &self,
        item: Item,
        image: Option<&Embedding>,
        text: Option<&Embedding>,
    ) -> SearchResult<IngestReceipt> {
        let embedding = self.fusion.fuse(image, text)?;

        let receipt = {
            let mut catalog = self.catalog.write();
            let expected = catalog.index.dimension();
            if embedding.dimension() != expected {
                return Err(SearchError::DimensionMismatch {
                    expected,
                    actual: embedding.dimension(),
                });
            }

            catalog.realign();
            if let Some(persistence) = &self.persistence {
                if let Err(e) = persistence.log_insert(catalog.index.len(), &embedding, &item) {
                    // A checkpoint seals the segment the append failed on
                    self.checkpoint_wanted.notify_one();
                    return Err(e.into());
                }
            }

            let ordinal = catalog.append(&embedding, item)?;
            IngestReceipt {
                ordinal,
                total_items: catalog.index.len(),
            }
        };

        debug!(
            "Ingested ordinal {} ({} items)",
            receipt.ordinal, receipt.total_items
        );

        if self.persistence.is_some() {
            let pending = self.inserts_since_checkpoint.fetch_add(1, Ordering::Relaxed) + 1;
            if self.checkpoint_every_inserts > 0 && pending >= self.checkpoint_every_inserts {
                self.checkpoint_wanted.notify_one();
            }
        }
        Ok(receipt)
    }

    /// Ranked items most similar to the fused query.
    ///
    /// Scans `max(k, breadth)` candidates and returns at most
    /// `min(k, result_limit)` of them. Ordinals without metadata are skipped.
    pub fn search(
        &self,
        image: Option<&Embedding>,
        text: Option<&Embedding>,
        k: usize,
    ) -> SearchResult<RankedResults> {
        let query = self.fusion.fuse(image, text)?;
        let limit = k.min(self.limits.result_limit);
        let breadth = k.max(self.limits.breadth);

        let catalog = self.catalog.read();
        let candidates = catalog.index.search(&query, breadth)?;

        let mut joined: Vec<(SearchHit, &Item)> = Vec::with_capacity(candidates.len());
        for hit in candidates {
            match catalog.metadata.get(hit.ordinal) {
                Ok(item) => joined.push((hit, item)),
                Err(e) => warn!("Consistency fault: dropping search candidate: {}", e),
            }
        }

        let mut hits: Vec<SearchHit> = joined.iter().map(|(hit, _)| *hit).collect();
        sort_hits(&mut hits);
        hits.truncate(limit);

        let mut results = RankedResults {
            results: Vec::with_capacity(hits.len()),
            scores: Vec::with_capacity(hits.len()),
            total_items: catalog.index.len(),
        };
        for hit in hits {
            if let Some((_, item)) = joined.iter().find(|(h, _)| h.ordinal == hit.ordinal) {
                results.results.push((*item).clone());
                results.scores.push(hit.score);
            }
        }
        Ok(results)
    }

    /// Item stored under `ordinal`.
    pub fn item(&self, ordinal: Ordinal) -> SearchResult<Item> {
        self.catalog.read().metadata.get(ordinal).cloned()
    }

    /// Stored (unit-norm) embedding under `ordinal`.
    pub fn embedding(&self, ordinal: Ordinal) -> SearchResult<Vec<f32>> {
        self.catalog.read().index.get(ordinal).map(|row| row.to_vec())
    }

    pub fn stats(&self) -> StatsReport {
        let (total_items, dimension, metadata_count) = {
            let catalog = self.catalog.read();
            (
                catalog.index.len(),
                catalog.index.dimension(),
                catalog.metadata.len(),
            )
        };

        let consistent = total_items == metadata_count;
        if !consistent {
            error!(
                "Consistency fault: {} vectors vs {} items",
                total_items, metadata_count
            );
        }

        StatsReport {
            total_items,
            dimension,
            metadata_count,
            backing_store_health: self
                .persistence
                .as_ref()
                .map(|p| p.health())
                .unwrap_or(BackingStoreHealth::InMemory),
            consistent,
        }
    }

    /// Snapshot the pair and drop the WAL it covers. Returns the number of
    /// items written, or `None` when persistence is disabled.
    ///
    /// Mutation is blocked only while the pair is copied; the disk write
    /// happens after the lock is released.
    pub fn checkpoint(&self) -> SearchResult<Option<usize>> {
        let Some(persistence) = &self.persistence else {
            return Ok(None);
        };

        let permit = persistence.acquire_checkpoint();
        let ticket = {
            let catalog = self.catalog.write();
            self.inserts_since_checkpoint.store(0, Ordering::Relaxed);
            persistence.begin_checkpoint(&permit, &catalog.index, &catalog.metadata)?
        };
        let written = persistence.complete_checkpoint(&permit, ticket)?;
        Ok(Some(written))
    }

    /// Like [`checkpoint`](Self::checkpoint), but skipped when nothing was
    /// inserted since the last checkpoint and the last write succeeded.
    pub fn checkpoint_if_dirty(&self) -> SearchResult<Option<usize>> {
        let Some(persistence) = &self.persistence else {
            return Ok(None);
        };
        if self.inserts_since_checkpoint.load(Ordering::Relaxed) == 0
            && !persistence.has_failed_write()
        {
            return Ok(None);
        }
        self.checkpoint()
    }

    /// Flush everything to the backing store.
    pub fn shutdown(&self) -> SearchResult<()> {
        match self.checkpoint()? {
            Some(written) => info!("Final checkpoint wrote {} items", written),
            None => info!("Shutting down in-memory index ({} items discarded)", self.len()),
        }
        Ok(())
    }
}

impl std::fmt::Debug for SearchCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchCoordinator")
            .field("fusion", &self.fusion)
            .field("limits", &self.limits)
            .field("persistent", &self.persistence.is_some())
            .finish()
    }
}
