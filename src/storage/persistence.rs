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

//! Durable lifecycle of the (VectorIndex, MetadataStore) pair
//!
//! Durability is provided by three cooperating mechanisms:
//! - every insert is appended to the WAL before it becomes visible,
//! - checkpoints write a full snapshot and drop the WAL segments it covers,
//! - startup loads the last snapshot and replays the WAL on top of it.
//!
//! On restart the recovered state therefore equals the state as of the last
//! insert whose WAL record reached the disk.

use chrono::Utc;
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::compute::fusion::FusionPolicy;
use crate::core::config::PersistenceConfig;
use crate::core::types::{BackingStoreHealth, Embedding, Item, Ordinal};
use crate::index::VectorIndex;
use crate::storage::metadata::MetadataStore;
use crate::storage::snapshot::Snapshot;
use crate::storage::wal::{WalConfig, WalEntry, WalManager};
use crate::storage::{Result, StorageError};

pub const SNAPSHOT_FILE: &str = "snapshot.bin";
pub const WAL_DIR: &str = "wal";

/// State reconstructed by [`PersistenceManager::load`].
#[derive(Debug)]
pub struct Recovered {
    pub index: VectorIndex,
    pub metadata: MetadataStore,
    /// Items restored from the snapshot
    pub from_snapshot: usize,
    /// Items re-applied from the WAL on top of the snapshot
    pub replayed: usize,
    /// Set when recovery had to discard data
    pub degraded: Option<String>,
}

impl Recovered {
    fn empty(dimension: usize) -> Self {
        Self {
            index: VectorIndex::new(dimension),
            metadata: MetadataStore::new(),
            from_snapshot: 0,
            replayed: 0,
            degraded: None,
        }
    }

    /// Whether a checkpoint right after startup would shrink the recovery work.
    pub fn needs_checkpoint(&self) -> bool {
        self.replayed > 0 || self.degraded.is_some()
    }
}

/// Proof that the caller holds the checkpoint serialization lock.
///
/// Overlapping checkpoints could otherwise let an older snapshot overwrite a
/// newer one after the newer one already deleted WAL segments.
pub struct CheckpointPermit<'a> {
    _guard: MutexGuard<'a, ()>,
}

/// A consistent copy of the pair plus the WAL segments it makes redundant.
#[derive(Debug)]
pub struct CheckpointTicket {
    snapshot: Snapshot,
    sealed_segments: Vec<PathBuf>,
}

impl CheckpointTicket {
    pub fn len(&self) -> usize {
        self.snapshot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.is_empty()
    }
}

/// Snapshot + WAL persistence for one data directory.
#[derive(Debug)]
pub struct PersistenceManager {
    data_dir: PathBuf,
    dimension: usize,
    fusion: FusionPolicy,
    wal: Mutex<WalManager>,
    checkpoint_lock: Mutex<()>,
    health: RwLock<BackingStoreHealth>,
    /// Data discarded during recovery; reported until the process restarts
    recovery_fault: RwLock<Option<String>>,
}

impl PersistenceManager {
    pub fn open(
        config: &PersistenceConfig,
        dimension: usize,
        fusion: FusionPolicy,
    ) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let wal = WalManager::open(WalConfig {
            wal_dir: config.data_dir.join(WAL_DIR),
            sync_writes: config.sync_writes,
        })?;

        info!(
            "Persistence opened at {:?} (dimension {}, sync_writes {})",
            config.data_dir, dimension, config.sync_writes
        );

        Ok(Self {
            data_dir: config.data_dir.clone(),
            dimension,
            fusion,
            wal: Mutex::new(wal),
            checkpoint_lock: Mutex::new(()),
            health: RwLock::new(BackingStoreHealth::Healthy),
            recovery_fault: RwLock::new(None),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join(SNAPSHOT_FILE)
    }

    pub fn health(&self) -> BackingStoreHealth {
        let health = self.health.read().clone();
        if !health.is_healthy() {
            return health;
        }
        match &*self.recovery_fault.read() {
            Some(reason) => BackingStoreHealth::Degraded {
                reason: format!("recovered with data loss: {}", reason),
            },
            None => health,
        }
    }

    /// Whether the most recent WAL append or checkpoint failed.
    pub fn has_failed_write(&self) -> bool {
        !self.health.read().is_healthy()
    }

    fn mark_healthy(&self) {
        let mut health = self.health.write();
        if !health.is_healthy() {
            info!("Backing store recovered");
        }
        *health = BackingStoreHealth::Healthy;
    }

    fn mark_degraded(&self, reason: String) {
        *self.health.write() = BackingStoreHealth::Degraded { reason };
    }

    /// Reconstruct the pair from the latest snapshot plus the WAL.
    ///
    /// Never fails: a missing snapshot is a cold start, an unreadable one is
    /// moved aside and the engine starts from whatever the WAL can rebuild.
    pub fn load(&self) -> Recovered {
        let path = self.snapshot_path();
        let mut recovered = match Snapshot::read(&path) {
            Ok(Some(snapshot)) => self.restore_snapshot(snapshot, &path),
            Ok(None) => {
                info!("No snapshot at {:?}; starting with an empty index", path);
                Recovered::empty(self.dimension)
            }
            Err(e) => {
                let reason = format!("snapshot unreadable: {}", e);
                error!(
                    "DATA LOSS: {}; starting from an empty index (file moved to {:?})",
                    reason,
                    self.quarantine(&path, "corrupt")
                );
                Recovered {
                    degraded: Some(reason),
                    ..Recovered::empty(self.dimension)
                }
            }
        };

        self.replay_wal(&mut recovered);

        *self.recovery_fault.write() = recovered.degraded.clone();
        info!(
            "Recovered {} items ({} from snapshot, {} from WAL)",
            recovered.index.len(),
            recovered.from_snapshot,
            recovered.replayed
        );
        recovered
    }

    fn restore_snapshot(&self, snapshot: Snapshot, path: &Path) -> Recovered {
        if snapshot.dimension != self.dimension {
            let err = StorageError::DimensionMismatch {
                expected: self.dimension,
                actual: snapshot.dimension,
            };
            let reason = format!("snapshot rejected: {}", err);
            error!(
                "DATA LOSS: {}; starting from an empty index (file moved to {:?})",
                reason,
                self.quarantine(path, "rejected")
            );
            return Recovered {
                degraded: Some(reason),
                ..Recovered::empty(self.dimension)
            };
        }

        if snapshot.fusion != self.fusion {
            warn!(
                "Snapshot was built with fusion weights image={} text={}, running with image={} text={}; \
                 scores between old and new items are not directly comparable",
                snapshot.fusion.image_weight(),
                snapshot.fusion.text_weight(),
                self.fusion.image_weight(),
                self.fusion.text_weight()
            );
        }

        let from_snapshot = snapshot.len();
        info!(
            "Loaded snapshot {:?} from {} with {} items",
            path, snapshot.created_at, from_snapshot
        );
        let (index, metadata) = snapshot.into_parts();
        Recovered {
            index,
            metadata,
            from_snapshot,
            replayed: 0,
            degraded: None,
        }
    }

    /// Move an unusable snapshot out of the way so the next checkpoint does
    /// not overwrite the only copy of the data.
    fn quarantine(&self, path: &Path, label: &str) -> Option<PathBuf> {
        let target = path.with_file_name(format!(
            "{}.{}-{}",
            SNAPSHOT_FILE,
            label,
            Utc::now().format("%Y%m%dT%H%M%S%.3f")
        ));
        match std::fs::rename(path, &target) {
            Ok(()) => Some(target),
            Err(e) => {
                error!("Failed to move snapshot {:?} aside: {}", path, e);
                None
            }
        }
    }

    fn replay_wal(&self, recovered: &mut Recovered) {
        let read = self.wal.lock().read_all();
        let replay = match read {
            Ok(replay) => replay,
            Err(e) => {
                let reason = format!("WAL unreadable: {}", e);
                error!("DATA LOSS: {}; inserts since the last snapshot are lost", reason);
                recovered.degraded.get_or_insert(reason);
                self.preserve_wal();
                return;
            }
        };

        if replay.torn_tail {
            warn!("WAL ends in a partially written record; recovering up to the last complete insert");
        }

        // A failed append can leave a complete record behind that was never
        // applied; the retry under the same ordinal comes later in the log.
        let last_position: HashMap<u64, usize> = replay
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (entry.ordinal(), position))
            .collect();

        let mut discarded = 0usize;
        for (position, entry) in replay.entries.into_iter().enumerate() {
            if last_position.get(&entry.ordinal()) != Some(&position) {
                debug!("Skipping superseded WAL record for ordinal {}", entry.ordinal());
                continue;
            }
            let WalEntry::Insert {
                ordinal,
                embedding,
                item,
                ..
            } = entry;
            let ordinal = ordinal as Ordinal;
            let expected = recovered.index.len();

            if ordinal < expected {
                // Already covered by the snapshot
                continue;
            }
            if ordinal > expected {
                discarded += 1;
                continue;
            }

            let applied = Embedding::from_unit(embedding)
                .map_err(|e| e.to_string())
                .and_then(|embedding| {
                    recovered
                        .index
                        .add(&embedding)
                        .map_err(|e| e.to_string())
                });
            match applied {
                Ok(_) => {
                    recovered.metadata.append(item);
                    recovered.replayed += 1;
                }
                Err(reason) => {
                    error!("Stopping WAL replay at ordinal {}: {}", ordinal, reason);
                    discarded += 1;
                }
            }
        }

        if discarded > 0 {
            let reason = format!(
                "{} WAL records do not follow the recovered state and were discarded",
                discarded
            );
            error!("DATA LOSS: {}", reason);
            recovered.degraded.get_or_insert(reason);
            self.preserve_wal();
        }
    }

    /// Copy the WAL aside before the post-recovery checkpoint deletes the
    /// segments holding records that could not be applied.
    fn preserve_wal(&self) -> Option<PathBuf> {
        let target = self.data_dir.join(format!(
            "{}.rejected-{}",
            WAL_DIR,
            Utc::now().format("%Y%m%dT%H%M%S%.3f")
        ));
        match self.wal.lock().preserve_segments(&target) {
            Ok(copied) => {
                warn!("Copied {} WAL segments to {:?} for manual recovery", copied, target);
                Some(target)
            }
            Err(e) => {
                error!("Failed to copy WAL segments to {:?}: {}", target, e);
                None
            }
        }
    }

    /// Make an insert durable. Must be called while the caller holds
    /// exclusive access to the pair, before the insert becomes visible.
    pub fn log_insert(&self, ordinal: Ordinal, embedding: &Embedding, item: &Item) -> Result<()> {
        let entry = WalEntry::insert(ordinal, embedding.as_slice(), item);
        match self.wal.lock().append(&entry) {
            Ok(_) => Ok(()),
            Err(e) => {
                error!("WAL append failed for ordinal {}: {}", ordinal, e);
                self.mark_degraded(format!("WAL append failed: {}", e));
                Err(e)
            }
        }
    }

    pub fn acquire_checkpoint(&self) -> CheckpointPermit<'_> {
        CheckpointPermit {
            _guard: self.checkpoint_lock.lock(),
        }
    }

    /// First checkpoint phase, run under exclusive access to the pair: copy it
    /// and seal the WAL so later inserts land in a fresh segment.
    pub fn begin_checkpoint(
        &self,
        _permit: &CheckpointPermit<'_>,
        index: &VectorIndex,
        metadata: &MetadataStore,
    ) -> Result<CheckpointTicket> {
        let snapshot = Snapshot::capture(index, metadata, self.fusion);
        let sealed_segments = self.wal.lock().seal().map_err(|e| {
            self.mark_degraded(format!("WAL seal failed: {}", e));
            e
        })?;
        Ok(CheckpointTicket {
            snapshot,
            sealed_segments,
        })
    }

    /// Second checkpoint phase, run without holding the pair: write the
    /// snapshot and drop the sealed WAL segments it covers. On failure the
    /// previous snapshot and every segment stay in place.
    pub fn complete_checkpoint(
        &self,
        _permit: &CheckpointPermit<'_>,
        ticket: CheckpointTicket,
    ) -> Result<usize> {
        let path = self.snapshot_path();
        if let Err(e) = ticket.snapshot.write_atomic(&path) {
            error!("Checkpoint failed, previous snapshot kept: {}", e);
            self.mark_degraded(format!("checkpoint failed: {}", e));
            return Err(e);
        }

        self.wal.lock().remove_sealed(&ticket.sealed_segments);
        self.mark_healthy();
        info!("Checkpoint complete: {} items", ticket.snapshot.len());
        Ok(ticket.snapshot.len())
    }

    /// Write a snapshot of the pair synchronously.
    pub fn save(&self, index: &VectorIndex, metadata: &MetadataStore) -> Result<usize> {
        let permit = self.acquire_checkpoint();
        let ticket = self.begin_checkpoint(&permit, index, metadata)?;
        self.complete_checkpoint(&permit, ticket)
    }
}
