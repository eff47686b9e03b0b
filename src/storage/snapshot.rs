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

//! Versioned snapshot container for the (VectorIndex, MetadataStore) pair
//!
//! Layout: magic `PXLS`, `u16` format version, `u32` CRC32 of the payload,
//! `u64` payload length, then the bincode payload. Both halves of the pair
//! live in one container, so a reader sees either the whole snapshot or
//! nothing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::compute::distance::l2_norm;
use crate::compute::fusion::FusionPolicy;
use crate::core::types::{Item, UNIT_NORM_TOLERANCE};
use crate::index::VectorIndex;
use crate::storage::metadata::MetadataStore;
use crate::storage::{Result, StorageError};

pub const SNAPSHOT_MAGIC: &[u8; 4] = b"PXLS";
pub const SNAPSHOT_FORMAT_VERSION: u16 = 1;

const HEADER_LEN: usize = 4 + 2 + 4 + 8;

/// Format version 1 payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub dimension: usize,
    /// Fusion weights the stored embeddings were produced with
    pub fusion: FusionPolicy,
    pub created_at: DateTime<Utc>,
    /// Row-major embeddings, `items.len() * dimension` floats
    pub embeddings: Vec<f32>,
    pub items: Vec<Item>,
}

impl Snapshot {
    /// Copy the pair. Callers hold at least shared access to both halves so
    /// that they describe the same instant.
    pub fn capture(index: &VectorIndex, metadata: &MetadataStore, fusion: FusionPolicy) -> Self {
        Self {
            dimension: index.dimension(),
            fusion,
            created_at: Utc::now(),
            embeddings: index.as_raw().to_vec(),
            items: metadata.iter().cloned().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(StorageError::Corruption("snapshot dimension is zero".to_string()));
        }
        let expected = self.items.len().checked_mul(self.dimension);
        if expected != Some(self.embeddings.len()) {
            return Err(StorageError::Corruption(format!(
                "snapshot halves disagree: {} items but {} floats at dimension {}",
                self.items.len(),
                self.embeddings.len(),
                self.dimension
            )));
        }
        if let Some(pos) = self.embeddings.iter().position(|v| !v.is_finite()) {
            return Err(StorageError::Corruption(format!(
                "non-finite embedding component at offset {}",
                pos
            )));
        }
        Ok(())
    }

    /// Split into the live pair, re-normalizing rows that drifted off unit norm.
    pub fn into_parts(mut self) -> (VectorIndex, MetadataStore) {
        let mut renormalized = 0usize;
        for row in self.embeddings.chunks_exact_mut(self.dimension) {
            let norm = l2_norm(row);
            if (norm - 1.0).abs() >= UNIT_NORM_TOLERANCE && norm > 0.0 {
                row.iter_mut().for_each(|v| *v /= norm);
                renormalized += 1;
            }
        }
        if renormalized > 0 {
            warn!("Re-normalized {} snapshot embeddings that drifted off unit norm", renormalized);
        }

        (
            VectorIndex::from_raw_parts(self.dimension, self.embeddings),
            MetadataStore::from_items(self.items),
        )
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let payload = bincode::serialize(self)?;

        let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
        buf.extend_from_slice(SNAPSHOT_MAGIC);
        buf.extend_from_slice(&SNAPSHOT_FORMAT_VERSION.to_le_bytes());
        buf.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        buf.extend_from_slice(&(payload.len() as u64).to_le_bytes());
        buf.extend_from_slice(&payload);
        Ok(buf)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(StorageError::Corruption(format!(
                "snapshot truncated: {} bytes",
                bytes.len()
            )));
        }
        if &bytes[0..4] != SNAPSHOT_MAGIC {
            return Err(StorageError::Corruption("bad snapshot magic".to_string()));
        }

        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        let checksum = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]);
        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&bytes[10..18]);
        let payload_len = u64::from_le_bytes(len_bytes);

        let payload = &bytes[HEADER_LEN..];
        if payload.len() as u64 != payload_len {
            return Err(StorageError::Corruption(format!(
                "snapshot payload length {} does not match header {}",
                payload.len(),
                payload_len
            )));
        }
        if crc32fast::hash(payload) != checksum {
            return Err(StorageError::Corruption("snapshot checksum mismatch".to_string()));
        }

        // Older payload layouts get decoded and migrated here
        let snapshot: Snapshot = match version {
            1 => bincode::deserialize(payload)?,
            other => return Err(StorageError::UnsupportedVersion(other)),
        };
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Read the snapshot at `path`; `Ok(None)` when there is none yet.
    pub fn read(path: &Path) -> Result<Option<Self>> {
        match std::fs::read(path) {
            Ok(bytes) => Self::decode(&bytes).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the snapshot at `path` atomically: write a temporary sibling,
    /// fsync it, rename it over the target and fsync the directory.
    pub fn write_atomic(&self, path: &Path) -> Result<u64> {
        let bytes = self.encode()?;
        let tmp_path = temp_path(path);

        let write = || -> std::io::Result<()> {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
            drop(file);
            std::fs::rename(&tmp_path, path)?;
            sync_parent_dir(path)
        };

        if let Err(e) = write() {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        debug!(
            "Wrote snapshot {:?}: {} items, {} bytes",
            path,
            self.items.len(),
            bytes.len()
        );
        Ok(bytes.len() as u64)
    }
}

pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => File::open(parent)?.sync_all(),
        _ => Ok(()),
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
