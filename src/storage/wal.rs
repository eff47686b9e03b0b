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

//! Write-Ahead Log (WAL) of inserts for durability between checkpoints
//!
//! Each record is framed as `u32` little-endian length, bincode payload and a
//! `u32` CRC32 of the payload. Segments are named `wal_{sequence:010}.log`;
//! a new segment is opened on every start and on every checkpoint so that
//! sealed segments can be deleted once a snapshot covers them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

use crate::core::types::{Item, Ordinal};
use crate::storage::{Result, StorageError};

const SEGMENT_PREFIX: &str = "wal_";
const SEGMENT_SUFFIX: &str = ".log";

/// Framing overhead per record: length prefix + trailing checksum
const FRAME_OVERHEAD: usize = 8;

/// WAL entry types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WalEntry {
    /// One paired (embedding, item) append. The ordinal doubles as the
    /// sequence number of the log.
    Insert {
        ordinal: u64,
        embedding: Vec<f32>,
        item: Item,
        timestamp: DateTime<Utc>,
    },
}

impl WalEntry {
    pub fn insert(ordinal: Ordinal, embedding: &[f32], item: &Item) -> Self {
        WalEntry::Insert {
            ordinal: ordinal as u64,
            embedding: embedding.to_vec(),
            item: item.clone(),
            timestamp: Utc::now(),
        }
    }

    pub fn ordinal(&self) -> u64 {
        match self {
            WalEntry::Insert { ordinal, .. } => *ordinal,
        }
    }
}

/// WAL configuration
#[derive(Debug, Clone)]
pub struct WalConfig {
    /// Directory to store WAL files
    pub wal_dir: PathBuf,
    /// fsync after every append
    pub sync_writes: bool,
}

/// Entries recovered from all segments, in log order.
#[derive(Debug, Default)]
pub struct WalReplay {
    pub entries: Vec<WalEntry>,
    /// A segment ended in a partial or checksum-failing record
    pub torn_tail: bool,
}

/// WAL segment file
#[derive(Debug)]
struct WalSegment {
    path: PathBuf,
    file: File,
    size: u64,
    /// A failed append left bytes past `size` that could not be truncated.
    /// Anything appended after them would be unreachable on replay.
    damaged: bool,
}

impl WalSegment {
    fn create(path: PathBuf) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            path,
            file,
            size,
            damaged: false,
        })
    }

    fn append(&mut self, entry: &WalEntry, sync: bool) -> Result<u64> {
        if self.damaged {
            return Err(StorageError::Corruption(format!(
                "WAL segment {:?} ends in a torn record; appends resume after the next checkpoint",
                self.path
            )));
        }

        let serialized = bincode::serialize(entry)?;

        let mut frame = Vec::with_capacity(serialized.len() + FRAME_OVERHEAD);
        frame.extend_from_slice(&(serialized.len() as u32).to_le_bytes());
        frame.extend_from_slice(&serialized);
        frame.extend_from_slice(&crc32fast::hash(&serialized).to_le_bytes());

        if let Err(e) = self.write_frame(&frame, sync) {
            // Drop whatever part of the frame reached the file so later
            // appends stay readable
            if let Err(trunc) = self.file.set_len(self.size) {
                error!(
                    "Failed to truncate torn WAL record in {:?}: {}; rejecting appends until the segment is sealed",
                    self.path, trunc
                );
                self.damaged = true;
            }
            return Err(e.into());
        }

        self.size += frame.len() as u64;
        Ok(self.size)
    }

    fn write_frame(&mut self, frame: &[u8], sync: bool) -> std::io::Result<()> {
        self.file.write_all(frame)?;
        self.file.flush()?;
        if sync {
            self.file.sync_data()?;
        }
        Ok(())
    }
}

/// Parse every complete record of one segment. Stops at the first partial or
/// corrupted record and reports it as a torn tail.
fn read_segment(path: &Path) -> Result<(Vec<WalEntry>, bool)> {
    let data = std::fs::read(path)?;
    let mut entries = Vec::new();
    let mut offset = 0usize;

    while offset < data.len() {
        let Some(len_bytes) = data.get(offset..offset + 4) else {
            return Ok((entries, true));
        };
        let entry_len = u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]])
            as usize;

        let body_start = offset + 4;
        let body_end = body_start + entry_len;
        let (Some(body), Some(crc_bytes)) = (
            data.get(body_start..body_end),
            data.get(body_end..body_end + 4),
        ) else {
            return Ok((entries, true));
        };

        let stored = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
        if stored != crc32fast::hash(body) {
            warn!("WAL checksum mismatch in {:?} at offset {}", path, offset);
            return Ok((entries, true));
        }

        match bincode::deserialize::<WalEntry>(body) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                warn!("Undecodable WAL record in {:?} at offset {}: {}", path, offset, e);
                return Ok((entries, true));
            }
        }
        offset = body_end + 4;
    }

    Ok((entries, false))
}

fn segment_sequence(path: &Path) -> Option<u64> {
    let name = path.file_name()?.to_str()?;
    name.strip_prefix(SEGMENT_PREFIX)?
        .strip_suffix(SEGMENT_SUFFIX)?
        .parse()
        .ok()
}

/// Write-Ahead Log manager
#[derive(Debug)]
pub struct WalManager {
    config: WalConfig,
    current: WalSegment,
    current_sequence: u64,
    /// Older segments, ascending by sequence
    sealed: Vec<PathBuf>,
}

impl WalManager {
    pub fn open(config: WalConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.wal_dir)?;

        let mut existing: Vec<(u64, PathBuf)> = Vec::new();
        for entry in std::fs::read_dir(&config.wal_dir)? {
            let path = entry?.path();
            if let Some(seq) = segment_sequence(&path) {
                existing.push((seq, path));
            }
        }
        existing.sort();

        let current_sequence = existing.last().map(|(seq, _)| seq + 1).unwrap_or(1);
        let current = WalSegment::create(Self::segment_path(&config.wal_dir, current_sequence))?;
        debug!(
            "Opened WAL segment {:?} ({} existing segments)",
            current.path,
            existing.len()
        );

        Ok(Self {
            config,
            current,
            current_sequence,
            sealed: existing.into_iter().map(|(_, path)| path).collect(),
        })
    }

    fn segment_path(dir: &Path, sequence: u64) -> PathBuf {
        dir.join(format!("{}{:010}{}", SEGMENT_PREFIX, sequence, SEGMENT_SUFFIX))
    }

    /// Append an entry to the current segment; returns the segment size.
    pub fn append(&mut self, entry: &WalEntry) -> Result<u64> {
        self.current.append(entry, self.config.sync_writes)
    }

    /// Whether appends are refused until the next [`WalManager::seal`].
    pub fn is_damaged(&self) -> bool {
        self.current.damaged
    }

    /// Close the current segment and start a new one. Returns every sealed
    /// segment; all of them are covered by a snapshot taken at this instant.
    pub fn seal(&mut self) -> Result<Vec<PathBuf>> {
        let next_sequence = self.current_sequence + 1;
        let next = WalSegment::create(Self::segment_path(&self.config.wal_dir, next_sequence))?;

        let previous = std::mem::replace(&mut self.current, next);
        self.current_sequence = next_sequence;
        self.sealed.push(previous.path);

        Ok(self.sealed.clone())
    }

    /// Delete sealed segments once a snapshot makes them redundant.
    pub fn remove_sealed(&mut self, segments: &[PathBuf]) {
        for path in segments {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove old WAL segment {:?}: {}", path, e),
            }
        }
        self.sealed.retain(|path| !segments.contains(path));
    }

    /// Read all entries from all WAL segments, oldest first
    pub fn read_all(&self) -> Result<WalReplay> {
        let mut replay = WalReplay::default();
        for path in self.sealed.iter().chain(std::iter::once(&self.current.path)) {
            let (entries, torn) = read_segment(path).map_err(|e| match e {
                StorageError::DiskIO(io) => StorageError::DiskIO(std::io::Error::new(
                    io.kind(),
                    format!("{:?}: {}", path, io),
                )),
                other => other,
            })?;
            replay.entries.extend(entries);
            replay.torn_tail |= torn;
        }
        Ok(replay)
    }

    /// Copy every non-empty segment into `target` so a later checkpoint
    /// cannot delete records that recovery failed to apply.
    pub fn preserve_segments(&self, target: &Path) -> Result<usize> {
        std::fs::create_dir_all(target)?;
        let mut copied = 0;
        for path in self.sealed.iter().chain(std::iter::once(&self.current.path)) {
            let Some(name) = path.file_name() else {
                continue;
            };
            if std::fs::metadata(path)?.len() == 0 {
                continue;
            }
            std::fs::copy(path, target.join(name))?;
            copied += 1;
        }
        Ok(copied)
    }

    pub fn segment_count(&self) -> usize {
        self.sealed.len() + 1
    }
}
