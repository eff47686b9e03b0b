//! Durability across restarts: snapshots, WAL replay and degraded recovery

use super::common::*;
use anyhow::Result;
use proximalens::*;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[cfg(test)]
mod persistence_tests {
    use super::*;

    fn ingest_all(engine: &SearchCoordinator, embeddings: &[Embedding], offset: usize) -> Result<()> {
        for (i, embedding) in embeddings.iter().enumerate() {
            engine.ingest(
                Item::new(format!("img{}", offset + i), format!("item {}", offset + i)),
                Some(embedding),
                None,
            )?;
        }
        Ok(())
    }

    fn latest_wal_segment(data_dir: &Path) -> PathBuf {
        let mut segments: Vec<PathBuf> = std::fs::read_dir(data_dir.join("wal"))
            .unwrap()
            .filter_map(|e| e.ok().map(|e| e.path()))
            .collect();
        segments.sort();
        segments.pop().unwrap()
    }

    #[test]
    fn test_shutdown_then_restart_round_trip() -> Result<()> {
        init_test_env();
        let temp_dir = TempDir::new()?;
        let config = persistent_config(temp_dir.path(), 8);
        let embeddings = random_embeddings(20, 8, 1);
        let query = random_embeddings(1, 8, 2).remove(0);

        let before = {
            let engine = SearchCoordinator::open(&config)?;
            ingest_all(&engine, &embeddings, 0)?;
            let ranked = engine.search(Some(&query), None, 5)?;
            engine.shutdown()?;
            ranked
        };
        assert!(temp_dir.path().join("snapshot.bin").exists());

        let engine = SearchCoordinator::open(&config)?;
        assert_eq!(engine.len(), 20);
        for ordinal in 0..20 {
            assert_eq!(engine.item(ordinal)?.source_reference, format!("img{}", ordinal));
            let stored = engine.embedding(ordinal)?;
            assert!((dot(&stored, embeddings[ordinal].as_slice()) - 1.0).abs() < 1e-5);
        }
        assert_eq!(engine.search(Some(&query), None, 5)?, before);
        Ok(())
    }

    #[test]
    fn test_crash_without_checkpoint_replays_wal() -> Result<()> {
        init_test_env();
        let temp_dir = TempDir::new()?;
        let config = persistent_config(temp_dir.path(), 4);
        let embeddings = random_embeddings(6, 4, 3);

        {
            let engine = SearchCoordinator::open(&config)?;
            ingest_all(&engine, &embeddings[..3], 0)?;
            engine.checkpoint()?;
            ingest_all(&engine, &embeddings[3..], 3)?;
            // No shutdown: the last three inserts only exist in the WAL
        }

        let engine = SearchCoordinator::open(&config)?;
        let stats = engine.stats();
        assert_eq!(stats.total_items, 6);
        assert_eq!(stats.metadata_count, 6);
        assert!(stats.backing_store_health.is_healthy());
        assert_eq!(engine.item(5)?.description, "item 5");
        Ok(())
    }

    #[test]
    fn test_torn_wal_tail_recovers_complete_inserts() -> Result<()> {
        init_test_env();
        let temp_dir = TempDir::new()?;
        let config = persistent_config(temp_dir.path(), 4);

        {
            let engine = SearchCoordinator::open(&config)?;
            ingest_all(&engine, &random_embeddings(4, 4, 9), 0)?;
        }

        // A crash in the middle of a record leaves a partial frame behind
        let segment = latest_wal_segment(temp_dir.path());
        let mut file = std::fs::OpenOptions::new().append(true).open(&segment)?;
        file.write_all(&[0x40, 0x00, 0x00, 0x00, 0xde, 0xad])?;
        drop(file);

        let engine = SearchCoordinator::open(&config)?;
        assert_eq!(engine.len(), 4);
        assert!(engine.stats().consistent);

        engine.ingest(Item::new("img4", ""), Some(&basis(4, 0)), None)?;
        assert_eq!(engine.len(), 5);
        Ok(())
    }

    #[test]
    fn test_corrupt_snapshot_starts_empty_and_reports_degraded() -> Result<()> {
        init_test_env();
        let temp_dir = TempDir::new()?;
        let config = persistent_config(temp_dir.path(), 4);

        {
            let engine = SearchCoordinator::open(&config)?;
            ingest_all(&engine, &random_embeddings(3, 4, 4), 0)?;
            engine.shutdown()?;
        }
        let snapshot = temp_dir.path().join("snapshot.bin");
        let mut bytes = std::fs::read(&snapshot)?;
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        std::fs::write(&snapshot, &bytes)?;

        let engine = SearchCoordinator::open(&config)?;
        let stats = engine.stats();
        assert_eq!(stats.total_items, 0);
        assert!(!stats.backing_store_health.is_healthy());

        // Still serves traffic
        engine.ingest(Item::new("fresh", ""), Some(&basis(4, 1)), None)?;
        let ranked = engine.search(Some(&basis(4, 1)), None, 5)?;
        assert_eq!(ranked.results[0].source_reference, "fresh");

        let quarantined = std::fs::read_dir(temp_dir.path())?
            .filter_map(|e| e.ok())
            .any(|e| e.file_name().to_string_lossy().starts_with("snapshot.bin.corrupt-"));
        assert!(quarantined);
        Ok(())
    }

    #[test]
    fn test_dimension_change_does_not_misread_data() -> Result<()> {
        init_test_env();
        let temp_dir = TempDir::new()?;
        {
            let engine = SearchCoordinator::open(&persistent_config(temp_dir.path(), 4))?;
            ingest_all(&engine, &random_embeddings(2, 4, 8), 0)?;
            engine.shutdown()?;
        }

        let engine = SearchCoordinator::open(&persistent_config(temp_dir.path(), 6))?;
        let stats = engine.stats();
        assert_eq!(stats.dimension, 6);
        assert_eq!(stats.total_items, 0);
        assert!(!stats.backing_store_health.is_healthy());
        Ok(())
    }

    #[test]
    fn test_checkpoint_drops_covered_wal_segments() -> Result<()> {
        init_test_env();
        let temp_dir = TempDir::new()?;
        let config = persistent_config(temp_dir.path(), 4);
        let engine = SearchCoordinator::open(&config)?;
        ingest_all(&engine, &random_embeddings(5, 4, 6), 0)?;

        assert_eq!(engine.checkpoint()?, Some(5));
        let segments = std::fs::read_dir(temp_dir.path().join("wal"))?.count();
        assert_eq!(segments, 1);
        Ok(())
    }

    #[test]
    fn test_dimension_change_preserves_unapplied_wal() -> Result<()> {
        init_test_env();
        let temp_dir = TempDir::new()?;
        let embeddings = random_embeddings(4, 4, 12);
        {
            let engine = SearchCoordinator::open(&persistent_config(temp_dir.path(), 4))?;
            ingest_all(&engine, &embeddings[..2], 0)?;
            engine.checkpoint()?;
            ingest_all(&engine, &embeddings[2..], 2)?;
        }

        // Opening at another dimension checkpoints the empty recovered state
        {
            let engine = SearchCoordinator::open(&persistent_config(temp_dir.path(), 6))?;
            assert_eq!(engine.len(), 0);
            assert!(!engine.stats().backing_store_health.is_healthy());
        }

        let mut preserved = Vec::new();
        let mut rejected_snapshot = None;
        for entry in std::fs::read_dir(temp_dir.path())? {
            let path = entry?.path();
            let name = path.file_name().unwrap_or_default().to_string_lossy().to_string();
            if name.starts_with("wal.rejected-") {
                preserved.push(path);
            } else if name.starts_with("snapshot.bin.rejected-") {
                rejected_snapshot = Some(path);
            }
        }
        assert_eq!(preserved.len(), 1);
        let rejected_snapshot = rejected_snapshot.expect("rejected snapshot kept");

        let mut kept_bytes = 0;
        for entry in std::fs::read_dir(&preserved[0])? {
            let path = entry?.path();
            kept_bytes += std::fs::metadata(&path)?.len();
            std::fs::copy(&path, temp_dir.path().join("wal").join(path.file_name().unwrap()))?;
        }
        assert!(kept_bytes > 0);
        std::fs::rename(&rejected_snapshot, temp_dir.path().join("snapshot.bin"))?;

        let engine = SearchCoordinator::open(&persistent_config(temp_dir.path(), 4))?;
        assert_eq!(engine.len(), 4);
        assert_eq!(engine.item(3)?.source_reference, "img3");
        Ok(())
    }
}

