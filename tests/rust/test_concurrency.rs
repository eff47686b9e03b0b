//! Concurrent ingestion and search against one shared engine

use super::common::*;
use anyhow::Result;
use proximalens::*;
use std::sync::Arc;
use tempfile::TempDir;

#[cfg(test)]
mod concurrency_tests {
    use super::*;

    const WRITERS: usize = 8;
    const PER_WRITER: usize = 25;

    fn assert_fully_joined(engine: &SearchCoordinator, expected: usize) {
        let stats = engine.stats();
        assert_eq!(stats.total_items, expected);
        assert_eq!(stats.metadata_count, expected);
        assert!(stats.consistent);
        for ordinal in 0..expected {
            engine.item(ordinal).unwrap();
            engine.embedding(ordinal).unwrap();
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_adds_keep_pair_aligned() -> Result<()> {
        init_test_env();
        let engine = Arc::new(SearchCoordinator::open(&memory_config(16))?);
        let embeddings = Arc::new(random_embeddings(WRITERS * PER_WRITER, 16, 11));

        let mut tasks = Vec::new();
        for writer in 0..WRITERS {
            let engine = Arc::clone(&engine);
            let embeddings = Arc::clone(&embeddings);
            tasks.push(tokio::task::spawn_blocking(move || -> SearchResult<()> {
                for i in 0..PER_WRITER {
                    let n = writer * PER_WRITER + i;
                    engine.ingest(Item::new(format!("img{}", n), ""), Some(&embeddings[n]), None)?;
                }
                Ok(())
            }));
        }
        for task in tasks {
            task.await??;
        }

        assert_fully_joined(&engine, WRITERS * PER_WRITER);
        let ranked = engine.search(Some(&embeddings[0]), None, 5)?;
        assert_eq!(ranked.total_items, WRITERS * PER_WRITER);
        assert_eq!(ranked.results[0].source_reference, "img0");
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_searches_never_observe_partial_adds() -> Result<()> {
        init_test_env();
        let engine = Arc::new(SearchCoordinator::open(&memory_config(8))?);
        let embeddings = Arc::new(random_embeddings(200, 8, 5));
        let query = basis(8, 0);

        let writer = {
            let engine = Arc::clone(&engine);
            let embeddings = Arc::clone(&embeddings);
            tokio::task::spawn_blocking(move || -> SearchResult<()> {
                for (n, embedding) in embeddings.iter().enumerate() {
                    engine.ingest(Item::new(format!("img{}", n), ""), Some(embedding), None)?;
                }
                Ok(())
            })
        };

        let mut readers = Vec::new();
        for _ in 0..4 {
            let engine = Arc::clone(&engine);
            let query = query.clone();
            readers.push(tokio::task::spawn_blocking(move || -> SearchResult<()> {
                let mut last_total = 0;
                for _ in 0..100 {
                    let ranked = engine.search(Some(&query), None, 5)?;
                    assert_eq!(ranked.results.len(), ranked.scores.len());
                    assert_eq!(ranked.len(), ranked.total_items.min(5));
                    assert!(ranked.total_items >= last_total);
                    last_total = ranked.total_items;
                    assert!(engine.stats().consistent);
                }
                Ok(())
            }));
        }

        writer.await??;
        for reader in readers {
            reader.await??;
        }
        assert_fully_joined(&engine, 200);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_adds_with_checkpoints_survive_restart() -> Result<()> {
        init_test_env();
        let temp_dir = TempDir::new()?;
        let config = persistent_config(temp_dir.path(), 8);
        let embeddings = Arc::new(random_embeddings(120, 8, 21));

        {
            let engine = Arc::new(SearchCoordinator::open(&config)?);
            let mut tasks = Vec::new();
            for writer in 0..4 {
                let engine = Arc::clone(&engine);
                let embeddings = Arc::clone(&embeddings);
                tasks.push(tokio::task::spawn_blocking(move || -> SearchResult<()> {
                    for n in (writer..120).step_by(4) {
                        engine.ingest(Item::new(format!("img{}", n), ""), Some(&embeddings[n]), None)?;
                        if n % 25 == 0 {
                            engine.checkpoint()?;
                        }
                    }
                    Ok(())
                }));
            }
            for task in tasks {
                task.await??;
            }
            // Dropped without a final checkpoint, like a crash
        }

        let recovered = SearchCoordinator::open(&config)?;
        assert_fully_joined(&recovered, 120);
        assert!(recovered.stats().backing_store_health.is_healthy());

        let mut seen: Vec<String> = (0..120)
            .map(|ordinal| recovered.item(ordinal).unwrap().source_reference)
            .collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 120);
        Ok(())
    }
}
