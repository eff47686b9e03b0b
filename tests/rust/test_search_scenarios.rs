//! Ranking and fusion behavior of the search engine

use super::common::*;
use anyhow::Result;
use proximalens::*;

#[cfg(test)]
mod search_scenario_tests {
    use super::*;

    fn engine(dimension: usize) -> SearchCoordinator {
        SearchCoordinator::open(&memory_config(dimension)).unwrap()
    }

    #[test]
    fn test_empty_index_returns_empty_results() -> Result<()> {
        init_test_env();
        let engine = engine(8);

        let ranked = engine.search(Some(&basis(8, 0)), None, 5)?;
        assert!(ranked.results.is_empty());
        assert!(ranked.scores.is_empty());
        assert_eq!(ranked.total_items, 0);
        Ok(())
    }

    #[test]
    fn test_text_only_item_matches_itself() -> Result<()> {
        init_test_env();
        let engine = engine(8);
        let red_shoe = random_embeddings(1, 8, 7).remove(0);

        engine.ingest(Item::new("http://img/0.png", "red shoe"), None, Some(&red_shoe))?;
        let ranked = engine.search(None, Some(&red_shoe), 5)?;

        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked.results[0].description, "red shoe");
        assert!((ranked.scores[0] - 1.0).abs() < 1e-4);
        Ok(())
    }

    #[test]
    fn test_orthogonal_images_rank_in_order() -> Result<()> {
        init_test_env();
        let engine = engine(4);
        engine.ingest(Item::new("a.png", ""), Some(&basis(4, 0)), None)?;
        engine.ingest(Item::new("b.png", ""), Some(&basis(4, 1)), None)?;

        let ranked = engine.search(Some(&basis(4, 0)), None, 5)?;
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked.results[0].source_reference, "a.png");
        assert_eq!(ranked.results[1].source_reference, "b.png");
        assert!((ranked.scores[0] - 1.0).abs() < 1e-4);
        assert!(ranked.scores[1].abs() < 1e-4);
        assert!(ranked.scores[0] > ranked.scores[1]);
        Ok(())
    }

    #[test]
    fn test_both_signals_store_weighted_combination() -> Result<()> {
        init_test_env();
        let engine = engine(2);
        let image = basis(2, 0);
        let text = basis(2, 1);

        let receipt = engine.ingest(Item::new("c.png", "blue hat"), Some(&image), Some(&text))?;
        let stored = engine.embedding(receipt.ordinal)?;

        let norm = (0.6f32 * 0.6 + 0.4 * 0.4).sqrt();
        assert!((stored[0] - 0.6 / norm).abs() < 1e-5);
        assert!((stored[1] - 0.4 / norm).abs() < 1e-5);
        assert!((dot(&stored, &stored) - 1.0).abs() < 1e-4);
        assert_ne!(stored.as_slice(), image.as_slice());
        assert_ne!(stored.as_slice(), text.as_slice());
        Ok(())
    }

    #[test]
    fn test_equal_scores_prefer_earlier_items() -> Result<()> {
        init_test_env();
        let engine = engine(3);
        for name in ["first", "second", "third"] {
            engine.ingest(Item::new(name, ""), Some(&basis(3, 2)), None)?;
        }

        let ranked = engine.search(Some(&basis(3, 2)), None, 5)?;
        let names: Vec<_> = ranked.results.iter().map(|i| i.source_reference.as_str()).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
        Ok(())
    }

    #[test]
    fn test_ranking_is_monotone_and_repeatable() -> Result<()> {
        init_test_env();
        let engine = engine(16);
        for (i, embedding) in random_embeddings(50, 16, 42).iter().enumerate() {
            engine.ingest(Item::new(format!("img{}", i), ""), Some(embedding), None)?;
        }

        let query = random_embeddings(1, 16, 99).remove(0);
        let first = engine.search(Some(&query), None, 5)?;
        let second = engine.search(Some(&query), None, 5)?;

        assert_eq!(first, second);
        assert_eq!(first.len(), 5);
        assert_eq!(first.total_items, 50);
        for pair in first.scores.windows(2) {
            assert!(pair[0] >= pair[1]);
        }
        Ok(())
    }

    #[test]
    fn test_search_breadth_does_not_leak_into_results() -> Result<()> {
        init_test_env();
        let mut config = memory_config(4);
        config.index.search_breadth = 3;
        config.index.result_limit = 2;
        let engine = SearchCoordinator::open(&config)?;
        for (i, embedding) in random_embeddings(10, 4, 3).iter().enumerate() {
            engine.ingest(Item::new(format!("img{}", i), ""), Some(embedding), None)?;
        }

        assert_eq!(engine.search(Some(&basis(4, 0)), None, 10)?.len(), 2);
        assert_eq!(engine.search(Some(&basis(4, 0)), None, 1)?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_wrong_query_dimension_is_rejected() {
        init_test_env();
        let engine = engine(4);
        engine
            .ingest(Item::new("a.png", ""), Some(&basis(4, 0)), None)
            .unwrap();

        let err = engine.search(Some(&basis(3, 0)), None, 5).unwrap_err();
        assert!(matches!(
            err,
            SearchError::DimensionMismatch {
                expected: 4,
                actual: 3
            }
        ));
        assert!(err.is_client_error());
    }
}
