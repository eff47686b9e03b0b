//! ProximaLens Integration Tests
//!
//! End-to-end behavior of the engine: ranking scenarios, durability across
//! restarts, concurrent access and the REST surface.

pub mod test_concurrency;
pub mod test_persistence_recovery;
pub mod test_rest_api;
pub mod test_search_scenarios;

// Re-export common utilities
pub use common::*;
