// Copyright 2025 ProximaDB
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.

//! ProximaLens Server Module
//!
//! Wires the engine, the embedder and the REST router into one process.

pub mod builder;
pub mod logging;

pub use builder::{ProximaLensServer, ServerBuilder};
pub use logging::init_tracing;
