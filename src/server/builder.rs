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


//! Server builder and lifecycle
//!
//! Startup: recover the engine, checkpoint anything replayed, start the
//! checkpointer, serve. Shutdown: stop accepting requests, stop the
//! checkpointer, take a final checkpoint.

use anyhow::{Context, Result};
use std::future::Future;
use std::net::{SocketAddr, TcpListener};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::api::{create_router, ApiState};
use crate::core::config::Config;
use crate::services::{Checkpointer, Embedder, HttpEmbedder, SearchCoordinator};

/// Builder for a ProximaLens server
pub struct ServerBuilder {
    config: Config,
    embedder: Option<Arc<dyn Embedder>>,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            embedder: None,
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn with_server_endpoint(mut self, host: impl Into<String>, port: u16) -> Self {
        self.config.server.bind_address = host.into();
        self.config.server.port = port;
        self
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.config.persistence.data_dir = data_dir.into();
        self
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.config.index.dimension = dimension;
        self
    }

    pub fn with_persistence(mut self, enabled: bool) -> Self {
        self.config.persistence.enabled = enabled;
        self
    }

    /// Replace the HTTP embedder built from `config.embedder`.
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Validate the configuration and recover the engine.
    pub async fn build(self) -> Result<ProximaLensServer> {
        self.config.validate()?;
        info!("🚀 Building ProximaLens server");
        info!(
            "🌐 Network: {}:{}",
            self.config.server.bind_address, self.config.server.port
        );
        info!(
            "📐 Dimension: {}, fusion image={} text={}",
            self.config.index.dimension,
            self.config.fusion.image_weight,
            self.config.fusion.text_weight
        );

        let embedder: Arc<dyn Embedder> = match self.embedder {
            Some(embedder) => embedder,
            None => Arc::new(HttpEmbedder::new(&self.config.embedder)?),
        };

        // Recovery reads and may rewrite the snapshot
        let engine_config = self.config.clone();
        let coordinator = tokio::task::spawn_blocking(move || SearchCoordinator::open(&engine_config))
            .await
            .context("engine recovery task failed")??;
        info!("✅ Engine ready with {} items", coordinator.len());

        Ok(ProximaLensServer {
            config: self.config,
            coordinator: Arc::new(coordinator),
            embedder,
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A recovered engine plus its HTTP surface
pub struct ProximaLensServer {
    config: Config,
    coordinator: Arc<SearchCoordinator>,
    embedder: Arc<dyn Embedder>,
}

impl ProximaLensServer {
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn coordinator(&self) -> &Arc<SearchCoordinator> {
        &self.coordinator
    }

    pub fn endpoint(&self) -> Result<SocketAddr> {
        let addr = format!("{}:{}", self.config.server.bind_address, self.config.server.port);
        addr.parse()
            .with_context(|| format!("invalid bind address '{}'", addr))
    }

    pub fn router(&self) -> axum::Router {
        create_router(ApiState {
            coordinator: Arc::clone(&self.coordinator),
            embedder: Arc::clone(&self.embedder),
        })
    }

    /// Bind the configured endpoint and serve until `shutdown` resolves.
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.endpoint()?;
        let listener =
            TcpListener::bind(addr).with_context(|| format!("failed to bind {}", addr))?;
        self.serve_on(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves, then
    /// flush the engine to disk.
    pub async fn serve_on<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let checkpointer = self.coordinator.is_persistent().then(|| {
            Checkpointer::spawn(
                Arc::clone(&self.coordinator),
                Duration::from_secs(self.config.persistence.checkpoint_interval_secs),
            )
        });

        let router = self.router();
        info!("🚀 Serving on {}", listener.local_addr()?);
        let served = axum::Server::from_tcp(listener)?
            .serve(router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await;

        info!("Stopping ProximaLens server...");
        if let Some(checkpointer) = checkpointer {
            checkpointer.stop().await;
        }

        let coordinator = Arc::clone(&self.coordinator);
        match tokio::task::spawn_blocking(move || coordinator.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("❌ Final checkpoint failed: {}", e),
            Err(e) => error!("❌ Final checkpoint task failed: {}", e),
        }

        served.context("HTTP server failed")?;
        info!("ProximaLens server stopped");
        Ok(())
    }
}

impl std::fmt::Debug for ProximaLensServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProximaLensServer")
            .field(
                "endpoint",
                &format!("{}:{}", self.config.server.bind_address, self.config.server.port),
            )
            .field("coordinator", &self.coordinator)
            .finish()
    }
}
