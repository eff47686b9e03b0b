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


//! ProximaLens Server - multimodal similarity search over HTTP

use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info, warn};
use proximalens::server::{init_tracing, ServerBuilder};
use proximalens::Config;

#[derive(Parser)]
#[command(name = "proximalens-server")]
#[command(about = "ProximaLens multimodal similarity search server")]
struct Args {
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    #[arg(short, long)]
    port: Option<u16>,

    /// Embedding dimension; must match the embedding model
    #[arg(long)]
    dimension: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let config_found = args.config.exists();
    let mut config = if config_found {
        Config::from_file(&args.config)?
    } else {
        Config::default()
    };

    // Override with CLI arguments
    if let Some(data_dir) = args.data_dir {
        config.persistence.data_dir = data_dir;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(dimension) = args.dimension {
        config.index.dimension = dimension;
    }

    let _log_guard = init_tracing(&config.logging)?;
    if !config_found {
        warn!("Configuration file {:?} not found, using defaults", args.config);
    }
    info!("Starting ProximaLens server with config: {:?}", config);

    let server = match ServerBuilder::new().with_config(config).build().await {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to start ProximaLens: {:#}", e);
            return Err(e);
        }
    };

    server
        .serve(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                return;
            }
            info!("Received shutdown signal, stopping server...");
        })
        .await
}
