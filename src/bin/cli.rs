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


//! ProximaLens command line client

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use proximalens::api::rest::{AddItemRequest, AddItemResponse, ErrorResponse, SearchRequest};
use proximalens::{RankedResults, StatsReport};
use serde::de::DeserializeOwned;

#[derive(Parser)]
#[command(name = "proximalens-cli")]
#[command(about = "ProximaLens command line interface")]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8000")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index an item by image URL and optional description
    Add {
        #[arg(short, long)]
        image_url: String,
        #[arg(short, long, default_value = "")]
        description: String,
    },
    /// Search by image URL, text, or both
    Search {
        #[arg(short, long)]
        image_url: Option<String>,
        #[arg(short, long)]
        text: Option<String>,
        #[arg(short, long)]
        k: Option<usize>,
    },
    /// Show engine statistics
    Stats,
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return response.json().await.context("malformed server response");
    }
    match response.json::<ErrorResponse>().await {
        Ok(body) => bail!("{} ({}): {}", status, body.error, body.message),
        Err(_) => bail!("request failed with {}", status),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.server.trim_end_matches('/');

    match cli.command {
        Commands::Add {
            image_url,
            description,
        } => {
            let request = AddItemRequest {
                source_reference: image_url,
                description,
                image_embedding: None,
                text_embedding: None,
            };
            let response = client
                .post(format!("{}/add", base))
                .json(&request)
                .send()
                .await?;
            let added: AddItemResponse = decode(response).await?;
            println!("{} (total items: {})", added.message, added.total_items);
        }
        Commands::Search { image_url, text, k } => {
            if image_url.is_none() && text.is_none() {
                bail!("provide --image-url, --text, or both");
            }
            let request = SearchRequest {
                image_url,
                text,
                k,
                ..Default::default()
            };
            let response = client
                .post(format!("{}/search", base))
                .json(&request)
                .send()
                .await?;
            let ranked: RankedResults = decode(response).await?;
            if ranked.is_empty() {
                println!("No results ({} items indexed)", ranked.total_items);
            }
            for (rank, (item, score)) in ranked.results.iter().zip(&ranked.scores).enumerate() {
                println!(
                    "{:>2}. {:.4}  {}  {}",
                    rank + 1,
                    score,
                    item.source_reference,
                    item.description
                );
            }
        }
        Commands::Stats => {
            let response = client.get(format!("{}/stats", base)).send().await?;
            let stats: StatsReport = decode(response).await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    Ok(())
}
