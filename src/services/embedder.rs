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


//! Embedder boundary
//!
//! Turns an image reference or a text string into a unit-norm embedding. The
//! model itself lives in a separate service reached over HTTP.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::core::config::EmbedderConfig;
use crate::core::error::{SearchError, SearchResult};
use crate::core::types::Embedding;

/// Source of embeddings for raw inputs. Every failure is reported as
/// `SearchError::EmbeddingUnavailable`.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_image(&self, source_reference: &str) -> SearchResult<Embedding>;

    async fn embed_text(&self, text: &str) -> SearchResult<Embedding>;
}

#[derive(Debug, Serialize)]
struct EmbedImageRequest<'a> {
    image_url: &'a str,
}

#[derive(Debug, Serialize)]
struct EmbedTextRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

/// Client for an embedding service exposing `POST /embed/image` and
/// `POST /embed/text`.
#[derive(Debug, Clone)]
pub struct HttpEmbedder {
    http_client: reqwest::Client,
    image_url: Url,
    text_url: Url,
}

impl HttpEmbedder {
    pub fn new(config: &EmbedderConfig) -> anyhow::Result<Self> {
        debug!(
            "🌐 Creating embedder client for {} with timeout: {}s",
            config.endpoint, config.timeout_secs
        );

        // Without the trailing slash `join` would replace the last path segment
        let base = Url::parse(&format!("{}/", config.endpoint.trim_end_matches('/')))?;
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http_client,
            image_url: base.join("embed/image")?,
            text_url: base.join("embed/text")?,
        })
    }

    async fn request<B: Serialize + Sync>(&self, url: &Url, body: &B) -> SearchResult<Embedding> {
        let unavailable = |e: reqwest::Error| {
            warn!("❌ Embedder request to {} failed: {}", url, e);
            SearchError::EmbeddingUnavailable(e.to_string())
        };

        let response: EmbedResponse = self
            .http_client
            .post(url.clone())
            .json(body)
            .send()
            .await
            .map_err(unavailable)?
            .error_for_status()
            .map_err(unavailable)?
            .json()
            .await
            .map_err(unavailable)?;

        Embedding::new(response.embedding).map_err(|e| {
            SearchError::EmbeddingUnavailable(format!("embedder returned an unusable vector: {}", e))
        })
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed_image(&self, source_reference: &str) -> SearchResult<Embedding> {
        if source_reference.trim().is_empty() {
            return Err(SearchError::EmbeddingUnavailable(
                "empty image reference".to_string(),
            ));
        }
        self.request(
            &self.image_url,
            &EmbedImageRequest {
                image_url: source_reference,
            },
        )
        .await
    }

    async fn embed_text(&self, text: &str) -> SearchResult<Embedding> {
        if text.trim().is_empty() {
            return Err(SearchError::EmbeddingUnavailable("empty text".to_string()));
        }
        self.request(&self.text_url, &EmbedTextRequest { text }).await
    }
}
