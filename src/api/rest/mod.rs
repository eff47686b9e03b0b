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


//! REST API implementation for ProximaLens

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::core::error::{SearchError, SearchResult};
use crate::core::types::{Embedding, Item, RankedResults, StatsReport};
use crate::services::{Embedder, SearchCoordinator};

/// API application state
#[derive(Clone)]
pub struct ApiState {
    pub coordinator: Arc<SearchCoordinator>,
    pub embedder: Arc<dyn Embedder>,
}

/// Item ingestion request
#[derive(Debug, Serialize, Deserialize)]
pub struct AddItemRequest {
    pub source_reference: String,
    #[serde(default)]
    pub description: String,
    /// Precomputed image signal; skips the embedder
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_embedding: Option<Vec<f32>>,
    /// Precomputed text signal; skips the embedder
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_embedding: Option<Vec<f32>>,
}

/// Item ingestion response
#[derive(Debug, Serialize, Deserialize)]
pub struct AddItemResponse {
    pub message: String,
    pub total_items: usize,
}

/// Similarity search request; at least one signal is required
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k: Option<usize>,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = Result<Json<T>, ApiError>;

/// Map an engine error onto an HTTP status and error body.
pub fn error_response(e: SearchError) -> ApiError {
    let status = match &e {
        SearchError::DimensionMismatch { .. }
        | SearchError::NoSignal
        | SearchError::InvalidEmbedding(_) => StatusCode::BAD_REQUEST,
        SearchError::EmbeddingUnavailable(_) => StatusCode::UNPROCESSABLE_ENTITY,
        SearchError::OutOfRange { .. } | SearchError::Persistence(_) => {
            error!("Request failed with internal fault: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (
        status,
        Json(ErrorResponse {
            error: e.code().to_string(),
            message: e.to_string(),
        }),
    )
}

fn join_error(e: tokio::task::JoinError) -> ApiError {
    error!("Blocking task failed: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "internal_error".to_string(),
            message: e.to_string(),
        }),
    )
}

fn precomputed(raw: Option<Vec<f32>>) -> SearchResult<Option<Embedding>> {
    raw.map(Embedding::new).transpose()
}

/// API Router setup
pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(stats))
        .route("/add", post(add_item))
        .route("/search", post(search))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint
async fn health_check(State(state): State<ApiState>) -> Json<HealthResponse> {
    let healthy = state.coordinator.stats().backing_store_health.is_healthy();
    Json(HealthResponse {
        status: if healthy { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Engine diagnostics
async fn stats(State(state): State<ApiState>) -> Json<StatsReport> {
    Json(state.coordinator.stats())
}

/// Index a new item
///
/// Without precomputed embeddings the image signal comes from
/// `source_reference` and the text signal from a non-empty description.
async fn add_item(
    State(state): State<ApiState>,
    Json(request): Json<AddItemRequest>,
) -> ApiResult<AddItemResponse> {
    let mut image = precomputed(request.image_embedding).map_err(error_response)?;
    let mut text = precomputed(request.text_embedding).map_err(error_response)?;

    if image.is_none() && text.is_none() {
        image = Some(
            state
                .embedder
                .embed_image(&request.source_reference)
                .await
                .map_err(error_response)?,
        );
        if !request.description.trim().is_empty() {
            text = Some(
                state
                    .embedder
                    .embed_text(&request.description)
                    .await
                    .map_err(error_response)?,
            );
        }
    }

    let item = Item::new(request.source_reference, request.description);
    let coordinator = Arc::clone(&state.coordinator);
    let receipt = tokio::task::spawn_blocking(move || {
        coordinator.ingest(item, image.as_ref(), text.as_ref())
    })
    .await
    .map_err(join_error)?
    .map_err(error_response)?;

    info!("Item added at ordinal {}", receipt.ordinal);
    Ok(Json(AddItemResponse {
        message: "Item added successfully".to_string(),
        total_items: receipt.total_items,
    }))
}

/// Similarity search over stored items
async fn search(
    State(state): State<ApiState>,
    Json(request): Json<SearchRequest>,
) -> ApiResult<RankedResults> {
    let image = match (precomputed(request.image_embedding), request.image_url) {
        (Ok(Some(embedding)), _) => Some(embedding),
        (Ok(None), Some(url)) if !url.trim().is_empty() => {
            Some(state.embedder.embed_image(&url).await.map_err(error_response)?)
        }
        (Ok(None), _) => None,
        (Err(e), _) => return Err(error_response(e)),
    };
    let text = match (precomputed(request.text_embedding), request.text) {
        (Ok(Some(embedding)), _) => Some(embedding),
        (Ok(None), Some(text)) if !text.trim().is_empty() => {
            Some(state.embedder.embed_text(&text).await.map_err(error_response)?)
        }
        (Ok(None), _) => None,
        (Err(e), _) => return Err(error_response(e)),
    };

    let coordinator = Arc::clone(&state.coordinator);
    let k = request.k.unwrap_or(coordinator.limits().result_limit);
    let results = tokio::task::spawn_blocking(move || {
        coordinator.search(image.as_ref(), text.as_ref(), k)
    })
    .await
    .map_err(join_error)?
    .map_err(error_response)?;

    Ok(Json(results))
}
