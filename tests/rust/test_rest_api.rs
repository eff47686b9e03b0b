//! REST surface exercised in-process through the router

use super::common::*;
use anyhow::Result;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use proximalens::server::ServerBuilder;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

#[cfg(test)]
mod rest_api_tests {
    use super::*;

    fn stub_embedder() -> StubEmbedder {
        StubEmbedder::new()
            .with_image("http://img/shoe.png", vec![1.0, 0.0, 0.0, 0.0])
            .with_image("http://img/hat.png", vec![0.0, 1.0, 0.0, 0.0])
            .with_text("red shoe", vec![0.0, 0.0, 1.0, 0.0])
    }

    async fn router() -> axum::Router {
        ServerBuilder::new()
            .with_config(memory_config(4))
            .with_embedder(Arc::new(stub_embedder()))
            .build()
            .await
            .unwrap()
            .router()
    }

    async fn call(router: &axum::Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(body) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(body.to_string())
            }
            None => Body::empty(),
        };

        let response = router
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health_and_empty_stats() -> Result<()> {
        init_test_env();
        let router = router().await;

        let (status, body) = call(&router, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");

        let (status, body) = call(&router, Method::GET, "/stats", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_items"], 0);
        assert_eq!(body["dimension"], 4);
        assert_eq!(body["metadata_count"], 0);
        assert_eq!(body["backing_store_health"]["status"], "in_memory");
        Ok(())
    }

    #[tokio::test]
    async fn test_search_on_empty_index() -> Result<()> {
        init_test_env();
        let router = router().await;

        let (status, body) = call(
            &router,
            Method::POST,
            "/search",
            Some(json!({ "image_url": "http://img/shoe.png" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["results"], json!([]));
        assert_eq!(body["scores"], json!([]));
        Ok(())
    }

    #[tokio::test]
    async fn test_add_then_search_by_image_and_text() -> Result<()> {
        init_test_env();
        let router = router().await;

        let (status, body) = call(
            &router,
            Method::POST,
            "/add",
            Some(json!({ "source_reference": "http://img/shoe.png", "description": "red shoe" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_items"], 1);

        let (_, body) = call(
            &router,
            Method::POST,
            "/add",
            Some(json!({ "source_reference": "http://img/hat.png" })),
        )
        .await;
        assert_eq!(body["total_items"], 2);

        let (status, body) = call(
            &router,
            Method::POST,
            "/search",
            Some(json!({ "image_url": "http://img/shoe.png", "text": "red shoe" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["results"][0]["source_reference"], "http://img/shoe.png");
        assert_eq!(body["results"][0]["description"], "red shoe");
        assert_eq!(body["total_items"], 2);
        let scores = body["scores"].as_array().unwrap();
        assert_eq!(scores.len(), 2);
        assert!((scores[0].as_f64().unwrap() - 1.0).abs() < 1e-4);
        Ok(())
    }

    #[tokio::test]
    async fn test_precomputed_embeddings_skip_embedder() -> Result<()> {
        init_test_env();
        let router = router().await;

        let (status, _) = call(
            &router,
            Method::POST,
            "/add",
            Some(json!({
                "source_reference": "unknown-to-embedder",
                "text_embedding": [0.0, 0.0, 0.0, 2.0]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = call(
            &router,
            Method::POST,
            "/search",
            Some(json!({ "text_embedding": [0.0, 0.0, 0.0, 1.0], "k": 1 })),
        )
        .await;
        assert_eq!(body["results"][0]["source_reference"], "unknown-to-embedder");
        Ok(())
    }

    #[tokio::test]
    async fn test_client_errors() -> Result<()> {
        init_test_env();
        let router = router().await;

        let (status, body) = call(&router, Method::POST, "/search", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "no_signal");

        let (status, body) = call(
            &router,
            Method::POST,
            "/add",
            Some(json!({ "source_reference": "x", "image_embedding": [1.0, 0.0] })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "dimension_mismatch");

        let (status, body) = call(
            &router,
            Method::POST,
            "/add",
            Some(json!({ "source_reference": "http://img/missing.png" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "embedding_unavailable");

        let (_, body) = call(&router, Method::GET, "/stats", None).await;
        assert_eq!(body["total_items"], 0);
        assert_eq!(body["consistent"], true);
        Ok(())
    }

    #[tokio::test]
    async fn test_blank_image_url_counts_as_absent() -> Result<()> {
        init_test_env();
        let router = router().await;
        let (status, _) = call(
            &router,
            Method::POST,
            "/add",
            Some(json!({ "source_reference": "http://img/shoe.png", "description": "red shoe" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(
            &router,
            Method::POST,
            "/search",
            Some(json!({ "image_url": "   ", "text": "red shoe" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["results"][0]["source_reference"], "http://img/shoe.png");

        let (status, body) =
            call(&router, Method::POST, "/search", Some(json!({ "image_url": "" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "no_signal");
        Ok(())
    }
}

