use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use tabula_server::pipeline::{
    DocumentUpload, ExtractionData, ExtractionPipeline, IngestReceipt, PipelineFault,
};
use tabula_server::{ApiState, build_api_router};

struct UnusedPipeline;

#[async_trait]
impl ExtractionPipeline for UnusedPipeline {
    async fn ingest_document(
        &self,
        _upload: DocumentUpload,
    ) -> Result<IngestReceipt, PipelineFault> {
        unreachable!("healthz never reaches the pipeline")
    }

    async fn extract(&self, _file_id: &str) -> Result<ExtractionData, PipelineFault> {
        unreachable!("healthz never reaches the pipeline")
    }
}

#[tokio::test]
async fn healthz_returns_ok_json() {
    let app = build_api_router(ApiState::new(Arc::new(UnusedPipeline), 1024));
    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/v1/healthz")
                .body(Body::empty())
                .expect("request builder should not fail"),
        )
        .await
        .expect("healthz handler should respond");

    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response
        .headers()
        .get(axum::http::header::CONTENT_TYPE)
        .expect("content-type header present")
        .to_str()
        .expect("content-type must be valid utf-8");
    assert!(
        content_type.starts_with("application/json"),
        "content-type must indicate JSON: {content_type}"
    );

    let body_bytes = response
        .into_body()
        .collect()
        .await
        .expect("response body must be readable")
        .to_bytes();
    let value: Value =
        serde_json::from_slice(body_bytes.as_ref()).expect("healthz response must be valid JSON");
    assert_eq!(value, json!({ "status": "ok" }));
}

#[tokio::test]
async fn method_mismatch_returns_a_json_envelope() {
    let app = build_api_router(ApiState::new(Arc::new(UnusedPipeline), 1024));
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/healthz")
                .body(Body::empty())
                .expect("request builder should not fail"),
        )
        .await
        .expect("method fallback should respond");

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    let body = response
        .into_body()
        .collect()
        .await
        .expect("body readable")
        .to_bytes();
    let value: Value = serde_json::from_slice(body.as_ref()).expect("method fallback is JSON");
    assert_eq!(value["ok"], false);
    assert_eq!(value["error"], "method_not_allowed");
}

#[tokio::test]
async fn unknown_routes_return_a_json_envelope() {
    let app = build_api_router(ApiState::new(Arc::new(UnusedPipeline), 1024));
    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/nope")
                .body(Body::empty())
                .expect("request builder should not fail"),
        )
        .await
        .expect("fallback should respond");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = response
        .into_body()
        .collect()
        .await
        .expect("body readable")
        .to_bytes();
    let value: Value = serde_json::from_slice(body.as_ref()).expect("fallback is JSON");
    assert_eq!(value["ok"], false);
    assert_eq!(value["error"], "not_found");
}
