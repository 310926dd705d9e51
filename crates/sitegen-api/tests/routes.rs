use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sitegen_api::{router, AppState};
use sitegen_bucket::{BucketError, BucketStore, MemoryBucketStore};
use sitegen_core::architect::SpecGenerator;
use sitegen_core::artifacts::ArtifactLayout;
use sitegen_core::builder::MockBuilder;
use sitegen_core::error::GenerationError;
use sitegen_core::pipeline::GeneratorSet;
use sitegen_core::publish::Uploader;
use sitegen_core::{BusinessRecord, Pipeline, Specification};
use tempfile::TempDir;
use tower::ServiceExt;

struct BrokenStore;

#[async_trait]
impl BucketStore for BrokenStore {
    async fn put_object(
        &self,
        _key: &str,
        _bytes: Bytes,
        _content_type: &str,
    ) -> Result<(), BucketError> {
        Err(BucketError::Sdk("bucket unavailable".into()))
    }

    async fn get_object(&self, key: &str) -> Result<Bytes, BucketError> {
        Err(BucketError::NotFound(key.to_string()))
    }

    async fn delete_object(&self, _key: &str) -> Result<(), BucketError> {
        Ok(())
    }

    async fn list_prefix(&self, _prefix: &str) -> Result<Vec<String>, BucketError> {
        Ok(Vec::new())
    }

    fn public_url(&self, key: &str) -> String {
        format!("memory://broken/{key}")
    }
}

struct PanickingArchitect;

#[async_trait]
impl SpecGenerator for PanickingArchitect {
    async fn generate_spec(
        &self,
        _record: &BusinessRecord,
    ) -> Result<Specification, GenerationError> {
        panic!("client blew up");
    }
}

fn sharma_optics() -> Value {
    json!({
        "business_name": "Sharma Optics",
        "address": "12 MG Road, Camp",
        "city": "Pune",
        "state": "Maharashtra",
        "category": "Optician",
        "description": "Family-run optician offering eye tests, contact lenses and designer frames since 1998.",
        "phone": "+91 20 2613 4567",
    })
}

fn layout(dir: &TempDir) -> ArtifactLayout {
    ArtifactLayout::new(dir.path().join("output"), dir.path().join("tasks"))
}

fn app(dir: &TempDir, store: Option<Arc<dyn BucketStore>>) -> Router {
    let layout = layout(dir);
    let mut pipeline = Pipeline::new().with_layout(layout.clone());
    if let Some(store) = store {
        pipeline = pipeline.with_uploader(Uploader::new(store));
    }
    router(Arc::new(AppState::new(pipeline, layout)))
}

fn panicking_app(dir: &TempDir) -> Router {
    let layout = layout(dir);
    let pipeline = Pipeline::new()
        .with_layout(layout.clone())
        .with_mock(GeneratorSet {
            architect: Arc::new(PanickingArchitect),
            builder: Arc::new(MockBuilder),
        });
    router(Arc::new(AppState::new(pipeline, layout)))
}

async fn send(app: Router, method: &str, uri: &str, body: Option<String>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.map(Body::from).unwrap_or_else(Body::empty))
        .expect("request");

    let response = app.oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    let value = serde_json::from_slice(&bytes).expect("json body");
    (status, value)
}

async fn post_json(app: Router, uri: &str, body: &Value) -> (StatusCode, Value) {
    send(app, "POST", uri, Some(body.to_string())).await
}

#[tokio::test]
async fn mock_generation_without_upload_succeeds() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (status, body) = post_json(
        app(&dir, None),
        "/api/generate?mock=true&skip_upload=true",
        &sharma_optics(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["business_slug"], "sharma-optics");
    assert!(body["html_size_bytes"].as_u64().expect("size") > 0);
    assert!(body.get("public_url").is_none());
    assert!(body.get("storage_path").is_none());
}

#[tokio::test]
async fn short_business_name_is_a_validation_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut input = sharma_optics();
    input["business_name"] = json!("S");

    let (status, body) = post_json(app(&dir, None), "/api/generate?mock=true", &input).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
    assert_eq!(body["error_phase"], "validation");
    let errors = body["validation_errors"].as_array().expect("errors");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["field"], "business_name");
    assert!(errors[0]["message"].as_str().expect("message").contains("2 characters"));
}

#[tokio::test]
async fn storage_failure_is_reported_as_upload_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (status, body) = post_json(
        app(&dir, Some(Arc::new(BrokenStore))),
        "/api/generate?mock=1",
        &sharma_optics(),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
    assert_eq!(body["error_phase"], "upload");
    assert!(body["error_message"].as_str().expect("message").contains("bucket unavailable"));
}

#[tokio::test]
async fn generation_with_storage_returns_public_url() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = MemoryBucketStore::new("https://sites.example.com");
    let (status, body) = post_json(
        app(&dir, Some(Arc::new(store.clone()))),
        "/api/generate?mock=true&save_local=true",
        &sharma_optics(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let storage_path = body["storage_path"].as_str().expect("storage path");
    assert!(storage_path.starts_with("sharma-optics/"));
    assert_eq!(
        body["public_url"],
        format!("https://sites.example.com/{storage_path}")
    );
    assert!(body["local_path"].as_str().expect("local path").ends_with("index.html"));
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn live_generation_without_credentials_fails_in_architect_phase() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (status, body) =
        post_json(app(&dir, None), "/api/generate?skip_upload=true", &sharma_optics()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_phase"], "architect");
}

#[tokio::test]
async fn malformed_json_is_a_validation_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (status, body) = send(
        app(&dir, None),
        "POST",
        "/api/generate?mock=true",
        Some("{not json".into()),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_phase"], "validation");
    assert_eq!(body["validation_errors"][0]["field"], "body");
}

#[tokio::test]
async fn invalid_flag_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (status, body) =
        post_json(app(&dir, None), "/api/generate?mock=perhaps", &sharma_optics()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["validation_errors"][0]["field"], "mock");
}

#[tokio::test]
async fn manual_upload_of_missing_markup_is_not_found() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (status, body) = post_json(
        app(&dir, Some(Arc::new(MemoryBucketStore::default()))),
        "/api/upload",
        &json!({ "run_id": "run-404", "slug": "sharma-optics" }),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    let expected = layout(&dir).markup_path("sharma-optics", "run-404");
    assert_eq!(body["expected_path"], expected.display().to_string());
    assert_eq!(body["error_phase"], "upload");
}

#[tokio::test]
async fn spec_handoff_then_manual_upload() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = MemoryBucketStore::default();
    let app = app(&dir, Some(Arc::new(store.clone())));

    let (status, body) = post_json(app.clone(), "/api/spec?mock=true", &sharma_optics()).await;
    assert_eq!(status, StatusCode::OK);
    let run_id = body["run_id"].as_str().expect("run id").to_string();
    assert!(std::path::Path::new(body["task_path"].as_str().expect("task")).exists());
    assert!(std::path::Path::new(body["spec_path"].as_str().expect("spec")).exists());
    assert_eq!(body["specification"]["fonts"][0], "Playfair Display");

    let markup_path = body["expected_markup_path"].as_str().expect("markup path");
    std::fs::write(markup_path, "<!DOCTYPE html><html><body>Sharma Optics</body></html>")
        .expect("write markup");

    let (status, body) = post_json(
        app,
        "/api/upload",
        &json!({ "run_id": run_id, "slug": "sharma-optics" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert!(body["storage_path"].as_str().expect("path").starts_with("sharma-optics/"));
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn upload_rejects_path_segments() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (status, body) = post_json(
        app(&dir, None),
        "/api/upload",
        &json!({ "run_id": "../../etc", "slug": "Sharma Optics" }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["validation_errors"].as_array().expect("errors").len(), 2);
}

#[tokio::test]
async fn validate_endpoint_reports_both_outcomes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (status, body) = post_json(app(&dir, None), "/api/validate", &sharma_optics()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);
    assert_eq!(body["record"]["city"], "Pune");

    let (status, body) = post_json(app(&dir, None), "/api/validate", &json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["valid"], false);
    assert_eq!(body["errors"].as_array().expect("errors").len(), 6);
}

#[tokio::test]
async fn health_reports_configuration() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (status, body) = send(app(&dir, None), "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["llm_configured"], false);
    assert_eq!(body["storage_configured"], false);
    assert_eq!(
        body["output_root"],
        dir.path().join("output").display().to_string()
    );
}

#[tokio::test]
async fn generator_panic_becomes_unknown_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (status, body) = post_json(
        panicking_app(&dir),
        "/api/generate?mock=true&skip_upload=true",
        &sharma_optics(),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "error");
    assert_eq!(body["error_phase"], "unknown");
    assert!(body["run_id"].as_str().is_some());
}

#[tokio::test]
async fn spec_panic_becomes_unknown_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (status, body) =
        post_json(panicking_app(&dir), "/api/spec?mock=true", &sharma_optics()).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error_phase"], "unknown");
}

#[tokio::test]
async fn empty_handoff_markup_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = MemoryBucketStore::default();
    let markup_path = layout(&dir).markup_path("sharma-optics", "run-empty");
    std::fs::create_dir_all(markup_path.parent().expect("run dir")).expect("mkdir");
    std::fs::write(&markup_path, "").expect("write markup");

    let (status, body) = post_json(
        app(&dir, Some(Arc::new(store.clone()))),
        "/api/upload",
        &json!({ "run_id": "run-empty", "slug": "sharma-optics" }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_phase"], "upload");
    assert!(store.is_empty().await);
}
