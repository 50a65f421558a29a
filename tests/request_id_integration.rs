use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use tower::ServiceExt;

use image_intake::{AppConfig, AppState, build_router};

fn build_app(dir: &tempfile::TempDir) -> Router {
    let mut cfg = AppConfig::default();
    cfg.storage.root = dir.path().join("images").to_string_lossy().into_owned();
    cfg.storage.temp_dir = dir.path().join("tmp").to_string_lossy().into_owned();
    std::fs::create_dir_all(&cfg.storage.root).expect("mkdir");
    std::fs::create_dir_all(&cfg.storage.temp_dir).expect("mkdir");
    build_router(AppState::new(cfg))
}

#[tokio::test]
async fn request_id_is_generated_when_missing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let resp = build_app(&dir)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .expect("request /health");

    assert_eq!(resp.status(), StatusCode::OK);
    let request_id = resp
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    assert!(request_id.starts_with("req_"), "got {request_id:?}");
}

#[tokio::test]
async fn request_id_uses_client_value_when_valid() {
    let dir = tempfile::tempdir().expect("tempdir");
    let resp = build_app(&dir)
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-request-id", "client.req-001")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("request /health");

    let request_id = resp
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    assert_eq!(request_id, "client.req-001");
}

#[tokio::test]
async fn error_envelope_contains_request_id() {
    let dir = tempfile::tempdir().expect("tempdir");
    let boundary = "rid-boundary";
    let body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"type\"\r\n\r\navatar\r\n--{boundary}--\r\n"
    );
    let resp = build_app(&dir)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/upload")
                .header("x-request-id", "err.req-001")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .expect("request /upload");

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body");
    let json: serde_json::Value = serde_json::from_slice(&bytes).expect("parse json");
    assert_eq!(json["error"], "MISSING_FILE");
    assert_eq!(json["requestId"], "err.req-001");
}
