//! Upload API integration tests
//!
//! Drive the router end to end: multipart chunk requests, cancellation and
//! health, against a temporary root folder.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

use scoreshare_ingest::config::UploadConfig;
use scoreshare_ingest::storage::FilesystemBlobStore;
use scoreshare_ingest::{build_router, AppState};

const BOUNDARY: &str = "scoreshare-test-boundary";

struct TestApp {
    router: Router,
    config: UploadConfig,
    _root: TempDir,
}

fn setup_app() -> TestApp {
    setup_app_with(|_| {})
}

fn setup_app_with(adjust: impl FnOnce(&mut UploadConfig)) -> TestApp {
    let root = tempfile::tempdir().unwrap();
    let mut config = UploadConfig::with_root(root.path());
    adjust(&mut config);

    let blob_store = Arc::new(FilesystemBlobStore::new(config.public_dir.clone()));
    let router = build_router(AppState::new(config.clone(), blob_store));
    TestApp {
        router,
        config,
        _root: root,
    }
}

fn multipart_body(session_id: &str, index: u32, total: u32, file_name: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in [
        ("chunkIndex", index.to_string()),
        ("totalChunks", total.to_string()),
        ("fileName", file_name.to_string()),
        ("uniqueId", session_id.to_string()),
    ] {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"blob\"\r\nContent-Type: application/octet-stream\r\n\r\n",
            BOUNDARY
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn multipart_request(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/upload/chunk")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn extract_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn send_chunk(
    app: &TestApp,
    session_id: &str,
    index: u32,
    total: u32,
    file_name: &str,
    data: &[u8],
) -> (StatusCode, Value) {
    let request = multipart_request(multipart_body(session_id, index, total, file_name, data));
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    (status, extract_json(response).await)
}

async fn cancel(app: &TestApp, session_id: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/api/upload/cancel")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "uniqueId": session_id }).to_string()))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    (status, extract_json(response).await)
}

fn count_files(dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .map(|e| e.unwrap())
        .map(|e| {
            if e.file_type().unwrap().is_dir() {
                count_files(&e.path())
            } else {
                1
            }
        })
        .sum()
}

fn pdf_chunks() -> Vec<Vec<u8>> {
    vec![
        b"%PDF-1.4\n1 0 obj << /Type /Catalog >> endobj\n".to_vec(),
        b"2 0 obj << /Type /Pages /Count 0 >> endobj\n".to_vec(),
        b"trailer << /Root 1 0 R >>\n%%EOF\n".to_vec(),
    ]
}

#[tokio::test]
async fn test_out_of_order_upload_publishes_concatenation() {
    let app = setup_app();
    let chunks = pdf_chunks();

    let (status, body) = send_chunk(&app, "abc123", 1, 3, "song.pdf", &chunks[1]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Chunk uploaded successfully");
    assert_eq!(body["received"], 1);
    assert_eq!(body["total"], 3);

    let (status, body) = send_chunk(&app, "abc123", 0, 3, "song.pdf", &chunks[0]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], 2);

    let (status, body) = send_chunk(&app, "abc123", 2, 3, "song.pdf", &chunks[2]).await;
    assert_eq!(status, StatusCode::OK);

    let expected: Vec<u8> = chunks.concat();
    let path = body["path"].as_str().unwrap();
    assert!(path.starts_with("sheet-music/"), "unexpected path {}", path);
    assert!(path.ends_with("_song.pdf"));
    assert_eq!(body["fileName"], "song.pdf");
    assert_eq!(body["size"], expected.len() as u64);
    assert_eq!(body["sha256"], format!("{:x}", Sha256::digest(&expected)));

    let stored = std::fs::read(app.config.public_dir.join(path)).unwrap();
    assert_eq!(stored, expected);

    // Staging is gone once published
    assert!(!app.config.staging_dir.join("abc123").exists());
}

#[tokio::test]
async fn test_non_pdf_upload_is_rejected_and_nothing_published() {
    let app = setup_app();
    let chunks: [&[u8]; 3] = [b"just some ", b"plain text ", b"pretending to be a score"];

    for (index, chunk) in chunks.iter().enumerate().take(2) {
        let (status, _) = send_chunk(&app, "abc123", index as u32, 3, "song.pdf", chunk).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, body) = send_chunk(&app, "abc123", 2, 3, "song.pdf", chunks[2]).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "INVALID_FILE_TYPE");
    assert_eq!(body["error"]["message"], "Invalid file type. Only PDF allowed.");
    assert_eq!(body["error"]["retryable"], false);

    assert_eq!(count_files(&app.config.public_dir), 0);
    assert!(!app.config.staging_dir.join("abc123").exists());
}

#[tokio::test]
async fn test_cancel_removes_staging_and_resets_session() {
    let app = setup_app();
    let chunks = pdf_chunks();

    send_chunk(&app, "xyz789", 0, 3, "song.pdf", &chunks[0]).await;
    send_chunk(&app, "xyz789", 1, 3, "song.pdf", &chunks[1]).await;
    assert!(app.config.staging_dir.join("xyz789").exists());

    let (status, body) = cancel(&app, "xyz789").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Upload cancelled");
    assert!(!app.config.staging_dir.join("xyz789").exists());

    // The id now behaves as a fresh session, even with a different shape
    let (status, body) = send_chunk(&app, "xyz789", 2, 4, "other.pdf", &chunks[2]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], 1);
    assert_eq!(body["total"], 4);
}

#[tokio::test]
async fn test_cancel_always_succeeds() {
    let app = setup_app();

    let (status, body) = cancel(&app, "never-started").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Upload cancelled");

    let (status, _) = cancel(&app, "../../etc").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_resubmitted_chunk_uses_latest_bytes() {
    let app = setup_app();

    send_chunk(&app, "retry", 0, 2, "song.pdf", b"%PDF-1.4 first attempt\n").await;
    send_chunk(&app, "retry", 0, 2, "song.pdf", b"%PDF-1.4 second attempt\n").await;
    let (status, body) = send_chunk(&app, "retry", 1, 2, "song.pdf", b"%%EOF\n").await;
    assert_eq!(status, StatusCode::OK);

    let stored = std::fs::read(app.config.public_dir.join(body["path"].as_str().unwrap())).unwrap();
    assert_eq!(stored, b"%PDF-1.4 second attempt\n%%EOF\n");
}

#[tokio::test]
async fn test_mismatched_total_is_conflict() {
    let app = setup_app();
    let chunks = pdf_chunks();

    send_chunk(&app, "shape", 0, 3, "song.pdf", &chunks[0]).await;
    let (status, body) = send_chunk(&app, "shape", 1, 2, "song.pdf", &chunks[1]).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "SESSION_MISMATCH");

    let (status, _) = send_chunk(&app, "shape", 1, 3, "renamed.pdf", &chunks[1]).await;
    assert_eq!(status, StatusCode::CONFLICT);

    // The staged chunk survives the rejected requests
    assert!(app.config.staging_dir.join("shape").join("0.part").exists());
    assert!(!app.config.staging_dir.join("shape").join("1.part").exists());
}

#[tokio::test]
async fn test_oversized_chunk_is_rejected() {
    let app = setup_app_with(|config| config.max_chunk_bytes = 16);

    let (status, body) = send_chunk(&app, "big", 0, 2, "song.pdf", &[b'x'; 32]).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"]["code"], "TOO_LARGE");
    assert!(!app.config.staging_dir.join("big").exists());
}

#[tokio::test]
async fn test_oversized_file_is_rejected_and_cleaned() {
    let app = setup_app_with(|config| config.max_file_bytes = 20);

    send_chunk(&app, "huge", 0, 2, "song.pdf", b"%PDF-1.4 aaaaaaaa").await;
    let (status, _) = send_chunk(&app, "huge", 1, 2, "song.pdf", b"bbbbbbbbbbbb").await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(!app.config.staging_dir.join("huge").exists());
    assert_eq!(count_files(&app.config.public_dir), 0);
}

#[tokio::test]
async fn test_concurrent_chunks_publish_exactly_once() {
    let app = setup_app();
    let mut chunks = vec![b"%PDF-1.4\n".to_vec()];
    chunks.extend((1..16).map(|i| format!("object {}\n", i).into_bytes()));
    let total = chunks.len() as u32;

    let requests = chunks.iter().enumerate().map(|(index, data)| {
        let request = multipart_request(multipart_body("burst", index as u32, total, "song.pdf", data));
        let router = app.router.clone();
        tokio::spawn(async move {
            let response = router.oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            extract_json(response).await
        })
    });

    let bodies: Vec<Value> = futures::future::join_all(requests)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let published: Vec<&Value> = bodies.iter().filter(|b| b.get("path").is_some()).collect();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0]["size"], chunks.concat().len() as u64);
    assert_eq!(count_files(&app.config.public_dir), 1);
}

#[tokio::test]
async fn test_invalid_fields_are_bad_requests() {
    let app = setup_app();

    // Index outside the declared range
    let (status, body) = send_chunk(&app, "fields", 3, 3, "song.pdf", b"%PDF").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    let (status, _) = send_chunk(&app, "fields", 0, 0, "song.pdf", b"%PDF").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send_chunk(&app, "bad/id", 0, 1, "song.pdf", b"%PDF").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send_chunk(&app, "fields", 0, 1, "", b"%PDF").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Missing file part
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"uniqueId\"\r\n\r\nfields\r\n--{b}--\r\n",
        b = BOUNDARY
    );
    let response = app
        .router
        .clone()
        .oneshot(multipart_request(body.into_bytes()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert!(!app.config.staging_dir.join("fields").exists());
}

#[tokio::test]
async fn test_health_reports_staged_sessions() {
    let app = setup_app();

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "scoreshare-ingest");
    assert_eq!(body["active_sessions"], 0);
    assert_eq!(body["in_flight_sessions"], 0);

    send_chunk(&app, "pending", 0, 2, "song.pdf", b"%PDF-1.4").await;

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = extract_json(response).await;
    assert_eq!(body["active_sessions"], 1);
}
