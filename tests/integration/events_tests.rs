//! Upload webhook tests.
//!
//! Tests verify:
//! - Flat events and S3 event notifications trigger the fan-out
//! - Body signatures when a secret is configured
//! - Status aggregation across events and cells

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use serde_json::{json, Value};

use image_variants::error::CodecError;
use image_variants::server::{EventSigner, SIGNATURE_HEADER};
use image_variants::variant::MediaFormat;
use image_variants::VariantPolicy;

use super::test_utils::{body_bytes, png_bytes, FaultyCodec, TestApp, BUCKET};

fn small_policy() -> VariantPolicy {
    VariantPolicy::default().with_common_widths([32])
}

fn event_request(body: &Value, signature: Option<String>) -> Request<Body> {
    let mut request = Request::builder()
        .method(Method::POST)
        .uri("/events/upload")
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        request = request.header(SIGNATURE_HEADER, signature);
    }
    request.body(Body::from(body.to_string())).unwrap()
}

async fn json_body(response: axum::http::Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

// =============================================================================
// Event Documents
// =============================================================================

#[tokio::test]
async fn test_flat_event_warms_matrix() {
    let app = TestApp::builder().policy(small_policy()).build();
    app.store.insert_source("a.png", png_bytes(64, 32), None);

    let body = json!({"bucket": BUCKET, "key": "a.png", "contentType": "image/png"});
    let response = app.send(event_request(&body, None)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let report = json_body(response).await;
    assert_eq!(report["reports"][0]["source"], "a.png");
    assert_eq!(report["reports"][0]["stored"], 4);
    assert_eq!(report["reports"][0]["cells"][0]["status"], "stored");
    assert!(report.get("failures").is_none());
    assert_eq!(app.store.variant_keys().len(), 4);
}

#[tokio::test]
async fn test_s3_notification_document() {
    let app = TestApp::builder().policy(small_policy()).build();
    app.store.insert_source("my photos/a.png", png_bytes(64, 32), None);

    let body = json!({
        "Records": [
            {
                "eventName": "ObjectCreated:Put",
                "s3": {
                    "bucket": {"name": BUCKET},
                    "object": {"key": "my+photos/a.png", "size": 1024}
                }
            },
            {
                "eventName": "ObjectRemoved:Delete",
                "s3": {
                    "bucket": {"name": BUCKET},
                    "object": {"key": "gone.png"}
                }
            }
        ]
    });
    let response = app.send(event_request(&body, None)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let report = json_body(response).await;
    assert_eq!(report["reports"].as_array().unwrap().len(), 1);
    assert_eq!(report["reports"][0]["source"], "my photos/a.png");
    assert!(app
        .store
        .variant_keys()
        .contains(&"my photos/a.png/format=webp,width=32".to_string()));
}

#[tokio::test]
async fn test_invalid_document() {
    let app = TestApp::builder().build();

    let request = Request::builder()
        .method(Method::POST)
        .uri("/events/upload")
        .body(Body::from("not json"))
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "invalid_event");
}

#[tokio::test]
async fn test_webhook_disabled_without_warm_cache() {
    let app = TestApp::builder().without_warm_cache().build();

    let body = json!({"bucket": BUCKET, "key": "a.png"});
    let response = app.send(event_request(&body, None)).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

// =============================================================================
// Signatures
// =============================================================================

#[tokio::test]
async fn test_signed_event_accepted() {
    let app = TestApp::builder()
        .policy(small_policy())
        .secret("hook-secret")
        .build();
    app.store.insert_source("a.png", png_bytes(64, 32), None);

    let body = json!({"bucket": BUCKET, "key": "a.png"});
    let signature = EventSigner::new("hook-secret").sign(body.to_string().as_bytes());
    let response = app.send(event_request(&body, Some(signature))).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_unsigned_or_forged_event_rejected() {
    let app = TestApp::builder().secret("hook-secret").build();
    app.store.insert_source("a.png", png_bytes(64, 32), None);
    let body = json!({"bucket": BUCKET, "key": "a.png"});

    let response = app.send(event_request(&body, None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"], "missing_signature");

    let forged = EventSigner::new("other-secret").sign(body.to_string().as_bytes());
    let response = app.send(event_request(&body, Some(forged))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"], "invalid_signature");

    let response = app
        .send(event_request(&body, Some("sha1=abc".to_string())))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Nothing was warmed
    assert_eq!(app.store.get_count(), 0);
}

// =============================================================================
// Status Aggregation
// =============================================================================

#[tokio::test]
async fn test_fatal_cell_fails_request() {
    let app = TestApp::builder()
        .policy(small_policy())
        .codec(FaultyCodec::failing(
            MediaFormat::Avif,
            CodecError::Aborted("worker panicked".into()),
        ))
        .build();
    app.store.insert_source("a.png", png_bytes(64, 32), None);

    let body = json!({"bucket": BUCKET, "key": "a.png"});
    let response = app.send(event_request(&body, None)).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let report = json_body(response).await;
    assert_eq!(report["reports"][0]["fatal"], 2);
    assert_eq!(report["reports"][0]["stored"], 2);
}

#[tokio::test]
async fn test_unknown_bucket_reported() {
    let app = TestApp::builder().policy(small_policy()).build();
    app.store.insert_source("a.png", png_bytes(64, 32), None);

    let body = json!({"bucket": "elsewhere", "key": "a.png"});
    let response = app.send(event_request(&body, None)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let report = json_body(response).await;
    assert!(report["reports"].as_array().unwrap().is_empty());
    assert_eq!(report["failures"][0]["error"], "unknown_location");
}

#[tokio::test]
async fn test_missing_source_reported() {
    let app = TestApp::builder().build();

    let body = json!({"bucket": BUCKET, "key": "missing.png"});
    let response = app.send(event_request(&body, None)).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        json_body(response).await["failures"][0]["error"],
        "source_not_found"
    );
}
