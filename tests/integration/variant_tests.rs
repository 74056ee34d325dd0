//! Variant serving tests.
//!
//! Tests verify:
//! - Response headers (ETag, Cache-Control, Server-Timing, X-Variant-Cache)
//! - Cache tiers: computed, variant store, hot cache
//! - The size guard: redirect when stored, 403 otherwise
//! - Read-only method enforcement and error mapping
//! - Pass-through, SVG rasterization and GIF sources

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};

use image_variants::error::CodecError;
use image_variants::variant::MediaFormat;
use image_variants::{CacheStatus, VariantKey, VariantOutcome, VariantPolicy};

use super::test_utils::{
    body_bytes, dimensions, gif_bytes, header, is_avif, is_png, jpeg_bytes, png_bytes, svg_bytes,
    FaultyCodec, TestApp,
};

/// Policy whose size limit every real image exceeds.
fn tiny_limit() -> VariantPolicy {
    VariantPolicy::default().with_max_response_bytes(16)
}

// =============================================================================
// Headers and Cache Tiers
// =============================================================================

#[tokio::test]
async fn test_computed_variant_headers() {
    let app = TestApp::builder().build();
    app.store.insert_source("a.jpg", jpeg_bytes(64, 32), None);

    let response = app.get("/a.jpg?width=32", Some("image/webp")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        header(&response, "cache-control"),
        Some("public, max-age=31622400, immutable")
    );
    assert_eq!(header(&response, "x-variant-cache"), Some("miss"));

    let etag = header(&response, "etag").unwrap();
    assert!(etag.starts_with('"') && etag.ends_with('"'));

    let timing = header(&response, "server-timing").unwrap();
    assert!(timing.starts_with("img-download;dur="));
    assert!(timing.contains(",img-transform;dur="));

    let length: usize = header(&response, "content-length").unwrap().parse().unwrap();
    let body = body_bytes(response).await;
    assert_eq!(length, body.len());
    assert_eq!(dimensions(&body), (32, 16));
}

#[tokio::test]
async fn test_store_hit_skips_origin() {
    let app = TestApp::builder().build();
    app.store.insert_source("a.jpg", jpeg_bytes(64, 32), None);

    let first = app.get("/a.jpg?width=32", Some("image/webp")).await;
    let first_etag = header(&first, "etag").unwrap().to_string();
    let first_body = body_bytes(first).await;
    let reads = app.store.get_count();

    let second = app.get("/a.jpg?width=32", Some("image/webp")).await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(header(&second, "x-variant-cache"), Some("store"));
    assert!(header(&second, "server-timing").is_none());
    assert_eq!(header(&second, "etag"), Some(first_etag.as_str()));
    assert_eq!(body_bytes(second).await, first_body);

    // One variant-store lookup, no origin fetch
    assert_eq!(app.store.get_count(), reads + 1);
    assert_eq!(app.store.put_count(), 1);
}

#[tokio::test]
async fn test_hot_cache_hit() {
    let app = TestApp::builder().with_hot_cache().build();
    app.store.insert_source("a.jpg", jpeg_bytes(64, 32), None);

    let first = app.get("/a.jpg?width=32", Some("image/webp")).await;
    assert_eq!(header(&first, "x-variant-cache"), Some("miss"));
    let reads = app.store.get_count();

    let second = app.get("/a.jpg?width=32", Some("image/webp")).await;
    assert_eq!(header(&second, "x-variant-cache"), Some("hit"));
    assert_eq!(app.store.get_count(), reads);
}

#[tokio::test]
async fn test_store_lookup_failure_falls_through_to_origin() {
    let app = TestApp::builder().build();
    app.store.insert_source("a.jpg", jpeg_bytes(16, 16), None);

    // Variant store reads fail, but so do origin reads: the request must
    // reach the origin and surface that failure rather than the lookup's.
    app.store.fail_gets(true);
    let response = app.get("/a.jpg", Some("image/webp")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["error"], "source_fetch_failed");
}

// =============================================================================
// Size Guard
// =============================================================================

#[tokio::test]
async fn test_oversized_redirects_to_query_location() {
    let app = TestApp::builder().policy(tiny_limit()).build();
    app.store.insert_source("photos/a.jpg", jpeg_bytes(64, 32), None);

    let response = app.get("/photos/a.jpg?width=32", Some("image/webp")).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        header(&response, "location"),
        Some("/photos/a.jpg?format=webp&width=32")
    );
    assert_eq!(header(&response, "cache-control"), Some("private, no-store"));
    assert!(header(&response, "server-timing").is_some());
    assert!(body_bytes(response).await.is_empty());

    // Stored despite the size
    assert_eq!(
        app.store.variant_keys(),
        vec!["photos/a.jpg/format=webp,width=32".to_string()]
    );

    // Following the redirect serves the stored copy
    let followed = app
        .get("/photos/a.jpg?format=webp&width=32", Some("image/jpeg"))
        .await;
    assert_eq!(followed.status(), StatusCode::OK);
    assert_eq!(header(&followed, "x-variant-cache"), Some("store"));
    assert_eq!(header(&followed, "content-type"), Some("image/webp"));
}

#[tokio::test]
async fn test_oversized_redirects_to_public_url() {
    let app = TestApp::builder()
        .policy(tiny_limit())
        .public_url("https://cdn.example.com/")
        .build();
    app.store.insert_source("a.jpg", jpeg_bytes(64, 32), None);

    let response = app.get("/a.jpg?width=32", Some("image/webp")).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        header(&response, "location"),
        Some("https://cdn.example.com/a.jpg/format=webp,width=32")
    );
}

#[tokio::test]
async fn test_oversized_without_store_is_forbidden() {
    let app = TestApp::builder()
        .policy(tiny_limit())
        .without_persistence()
        .build();
    app.store.insert_source("a.jpg", jpeg_bytes(64, 32), None);

    let response = app.get("/a.jpg?width=32", Some("image/webp")).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        header(&response, "content-type"),
        Some("text/plain; charset=utf-8")
    );
    assert!(header(&response, "etag").is_none());

    // Only the short message, never image bytes
    let body = body_bytes(response).await;
    assert_eq!(&body[..], b"Variant exceeds the response size limit");
    assert!(app.store.variant_keys().is_empty());
}

#[tokio::test]
async fn test_oversized_with_failed_persist_is_forbidden() {
    let app = TestApp::builder().policy(tiny_limit()).build();
    app.store.insert_source("a.jpg", jpeg_bytes(64, 32), None);
    app.store.fail_puts(true);

    let response = app.get("/a.jpg?width=32", Some("image/webp")).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(app.store.put_count(), 1);
}

#[tokio::test]
async fn test_persist_failure_still_serves() {
    let app = TestApp::builder().build();
    app.store.insert_source("a.jpg", jpeg_bytes(64, 32), None);
    app.store.fail_puts(true);

    let response = app.get("/a.jpg?width=32", Some("image/webp")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(dimensions(&body_bytes(response).await), (32, 16));
    assert!(app.store.variant_keys().is_empty());
}

// =============================================================================
// Methods and Errors
// =============================================================================

#[tokio::test]
async fn test_head_returns_headers_only() {
    let app = TestApp::builder().build();
    app.store.insert_source("a.jpg", jpeg_bytes(64, 32), None);

    let request = Request::builder()
        .method(Method::HEAD)
        .uri("/a.jpg?width=32")
        .header("accept", "image/webp")
        .body(Body::empty())
        .unwrap();
    let response = app.send(request).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), Some("image/webp"));
    let length: usize = header(&response, "content-length").unwrap().parse().unwrap();
    assert!(length > 0);
    assert!(body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn test_non_read_methods_rejected_before_storage() {
    let app = TestApp::builder().build();
    app.store.insert_source("a.jpg", jpeg_bytes(16, 16), None);

    for method in [Method::POST, Method::PUT, Method::DELETE, Method::PATCH] {
        let request = Request::builder()
            .method(method.clone())
            .uri("/a.jpg?width=8")
            .body(Body::empty())
            .unwrap();
        let response = app.send(request).await;

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED, "{}", method);
        assert_eq!(header(&response, "allow"), Some("GET, HEAD"));
        let body: serde_json::Value =
            serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(body["error"], "method_not_allowed");
    }

    assert_eq!(app.store.get_count(), 0);
    assert_eq!(app.store.put_count(), 0);
}

#[tokio::test]
async fn test_missing_source() {
    let app = TestApp::builder().build();

    let response = app.get("/missing.jpg?width=10", Some("image/webp")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["error"], "source_not_found");
    assert_eq!(body["status"], 500);
    assert!(app.store.variant_keys().is_empty());
}

#[tokio::test]
async fn test_corrupt_source() {
    let app = TestApp::builder().build();
    app.store
        .insert_source("bad.jpg", &b"\xFF\xD8\xFF\xE0 not really a jpeg"[..], None);

    let response = app.get("/bad.jpg?width=10", Some("image/webp")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["error"], "transform_failed");
    assert!(app.store.variant_keys().is_empty());
}

#[tokio::test]
async fn test_encoder_failure_not_persisted() {
    let app = TestApp::builder()
        .codec(FaultyCodec::failing(
            MediaFormat::Webp,
            CodecError::ResourceExhausted("out of memory".into()),
        ))
        .build();
    app.store.insert_source("a.jpg", jpeg_bytes(16, 16), None);

    let response = app.get("/a.jpg", Some("image/webp")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(app.store.put_count(), 0);

    // Other formats are unaffected
    let response = app.get("/a.jpg", Some("image/jpeg")).await;
    assert_eq!(response.status(), StatusCode::OK);
}

// =============================================================================
// Source Formats
// =============================================================================

#[tokio::test]
async fn test_original_returns_source_bytes() {
    let app = TestApp::builder().without_edge_normalize().build();
    let source = jpeg_bytes(16, 16);
    app.store.insert_source("a.jpg", source.clone(), Some("image/jpeg"));

    let response = app.get("/a.jpg/original", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), Some("image/jpeg"));
    assert_eq!(body_bytes(response).await, source);
}

#[tokio::test]
async fn test_svg_rasterized_to_png() {
    let app = TestApp::builder().without_edge_normalize().build();
    app.store
        .insert_source("logo.svg", svg_bytes(200, 100), Some("image/svg+xml"));

    let response = app.get("/logo.svg/width=50", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), Some("image/png"));

    let body = body_bytes(response).await;
    assert!(is_png(&body));
    assert_eq!(dimensions(&body), (50, 25));
}

#[tokio::test]
async fn test_gif_to_avif() {
    let app = TestApp::builder().build();
    app.store.insert_source("anim.gif", gif_bytes(24, 24), None);

    let response = app.get("/anim.gif?width=12", Some("image/avif")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), Some("image/avif"));
    assert!(is_avif(&body_bytes(response).await));
}

// =============================================================================
// Service API
// =============================================================================

#[tokio::test]
async fn test_service_serve_outcomes() {
    let app = TestApp::builder().build();
    app.store.insert_source("a.png", png_bytes(40, 20), None);
    let key = VariantKey::from_uri_path("/a.png/format=webp,width=20", 4000).unwrap();

    match app.service.serve(&Method::GET, &key).await.unwrap() {
        VariantOutcome::Ok { record, timing, cache } => {
            assert_eq!(cache, CacheStatus::Miss);
            assert!(timing.is_some());
            assert_eq!(record.content_type, "image/webp");
            assert_eq!(record.source_width, Some(40));
        }
        other => panic!("expected Ok, got {:?}", other),
    }

    match app.service.serve(&Method::HEAD, &key).await.unwrap() {
        VariantOutcome::Ok { cache, .. } => assert_eq!(cache, CacheStatus::Store),
        other => panic!("expected Ok, got {:?}", other),
    }

    assert!(app.service.serve(&Method::POST, &key).await.is_err());
}
