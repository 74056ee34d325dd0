//! Edge normalization tests, driven through the router.
//!
//! Tests verify:
//! - Requests map to canonical keys stored in the variant store
//! - Accept-header negotiation and the explicit format override
//! - Width clamping and unknown-parameter handling
//! - Query and canonical forms of the same variant share one key

use axum::http::StatusCode;

use super::test_utils::{
    body_bytes, dimensions, header, is_avif, is_jpeg, is_webp, jpeg_bytes, png_bytes, TestApp,
};

// =============================================================================
// Negotiation
// =============================================================================

#[tokio::test]
async fn test_query_width_negotiated_webp() {
    let app = TestApp::builder().build();
    app.store
        .insert_source("images/a.jpg", jpeg_bytes(800, 600), Some("image/jpeg"));

    let response = app.get("/images/a.jpg?width=400", Some("image/webp,*/*")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), Some("image/webp"));

    let body = body_bytes(response).await;
    assert!(is_webp(&body));
    assert_eq!(dimensions(&body), (400, 300));

    assert_eq!(
        app.store.variant_keys(),
        vec!["images/a.jpg/format=webp,width=400".to_string()]
    );
}

#[tokio::test]
async fn test_no_accept_falls_back_to_jpeg() {
    let app = TestApp::builder().build();
    app.store.insert_source("a.png", png_bytes(64, 48), None);

    let response = app.get("/a.png", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), Some("image/jpeg"));
    assert!(is_jpeg(&body_bytes(response).await));

    // No query: the format is negotiated and no width marker is added
    assert_eq!(app.store.variant_keys(), vec!["a.png/format=jpeg".to_string()]);
}

#[tokio::test]
async fn test_avif_preferred_over_webp() {
    let app = TestApp::builder().build();
    app.store.insert_source("a.png", png_bytes(32, 32), None);

    let response = app
        .get("/a.png?width=16", Some("image/avif,image/webp,*/*"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), Some("image/avif"));
    assert!(is_avif(&body_bytes(response).await));
}

#[tokio::test]
async fn test_format_query_overrides_accept() {
    let app = TestApp::builder().build();
    app.store.insert_source("a.png", png_bytes(32, 32), None);

    let response = app.get("/a.png?format=JPG", Some("image/webp")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), Some("image/jpeg"));

    // auto means negotiate
    let response = app.get("/a.png?format=auto", Some("image/webp")).await;
    assert_eq!(header(&response, "content-type"), Some("image/webp"));

    assert_eq!(
        app.store.variant_keys(),
        vec!["a.png/format=jpeg".to_string(), "a.png/format=webp".to_string()]
    );
}

// =============================================================================
// Width Handling
// =============================================================================

#[tokio::test]
async fn test_width_clamped_to_max() {
    let app = TestApp::builder().build();
    app.store.insert_source("a.jpg", jpeg_bytes(80, 60), None);

    let response = app.get("/a.jpg?width=5000", Some("image/webp")).await;
    assert_eq!(response.status(), StatusCode::OK);

    // Clamped in the key, never upscaled in the output
    let body = body_bytes(response).await;
    assert_eq!(dimensions(&body), (80, 60));
    assert_eq!(
        app.store.variant_keys(),
        vec!["a.jpg/format=webp,width=4000".to_string()]
    );
}

#[tokio::test]
async fn test_invalid_width_and_unknown_params_dropped() {
    let app = TestApp::builder().build();
    app.store.insert_source("a.jpg", jpeg_bytes(40, 30), None);

    let response = app
        .get("/a.jpg?width=abc&blur=5&crop=1", Some("image/webp"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.store.variant_keys(), vec!["a.jpg/format=webp".to_string()]);
}

// =============================================================================
// Canonical Forms
// =============================================================================

#[tokio::test]
async fn test_query_and_canonical_forms_share_key() {
    let app = TestApp::builder().build();
    app.store.insert_source("a.jpg", jpeg_bytes(100, 50), None);

    let first = app.get("/a.jpg/format=webp,width=50", None).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(header(&first, "x-variant-cache"), Some("miss"));

    // Query form with negotiation lands on the same stored key
    let second = app.get("/a.jpg?width=50", Some("image/webp")).await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(header(&second, "x-variant-cache"), Some("store"));

    assert_eq!(app.store.variant_keys(), vec!["a.jpg/format=webp,width=50".to_string()]);
}

#[tokio::test]
async fn test_query_overrides_embedded_operations() {
    let app = TestApp::builder().build();
    app.store.insert_source("a.jpg", jpeg_bytes(100, 50), None);

    let response = app
        .get("/a.jpg/format=webp,width=80?width=20", Some("image/avif"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        app.store.variant_keys(),
        vec!["a.jpg/format=webp,width=20".to_string()]
    );
}

#[tokio::test]
async fn test_percent_encoded_source_path() {
    let app = TestApp::builder().build();
    app.store
        .insert_source("my photos/a b.jpg", jpeg_bytes(20, 20), None);

    let response = app.get("/my%20photos/a%20b.jpg?width=10", Some("image/webp")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        app.store.variant_keys(),
        vec!["my photos/a b.jpg/format=webp,width=10".to_string()]
    );
}

#[tokio::test]
async fn test_edge_normalizer_disabled_serves_canonical_paths_only() {
    let app = TestApp::builder().without_edge_normalize().build();
    let source = png_bytes(16, 16);
    app.store.insert_source("a.png", source.clone(), None);

    // Without rewriting, a bare path is the untouched original
    let response = app.get("/a.png?width=8", Some("image/webp")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), Some("image/png"));
    assert_eq!(body_bytes(response).await, source);
}
