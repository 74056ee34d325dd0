//! Router configuration for the variant service.
//!
//! # Route Structure
//!
//! ```text
//! /health                 - Health check
//! /events/upload          - Upload webhook (POST, optionally signed)
//! /{*key}                 - Variant endpoint, behind the edge normalizer
//! ```
//!
//! # Example
//!
//! ```ignore
//! use image_variants::server::{create_router, AppState, RouterConfig};
//!
//! let state = AppState::new(Arc::new(service));
//! let config = RouterConfig::new()
//!     .with_cors_origins(vec!["https://example.com".to_string()]);
//!
//! let router = create_router(state, config);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::time::Duration;

use axum::{
    middleware,
    routing::{any, get, post},
    Router,
};
use http::header::{ACCEPT, CONTENT_TYPE};
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::edge::edge_normalize;
use super::handlers::{health_handler, upload_event_handler, variant_handler, AppState};

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Whether to enable request tracing
    pub enable_tracing: bool,

    /// Whether to canonicalize variant requests before routing
    pub edge_normalize: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterConfig {
    /// Any CORS origin, tracing on, edge normalizer on.
    pub fn new() -> Self {
        Self {
            cors_origins: None,
            enable_tracing: true,
            edge_normalize: true,
        }
    }

    /// Set specific allowed CORS origins.
    ///
    /// Pass an empty vec to disallow all cross-origin requests.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    /// Allow any CORS origin.
    pub fn with_cors_any_origin(mut self) -> Self {
        self.cors_origins = None;
        self
    }

    /// Enable or disable request tracing.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }

    /// Enable or disable the edge normalizer. Without it, clients must send
    /// canonical variant paths.
    pub fn with_edge_normalize(mut self, enabled: bool) -> Self {
        self.edge_normalize = enabled;
        self
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the application router.
pub fn create_router(state: AppState, config: RouterConfig) -> Router {
    let policy = state.service.policy().clone();

    let variant_routes = Router::new().route("/{*key}", any(variant_handler));
    let variant_routes = if config.edge_normalize {
        variant_routes.route_layer(middleware::from_fn_with_state(policy, edge_normalize))
    } else {
        variant_routes
    };

    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/events/upload", post(upload_event_handler))
        .merge(variant_routes)
        .with_state(state)
        .layer(build_cors_layer(&config));

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers([ACCEPT, CONTENT_TYPE])
        .max_age(Duration::from_secs(86400));

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        Some(origins) if origins.is_empty() => cors,
        Some(origins) => {
            let parsed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
