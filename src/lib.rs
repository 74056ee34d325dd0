//! # image-variants
//!
//! Serves resized, re-encoded and format-negotiated variants of images kept
//! in S3-compatible object storage.
//!
//! ## Features
//!
//! - **Edge normalization**: every request maps to one canonical variant key,
//!   with the output format negotiated from the `Accept` header
//! - **On-demand variants**: fetch, orient, resize and encode, then persist
//!   the result to a variant bucket
//! - **Size guard**: variants too large to inline are redirected to their
//!   stored copy
//! - **Warm cache**: an upload webhook pre-computes the common variants
//!   concurrently
//!
//! ## Architecture
//!
//! - [`variant`] - Keys, normalization, policy and the serve/warm pipelines
//! - [`codec`] - Decoding, orientation, resizing and encoding
//! - [`io`] - Origin and variant stores (S3 and in-memory)
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use image_variants::{
//!     create_router, AppState, MemoryStore, RasterCodec, RouterConfig, VariantPolicy,
//!     VariantService,
//! };
//!
//! let store = Arc::new(MemoryStore::new("images"));
//! let service = VariantService::new(
//!     store.clone(),
//!     Arc::new(RasterCodec::new()),
//!     Arc::new(VariantPolicy::default()),
//! )
//! .with_variant_store(store);
//!
//! let router = create_router(AppState::new(Arc::new(service)), RouterConfig::new());
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod io;
pub mod server;
pub mod variant;

// Re-export commonly used types
pub use codec::{Codec, DecodedImage, ImageMetadata, RasterCodec};
pub use config::{
    CheckConfig, Cli, Command, NormalizeConfig, PolicyArgs, ServeConfig, StorageArgs, WarmConfig,
};
pub use error::{CodecError, IoError, NormalizeError, SignatureError, VariantError};
pub use io::{
    create_s3_client, MemoryStore, OriginStore, S3OriginStore, S3VariantStore, SourceObject,
    VariantStore,
};
pub use server::{
    create_router, edge_normalize, health_handler, upload_event_handler, variant_handler,
    AppState, ErrorResponse, EventSigner, HealthResponse, RouterConfig, UploadEventResponse,
};
pub use variant::{
    normalize, normalize_or_passthrough, CacheStatus, EdgeRequest, MediaFormat, OperationSet,
    OutputFormat, QualityParams, QualityTable, Rewrite, UploadEvent, VariantCache, VariantKey,
    VariantOutcome, VariantPolicy, VariantRecord, VariantService, WarmCache, WarmReport,
};
