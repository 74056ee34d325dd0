//! image-variants - serves image variants from S3.
//!
//! This binary starts the HTTP server and configures all components.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use image_variants::{
    config::{CheckConfig, Cli, Command, NormalizeConfig, ServeConfig, StorageArgs, WarmConfig},
    create_s3_client,
    server::{create_router, AppState, EventSigner, RouterConfig},
    variant::{MediaFormat, Transformer},
    EdgeRequest, OriginStore, RasterCodec, Rewrite, S3OriginStore, S3VariantStore, UploadEvent,
    VariantCache, VariantPolicy, VariantService, VariantStore, WarmCache,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Serve(config) => run_serve(config).await,
        Command::Warm(config) => run_warm(config).await,
        Command::Normalize(config) => run_normalize(config),
        Command::Check(config) => run_check(config).await,
    }
}

// =============================================================================
// Shared Setup
// =============================================================================

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "image_variants=debug,tower_http=debug"
    } else {
        "image_variants=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

struct Stores {
    origin: S3OriginStore,
    variants: Option<S3VariantStore>,
}

async fn build_stores(storage: &StorageArgs) -> Stores {
    let client = create_s3_client(storage.s3_endpoint.as_deref(), &storage.s3_region).await;

    let origin = S3OriginStore::new(client.clone(), storage.origin_bucket.as_str());
    let variants = storage.variant_bucket.as_deref().map(|bucket| {
        let store = S3VariantStore::new(client.clone(), bucket);
        match storage.variant_public_url.as_deref() {
            Some(base) => store.with_public_base_url(base),
            None => store,
        }
    });

    Stores { origin, variants }
}

/// Fail fast if a configured bucket is unreachable.
async fn check_stores(stores: &Stores) -> Result<(), String> {
    stores
        .origin
        .check()
        .await
        .map_err(|e| format!("origin bucket '{}': {}", stores.origin.bucket(), e))?;

    if let Some(variants) = &stores.variants {
        variants
            .check()
            .await
            .map_err(|e| format!("variant bucket '{}': {}", variants.bucket(), e))?;
    }

    Ok(())
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }
    let policy = match config.policy.to_policy() {
        Ok(policy) => Arc::new(policy),
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("image-variants v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Origin bucket: {}", config.storage.origin_bucket);
    match &config.storage.variant_bucket {
        Some(bucket) => info!("  Variant bucket: {}", bucket),
        None => {
            warn!("  Variant bucket: none - variants are not persisted");
            warn!("        oversized variants get 403 and the upload webhook is disabled");
        }
    }
    if let Some(ref endpoint) = config.storage.s3_endpoint {
        info!("  S3 endpoint: {}", endpoint);
    }
    info!("  S3 region: {}", config.storage.s3_region);
    info!(
        "  Max width: {}, common widths: {:?}, max response: {} bytes",
        policy.max_width, policy.common_widths, policy.max_response_bytes
    );
    info!("  Hot cache: {}MB", config.cache_size / (1024 * 1024));
    if config.event_secret.is_none() {
        warn!("  Upload webhook signatures: DISABLED");
    }

    let stores = build_stores(&config.storage).await;

    info!("Connecting to S3...");
    if let Err(e) = check_stores(&stores).await {
        error!("  Failed to connect to S3: {}", e);
        error!("  Please check:");
        error!("    - Your AWS credentials are configured correctly");
        error!("    - The buckets exist and are accessible");
        error!("    - The S3 endpoint is correct (if using MinIO/custom S3)");
        return ExitCode::FAILURE;
    }
    info!("  Connected successfully");

    let origin: Arc<dyn OriginStore> = Arc::new(stores.origin);
    let variants: Option<Arc<dyn VariantStore>> = stores
        .variants
        .map(|store| Arc::new(store) as Arc<dyn VariantStore>);

    let mut service = VariantService::new(
        Arc::clone(&origin),
        Arc::new(RasterCodec::new()),
        Arc::clone(&policy),
    );
    if config.cache_size > 0 {
        service = service.with_cache(Arc::new(VariantCache::with_capacity(config.cache_size)));
    }
    if let Some(variants) = &variants {
        service = service.with_variant_store(Arc::clone(variants));
    }

    let mut state = AppState::new(Arc::new(service));
    if let Some(variants) = variants {
        let warm = WarmCache::new(
            origin,
            variants,
            state.service.transformer().clone(),
            Arc::clone(&policy),
        );
        state = state.with_warm_cache(Arc::new(warm));
    }
    if let Some(ref secret) = config.event_secret {
        state = state.with_signer(EventSigner::new(secret));
    }

    let router = create_router(state, build_router_config(&config));

    let addr = config.bind_address();
    info!("Server listening on: http://{}", addr);
    info!("  curl http://{}/health", addr);
    info!("  curl -H 'Accept: image/webp' http://{}/<image>?width=640", addr);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Server stopped");
    ExitCode::SUCCESS
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutting down"),
        Err(e) => {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

/// Build RouterConfig from the application ServeConfig.
fn build_router_config(config: &ServeConfig) -> RouterConfig {
    let mut router_config = RouterConfig::new()
        .with_tracing(!config.no_tracing)
        .with_edge_normalize(!config.no_edge_normalize);

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config
}

// =============================================================================
// Warm Command
// =============================================================================

async fn run_warm(config: WarmConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }
    let policy: Arc<VariantPolicy> = match config.policy.to_policy() {
        Ok(policy) => Arc::new(policy),
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let stores = build_stores(&config.storage).await;
    let Some(variants) = stores.variants else {
        error!("Configuration error: warm requires a variant bucket");
        return ExitCode::FAILURE;
    };

    let transformer = Transformer::new(Arc::new(RasterCodec::new()), &policy);
    let warm = WarmCache::new(Arc::new(stores.origin), Arc::new(variants), transformer, policy);

    let mut event = UploadEvent::new(config.storage.origin_bucket.as_str(), config.key.as_str());
    if let Some(ref content_type) = config.content_type {
        event = event.with_content_type(content_type.as_str());
    }

    let report = match warm.warm(&event).await {
        Ok(report) => report,
        Err(e) => {
            error!("Warm-cache fan-out failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            error!("Failed to serialize report: {}", e);
            return ExitCode::FAILURE;
        }
    }

    if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

// =============================================================================
// Normalize Command
// =============================================================================

fn run_normalize(config: NormalizeConfig) -> ExitCode {
    let policy = match config.policy.to_policy() {
        Ok(policy) => policy,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let (path, query) = config.path_and_query();
    let request = EdgeRequest::new(path, query, config.accept.as_deref());

    match image_variants::normalize_or_passthrough(&request, &policy) {
        Rewrite::Canonical(normalized) => {
            println!("URI:          {}", normalized.uri);
            println!("Variant key:  {}", normalized.key.object_key());
            println!("Common width: {}", normalized.common_width);
            ExitCode::SUCCESS
        }
        Rewrite::PassThrough { reason } => {
            println!("Pass-through: {}", reason);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Check Command
// =============================================================================

async fn run_check(config: CheckConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    println!("image-variants Configuration Check");
    println!("══════════════════════════════════");
    println!();

    if let Err(e) = config.storage.validate() {
        println!("✗ Storage: {}", e);
        return ExitCode::FAILURE;
    }
    println!("✓ Origin bucket: {}", config.storage.origin_bucket);
    if let Some(ref bucket) = config.storage.variant_bucket {
        println!("✓ Variant bucket: {}", bucket);
    }
    if let Some(ref endpoint) = config.storage.s3_endpoint {
        println!("✓ Endpoint: {}", endpoint);
    }
    println!("✓ Region: {}", config.storage.s3_region);
    println!();

    let stores = build_stores(&config.storage).await;

    print!("Testing S3 connection... ");
    if let Err(e) = check_stores(&stores).await {
        println!("✗ failed");
        println!();
        println!("Error: {}", e);
        println!();
        println!("Please check:");
        println!("  - Your AWS credentials are configured correctly");
        println!("  - The buckets exist and are accessible");
        if config.storage.s3_endpoint.is_some() {
            println!("  - The S3 endpoint is correct and reachable");
        }
        return ExitCode::FAILURE;
    }
    println!("✓ success");

    if let Some(ref path) = config.test_source {
        println!();
        print!("Testing source '{}'... ", path);

        match stores.origin.get(path).await {
            Ok(source) => {
                println!("✓ found");
                println!("  Size: {:.2} MB", source.size as f64 / (1024.0 * 1024.0));
                if let Some(ref content_type) = source.content_type {
                    println!("  Content-Type: {}", content_type);
                }
                match MediaFormat::detect(&source.bytes, source.content_type.as_deref(), path) {
                    Some(format) => println!("  Detected format: {}", format.content_type()),
                    None => println!("  Detected format: ✗ unsupported"),
                }
            }
            Err(e) => {
                println!("✗ {}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    println!();
    println!("══════════════════════════════════");
    println!("✓ All checks passed!");

    ExitCode::SUCCESS
}
