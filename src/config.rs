//! Configuration management for the variant service.
//!
//! Every option can be given on the command line or through an environment
//! variable with the `IMGV_` prefix. Variant policy options are shared by all
//! subcommands so that `serve` and `warm` compute byte-identical variants.
//!
//! # Environment Variables
//!
//! - `IMGV_HOST` - Server bind address (default: 0.0.0.0)
//! - `IMGV_PORT` - Server port (default: 3000)
//! - `IMGV_ORIGIN_BUCKET` - Bucket holding source images (required)
//! - `IMGV_VARIANT_BUCKET` - Bucket for computed variants (optional)
//! - `IMGV_VARIANT_PUBLIC_URL` - Public base URL of the variant bucket
//! - `IMGV_S3_ENDPOINT` - Custom S3 endpoint for S3-compatible services
//! - `IMGV_S3_REGION` - AWS region (default: us-east-1)
//! - `IMGV_MAX_WIDTH` - Largest width served (default: 4000)
//! - `IMGV_COMMON_WIDTHS` - Pre-computed widths (default: 320,640,960,1280,1920)
//! - `IMGV_MAX_RESPONSE_BYTES` - Largest inline response (default: 4700000)
//! - `IMGV_CACHE_CONTROL` - Cache-Control for variants
//! - `IMGV_FANOUT_FORMATS` - Formats pre-computed on upload (default: webp,avif)
//! - `IMGV_EVENT_SECRET` - HMAC secret for upload webhook signatures
//! - `IMGV_CACHE_SIZE` - Hot cache size in bytes, 0 to disable (default: 64MB)

use clap::{Args, Parser, Subcommand};

use crate::variant::policy::{
    QualityTable, DEFAULT_CACHE_CONTROL, DEFAULT_LARGE_SOURCE_BYTES, DEFAULT_MAX_RESPONSE_BYTES,
    DEFAULT_MAX_WIDTH,
};
use crate::variant::{OutputFormat, VariantPolicy, DEFAULT_VARIANT_CACHE_CAPACITY};

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default AWS region.
pub const DEFAULT_REGION: &str = "us-east-1";

// =============================================================================
// CLI Arguments
// =============================================================================

/// image-variants - resized, re-encoded and format-negotiated images from S3.
#[derive(Parser, Debug, Clone)]
#[command(name = "image-variants")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the HTTP server.
    Serve(ServeConfig),

    /// Pre-compute the variant matrix for one source, as an upload would.
    Warm(WarmConfig),

    /// Print the canonical variant key for a request.
    Normalize(NormalizeConfig),

    /// Check connectivity to the configured buckets.
    Check(CheckConfig),
}

/// Origin and variant storage.
#[derive(Args, Debug, Clone)]
pub struct StorageArgs {
    /// S3 bucket holding the source images.
    #[arg(long, env = "IMGV_ORIGIN_BUCKET")]
    pub origin_bucket: String,

    /// S3 bucket for computed variants.
    ///
    /// Without it nothing is persisted: oversized variants get a 403 and the
    /// upload webhook is disabled.
    #[arg(long, env = "IMGV_VARIANT_BUCKET")]
    pub variant_bucket: Option<String>,

    /// Public base URL of the variant bucket, used as the redirect target
    /// for oversized variants.
    #[arg(long, env = "IMGV_VARIANT_PUBLIC_URL")]
    pub variant_public_url: Option<String>,

    /// Custom S3 endpoint URL for S3-compatible services (MinIO, etc.).
    #[arg(long, env = "IMGV_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// AWS region for S3.
    #[arg(long, default_value = DEFAULT_REGION, env = "IMGV_S3_REGION")]
    pub s3_region: String,
}

impl StorageArgs {
    pub fn validate(&self) -> Result<(), String> {
        if self.origin_bucket.is_empty() {
            return Err(
                "Origin bucket is required. Set --origin-bucket or IMGV_ORIGIN_BUCKET".to_string(),
            );
        }
        if self.variant_bucket.as_deref() == Some("") {
            return Err("variant_bucket must not be empty when set".to_string());
        }
        if self.variant_public_url.is_some() && self.variant_bucket.is_none() {
            return Err("variant_public_url requires a variant bucket".to_string());
        }
        Ok(())
    }
}

/// Variant policy, shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct PolicyArgs {
    /// Largest width served; larger requests are clamped.
    #[arg(long, default_value_t = DEFAULT_MAX_WIDTH, env = "IMGV_MAX_WIDTH")]
    pub max_width: u32,

    /// Widths pre-computed on upload (comma-separated).
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "320,640,960,1280,1920",
        env = "IMGV_COMMON_WIDTHS"
    )]
    pub common_widths: Vec<u32>,

    /// Largest computed variant served inline, in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_RESPONSE_BYTES, env = "IMGV_MAX_RESPONSE_BYTES")]
    pub max_response_bytes: usize,

    /// Cache-Control header for variant responses and stored variants.
    #[arg(long, default_value = DEFAULT_CACHE_CONTROL, env = "IMGV_CACHE_CONTROL")]
    pub cache_control: String,

    /// JPEG quality (1-100).
    #[arg(long, default_value_t = 80, env = "IMGV_JPEG_QUALITY")]
    pub jpeg_quality: u8,

    /// WebP quality (1-100).
    #[arg(long, default_value_t = 82, env = "IMGV_WEBP_QUALITY")]
    pub webp_quality: u8,

    /// AVIF quality (1-100).
    #[arg(long, default_value_t = 70, env = "IMGV_AVIF_QUALITY")]
    pub avif_quality: u8,

    /// AVIF encoder speed (1 = most effort, 10 = fastest).
    #[arg(long, default_value_t = 4, env = "IMGV_AVIF_SPEED")]
    pub avif_speed: u8,

    /// Formats pre-computed on upload, most efficient first (comma-separated).
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "webp,avif",
        value_parser = parse_output_format,
        env = "IMGV_FANOUT_FORMATS"
    )]
    pub fanout_formats: Vec<OutputFormat>,

    /// Sources larger than this (bytes) get a reduced fan-out matrix.
    #[arg(long, default_value_t = DEFAULT_LARGE_SOURCE_BYTES, env = "IMGV_LARGE_SOURCE_BYTES")]
    pub large_source_bytes: u64,
}

fn parse_output_format(value: &str) -> Result<OutputFormat, String> {
    OutputFormat::parse(value).ok_or_else(|| {
        format!("unknown format '{}' (expected jpeg, webp or avif)", value)
    })
}

impl PolicyArgs {
    /// Build and validate the process-wide policy.
    pub fn to_policy(&self) -> Result<VariantPolicy, String> {
        let mut quality = QualityTable::default();
        quality.jpeg.quality = self.jpeg_quality;
        quality.webp.quality = self.webp_quality;
        quality.avif.quality = self.avif_quality;
        quality.avif.speed = self.avif_speed;

        let policy = VariantPolicy::default()
            .with_max_width(self.max_width)
            .with_common_widths(self.common_widths.iter().copied())
            .with_max_response_bytes(self.max_response_bytes)
            .with_cache_control(self.cache_control.as_str())
            .with_quality(quality)
            .with_fanout_formats(self.fanout_formats.clone())
            .with_large_source_bytes(self.large_source_bytes);

        policy.validate()?;
        Ok(policy)
    }
}

/// `serve` subcommand.
#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "IMGV_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "IMGV_PORT")]
    pub port: u16,

    #[command(flatten)]
    pub storage: StorageArgs,

    #[command(flatten)]
    pub policy: PolicyArgs,

    /// Hot cache size in bytes (0 disables it).
    #[arg(long, default_value_t = DEFAULT_VARIANT_CACHE_CAPACITY, env = "IMGV_CACHE_SIZE")]
    pub cache_size: usize,

    /// Secret for verifying upload webhook signatures.
    ///
    /// If not set, webhook bodies are accepted unsigned.
    #[arg(long, env = "IMGV_EVENT_SECRET")]
    pub event_secret: Option<String>,

    /// Allowed CORS origins (comma-separated). If not specified, allows any origin.
    #[arg(long, env = "IMGV_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    /// Serve canonical variant paths only, without rewriting requests.
    #[arg(long, default_value_t = false, env = "IMGV_NO_EDGE_NORMALIZE")]
    pub no_edge_normalize: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.storage.validate()?;
        self.policy.to_policy()?;

        if self.event_secret.as_deref().is_some_and(|s| s.is_empty()) {
            return Err("event_secret must not be empty when set".to_string());
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// `warm` subcommand.
#[derive(Args, Debug, Clone)]
pub struct WarmConfig {
    /// Source object key to warm.
    #[arg(long)]
    pub key: String,

    /// Declared content type of the upload.
    #[arg(long)]
    pub content_type: Option<String>,

    #[command(flatten)]
    pub storage: StorageArgs,

    #[command(flatten)]
    pub policy: PolicyArgs,

    /// Enable verbose logging.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl WarmConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.storage.validate()?;
        if self.storage.variant_bucket.is_none() {
            return Err(
                "warm requires a variant bucket. Set --variant-bucket or IMGV_VARIANT_BUCKET"
                    .to_string(),
            );
        }
        if self.key.trim_matches('/').is_empty() {
            return Err("key must name a source object".to_string());
        }
        self.policy.to_policy()?;
        Ok(())
    }
}

/// `normalize` subcommand.
#[derive(Args, Debug, Clone)]
pub struct NormalizeConfig {
    /// Request path with optional query, e.g. "/images/a.jpg?width=500".
    pub path: String,

    /// Accept header value used for format negotiation.
    #[arg(long)]
    pub accept: Option<String>,

    #[command(flatten)]
    pub policy: PolicyArgs,
}

impl NormalizeConfig {
    /// Split the argument into path and query.
    pub fn path_and_query(&self) -> (&str, Option<&str>) {
        match self.path.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (self.path.as_str(), None),
        }
    }
}

/// `check` subcommand.
#[derive(Args, Debug, Clone)]
pub struct CheckConfig {
    #[command(flatten)]
    pub storage: StorageArgs,

    /// Also fetch this source object and report its type and size.
    #[arg(long)]
    pub test_source: Option<String>,

    /// Enable verbose logging.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

// =============================================================================
// Tests
// =============================================================================
