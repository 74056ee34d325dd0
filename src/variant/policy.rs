//! Variant policy: the single immutable configuration shared by the
//! normalizer, the orchestrator and the warm-cache fan-out.
//!
//! The policy is built once at startup and handed around as
//! `Arc<VariantPolicy>`; nothing recomputes it per request.

use super::format::{MediaFormat, OutputFormat};

// =============================================================================
// Policy Constants
// =============================================================================

/// Widest variant that may be requested. Wider requests clamp to this.
pub const DEFAULT_MAX_WIDTH: u32 = 4000;

/// Largest freshly computed variant served inline. Larger results are
/// redirected to the variant store, or refused when they could not be stored.
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 4_700_000;

/// Cache-Control sent with variants and stored alongside them.
pub const DEFAULT_CACHE_CONTROL: &str = "public, max-age=31622400, immutable";

/// Cache-Control on oversized-variant redirects.
pub const REDIRECT_CACHE_CONTROL: &str = "private, no-store";

/// Widths pre-computed by the warm-cache fan-out.
///
/// There is no default target width: a request without `width` is served at
/// source dimensions.
pub const DEFAULT_COMMON_WIDTHS: [u32; 5] = [320, 640, 960, 1280, 1920];

/// Formats computed by the fan-out, most bandwidth-efficient first.
pub const DEFAULT_FANOUT_FORMATS: [OutputFormat; 2] = [OutputFormat::Webp, OutputFormat::Avif];

/// Sources above this size get a reduced fan-out matrix and lower quality.
pub const DEFAULT_LARGE_SOURCE_BYTES: u64 = 10 * 1024 * 1024;

/// Quality never adapts below this.
pub const MIN_ADAPTIVE_QUALITY: u8 = 30;

/// Target widths at or below this get a small quality reduction.
pub const SMALL_TARGET_WIDTH: u32 = 640;

// =============================================================================
// Quality Tables
// =============================================================================

/// Encoder parameters for one format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityParams {
    /// Encoder quality (1-100)
    pub quality: u8,

    /// Encoder speed (1 = slowest/most effort, 10 = fastest). AVIF only.
    pub speed: u8,

    /// Request progressive scans. JPEG only.
    pub progressive: bool,
}

impl QualityParams {
    pub const fn new(quality: u8, speed: u8, progressive: bool) -> Self {
        Self {
            quality,
            speed,
            progressive,
        }
    }
}

/// Per-format encoder parameters, keyed by format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityTable {
    pub jpeg: QualityParams,
    pub webp: QualityParams,
    pub avif: QualityParams,

    /// Used for pass-through re-encodes (PNG, GIF) where quality is moot
    pub lossless: QualityParams,
}

impl Default for QualityTable {
    fn default() -> Self {
        Self {
            jpeg: QualityParams::new(80, 0, true),
            webp: QualityParams::new(82, 0, false),
            avif: QualityParams::new(70, 4, false),
            lossless: QualityParams::new(100, 0, false),
        }
    }
}

impl QualityTable {
    pub fn get(&self, format: OutputFormat) -> QualityParams {
        match format {
            OutputFormat::Jpeg => self.jpeg,
            OutputFormat::Webp => self.webp,
            OutputFormat::Avif => self.avif,
        }
    }

    /// Parameters for encoding one variant to `media`.
    ///
    /// Lossy targets are [`adapted`](Self::adapted) to the source; PNG and GIF
    /// re-encodes use the lossless entry. Every code path that computes a key
    /// goes through here, so a key always maps to the same encoder settings.
    pub fn for_variant(
        &self,
        media: MediaFormat,
        width: Option<u32>,
        source_size: u64,
        source_width: u32,
        large_source_bytes: u64,
    ) -> QualityParams {
        let format = match media {
            MediaFormat::Jpeg => OutputFormat::Jpeg,
            MediaFormat::Webp => OutputFormat::Webp,
            MediaFormat::Avif => OutputFormat::Avif,
            MediaFormat::Png | MediaFormat::Gif | MediaFormat::Svg => return self.lossless,
        };
        self.adapted(format, width, source_size, Some(source_width), large_source_bytes)
    }

    /// Quality for a fan-out cell, adapted to the source and target.
    ///
    /// Deterministic in `(format, width, source_size, source_width)`:
    /// large sources lose 10 points and encode faster, small targets lose 5
    /// points unless the target is at least as wide as the source. An unknown
    /// source width counts as wider than any target.
    pub fn adapted(
        &self,
        format: OutputFormat,
        width: Option<u32>,
        source_size: u64,
        source_width: Option<u32>,
        large_source_bytes: u64,
    ) -> QualityParams {
        let mut params = self.get(format);
        let mut quality = params.quality;

        if source_size > large_source_bytes {
            quality = quality.saturating_sub(10);
            if format == OutputFormat::Avif {
                params.speed = (params.speed + 2).min(10);
            }
        }

        if let Some(width) = width {
            if width <= SMALL_TARGET_WIDTH && source_width.map_or(true, |sw| width < sw) {
                quality = quality.saturating_sub(5);
            }
        }

        params.quality = quality.max(MIN_ADAPTIVE_QUALITY);
        params
    }
}

// =============================================================================
// Variant Policy
// =============================================================================

/// Process-wide variant configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantPolicy {
    /// Requested widths clamp to this
    pub max_width: u32,

    /// Widths eligible for pre-computation, ascending
    pub common_widths: Vec<u32>,

    /// Largest computed variant served inline
    pub max_response_bytes: usize,

    /// Cache-Control for variant responses and stored records
    pub cache_control: String,

    /// Encoder parameters per format
    pub quality: QualityTable,

    /// Formats computed by the fan-out, most efficient first
    pub fanout_formats: Vec<OutputFormat>,

    /// Threshold above which the fan-out matrix is reduced
    pub large_source_bytes: u64,
}

impl Default for VariantPolicy {
    fn default() -> Self {
        Self {
            max_width: DEFAULT_MAX_WIDTH,
            common_widths: DEFAULT_COMMON_WIDTHS.to_vec(),
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
            cache_control: DEFAULT_CACHE_CONTROL.to_string(),
            quality: QualityTable::default(),
            fanout_formats: DEFAULT_FANOUT_FORMATS.to_vec(),
            large_source_bytes: DEFAULT_LARGE_SOURCE_BYTES,
        }
    }
}

impl VariantPolicy {
    /// Set the common widths, sorted and de-duplicated, clamped to the max.
    pub fn with_common_widths(mut self, widths: impl IntoIterator<Item = u32>) -> Self {
        let mut widths: Vec<u32> = widths
            .into_iter()
            .filter(|w| *w > 0)
            .map(|w| w.min(self.max_width))
            .collect();
        widths.sort_unstable();
        widths.dedup();
        self.common_widths = widths;
        self
    }

    pub fn with_max_width(mut self, max_width: u32) -> Self {
        self.max_width = max_width;
        self
    }

    pub fn with_max_response_bytes(mut self, bytes: usize) -> Self {
        self.max_response_bytes = bytes;
        self
    }

    pub fn with_cache_control(mut self, cache_control: impl Into<String>) -> Self {
        self.cache_control = cache_control.into();
        self
    }

    pub fn with_quality(mut self, quality: QualityTable) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_fanout_formats(mut self, formats: Vec<OutputFormat>) -> Self {
        self.fanout_formats = formats;
        self
    }

    pub fn with_large_source_bytes(mut self, bytes: u64) -> Self {
        self.large_source_bytes = bytes;
        self
    }

    /// Whether a width belongs to the Common-Width Set.
    pub fn is_common_width(&self, width: u32) -> bool {
        self.common_widths.binary_search(&width).is_ok()
    }

    /// Check invariants. Called once when the policy is built from config.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_width == 0 {
            return Err("max_width must be greater than 0".to_string());
        }
        if self.max_response_bytes == 0 {
            return Err("max_response_bytes must be greater than 0".to_string());
        }
        if self.fanout_formats.is_empty() {
            return Err("at least one fan-out format is required".to_string());
        }
        if self.cache_control.trim().is_empty() {
            return Err("cache_control must not be empty".to_string());
        }
        if self.common_widths.iter().any(|w| *w > self.max_width) {
            return Err("common widths must not exceed max_width".to_string());
        }
        for (name, params) in [
            ("jpeg", self.quality.jpeg),
            ("webp", self.quality.webp),
            ("avif", self.quality.avif),
        ] {
            if params.quality == 0 || params.quality > 100 {
                return Err(format!("{} quality must be between 1 and 100", name));
            }
        }
        if self.quality.avif.speed == 0 || self.quality.avif.speed > 10 {
            return Err("avif speed must be between 1 and 10".to_string());
        }
        Ok(())
    }
}
