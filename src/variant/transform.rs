//! Transform pipeline: decode, rotate, resize, re-encode.
//!
//! Shared by the on-demand orchestrator and the warm-cache fan-out so both
//! paths produce the same bytes for the same key. Codec work is CPU-bound and
//! runs on the blocking pool.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use image::metadata::Orientation;

use crate::codec::{Codec, ImageMetadata};
use crate::error::CodecError;
use crate::io::SourceObject;

use super::format::MediaFormat;
use super::key::{OperationSet, VariantKey};
use super::policy::{QualityTable, VariantPolicy};
use super::record::VariantRecord;

// =============================================================================
// Timing
// =============================================================================

/// Timing signals reported in the `Server-Timing` header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerTiming {
    pub download: Duration,
    pub transform: Duration,
}

impl ServerTiming {
    pub fn header_value(&self) -> String {
        format!(
            "img-download;dur={:.1},img-transform;dur={:.1}",
            self.download.as_secs_f64() * 1000.0,
            self.transform.as_secs_f64() * 1000.0
        )
    }
}

// =============================================================================
// Transform Output
// =============================================================================

/// Bytes produced for one key.
#[derive(Debug, Clone)]
pub struct Transformed {
    pub bytes: Bytes,

    /// Format of `bytes`
    pub format: MediaFormat,

    /// Encoder quality, for lossy re-encodes
    pub quality: Option<u8>,

    /// Source metadata; `None` when the source passed through undecoded
    pub metadata: Option<ImageMetadata>,
}

impl Transformed {
    pub fn into_record(self, cache_control: &str) -> VariantRecord {
        let mut record = VariantRecord::new(self.bytes, self.format.content_type(), cache_control)
            .with_quality(self.quality);
        record.source_width = self.metadata.map(|m| m.display_width());
        record
    }
}

/// Media type produced for a source and operation set.
///
/// Without a format operation the source format is kept, except SVG, which
/// always rasterizes to PNG.
pub fn target_format(source: MediaFormat, operations: &OperationSet) -> MediaFormat {
    match operations.format {
        Some(format) => format.media(),
        None if source == MediaFormat::Svg => MediaFormat::Png,
        None => source,
    }
}

// =============================================================================
// Transformer
// =============================================================================

/// Runs the transform pipeline for a key against fetched source bytes.
///
/// Encoder parameters are derived from the policy's quality table, the source
/// size and the decoded source width, so the result depends only on the key
/// and the source.
#[derive(Clone)]
pub struct Transformer {
    codec: Arc<dyn Codec>,
    quality: QualityTable,
    large_source_bytes: u64,
}

impl Transformer {
    pub fn new(codec: Arc<dyn Codec>, policy: &VariantPolicy) -> Self {
        Self {
            codec,
            quality: policy.quality.clone(),
            large_source_bytes: policy.large_source_bytes,
        }
    }

    pub async fn transform(
        &self,
        key: &VariantKey,
        source: &SourceObject,
    ) -> Result<Transformed, CodecError> {
        let format = MediaFormat::detect(&source.bytes, source.content_type.as_deref(), &key.source)
            .ok_or_else(|| {
                CodecError::UnsupportedFormat(format!(
                    "cannot determine image format of {}",
                    key.source
                ))
            })?;

        let codec = Arc::clone(&self.codec);
        let settings = EncodeSettings {
            quality: self.quality.clone(),
            source_size: source.size,
            large_source_bytes: self.large_source_bytes,
        };
        let operations = key.operations;
        let bytes = source.bytes.clone();

        tokio::task::spawn_blocking(move || {
            run_pipeline(codec.as_ref(), bytes, format, operations, &settings)
        })
        .await
        .map_err(|e| CodecError::Aborted(e.to_string()))?
    }
}

/// Inputs to encoder parameter selection besides the decoded image.
struct EncodeSettings {
    quality: QualityTable,
    source_size: u64,
    large_source_bytes: u64,
}

/// The synchronous pipeline. Orientation is corrected before resizing so the
/// width always refers to the displayed image.
fn run_pipeline(
    codec: &dyn Codec,
    source: Bytes,
    format: MediaFormat,
    operations: OperationSet,
    settings: &EncodeSettings,
) -> Result<Transformed, CodecError> {
    if operations.is_original() && format != MediaFormat::Svg {
        return Ok(Transformed {
            bytes: source,
            format,
            quality: None,
            metadata: None,
        });
    }

    let decoded = codec.decode(&source, format)?;
    let metadata = decoded.metadata;
    let mut image = decoded.image;

    if metadata.orientation != Orientation::NoTransforms {
        image = codec.rotate(image, metadata.orientation);
    }
    if let Some(width) = operations.width {
        image = codec.resize(image, width);
    }

    let target = target_format(format, &operations);
    let params = settings.quality.for_variant(
        target,
        operations.width,
        settings.source_size,
        metadata.display_width(),
        settings.large_source_bytes,
    );

    // Palette sources go through a neutral PNG before AVIF
    if target == MediaFormat::Avif && format.is_palette_based() {
        let intermediate = codec.encode(&image, MediaFormat::Png, &settings.quality.lossless)?;
        image = codec.decode(&intermediate, MediaFormat::Png)?.image;
    }

    let bytes = codec.encode(&image, target, &params)?;
    if bytes.is_empty() {
        return Err(CodecError::EmptyOutput);
    }

    let quality = match target {
        MediaFormat::Jpeg | MediaFormat::Webp | MediaFormat::Avif => Some(params.quality),
        _ => None,
    };

    Ok(Transformed {
        bytes,
        format: target,
        quality,
        metadata: Some(metadata),
    })
}
