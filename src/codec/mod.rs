//! Image codec seam.
//!
//! The orchestrator and the fan-out never touch pixels directly. They drive
//! a [`Codec`], which decodes source bytes, applies the corrective rotation,
//! resizes, and encodes to a target format. [`RasterCodec`] is the production
//! implementation; tests substitute fault-injecting codecs.
//!
//! All methods are synchronous and CPU-bound. Callers run them on the
//! blocking pool.

mod raster;

pub use raster::{RasterCodec, MAX_SVG_DIMENSION};

use bytes::Bytes;
use image::metadata::Orientation;
use image::DynamicImage;

use crate::error::CodecError;
use crate::variant::format::MediaFormat;
use crate::variant::policy::QualityParams;

/// Pixel metadata of a decoded source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageMetadata {
    /// Stored width, before orientation is applied
    pub width: u32,

    /// Stored height, before orientation is applied
    pub height: u32,

    /// Embedded orientation
    pub orientation: Orientation,

    /// Whether the source has more than one frame
    pub animated: bool,

    /// Format the source was decoded from
    pub format: MediaFormat,
}

impl ImageMetadata {
    /// Width as displayed, after the orientation is applied.
    pub fn display_width(&self) -> u32 {
        if swaps_axes(self.orientation) {
            self.height
        } else {
            self.width
        }
    }
}

/// A decoded source: the first frame plus its metadata.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub image: DynamicImage,
    pub metadata: ImageMetadata,
}

/// Decode, rotate, resize and encode images.
pub trait Codec: Send + Sync {
    /// Decode source bytes of a known format.
    ///
    /// Animated sources decode to their first frame.
    fn decode(&self, bytes: &[u8], format: MediaFormat) -> Result<DecodedImage, CodecError>;

    /// Apply an embedded orientation so the image displays upright.
    fn rotate(&self, image: DynamicImage, orientation: Orientation) -> DynamicImage;

    /// Fit the image inside `width`, preserving aspect ratio, never upscaling.
    fn resize(&self, image: DynamicImage, width: u32) -> DynamicImage;

    /// Encode to the target format.
    fn encode(
        &self,
        image: &DynamicImage,
        format: MediaFormat,
        params: &QualityParams,
    ) -> Result<Bytes, CodecError>;
}

/// Whether an orientation swaps width and height.
pub fn swaps_axes(orientation: Orientation) -> bool {
    matches!(
        orientation,
        Orientation::Rotate90
            | Orientation::Rotate270
            | Orientation::Rotate90FlipH
            | Orientation::Rotate270FlipH
    )
}
