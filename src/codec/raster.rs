//! Production codec built on `image` for raster formats and `resvg` for SVG.

use std::borrow::Cow;
use std::io::Cursor;

use bytes::Bytes;
use image::codecs::avif::AvifEncoder;
use image::codecs::gif::GifDecoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::{WebPDecoder, WebPEncoder};
use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{AnimationDecoder, DynamicImage, ImageDecoder, ImageFormat, ImageReader, RgbaImage};
use resvg::{tiny_skia, usvg};

use super::{Codec, DecodedImage, ImageMetadata};
use crate::error::CodecError;
use crate::variant::format::MediaFormat;
use crate::variant::policy::QualityParams;

/// Largest SVG canvas side we rasterize.
pub const MAX_SVG_DIMENSION: u32 = 8192;

/// Stateless codec over the `image` and `resvg` crates.
///
/// Decoding honors the `image` crate's default allocation limits; hitting
/// them surfaces as [`CodecError::ResourceExhausted`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterCodec;

impl RasterCodec {
    pub fn new() -> Self {
        Self
    }

    fn decode_raster(&self, bytes: &[u8], format: MediaFormat) -> Result<DecodedImage, CodecError> {
        let raster = format.raster().ok_or_else(|| {
            CodecError::UnsupportedFormat(format!("{} is not a raster format", format.content_type()))
        })?;

        let mut decoder = ImageReader::with_format(Cursor::new(bytes), raster).into_decoder()?;
        let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
        let (width, height) = decoder.dimensions();
        let image = DynamicImage::from_decoder(decoder)?;

        Ok(DecodedImage {
            image,
            metadata: ImageMetadata {
                width,
                height,
                orientation,
                animated: is_animated(bytes, format),
                format,
            },
        })
    }

    fn decode_svg(&self, bytes: &[u8]) -> Result<DecodedImage, CodecError> {
        let tree = usvg::Tree::from_data(bytes, &usvg::Options::default())
            .map_err(|e| CodecError::CorruptInput(format!("Failed to parse SVG: {}", e)))?;

        let size = tree.size().to_int_size();
        let (width, height) = (size.width(), size.height());
        if width > MAX_SVG_DIMENSION || height > MAX_SVG_DIMENSION {
            return Err(CodecError::ResourceExhausted(format!(
                "SVG canvas {}x{} exceeds {}px",
                width, height, MAX_SVG_DIMENSION
            )));
        }

        let mut pixmap = tiny_skia::Pixmap::new(width, height).ok_or_else(|| {
            CodecError::ResourceExhausted(format!("Cannot allocate {}x{} canvas", width, height))
        })?;
        resvg::render(&tree, tiny_skia::Transform::default(), &mut pixmap.as_mut());

        // tiny-skia stores premultiplied alpha
        let mut rgba = Vec::with_capacity(pixmap.data().len());
        for pixel in pixmap.pixels() {
            let color = pixel.demultiply();
            rgba.extend_from_slice(&[color.red(), color.green(), color.blue(), color.alpha()]);
        }
        let image = RgbaImage::from_raw(width, height, rgba)
            .ok_or_else(|| CodecError::CorruptInput("SVG raster buffer size mismatch".to_string()))?;

        Ok(DecodedImage {
            image: DynamicImage::ImageRgba8(image),
            metadata: ImageMetadata {
                width,
                height,
                orientation: Orientation::NoTransforms,
                animated: false,
                format: MediaFormat::Svg,
            },
        })
    }
}

impl Codec for RasterCodec {
    fn decode(&self, bytes: &[u8], format: MediaFormat) -> Result<DecodedImage, CodecError> {
        if bytes.is_empty() {
            return Err(CodecError::CorruptInput("source is empty".to_string()));
        }
        match format {
            MediaFormat::Svg => self.decode_svg(bytes),
            _ => self.decode_raster(bytes, format),
        }
    }

    fn rotate(&self, mut image: DynamicImage, orientation: Orientation) -> DynamicImage {
        image.apply_orientation(orientation);
        image
    }

    fn resize(&self, image: DynamicImage, width: u32) -> DynamicImage {
        let (source_width, source_height) = (image.width(), image.height());
        if width == 0 || width >= source_width {
            return image;
        }

        let height = fit_height(source_width, source_height, width);
        image.resize_exact(width, height, FilterType::Lanczos3)
    }

    fn encode(
        &self,
        image: &DynamicImage,
        format: MediaFormat,
        params: &QualityParams,
    ) -> Result<Bytes, CodecError> {
        let quality = params.quality.clamp(1, 100);
        let mut output = Vec::new();

        match format {
            MediaFormat::Jpeg => {
                let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
                rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut output, quality))?;
            }
            MediaFormat::Png => {
                image.write_with_encoder(PngEncoder::new(&mut output))?;
            }
            MediaFormat::Webp => {
                to_8bit(image).write_with_encoder(WebPEncoder::new_lossless(&mut output))?;
            }
            MediaFormat::Avif => {
                let speed = params.speed.clamp(1, 10);
                to_8bit(image).write_with_encoder(AvifEncoder::new_with_speed_quality(
                    &mut output,
                    speed,
                    quality,
                ))?;
            }
            MediaFormat::Gif => {
                image.write_to(&mut Cursor::new(&mut output), ImageFormat::Gif)?;
            }
            MediaFormat::Svg => {
                return Err(CodecError::UnsupportedFormat(
                    "cannot encode to SVG".to_string(),
                ));
            }
        }

        if output.is_empty() {
            return Err(CodecError::EmptyOutput);
        }
        Ok(Bytes::from(output))
    }
}

/// Height that keeps the aspect ratio at `width`. Never below 1px.
fn fit_height(source_width: u32, source_height: u32, width: u32) -> u32 {
    let height = (source_height as f64 * width as f64 / source_width as f64).round();
    (height as u32).max(1)
}

/// The WebP and AVIF encoders only take 8-bit buffers.
fn to_8bit(image: &DynamicImage) -> Cow<'_, DynamicImage> {
    match image {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => Cow::Borrowed(image),
        _ if image.color().has_alpha() => Cow::Owned(DynamicImage::ImageRgba8(image.to_rgba8())),
        _ => Cow::Owned(DynamicImage::ImageRgb8(image.to_rgb8())),
    }
}

fn is_animated(bytes: &[u8], format: MediaFormat) -> bool {
    match format {
        MediaFormat::Gif => GifDecoder::new(Cursor::new(bytes))
            .map(|decoder| decoder.into_frames().take(2).count() > 1)
            .unwrap_or(false),
        MediaFormat::Webp => WebPDecoder::new(Cursor::new(bytes))
            .map(|decoder| decoder.has_animation())
            .unwrap_or(false),
        _ => false,
    }
}
