//! Image formats: what clients may request and what sources may be.

use std::fmt;

/// Formats a client may request through the `format` operation.
///
/// Ordered from most to least bandwidth-efficient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OutputFormat {
    Avif,
    Webp,
    Jpeg,
}

impl OutputFormat {
    /// All requestable formats, most efficient first.
    pub const ALL: [OutputFormat; 3] = [OutputFormat::Avif, OutputFormat::Webp, OutputFormat::Jpeg];

    /// Parse an operation value. Accepts `jpg` as an alias, ignores case.
    ///
    /// Returns `None` for anything outside the enumerated set (including
    /// `auto`), so unknown values are dropped rather than rejected.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "avif" => Some(OutputFormat::Avif),
            "webp" => Some(OutputFormat::Webp),
            "jpeg" | "jpg" => Some(OutputFormat::Jpeg),
            _ => None,
        }
    }

    /// Canonical operation value.
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Avif => "avif",
            OutputFormat::Webp => "webp",
            OutputFormat::Jpeg => "jpeg",
        }
    }

    /// The media type this format encodes to.
    pub fn media(&self) -> MediaFormat {
        match self {
            OutputFormat::Avif => MediaFormat::Avif,
            OutputFormat::Webp => MediaFormat::Webp,
            OutputFormat::Jpeg => MediaFormat::Jpeg,
        }
    }

    /// Content type of the encoded output.
    pub fn content_type(&self) -> &'static str {
        self.media().content_type()
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Formats a source image may arrive in, and that the codec can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaFormat {
    Jpeg,
    Png,
    Webp,
    Avif,
    Gif,
    Svg,
}

impl MediaFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            MediaFormat::Jpeg => "image/jpeg",
            MediaFormat::Png => "image/png",
            MediaFormat::Webp => "image/webp",
            MediaFormat::Avif => "image/avif",
            MediaFormat::Gif => "image/gif",
            MediaFormat::Svg => "image/svg+xml",
        }
    }

    /// Map a declared content type (parameters ignored) to a format.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(MediaFormat::Jpeg),
            "image/png" => Some(MediaFormat::Png),
            "image/webp" => Some(MediaFormat::Webp),
            "image/avif" => Some(MediaFormat::Avif),
            "image/gif" => Some(MediaFormat::Gif),
            "image/svg+xml" => Some(MediaFormat::Svg),
            _ => None,
        }
    }

    /// Map a file extension to a format.
    pub fn from_path(path: &str) -> Option<Self> {
        let ext = path.rsplit_once('.')?.1.to_ascii_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" => Some(MediaFormat::Jpeg),
            "png" => Some(MediaFormat::Png),
            "webp" => Some(MediaFormat::Webp),
            "avif" => Some(MediaFormat::Avif),
            "gif" => Some(MediaFormat::Gif),
            "svg" => Some(MediaFormat::Svg),
            _ => None,
        }
    }

    /// Sniff the format from the leading bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if looks_like_svg(bytes) {
            return Some(MediaFormat::Svg);
        }

        match image::guess_format(bytes).ok()? {
            image::ImageFormat::Jpeg => Some(MediaFormat::Jpeg),
            image::ImageFormat::Png => Some(MediaFormat::Png),
            image::ImageFormat::WebP => Some(MediaFormat::Webp),
            image::ImageFormat::Avif => Some(MediaFormat::Avif),
            image::ImageFormat::Gif => Some(MediaFormat::Gif),
            _ => None,
        }
    }

    /// Resolve a source's format: magic bytes first, then the declared
    /// content type, then the path extension.
    pub fn detect(bytes: &[u8], content_type: Option<&str>, path: &str) -> Option<Self> {
        Self::sniff(bytes)
            .or_else(|| content_type.and_then(Self::from_content_type))
            .or_else(|| Self::from_path(path))
    }

    /// The `image` crate format used to decode or encode this media type.
    ///
    /// SVG has no raster equivalent and returns `None`.
    pub fn raster(&self) -> Option<image::ImageFormat> {
        match self {
            MediaFormat::Jpeg => Some(image::ImageFormat::Jpeg),
            MediaFormat::Png => Some(image::ImageFormat::Png),
            MediaFormat::Webp => Some(image::ImageFormat::WebP),
            MediaFormat::Avif => Some(image::ImageFormat::Avif),
            MediaFormat::Gif => Some(image::ImageFormat::Gif),
            MediaFormat::Svg => None,
        }
    }

    /// Limited-palette formats that must pass through a neutral
    /// intermediate encode before going to AVIF.
    pub fn is_palette_based(&self) -> bool {
        matches!(self, MediaFormat::Gif)
    }
}

/// Whether a declared content type names an image.
pub fn is_image_content_type(content_type: &str) -> bool {
    content_type
        .trim()
        .to_ascii_lowercase()
        .starts_with("image/")
}

fn looks_like_svg(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(512)];
    let Ok(text) = std::str::from_utf8(head) else {
        return false;
    };
    let text = text.trim_start_matches('\u{feff}').trim_start();
    text.starts_with("<svg") || (text.starts_with("<?xml") && text.contains("<svg"))
}
