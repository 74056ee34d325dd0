//! Canonical variant keys.
//!
//! A variant key is the source path followed by one operation segment:
//!
//! ```text
//! images/photo.jpg/format=webp,width=800
//! images/photo.jpg/format=avif
//! images/photo.jpg/original
//! ```
//!
//! Operations always serialize as `format` then `width`. An empty operation
//! set serializes to the `original` marker, which is distinct from a set that
//! only omits one of the operations.

use std::fmt;

use crate::error::VariantError;

use super::format::OutputFormat;

/// Operation segment naming the untouched source.
pub const ORIGINAL_OPERATIONS: &str = "original";

/// Operation names, in serialization order.
pub const FORMAT_OPERATION: &str = "format";
pub const WIDTH_OPERATION: &str = "width";

// =============================================================================
// Operation Set
// =============================================================================

/// The decoded `{format?, width?}` pair driving a transformation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct OperationSet {
    /// Target encoding; `None` keeps the source format
    pub format: Option<OutputFormat>,

    /// Target width in pixels, already clamped; `None` keeps source dimensions
    pub width: Option<u32>,
}

impl OperationSet {
    pub fn new(format: Option<OutputFormat>, width: Option<u32>) -> Self {
        Self { format, width }
    }

    /// The empty set, serialized as `original`.
    pub fn original() -> Self {
        Self::default()
    }

    pub fn is_original(&self) -> bool {
        self.format.is_none() && self.width.is_none()
    }

    /// Parse a raw operation segment.
    ///
    /// Parsing never fails: unknown operations, unsupported formats and
    /// invalid widths are dropped, and widths above `max_width` are clamped.
    /// When an operation repeats, the first occurrence wins.
    pub fn parse(raw: &str, max_width: u32) -> Self {
        let mut ops = OperationSet::default();
        let raw = raw.trim();

        if raw.eq_ignore_ascii_case(ORIGINAL_OPERATIONS) {
            return ops;
        }

        let mut seen_format = false;
        let mut seen_width = false;

        for part in raw.split(',') {
            let Some((name, value)) = part.split_once('=') else {
                continue;
            };

            match name.trim().to_ascii_lowercase().as_str() {
                FORMAT_OPERATION if !seen_format => {
                    seen_format = true;
                    ops.format = OutputFormat::parse(value);
                }
                WIDTH_OPERATION if !seen_width => {
                    seen_width = true;
                    ops.width = parse_width(value, max_width);
                }
                _ => {}
            }
        }

        ops
    }
}

impl fmt::Display for OperationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_original() {
            return f.write_str(ORIGINAL_OPERATIONS);
        }

        let mut first = true;
        if let Some(format) = self.format {
            write!(f, "{}={}", FORMAT_OPERATION, format)?;
            first = false;
        }
        if let Some(width) = self.width {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{}={}", WIDTH_OPERATION, width)?;
        }
        Ok(())
    }
}

/// Parse a width value.
///
/// Non-numeric, zero and negative values yield `None`. Values above
/// `max_width` (including integers too large to represent) clamp to it.
pub fn parse_width(value: &str, max_width: u32) -> Option<u32> {
    use std::num::IntErrorKind;

    match value.trim().parse::<i64>() {
        Ok(width) if width <= 0 => None,
        Ok(width) => Some(width.min(max_width as i64) as u32),
        Err(e) if *e.kind() == IntErrorKind::PosOverflow => Some(max_width),
        Err(_) => None,
    }
}

/// Whether a path segment is an operation segment rather than part of the
/// source path.
///
/// Every part must be `name=value` and at least one part must be a known
/// operation with a recognizable value, so file names such as `v=2.jpg` or
/// `width=2.jpg` stay part of the source.
pub fn is_operation_segment(segment: &str) -> bool {
    if segment.eq_ignore_ascii_case(ORIGINAL_OPERATIONS) {
        return true;
    }
    if segment.is_empty() {
        return false;
    }

    let mut known = false;
    for part in segment.split(',') {
        let Some((name, value)) = part.split_once('=') else {
            return false;
        };
        match name.trim().to_ascii_lowercase().as_str() {
            "" => return false,
            FORMAT_OPERATION => known |= OutputFormat::parse(value).is_some(),
            WIDTH_OPERATION => known |= is_width_value(value),
            _ => {}
        }
    }
    known
}

fn is_width_value(value: &str) -> bool {
    let value = value.trim();
    let digits = value.strip_prefix('-').unwrap_or(value);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

// =============================================================================
// Variant Key
// =============================================================================

/// Canonical identifier of one transformation of one source image.
///
/// `source` is the decoded origin object key without a leading slash.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VariantKey {
    pub source: String,
    pub operations: OperationSet,
}

impl VariantKey {
    pub fn new(source: impl Into<String>, operations: OperationSet) -> Self {
        Self {
            source: source.into().trim_start_matches('/').to_string(),
            operations,
        }
    }

    /// Split a request path into source and operations.
    ///
    /// The last segment is treated as operations only if it looks like one;
    /// otherwise the whole path is the source and the operations are empty.
    pub fn from_uri_path(path: &str, max_width: u32) -> Result<Self, VariantError> {
        let trimmed = path.trim_start_matches('/');

        let (raw_source, operations) = match trimmed.rsplit_once('/') {
            Some((source, last)) if is_operation_segment(last) => {
                (source, OperationSet::parse(last, max_width))
            }
            _ => (trimmed, OperationSet::original()),
        };

        if raw_source.is_empty() {
            return Err(VariantError::MalformedKey {
                reason: format!("no source image in '{}'", path),
            });
        }

        let source = urlencoding::decode(raw_source).map_err(|e| VariantError::MalformedKey {
            reason: format!("'{}' is not valid UTF-8: {}", raw_source, e),
        })?;

        Ok(Self::new(source.into_owned(), operations))
    }

    /// Key used in the variant store.
    pub fn object_key(&self) -> String {
        self.to_string()
    }

    /// Absolute, percent-encoded request path for this key.
    pub fn uri_path(&self) -> String {
        format!("/{}/{}", encode_path(&self.source), self.operations)
    }

    /// Source path with the operations spelled as query parameters.
    ///
    /// Requests to this location go back through the edge normalizer and
    /// land on the same key.
    pub fn query_location(&self) -> String {
        let path = format!("/{}", encode_path(&self.source));
        if self.operations.is_original() {
            return path;
        }
        let query = self.operations.to_string().replace(',', "&");
        format!("{}?{}", path, query)
    }
}

impl fmt::Display for VariantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.source, self.operations)
    }
}

/// Percent-encode each segment of a slash-separated path.
pub fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
