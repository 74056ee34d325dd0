//! Edge key normalizer.
//!
//! Reduces an inbound request (path, query string, `Accept` header) to a
//! canonical variant key before it reaches the orchestrator:
//!
//! ```text
//! GET /images/a.jpg?width=5000&utm=x     Accept: image/avif,*/*
//!   -> /images/a.jpg/format=avif,width=4000
//! ```
//!
//! Normalization is pure and deterministic. It fails open: any internal
//! error passes the original request through unchanged.

use url::form_urlencoded;

use crate::error::NormalizeError;

use super::format::OutputFormat;
use super::key::{
    is_operation_segment, parse_width, OperationSet, VariantKey, FORMAT_OPERATION,
    WIDTH_OPERATION,
};
use super::policy::VariantPolicy;

/// Negotiation markers, most efficient first.
const NEGOTIATION_ORDER: [(&str, OutputFormat); 2] = [
    ("image/avif", OutputFormat::Avif),
    ("image/webp", OutputFormat::Webp),
];

/// Format served when the client advertises nothing better.
pub const FALLBACK_FORMAT: OutputFormat = OutputFormat::Jpeg;

/// The parts of an inbound request the normalizer looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeRequest<'a> {
    /// Raw (percent-encoded) request path
    pub path: &'a str,

    /// Raw query string, without the leading `?`
    pub query: Option<&'a str>,

    /// `Accept` header value
    pub accept: Option<&'a str>,
}

impl<'a> EdgeRequest<'a> {
    pub fn new(path: &'a str, query: Option<&'a str>, accept: Option<&'a str>) -> Self {
        Self {
            path,
            query,
            accept,
        }
    }
}

/// A request rewritten to its canonical key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRequest {
    /// Canonical key
    pub key: VariantKey,

    /// Rewritten request path; the query is cleared
    pub uri: String,

    /// Whether the width is in the Common-Width Set
    pub common_width: bool,
}

/// Result of fail-open normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rewrite {
    /// Forward the rewritten request
    Canonical(NormalizedRequest),

    /// Forward the original request untouched
    PassThrough { reason: NormalizeError },
}

/// Pick an output format from an `Accept` header.
///
/// Markers are matched as case-insensitive substrings in priority order,
/// falling back to JPEG.
pub fn negotiate_format(accept: Option<&str>) -> OutputFormat {
    let Some(accept) = accept else {
        return FALLBACK_FORMAT;
    };
    let accept = accept.to_ascii_lowercase();

    NEGOTIATION_ORDER
        .iter()
        .find(|(marker, _)| accept.contains(marker))
        .map(|(_, format)| *format)
        .unwrap_or(FALLBACK_FORMAT)
}

/// Normalize a request to its canonical key.
pub fn normalize(
    request: &EdgeRequest<'_>,
    policy: &VariantPolicy,
) -> Result<NormalizedRequest, NormalizeError> {
    let Some(raw) = request.path.strip_prefix('/') else {
        return Err(NormalizeError::RelativePath(request.path.to_string()));
    };

    let mut segments: Vec<&str> = raw.split('/').collect();

    // A trailing operation segment is re-canonicalized; the query overrides it
    let embedded = match segments.last().copied() {
        Some(last) if segments.len() > 1 && is_operation_segment(last) => {
            let ops = OperationSet::parse(last, policy.max_width);
            segments.pop();
            ops
        }
        _ => OperationSet::original(),
    };

    let source = decode_source(&segments)?;
    let params = QueryParams::parse(request.query);

    let format = params
        .format
        .as_deref()
        .and_then(OutputFormat::parse)
        .or(embedded.format)
        .unwrap_or_else(|| negotiate_format(request.accept));

    let width = match params.width.as_deref() {
        Some(value) => parse_width(value, policy.max_width),
        None => embedded.width,
    };

    let key = VariantKey::new(source, OperationSet::new(Some(format), width));
    Ok(NormalizedRequest {
        uri: key.uri_path(),
        common_width: width.is_some_and(|w| policy.is_common_width(w)),
        key,
    })
}

/// Normalize, passing the request through on any error.
pub fn normalize_or_passthrough(request: &EdgeRequest<'_>, policy: &VariantPolicy) -> Rewrite {
    match normalize(request, policy) {
        Ok(normalized) => Rewrite::Canonical(normalized),
        Err(reason) => Rewrite::PassThrough { reason },
    }
}

/// Validate and percent-decode the source segments.
fn decode_source(segments: &[&str]) -> Result<String, NormalizeError> {
    if matches!(segments, [] | [""]) {
        return Err(NormalizeError::MissingSource);
    }

    let mut decoded = Vec::with_capacity(segments.len());
    for segment in segments {
        let value = urlencoding::decode(segment)
            .map_err(|e| NormalizeError::Encoding(e.to_string()))?;
        if value.is_empty() || value == "." || value == ".." || value.contains('/') {
            return Err(NormalizeError::InvalidSegment(segment.to_string()));
        }
        decoded.push(value.into_owned());
    }

    Ok(decoded.join("/"))
}

/// The query parameters the normalizer cares about. Everything else is
/// dropped so unrelated parameters never reach the key.
#[derive(Debug, Default)]
struct QueryParams {
    format: Option<String>,
    width: Option<String>,
}

impl QueryParams {
    /// Names compare case-insensitively; the first occurrence wins.
    fn parse(query: Option<&str>) -> Self {
        let mut params = QueryParams::default();
        let Some(query) = query else {
            return params;
        };

        for (name, value) in form_urlencoded::parse(query.as_bytes()) {
            let slot = match name.to_ascii_lowercase().as_str() {
                FORMAT_OPERATION => &mut params.format,
                WIDTH_OPERATION => &mut params.width,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }

        params
    }
}
