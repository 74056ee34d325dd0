//! Variant records: computed bytes plus the metadata stored with them.

use bytes::Bytes;
use sha2::{Digest, Sha256};

/// Hex characters of the SHA-256 digest used in ETags.
const ETAG_HEX_LEN: usize = 32;

/// The computed bytes for a variant key.
///
/// Records are logically immutable: a key always maps to the same bytes,
/// modulo codec non-determinism.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantRecord {
    /// Encoded image bytes
    pub bytes: Bytes,

    /// Content type of `bytes`
    pub content_type: String,

    /// Cache-Control value served with the record
    pub cache_control: String,

    /// Width of the decoded source, when it was decoded
    pub source_width: Option<u32>,

    /// Encoder quality used, when the bytes were re-encoded
    pub quality: Option<u8>,
}

impl VariantRecord {
    pub fn new(
        bytes: Bytes,
        content_type: impl Into<String>,
        cache_control: impl Into<String>,
    ) -> Self {
        Self {
            bytes,
            content_type: content_type.into(),
            cache_control: cache_control.into(),
            source_width: None,
            quality: None,
        }
    }

    pub fn with_source_width(mut self, width: u32) -> Self {
        self.source_width = Some(width);
        self
    }

    pub fn with_quality(mut self, quality: Option<u8>) -> Self {
        self.quality = quality;
        self
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Strong ETag derived from the bytes, quoted for the header.
    pub fn etag(&self) -> String {
        let digest = Sha256::digest(&self.bytes);
        let hex = hex::encode(digest);
        format!("\"{}\"", &hex[..ETAG_HEX_LEN])
    }
}
