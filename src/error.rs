use thiserror::Error;

/// I/O errors that can occur when talking to the origin or variant store
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Error from S3 or S3-compatible storage
    #[error("S3 error: {0}")]
    S3(String),

    /// Network or connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Object not found
    #[error("Object not found: {0}")]
    NotFound(String),
}

impl IoError {
    /// Whether this error means the object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, IoError::NotFound(_))
    }
}

/// Errors raised by the image codec.
#[derive(Debug, Clone, Error)]
pub enum CodecError {
    /// Source or target format cannot be handled by the codec
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Source bytes could not be decoded
    #[error("Corrupt input: {0}")]
    CorruptInput(String),

    /// Decoder or encoder hit a memory or dimension limit
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Encoder produced no bytes
    #[error("Encoder produced an empty buffer")]
    EmptyOutput,

    /// The blocking transform task panicked or was cancelled
    #[error("Transform task aborted: {0}")]
    Aborted(String),
}

impl CodecError {
    /// Whether this failure should fail a warm-cache cell hard rather than
    /// being skipped and left to the on-demand path.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CodecError::ResourceExhausted(_) | CodecError::Aborted(_))
    }
}

impl From<image::ImageError> for CodecError {
    fn from(err: image::ImageError) -> Self {
        use image::ImageError;

        match err {
            ImageError::Unsupported(e) => CodecError::UnsupportedFormat(e.to_string()),
            ImageError::Limits(e) => CodecError::ResourceExhausted(e.to_string()),
            ImageError::Decoding(e) => CodecError::CorruptInput(e.to_string()),
            ImageError::IoError(e) => CodecError::CorruptInput(e.to_string()),
            ImageError::Encoding(e) => CodecError::UnsupportedFormat(e.to_string()),
            ImageError::Parameter(e) => CodecError::UnsupportedFormat(e.to_string()),
        }
    }
}

/// Errors from serving or warming a variant.
///
/// Persistence failures never show up here: they are logged and the request
/// carries on with the computed bytes.
#[derive(Debug, Clone, Error)]
pub enum VariantError {
    /// Only GET and HEAD may read variants
    #[error("Method {method} not allowed: variants are read-only")]
    MethodNotAllowed { method: String },

    /// The request path does not decode to a variant key
    #[error("Malformed variant key: {reason}")]
    MalformedKey { reason: String },

    /// The source image could not be fetched from the origin store
    #[error("Failed to fetch source image {path}: {source}")]
    OriginFetch {
        path: String,
        #[source]
        source: IoError,
    },

    /// Decoding, resizing or encoding failed
    #[error("Transform failed: {0}")]
    Transform(#[from] CodecError),

    /// An upload event referenced a bucket this service does not read from
    #[error("Upload event for unknown location {location} (serving {expected})")]
    UnknownLocation { location: String, expected: String },
}

/// Internal normalizer failures. These never leave the normalizer: any of
/// them makes it pass the request through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    /// Path does not start with '/'
    #[error("Path is not absolute: {0}")]
    RelativePath(String),

    /// Path names no source image
    #[error("Path has no source image")]
    MissingSource,

    /// Path contains an empty, '.' or '..' segment
    #[error("Path has an invalid segment: {0}")]
    InvalidSegment(String),

    /// Path is not valid percent-encoded UTF-8
    #[error("Path is not valid UTF-8 after decoding: {0}")]
    Encoding(String),
}

/// Upload event signature failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    /// Signature header is missing
    #[error("Missing event signature header")]
    Missing,

    /// Header is not `sha256=<hex>`
    #[error("Invalid event signature format")]
    InvalidFormat,

    /// Signature does not match the body
    #[error("Invalid event signature")]
    Mismatch,
}
