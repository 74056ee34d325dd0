use async_trait::async_trait;
use bytes::Bytes;

use crate::error::IoError;
use crate::variant::record::VariantRecord;

/// A source image as read from the origin store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceObject {
    /// Raw bytes
    pub bytes: Bytes,

    /// Declared content type, if the store recorded one
    pub content_type: Option<String>,

    /// Size in bytes
    pub size: u64,
}

impl SourceObject {
    pub fn new(bytes: Bytes, content_type: Option<String>) -> Self {
        let size = bytes.len() as u64;
        Self {
            bytes,
            content_type,
            size,
        }
    }
}

/// Read-only access to original source images.
#[async_trait]
pub trait OriginStore: Send + Sync {
    /// Fetch a source image by path.
    ///
    /// Fails with [`IoError::NotFound`] when the object does not exist.
    async fn get(&self, path: &str) -> Result<SourceObject, IoError>;

    /// Bucket or location name upload events are matched against.
    fn location(&self) -> &str;
}

/// Durable storage for computed variants.
///
/// Writers may race on the same key; variants are deterministic in their
/// inputs so last-write-wins is fine.
#[async_trait]
pub trait VariantStore: Send + Sync {
    /// Persist a record under its canonical key.
    async fn put(&self, key: &str, record: &VariantRecord) -> Result<(), IoError>;

    /// Look a record up. `Ok(None)` is a miss.
    async fn get(&self, key: &str) -> Result<Option<VariantRecord>, IoError>;

    /// Bucket or location name, for logging.
    fn location(&self) -> &str;

    /// Externally addressable URL of a stored key, if the store is public.
    fn public_url(&self, _key: &str) -> Option<String> {
        None
    }
}
