use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;

use super::store::{OriginStore, SourceObject, VariantStore};
use crate::error::IoError;
use crate::variant::record::VariantRecord;

/// In-memory store implementing both store traits.
///
/// Used for local runs without a bucket and throughout the tests. Writes and
/// reads can be made to fail on demand, and every call is counted.
#[derive(Default)]
pub struct MemoryStore {
    location: String,
    sources: RwLock<HashMap<String, SourceObject>>,
    variants: RwLock<HashMap<String, VariantRecord>>,
    public_base_url: Option<String>,
    fail_puts: AtomicBool,
    fail_gets: AtomicBool,
    get_count: AtomicUsize,
    put_count: AtomicUsize,
}

impl MemoryStore {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            ..Self::default()
        }
    }

    pub fn with_public_base_url(mut self, base: impl Into<String>) -> Self {
        self.public_base_url = Some(base.into().trim_end_matches('/').to_string());
        self
    }

    /// Add a source image.
    pub fn insert_source(&self, path: &str, bytes: impl Into<Bytes>, content_type: Option<&str>) {
        let object = SourceObject::new(bytes.into(), content_type.map(str::to_string));
        if let Ok(mut sources) = self.sources.write() {
            sources.insert(path.to_string(), object);
        }
    }

    /// Make every subsequent `put` fail.
    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `get` (origin and variant) fail.
    pub fn fail_gets(&self, fail: bool) {
        self.fail_gets.store(fail, Ordering::SeqCst);
    }

    /// Stored variant keys, sorted.
    pub fn variant_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .variants
            .read()
            .map(|variants| variants.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    pub fn variant(&self, key: &str) -> Option<VariantRecord> {
        self.variants
            .read()
            .ok()
            .and_then(|variants| variants.get(key).cloned())
    }

    /// Origin and variant reads so far.
    pub fn get_count(&self) -> usize {
        self.get_count.load(Ordering::SeqCst)
    }

    /// Variant writes attempted so far, including failed ones.
    pub fn put_count(&self) -> usize {
        self.put_count.load(Ordering::SeqCst)
    }

    fn check_get(&self, identifier: &str) -> Result<(), IoError> {
        self.get_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(IoError::Connection(format!("injected read failure: {}", identifier)));
        }
        Ok(())
    }

    fn poisoned() -> IoError {
        IoError::S3("memory store lock poisoned".to_string())
    }
}

#[async_trait]
impl OriginStore for MemoryStore {
    async fn get(&self, path: &str) -> Result<SourceObject, IoError> {
        self.check_get(path)?;
        let sources = self.sources.read().map_err(|_| Self::poisoned())?;
        sources
            .get(path)
            .cloned()
            .ok_or_else(|| IoError::NotFound(format!("memory://{}/{}", self.location, path)))
    }

    fn location(&self) -> &str {
        &self.location
    }
}

#[async_trait]
impl VariantStore for MemoryStore {
    async fn put(&self, key: &str, record: &VariantRecord) -> Result<(), IoError> {
        self.put_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(IoError::S3(format!("injected write failure: {}", key)));
        }
        let mut variants = self.variants.write().map_err(|_| Self::poisoned())?;
        variants.insert(key.to_string(), record.clone());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<VariantRecord>, IoError> {
        self.check_get(key)?;
        let variants = self.variants.read().map_err(|_| Self::poisoned())?;
        Ok(variants.get(key).cloned())
    }

    fn location(&self) -> &str {
        &self.location
    }

    fn public_url(&self, key: &str) -> Option<String> {
        self.public_base_url
            .as_ref()
            .map(|base| format!("{}/{}", base, key))
    }
}
