//! In-process cache of variant records.
//!
//! Sits in front of the variant store so repeated requests for a hot key skip
//! both the store round-trip and the codec. Entries are bounded by total byte
//! size and evicted least-recently-used first.

use std::num::NonZeroUsize;

use lru::LruCache;
use tokio::sync::RwLock;

use super::key::VariantKey;
use super::record::VariantRecord;

/// Default cache capacity: 64MB
pub const DEFAULT_VARIANT_CACHE_CAPACITY: usize = 64 * 1024 * 1024;

/// Default maximum number of entries (to bound LRU overhead)
const DEFAULT_MAX_ENTRIES: NonZeroUsize = match NonZeroUsize::new(10_000) {
    Some(n) => n,
    None => NonZeroUsize::MIN,
};

/// LRU cache of variant records with size-based capacity.
///
/// Thread-safe; share it across tasks through `Arc`.
pub struct VariantCache {
    cache: RwLock<LruCache<VariantKey, VariantRecord>>,

    /// Maximum total size in bytes
    max_size: usize,

    /// Current total size in bytes
    current_size: RwLock<usize>,
}

impl VariantCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_VARIANT_CACHE_CAPACITY)
    }

    /// Create a cache holding at most `max_size` bytes of records.
    pub fn with_capacity(max_size: usize) -> Self {
        Self::with_capacity_and_entries(max_size, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_capacity_and_entries(max_size: usize, max_entries: NonZeroUsize) -> Self {
        Self {
            cache: RwLock::new(LruCache::new(max_entries)),
            max_size,
            current_size: RwLock::new(0),
        }
    }

    /// Get a record, marking it recently used.
    pub async fn get(&self, key: &VariantKey) -> Option<VariantRecord> {
        let mut cache = self.cache.write().await;
        cache.get(key).cloned()
    }

    /// Check presence without touching LRU order.
    pub async fn contains(&self, key: &VariantKey) -> bool {
        let cache = self.cache.read().await;
        cache.contains(key)
    }

    /// Store a record, evicting least-recently-used entries while over
    /// capacity. Records larger than the whole cache are not stored.
    pub async fn put(&self, key: VariantKey, record: VariantRecord) {
        let record_size = record.len();
        if record_size > self.max_size {
            return;
        }

        let mut cache = self.cache.write().await;
        let mut current_size = self.current_size.write().await;

        if let Some(old) = cache.peek(&key) {
            *current_size = current_size.saturating_sub(old.len());
        }

        // The entry-count bound can evict silently; account for it
        if let Some((evicted_key, evicted)) = cache.push(key, record) {
            if cache.peek(&evicted_key).is_none() {
                *current_size = current_size.saturating_sub(evicted.len());
            }
        }
        *current_size += record_size;

        while *current_size > self.max_size {
            match cache.pop_lru() {
                Some((_, evicted)) => {
                    *current_size = current_size.saturating_sub(evicted.len());
                }
                None => break,
            }
        }
    }

    pub async fn len(&self) -> usize {
        let cache = self.cache.read().await;
        cache.len()
    }

    pub async fn is_empty(&self) -> bool {
        let cache = self.cache.read().await;
        cache.is_empty()
    }

    /// Current total size of cached records in bytes.
    pub async fn size(&self) -> usize {
        *self.current_size.read().await
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }
}

impl Default for VariantCache {
    fn default() -> Self {
        Self::new()
    }
}
