//! Variant orchestrator.
//!
//! Serves one canonical variant key end-to-end:
//!
//! ```text
//! Received ─▶ hot cache ─▶ variant store ─▶ SourceFetch ─▶ Transform
//!                │              │                              │
//!                ▼              ▼                     SizeOK / SizeExceeded
//!              200            200                              │
//!                                                   Persist (best-effort)
//!                                                              │
//!                                                  200 / 302 / 403 / 5xx
//! ```
//!
//! Each external call is attempted once. Persistence is the last side effect
//! and its failure never fails the request.

use std::sync::Arc;
use std::time::Instant;

use http::Method;
use tracing::{debug, info, warn};

use crate::codec::Codec;
use crate::error::VariantError;
use crate::io::{OriginStore, VariantStore};

use super::cache::VariantCache;
use super::key::VariantKey;
use super::policy::VariantPolicy;
use super::record::VariantRecord;
use super::transform::{ServerTiming, Transformer};

/// Where a served record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// In-process hot cache
    Hit,
    /// Variant store
    Store,
    /// Computed for this request
    Miss,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "hit",
            CacheStatus::Store => "store",
            CacheStatus::Miss => "miss",
        }
    }
}

/// Terminal outcome of a served request. Errors are carried separately as
/// [`VariantError`].
#[derive(Debug, Clone)]
pub enum VariantOutcome {
    /// Serve the bytes
    Ok {
        record: VariantRecord,
        /// Present when the variant was computed for this request
        timing: Option<ServerTiming>,
        cache: CacheStatus,
    },

    /// Oversized and persisted: redirect to the stored copy
    Redirect {
        location: String,
        timing: ServerTiming,
    },

    /// Oversized and not persisted
    TooLarge { size: usize, limit: usize },
}

/// Variants are read-only: only GET and HEAD are served.
pub fn ensure_read_method(method: &Method) -> Result<(), VariantError> {
    if method == Method::GET || method == Method::HEAD {
        return Ok(());
    }
    Err(VariantError::MethodNotAllowed {
        method: method.to_string(),
    })
}

/// Serves variants from cache, store, or by computing them.
pub struct VariantService {
    origin: Arc<dyn OriginStore>,
    variants: Option<Arc<dyn VariantStore>>,
    cache: Option<Arc<VariantCache>>,
    transformer: Transformer,
    policy: Arc<VariantPolicy>,
}

impl VariantService {
    pub fn new(origin: Arc<dyn OriginStore>, codec: Arc<dyn Codec>, policy: Arc<VariantPolicy>) -> Self {
        Self {
            origin,
            variants: None,
            cache: None,
            transformer: Transformer::new(codec, &policy),
            policy,
        }
    }

    /// Persist computed variants and look keys up before computing.
    pub fn with_variant_store(mut self, store: Arc<dyn VariantStore>) -> Self {
        self.variants = Some(store);
        self
    }

    pub fn with_cache(mut self, cache: Arc<VariantCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn policy(&self) -> &Arc<VariantPolicy> {
        &self.policy
    }

    pub fn transformer(&self) -> &Transformer {
        &self.transformer
    }

    pub fn origin(&self) -> &Arc<dyn OriginStore> {
        &self.origin
    }

    pub fn variant_store(&self) -> Option<&Arc<dyn VariantStore>> {
        self.variants.as_ref()
    }

    /// Serve one canonical key.
    pub async fn serve(&self, method: &Method, key: &VariantKey) -> Result<VariantOutcome, VariantError> {
        ensure_read_method(method)?;

        if let Some(outcome) = self.lookup(key).await {
            return Ok(outcome);
        }

        let started = Instant::now();
        let source = self
            .origin
            .get(&key.source)
            .await
            .map_err(|source| VariantError::OriginFetch {
                path: key.source.clone(),
                source,
            })?;
        let download = started.elapsed();

        let started = Instant::now();
        let transformed = self.transformer.transform(key, &source).await?;
        let timing = ServerTiming {
            download,
            transform: started.elapsed(),
        };

        let record = transformed.into_record(&self.policy.cache_control);
        let size = record.len();
        let oversized = size > self.policy.max_response_bytes;
        let persisted = self.persist(key, &record).await;

        info!(
            key = %key,
            bytes = size,
            oversized,
            persisted,
            download_ms = timing.download.as_millis() as u64,
            transform_ms = timing.transform.as_millis() as u64,
            "Computed variant"
        );

        if oversized {
            if !persisted {
                return Ok(VariantOutcome::TooLarge {
                    size,
                    limit: self.policy.max_response_bytes,
                });
            }
            return Ok(VariantOutcome::Redirect {
                location: self.redirect_location(key),
                timing,
            });
        }

        if let Some(cache) = &self.cache {
            cache.put(key.clone(), record.clone()).await;
        }

        Ok(VariantOutcome::Ok {
            record,
            timing: Some(timing),
            cache: CacheStatus::Miss,
        })
    }

    /// Check the hot cache, then the variant store. Store errors count as a
    /// miss.
    async fn lookup(&self, key: &VariantKey) -> Option<VariantOutcome> {
        if let Some(cache) = &self.cache {
            if let Some(record) = cache.get(key).await {
                debug!(key = %key, "Variant cache hit");
                return Some(VariantOutcome::Ok {
                    record,
                    timing: None,
                    cache: CacheStatus::Hit,
                });
            }
        }

        let store = self.variants.as_ref()?;
        match store.get(&key.object_key()).await {
            Ok(Some(mut record)) => {
                debug!(key = %key, "Variant store hit");
                // Objects written by other writers may lack the header
                if record.cache_control.trim().is_empty() {
                    record.cache_control = self.policy.cache_control.clone();
                }
                if let Some(cache) = &self.cache {
                    cache.put(key.clone(), record.clone()).await;
                }
                Some(VariantOutcome::Ok {
                    record,
                    timing: None,
                    cache: CacheStatus::Store,
                })
            }
            Ok(None) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "Variant store lookup failed, computing");
                None
            }
        }
    }

    /// Best-effort write to the variant store. Returns whether it succeeded.
    async fn persist(&self, key: &VariantKey, record: &VariantRecord) -> bool {
        let Some(store) = &self.variants else {
            return false;
        };

        match store.put(&key.object_key(), record).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    key = %key,
                    location = store.location(),
                    error = %e,
                    "Failed to persist variant"
                );
                false
            }
        }
    }

    fn redirect_location(&self, key: &VariantKey) -> String {
        self.variants
            .as_ref()
            .and_then(|store| store.public_url(&key.object_key()))
            .unwrap_or_else(|| key.query_location())
    }
}
