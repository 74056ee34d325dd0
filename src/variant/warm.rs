//! Warm-cache fan-out.
//!
//! When a source image lands in the origin bucket, compute a fixed matrix of
//! (format × width) variants and persist them under the same keys the
//! on-demand path uses, so later requests are store hits.
//!
//! Cells run concurrently and are joined with settle-all semantics: a failed
//! cell never cancels its siblings. Each cell ends as one of
//! [`CellOutcome::Stored`], [`CellOutcome::Skipped`] (expected failure, left
//! to the on-demand path) or [`CellOutcome::Fatal`] (resource exhaustion).

use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::VariantError;
use crate::io::{OriginStore, SourceObject, VariantStore};

use super::format::is_image_content_type;
use super::key::{OperationSet, VariantKey};
use super::policy::VariantPolicy;
use super::transform::Transformer;

// =============================================================================
// Upload Events
// =============================================================================

/// One uploaded object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadEvent {
    /// Bucket or location the object was written to
    pub bucket: String,

    /// Object key (source path)
    pub key: String,

    #[serde(default, alias = "content_type")]
    pub content_type: Option<String>,

    #[serde(default)]
    pub size: Option<u64>,
}

impl UploadEvent {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            content_type: None,
            size: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Parse a webhook body: either one flat event or an S3 event
    /// notification. Only object-created records are kept.
    pub fn parse_document(body: &[u8]) -> Result<Vec<UploadEvent>, serde_json::Error> {
        match serde_json::from_slice::<EventDocument>(body)? {
            EventDocument::Flat(event) => Ok(vec![event]),
            EventDocument::Notification { records } => Ok(records
                .into_iter()
                .filter(|r| {
                    r.event_name
                        .as_deref()
                        .map_or(true, |name| name.starts_with("ObjectCreated"))
                })
                .map(|r| UploadEvent {
                    bucket: r.s3.bucket.name,
                    key: decode_notification_key(&r.s3.object.key),
                    content_type: None,
                    size: r.s3.object.size,
                })
                .collect()),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EventDocument {
    Notification {
        #[serde(rename = "Records")]
        records: Vec<NotificationRecord>,
    },
    Flat(UploadEvent),
}

#[derive(Deserialize)]
struct NotificationRecord {
    #[serde(rename = "eventName", default)]
    event_name: Option<String>,
    s3: NotificationEntity,
}

#[derive(Deserialize)]
struct NotificationEntity {
    bucket: NotificationBucket,
    object: NotificationObject,
}

#[derive(Deserialize)]
struct NotificationBucket {
    name: String,
}

#[derive(Deserialize)]
struct NotificationObject {
    key: String,
    #[serde(default)]
    size: Option<u64>,
}

/// Notification keys are form-encoded (`+` for spaces).
fn decode_notification_key(key: &str) -> String {
    let spaced = key.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|k| k.into_owned())
        .unwrap_or(spaced)
}

// =============================================================================
// Matrix Planning
// =============================================================================

/// Cells to compute for one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarmPlan {
    pub cells: Vec<OperationSet>,

    /// Whether the matrix was cut down to one format
    pub reduced: bool,
}

/// Plan the fan-out matrix.
///
/// Full matrix: every fan-out format × ({no width} ∪ common widths). Sources
/// with a non-image content type or above the large-source threshold only
/// get the first (most efficient) format.
pub fn plan_matrix(policy: &VariantPolicy, content_type: Option<&str>, size: u64) -> WarmPlan {
    let reduced = content_type.is_some_and(|ct| !is_image_content_type(ct))
        || size > policy.large_source_bytes;

    let formats = if reduced {
        &policy.fanout_formats[..policy.fanout_formats.len().min(1)]
    } else {
        &policy.fanout_formats[..]
    };

    let widths = std::iter::once(None).chain(policy.common_widths.iter().copied().map(Some));
    let cells = formats
        .iter()
        .flat_map(|format| {
            widths
                .clone()
                .map(move |width| OperationSet::new(Some(*format), width))
        })
        .collect();

    WarmPlan { cells, reduced }
}

// =============================================================================
// Reports
// =============================================================================

/// Result of one cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CellOutcome {
    Stored { bytes: usize },
    Skipped { reason: String },
    Fatal { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CellReport {
    pub key: String,
    #[serde(flatten)]
    pub outcome: CellOutcome,
}

/// Aggregated fan-out result for one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WarmReport {
    pub source: String,
    pub reduced: bool,
    pub stored: usize,
    pub skipped: usize,
    pub fatal: usize,
    pub cells: Vec<CellReport>,
}

impl WarmReport {
    fn new(source: &str, reduced: bool, cells: Vec<CellReport>) -> Self {
        let count = |pred: fn(&CellOutcome) -> bool| cells.iter().filter(|c| pred(&c.outcome)).count();
        Self {
            source: source.to_string(),
            reduced,
            stored: count(|o| matches!(o, CellOutcome::Stored { .. })),
            skipped: count(|o| matches!(o, CellOutcome::Skipped { .. })),
            fatal: count(|o| matches!(o, CellOutcome::Fatal { .. })),
            cells,
        }
    }

    /// Only fatal cells fail the fan-out.
    pub fn is_success(&self) -> bool {
        self.fatal == 0
    }

    pub fn outcome(&self, key: &str) -> Option<&CellOutcome> {
        self.cells.iter().find(|c| c.key == key).map(|c| &c.outcome)
    }
}

// =============================================================================
// Fan-Out
// =============================================================================

/// Pre-computes the variant matrix for uploaded sources.
pub struct WarmCache {
    origin: Arc<dyn OriginStore>,
    variants: Arc<dyn VariantStore>,
    transformer: Transformer,
    policy: Arc<VariantPolicy>,
}

impl WarmCache {
    pub fn new(
        origin: Arc<dyn OriginStore>,
        variants: Arc<dyn VariantStore>,
        transformer: Transformer,
        policy: Arc<VariantPolicy>,
    ) -> Self {
        Self {
            origin,
            variants,
            transformer,
            policy,
        }
    }

    /// Run the fan-out for one upload.
    ///
    /// Fails only when the event targets another bucket or the source cannot
    /// be fetched; per-cell failures are reported in the [`WarmReport`].
    pub async fn warm(&self, event: &UploadEvent) -> Result<WarmReport, VariantError> {
        let expected = self.origin.location();
        if !event.bucket.is_empty() && !expected.is_empty() && event.bucket != expected {
            return Err(VariantError::UnknownLocation {
                location: event.bucket.clone(),
                expected: expected.to_string(),
            });
        }

        let source = self
            .origin
            .get(&event.key)
            .await
            .map_err(|source| VariantError::OriginFetch {
                path: event.key.clone(),
                source,
            })?;

        let size = event.size.unwrap_or(source.size);
        let content_type = event
            .content_type
            .as_deref()
            .or(source.content_type.as_deref());
        let plan = plan_matrix(&self.policy, content_type, size);

        let cells = plan.cells.iter().map(|ops| {
            let key = VariantKey::new(event.key.as_str(), *ops);
            self.warm_cell(key, &source)
        });
        let cells = join_all(cells).await;

        let report = WarmReport::new(&event.key, plan.reduced, cells);
        info!(
            source = %event.key,
            reduced = report.reduced,
            stored = report.stored,
            skipped = report.skipped,
            fatal = report.fatal,
            "Warm-cache fan-out finished"
        );
        Ok(report)
    }

    async fn warm_cell(&self, key: VariantKey, source: &SourceObject) -> CellReport {
        let object_key = key.object_key();
        let outcome = self.compute_cell(&key, source).await;

        match &outcome {
            CellOutcome::Stored { .. } => {}
            CellOutcome::Skipped { reason } => {
                warn!(key = %object_key, reason = %reason, "Skipped warm-cache cell")
            }
            CellOutcome::Fatal { error } => {
                error!(key = %object_key, error = %error, "Warm-cache cell failed")
            }
        }

        CellReport {
            key: object_key,
            outcome,
        }
    }

    /// Same transform as the on-demand path, so the stored bytes match what
    /// a request for the key would compute.
    async fn compute_cell(&self, key: &VariantKey, source: &SourceObject) -> CellOutcome {
        let transformed = match self.transformer.transform(key, source).await {
            Ok(transformed) => transformed,
            Err(e) if e.is_fatal() => {
                return CellOutcome::Fatal {
                    error: e.to_string(),
                }
            }
            Err(e) => {
                return CellOutcome::Skipped {
                    reason: e.to_string(),
                }
            }
        };

        let record = transformed.into_record(&self.policy.cache_control);
        let bytes = record.len();
        match self.variants.put(&key.object_key(), &record).await {
            Ok(()) => CellOutcome::Stored { bytes },
            Err(e) => CellOutcome::Skipped {
                reason: format!("persist failed: {}", e),
            },
        }
    }
}
