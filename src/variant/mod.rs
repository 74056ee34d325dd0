//! Variant keys, negotiation, and the serve/warm pipelines.
//!
//! - [`normalize`]: edge request → canonical [`VariantKey`]
//! - [`service`]: the on-demand orchestrator
//! - [`warm`]: the upload-time fan-out
//!
//! Both pipelines share one [`Transformer`] and one immutable
//! [`VariantPolicy`], so a key computed by either is byte-identical.

pub mod cache;
pub mod format;
pub mod key;
pub mod normalize;
pub mod policy;
pub mod record;
pub mod service;
pub mod transform;
pub mod warm;

pub use cache::{VariantCache, DEFAULT_VARIANT_CACHE_CAPACITY};
pub use format::{MediaFormat, OutputFormat};
pub use key::{OperationSet, VariantKey};
pub use normalize::{
    negotiate_format, normalize, normalize_or_passthrough, EdgeRequest, NormalizedRequest, Rewrite,
};
pub use policy::{QualityParams, QualityTable, VariantPolicy};
pub use record::VariantRecord;
pub use service::{ensure_read_method, CacheStatus, VariantOutcome, VariantService};
pub use transform::{ServerTiming, Transformed, Transformer};
pub use warm::{plan_matrix, CellOutcome, CellReport, UploadEvent, WarmCache, WarmPlan, WarmReport};
