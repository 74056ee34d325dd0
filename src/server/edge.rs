//! Edge key normalizer.
//!
//! Runs in front of the variant handler and rewrites every read request to
//! its canonical variant URI before routing:
//!
//! ```text
//! GET /images/a.jpg?width=500        Accept: image/webp
//!   → GET /images/a.jpg/format=webp,width=500
//! ```
//!
//! Normalization is fail-open: a request that cannot be normalized is
//! forwarded untouched.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::ACCEPT, Method, Uri},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use crate::variant::{normalize_or_passthrough, EdgeRequest, Rewrite, VariantPolicy};

/// Rewrite the request URI to its canonical variant key.
pub async fn edge_normalize(
    State(policy): State<Arc<VariantPolicy>>,
    mut request: Request,
    next: Next,
) -> Response {
    if request.method() == Method::GET || request.method() == Method::HEAD {
        if let Some(uri) = rewrite_uri(&request, &policy) {
            *request.uri_mut() = uri;
        }
    }

    next.run(request).await
}

fn rewrite_uri(request: &Request, policy: &VariantPolicy) -> Option<Uri> {
    let accept = request
        .headers()
        .get(ACCEPT)
        .and_then(|value| value.to_str().ok());
    let edge = EdgeRequest::new(request.uri().path(), request.uri().query(), accept);

    match normalize_or_passthrough(&edge, policy) {
        Rewrite::Canonical(normalized) => match normalized.uri.parse::<Uri>() {
            Ok(uri) => {
                debug!(
                    from = %request.uri(),
                    to = %uri,
                    common_width = normalized.common_width,
                    "Normalized variant request"
                );
                Some(uri)
            }
            Err(e) => {
                warn!(uri = %normalized.uri, error = %e, "Normalized URI is not valid, passing through");
                None
            }
        },
        Rewrite::PassThrough { reason } => {
            debug!(path = %request.uri().path(), reason = %reason, "Passing request through");
            None
        }
    }
}
