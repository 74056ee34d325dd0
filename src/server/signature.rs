//! Upload event signatures.
//!
//! Event producers sign the raw webhook body with a shared secret:
//!
//! ```text
//! X-Event-Signature: sha256=<hex(HMAC-SHA256(secret, body))>
//! ```
//!
//! Verification uses a constant-time comparison.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use super::handlers::ErrorResponse;
use crate::error::SignatureError;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the body signature.
pub const SIGNATURE_HEADER: &str = "x-event-signature";

const SIGNATURE_PREFIX: &str = "sha256=";

/// Signs and verifies webhook bodies.
#[derive(Clone)]
pub struct EventSigner {
    secret_key: Vec<u8>,
}

impl EventSigner {
    pub fn new(secret_key: impl AsRef<[u8]>) -> Self {
        Self {
            secret_key: secret_key.as_ref().to_vec(),
        }
    }

    /// Header value for a body.
    pub fn sign(&self, body: &[u8]) -> String {
        format!("{}{}", SIGNATURE_PREFIX, hex::encode(self.mac(body)))
    }

    /// Verify a header value against a body.
    pub fn verify(&self, header: Option<&str>, body: &[u8]) -> Result<(), SignatureError> {
        let header = header.ok_or(SignatureError::Missing)?;
        let provided = header
            .trim()
            .strip_prefix(SIGNATURE_PREFIX)
            .ok_or(SignatureError::InvalidFormat)?;
        let provided = hex::decode(provided).map_err(|_| SignatureError::InvalidFormat)?;

        if provided.ct_eq(&self.mac(body)).into() {
            Ok(())
        } else {
            Err(SignatureError::Mismatch)
        }
    }

    fn mac(&self, body: &[u8]) -> Vec<u8> {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret_key).expect("HMAC can take key of any size");
        mac.update(body);
        mac.finalize().into_bytes().to_vec()
    }
}

impl IntoResponse for SignatureError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            SignatureError::Missing => (StatusCode::UNAUTHORIZED, "missing_signature"),
            SignatureError::InvalidFormat => (StatusCode::BAD_REQUEST, "invalid_signature_format"),
            SignatureError::Mismatch => (StatusCode::UNAUTHORIZED, "invalid_signature"),
        };
        let message = self.to_string();

        // A mismatch may be an attack; the rest are usually misconfiguration
        if self == SignatureError::Mismatch {
            warn!(error_type, status = status.as_u16(), "Event signature rejected: {}", message);
        } else {
            debug!(error_type, status = status.as_u16(), "Event signature rejected: {}", message);
        }

        (status, Json(ErrorResponse::with_status(error_type, message, status))).into_response()
    }
}
