//! HMAC signature computation and verification for next-gen webhooks
//!
//! Next-gen deliveries carry an HMAC-SHA256 signature over the raw,
//! unparsed body bytes, hex-encoded. Verification must therefore run against
//! the exact bytes received, before any JSON parsing touches them.
//!
//! Two header names are accepted because older provider versions sent the
//! signature without the `x-` prefix. Lookups are case-insensitive (the
//! `http` crate normalizes header names on ingress).

use hmac::{Hmac, Mac};
use http::HeaderMap;
use sha2::Sha256;

/// Signature header sent by current provider versions
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

/// Signature header sent by older provider versions
pub const SIGNATURE_HEADER_LEGACY: &str = "webhook-signature";

type HmacSha256 = Hmac<Sha256>;

fn hmac(secret: &str) -> HmacSha256 {
    // HMAC-SHA256 accepts keys of any length
    HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length")
}

/// Compute the hex-encoded HMAC-SHA256 signature of a payload.
pub fn compute_signature(secret: &str, payload: &[u8]) -> String {
    let mut mac = hmac(secret);
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a hex-encoded signature against a payload.
///
/// Comparison is constant-time via `Mac::verify_slice`. Undecodable hex is
/// simply an invalid signature, never an error.
pub fn verify_signature(secret: &str, payload: &[u8], signature_hex: &str) -> bool {
    let Ok(signature) = hex::decode(signature_hex) else {
        return false;
    };

    let mut mac = hmac(secret);
    mac.update(payload);
    mac.verify_slice(&signature).is_ok()
}

/// Extract the raw signature header value from a request, trying the current
/// name first and the legacy name second.
pub fn extract_signature(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SIGNATURE_HEADER)
        .or_else(|| headers.get(SIGNATURE_HEADER_LEGACY))
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}
