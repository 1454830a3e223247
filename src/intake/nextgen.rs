//! Next-gen webhook handling: full payload in, HMAC signature verified
//!
//! Verification runs over the raw body bytes exactly as received; parsing
//! happens separately and never feeds the MAC. A failed or missing
//! signature still gets a 200 acknowledgment with `signatureValid:false`
//! and a warning, so providers do not retry unverifiable deliveries; the
//! log keeps everything either way.

use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use http::{HeaderMap, StatusCode};
use tracing::debug;

use crate::forward::spawn_forward;
use crate::intake::{forward_request_for, write_log, IntakeResponse, RequestMeta};
use crate::model::{Endpoint, LogStatus, ParsedBody, WebhookLog};
use crate::signature::{extract_signature, verify_signature};
use crate::state::AppState;

pub(super) async fn handle(
    state: Arc<AppState>,
    endpoint: Endpoint,
    meta: RequestMeta,
    headers: &HeaderMap,
    raw: &[u8],
    started: Instant,
) -> (StatusCode, Json<IntakeResponse>) {
    let raw_body = String::from_utf8_lossy(raw).into_owned();

    let value: serde_json::Value = match serde_json::from_slice(raw) {
        Ok(value) => value,
        Err(_) => {
            let mut log = WebhookLog::new(endpoint.id, &endpoint.owner_id, LogStatus::Invalid);
            meta.apply(&mut log);
            log.raw_body = Some(raw_body);
            log.error = Some("Invalid JSON payload".to_string());
            write_log(&state, endpoint.kind, log, started);
            return (
                StatusCode::BAD_REQUEST,
                Json(IntakeResponse::error("Invalid JSON payload")),
            );
        }
    };
    let parsed = ParsedBody::Json(value);

    let signature = extract_signature(headers);
    let (valid, warning) = verify(&state, &endpoint, signature.as_deref(), raw);
    let event_type = parsed.event_type();

    // Filtering applies only to verified traffic; an unverified delivery is
    // always logged, filter or not. A payload with no recognizable event
    // type has nothing to match against the allow-list and is never dropped.
    if valid {
        if let Some(event) = event_type.as_deref() {
            if !endpoint.accepts_event_type(event) {
                debug!(
                    endpoint_id = %endpoint.id,
                    event_type = event,
                    "Delivery dropped by event-type filter"
                );
                return (StatusCode::OK, Json(IntakeResponse::filtered()));
            }
        }
    }

    let mut log = WebhookLog::new(
        endpoint.id,
        &endpoint.owner_id,
        if valid {
            LogStatus::Success
        } else {
            LogStatus::SignatureFailed
        },
    );
    meta.apply(&mut log);
    log.parsed_body = Some(parsed);
    log.raw_body = Some(raw_body.clone());
    log.event_type = event_type;
    log.signature_valid = Some(valid);
    log.signature_header = signature;
    log.error = warning.clone();

    let log_id = write_log(&state, endpoint.kind, log, started);

    if valid {
        state.store().record_received(endpoint.id);
        if let Some(request) =
            forward_request_for(&endpoint, meta.content_type.as_deref(), &raw_body)
        {
            spawn_forward(&state, log_id, request);
        }
    }

    (StatusCode::OK, Json(IntakeResponse::signature(valid, warning)))
}

/// Verify the HMAC, or explain why that was impossible. Both the header and
/// a configured secret must be present before the MAC is even computed.
fn verify(
    state: &Arc<AppState>,
    endpoint: &Endpoint,
    signature: Option<&str>,
    raw: &[u8],
) -> (bool, Option<String>) {
    let Some(signature) = signature else {
        return (false, Some("Missing signature header".to_string()));
    };
    let Some(encrypted_secret) = endpoint.encrypted_secret.as_deref() else {
        return (false, Some("No shared secret configured".to_string()));
    };
    let secret = match state.cipher().decrypt(encrypted_secret) {
        Ok(secret) => secret,
        Err(_) => return (false, Some("Unable to decrypt shared secret".to_string())),
    };
    if verify_signature(&secret, raw, signature) {
        (true, None)
    } else {
        (false, Some("Signature verification failed".to_string()))
    }
}
