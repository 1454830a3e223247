//! Webhook intake
//!
//! ```text
//!                         POST /api/webhooks/:kind/:owner_id/:endpoint_id
//!                                            |
//!                              resolve endpoint (owner + kind match)
//!                                  404 unknown / 403 disabled
//!                                   /                    \
//!                             kind=classic           kind=nextgen
//!                          parse, classify,        parse JSON, verify
//!                          fetch full resource     HMAC signature
//!                                   \                    /
//!                              write exactly one WebhookLog
//!                                            |
//!                              [optional] detached forwarding
//! ```
//!
//! Every delivery that reaches body handling produces exactly one log, even
//! malformed ones. The only unlogged exits are endpoint-resolution failures
//! (404/403) and allow-list filtering, which acknowledges silently without
//! an audit record.
//!
//! `GET` on the same path is a liveness probe: static, unauthenticated, no
//! store access.

pub mod body;
mod classic;
mod nextgen;

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{body::Bytes, Json, Router};
use http::StatusCode;
use serde::Serialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::forward::ForwardRequest;
use crate::metrics::global_metrics;
use crate::model::{Endpoint, EndpointKind, WebhookLog};
use crate::state::AppState;

pub use body::{parse_body, RequestMeta};

/// Provider-facing acknowledgment body.
///
/// Deliberately always `ok:true` for logged deliveries so providers never
/// retry; the optional fields carry the detail the provider may surface.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeResponse {
    /// Whether the delivery was accepted
    pub ok: bool,

    /// Set when an allow-list dropped the delivery
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filtered: Option<bool>,

    /// Nextgen only: outcome of signature verification
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature_valid: Option<bool>,

    /// Nextgen only: why verification failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,

    /// Rejection detail for 4xx responses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IntakeResponse {
    /// Plain acceptance
    pub fn ok() -> Self {
        Self {
            ok: true,
            filtered: None,
            signature_valid: None,
            warning: None,
            error: None,
        }
    }

    /// Silent allow-list acknowledgment
    pub fn filtered() -> Self {
        Self {
            filtered: Some(true),
            ..Self::ok()
        }
    }

    /// Nextgen acknowledgment echoing the verification outcome
    pub fn signature(valid: bool, warning: Option<String>) -> Self {
        Self {
            signature_valid: Some(valid),
            warning,
            ..Self::ok()
        }
    }

    /// Rejection body for 400/403/404 responses
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            filtered: None,
            signature_valid: None,
            warning: None,
            error: Some(message.into()),
        }
    }
}

/// Liveness probe body
#[derive(Debug, Serialize)]
pub struct ProbeResponse {
    /// Always true
    pub ok: bool,

    /// Human-readable acknowledgment
    pub message: String,
}

/// Build the intake router
pub fn intake_router() -> Router<Arc<AppState>> {
    Router::new().route(
        "/api/webhooks/:kind/:owner_id/:endpoint_id",
        post(receive_webhook).get(webhook_probe),
    )
}

fn not_found() -> (StatusCode, Json<IntakeResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(IntakeResponse::error("Endpoint not found")),
    )
}

/// Inbound webhook entry point for both protocols.
///
/// Resolves the endpoint strictly against all three path segments; any
/// mismatch is indistinguishable from a missing endpoint.
#[instrument(skip(state, headers, raw))]
pub async fn receive_webhook(
    State(state): State<Arc<AppState>>,
    Path((kind, owner_id, endpoint_id)): Path<(String, String, String)>,
    headers: HeaderMap,
    raw: Bytes,
) -> (StatusCode, Json<IntakeResponse>) {
    let started = Instant::now();

    let Ok(kind) = kind.parse::<EndpointKind>() else {
        return not_found();
    };
    let Ok(endpoint_id) = Uuid::parse_str(&endpoint_id) else {
        return not_found();
    };
    let Some(endpoint) = state.store().endpoint_by_id(endpoint_id) else {
        return not_found();
    };
    if endpoint.owner_id != owner_id || endpoint.kind != kind {
        return not_found();
    }
    if !endpoint.is_enabled {
        return (
            StatusCode::FORBIDDEN,
            Json(IntakeResponse::error("Endpoint is disabled")),
        );
    }

    let meta = RequestMeta::from_headers(&headers);
    match kind {
        EndpointKind::Classic => classic::handle(state, endpoint, meta, &raw, started).await,
        EndpointKind::Nextgen => {
            nextgen::handle(state, endpoint, meta, &headers, &raw, started).await
        }
    }
}

/// Liveness probe: providers (and humans) hit this to confirm the intake
/// URL is reachable before saving it. Static acknowledgment, no store access.
pub async fn webhook_probe(
    Path((kind, _owner_id, _endpoint_id)): Path<(String, String, String)>,
) -> Json<ProbeResponse> {
    let message = match kind.parse::<EndpointKind>() {
        Ok(kind) => format!("Webhook endpoint active ({} protocol)", kind),
        Err(_) => "Webhook endpoint active".to_string(),
    };
    Json(ProbeResponse { ok: true, message })
}

/// Finalize and persist a log record; the single funnel all intake exits
/// share. Returns the log id for the forwarding dispatch.
pub(crate) fn write_log(
    state: &Arc<AppState>,
    kind: EndpointKind,
    mut log: WebhookLog,
    started: Instant,
) -> Uuid {
    let elapsed = started.elapsed();
    log.processing_time_ms = elapsed.as_millis() as u64;
    let log_id = log.id;

    state.increment_webhooks_received();
    state.record_latency_us(elapsed.as_micros() as u64);
    global_metrics().record_webhook(kind.as_str(), log.status.as_str(), elapsed);

    info!(
        endpoint_id = %log.endpoint_id,
        kind = %kind,
        status = %log.status,
        time_ms = log.processing_time_ms,
        "Webhook logged"
    );

    state.store().insert_log(log);
    log_id
}

/// Build the forwarding request for a just-accepted delivery, if the
/// endpoint's forwarding config is actually active
pub(crate) fn forward_request_for(
    endpoint: &Endpoint,
    content_type: Option<&str>,
    body: &str,
) -> Option<ForwardRequest> {
    if !endpoint.forwarding.is_active() {
        return None;
    }
    let url = endpoint.forwarding.url.clone()?;
    Some(ForwardRequest {
        url,
        body: body.to_string(),
        content_type: content_type
            .map(String::from)
            .unwrap_or_else(|| endpoint.kind.default_content_type().to_string()),
        headers: endpoint.forwarding.headers.clone(),
        timeout_ms: endpoint.forwarding.timeout_ms,
    })
}
