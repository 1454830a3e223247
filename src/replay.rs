//! Webhook replay
//!
//! Re-sends a stored delivery, either back through the endpoint's own
//! intake URL or straight to its forwarding target. Unlike post-intake
//! forwarding this is synchronous: the operator who clicked replay wants
//! the downstream outcome in the response, so the engine is awaited and the
//! result is embedded in the new log record immediately instead of written
//! back later.
//!
//! Every replay creates a brand-new log carrying the original's request
//! metadata plus lineage fields pointing back at the source record.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::StoreError;
use crate::forward::ForwardRequest;
use crate::metrics::global_metrics;
use crate::model::{Endpoint, LogStatus, WebhookLog};
use crate::state::AppState;

/// Where a replay should be sent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayTarget {
    /// Back through the endpoint's canonical intake URL
    #[default]
    Endpoint,
    /// Straight to the endpoint's configured forwarding URL
    Forward,
}

/// Replay request body
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ReplayRequest {
    /// Requested target; `forward` silently falls back to `endpoint` when
    /// forwarding is not currently active
    #[serde(default)]
    pub target: ReplayTarget,
}

/// What the operator gets back from a replay
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayOutcome {
    /// Whether the downstream answered 2xx
    pub success: bool,

    /// Id of the newly created replay log
    pub log_id: Uuid,

    /// Target actually used (after any fallback)
    pub target_type: ReplayTarget,

    /// URL the body was sent to
    pub target_url: String,

    /// Downstream HTTP status, when a response arrived
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,

    /// Delivery duration in milliseconds
    pub time_ms: u64,

    /// Failure detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Resolve the requested target against the endpoint's current config.
/// `forward` is honored only while forwarding is enabled with a URL set;
/// anything else re-targets the canonical intake URL.
fn resolve_target(
    public_url: &str,
    endpoint: &Endpoint,
    requested: ReplayTarget,
) -> (ReplayTarget, String) {
    if requested == ReplayTarget::Forward {
        if let Some(url) = endpoint.forwarding.url.as_deref() {
            if endpoint.forwarding.is_active() {
                return (ReplayTarget::Forward, url.to_string());
            }
        }
    }
    (ReplayTarget::Endpoint, endpoint.intake_url(public_url))
}

/// Execute a replay for one stored log on behalf of `actor`.
///
/// Fails only on resolution (unknown log, or the endpoint that produced it
/// is gone); delivery failures come back as a non-success outcome with the
/// replay log still written.
#[instrument(skip(state))]
pub async fn execute_replay(
    state: &Arc<AppState>,
    owner_id: &str,
    log_id: Uuid,
    target: ReplayTarget,
    actor: &str,
) -> Result<ReplayOutcome, StoreError> {
    let original = state.store().get_log(owner_id, log_id)?;
    let endpoint = state.store().get_endpoint(owner_id, original.endpoint_id)?;

    let (target_type, target_url) =
        resolve_target(&state.config().public_url, &endpoint, target);

    // Original content type when recorded, protocol default otherwise
    let content_type = original
        .headers
        .get("content-type")
        .cloned()
        .unwrap_or_else(|| endpoint.kind.default_content_type().to_string());

    // Raw body byte-for-byte when we have it; re-serializing the parsed
    // body is lossy (field order, form encoding) and only a last resort
    let body = match (&original.raw_body, &original.parsed_body) {
        (Some(raw), _) => raw.clone(),
        (None, Some(parsed)) => parsed.to_json().to_string(),
        (None, None) => String::new(),
    };

    let request = ForwardRequest {
        url: target_url.clone(),
        body,
        content_type,
        headers: endpoint.forwarding.headers.clone(),
        timeout_ms: endpoint.forwarding.timeout_ms,
    };
    let result = state.forwarder().forward(&request).await;

    // The new log's status reflects the replay delivery, not the original
    // intake; only request metadata and classification carry over
    let status = if result.success {
        LogStatus::Success
    } else {
        LogStatus::Invalid
    };
    let mut log = WebhookLog::new(endpoint.id, owner_id, status);
    log.headers = original.headers.clone();
    log.parsed_body = original.parsed_body.clone();
    log.raw_body = original.raw_body.clone();
    log.client_ip = original.client_ip.clone();
    log.user_agent = original.user_agent.clone();
    log.resource_type = original.resource_type;
    log.resource_id = original.resource_id.clone();
    log.event_type = original.event_type.clone();
    log.processing_time_ms = result.time_ms;
    log.is_replay = true;
    log.original_log_id = Some(original.id);
    log.replayed_at = Some(Utc::now());
    log.replayed_by = Some(actor.to_string());
    log.apply_forwarding(&target_url, &result, Utc::now());

    let new_log_id = log.id;
    state.store().insert_log(log);
    state.increment_replays_executed();
    global_metrics().record_replay(match target_type {
        ReplayTarget::Endpoint => "endpoint",
        ReplayTarget::Forward => "forward",
    });

    info!(
        original_log_id = %original.id,
        new_log_id = %new_log_id,
        target = ?target_type,
        success = result.success,
        time_ms = result.time_ms,
        "Replay executed"
    );

    Ok(ReplayOutcome {
        success: result.success,
        log_id: new_log_id,
        target_type,
        target_url,
        status: result.status,
        time_ms: result.time_ms,
        error: result.error,
    })
}
