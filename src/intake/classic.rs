//! Classic webhook handling: resource id in, full resource fetched back
//!
//! The classic protocol is reference-based. The provider sends only a
//! resource id; everything interesting is fetched from the provider API with
//! the owner's decrypted credential. Every gate past endpoint resolution
//! acknowledges with 200 so the provider never retries; a failed fetch is
//! recorded on the log, not surfaced to the provider.

use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use http::StatusCode;
use tracing::debug;
use uuid::Uuid;

use crate::forward::spawn_forward;
use crate::intake::{forward_request_for, parse_body, write_log, IntakeResponse, RequestMeta};
use crate::model::{Endpoint, LogStatus, ResourceType, WebhookLog};
use crate::state::AppState;

pub(super) async fn handle(
    state: Arc<AppState>,
    endpoint: Endpoint,
    meta: RequestMeta,
    raw: &[u8],
    started: Instant,
) -> (StatusCode, Json<IntakeResponse>) {
    let raw_body = String::from_utf8_lossy(raw).into_owned();
    let parsed = parse_body(meta.content_type.as_deref(), raw);

    // An empty id is as useless as a missing one
    let resource_id = parsed.resource_id().filter(|id| !id.is_empty());
    let Some(resource_id) = resource_id else {
        let mut log = WebhookLog::new(endpoint.id, &endpoint.owner_id, LogStatus::Invalid);
        meta.apply(&mut log);
        log.parsed_body = Some(parsed);
        log.raw_body = Some(raw_body);
        log.error = Some("Missing or invalid resource id".to_string());
        write_log(&state, endpoint.kind, log, started);
        return (
            StatusCode::BAD_REQUEST,
            Json(IntakeResponse::error("Missing or invalid resource id")),
        );
    };

    let resource_type = ResourceType::from_resource_id(&resource_id);

    // Allow-list filtering is deliberately unaudited: acknowledged, but no
    // log and no stats
    if !endpoint.accepts_resource_type(resource_type) {
        debug!(
            endpoint_id = %endpoint.id,
            resource_type = %resource_type,
            "Delivery dropped by resource-type filter"
        );
        return (StatusCode::OK, Json(IntakeResponse::filtered()));
    }

    let outcome = fetch_resource(&state, &endpoint, resource_type, &resource_id).await;

    let mut log = WebhookLog::new(
        endpoint.id,
        &endpoint.owner_id,
        match outcome {
            Ok(_) => LogStatus::Success,
            Err(_) => LogStatus::FetchFailed,
        },
    );
    meta.apply(&mut log);
    log.parsed_body = Some(parsed);
    log.raw_body = Some(raw_body.clone());
    log.resource_type = Some(resource_type);
    log.resource_id = Some(resource_id);
    match outcome {
        Ok(resource) => log.fetched_resource = Some(resource),
        Err(message) => log.error = Some(message),
    }

    let succeeded = log.status == LogStatus::Success;
    let log_id = write_log(&state, endpoint.kind, log, started);

    if succeeded {
        state.store().record_received(endpoint.id);
        dispatch_forwarding(&state, &endpoint, &meta, &raw_body, log_id);
    }

    (StatusCode::OK, Json(IntakeResponse::ok()))
}

/// Resolve a credential, decrypt it, and fetch the full resource. Any
/// failure collapses into the message recorded as the log's fetch error.
async fn fetch_resource(
    state: &Arc<AppState>,
    endpoint: &Endpoint,
    resource_type: ResourceType,
    resource_id: &str,
) -> Result<serde_json::Value, String> {
    let credential_id = endpoint
        .credential_id
        .ok_or_else(|| "No API key configured for endpoint".to_string())?;
    let credential = state
        .store()
        .get_credential(&endpoint.owner_id, credential_id)
        .map_err(|_| "API key not found".to_string())?;

    let api_key = state
        .cipher()
        .decrypt(&credential.encrypted_key)
        .map_err(|e| e.to_string())?;

    state
        .fetcher()
        .fetch(&api_key, resource_type, resource_id)
        .await
        .map_err(|e| e.to_string())
}

fn dispatch_forwarding(
    state: &Arc<AppState>,
    endpoint: &Endpoint,
    meta: &RequestMeta,
    raw_body: &str,
    log_id: Uuid,
) {
    if let Some(request) = forward_request_for(endpoint, meta.content_type.as_deref(), raw_body) {
        spawn_forward(state, log_id, request);
    }
}
