//! Endpoint CRUD
//!
//! Create, list, inspect, patch, and delete webhook endpoints. The endpoint
//! kind is fixed at creation; a patch cannot turn a classic endpoint into a
//! nextgen one. Fields belonging to the other kind are ignored rather than
//! rejected, so clients can send a uniform shape for both.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;
use uuid::Uuid;

use super::{double_option, ApiError, FieldError, OkResponse, Owner};
use crate::error::Error;
use crate::model::{
    Endpoint, EndpointKind, ForwardingConfig, ResourceType, MAX_FORWARD_TIMEOUT_MS,
    MIN_FORWARD_TIMEOUT_MS,
};
use crate::state::AppState;

const MAX_NAME_CHARS: usize = 100;
const MIN_RETENTION_DAYS: u32 = 1;
const MAX_RETENTION_DAYS: u32 = 365;

/// Routes under `/api/endpoints`
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/endpoints", get(list_endpoints).post(create_endpoint))
        .route(
            "/api/endpoints/:id",
            get(get_endpoint)
                .patch(update_endpoint)
                .delete(delete_endpoint),
        )
}

// ============================================================================
// Request / response shapes
// ============================================================================

/// Partial forwarding settings; absent fields keep their current value
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardingInput {
    /// Toggle forwarding on or off
    pub enabled: Option<bool>,

    /// Destination URL; explicit null clears it
    #[serde(default, deserialize_with = "double_option")]
    pub url: Option<Option<String>>,

    /// Extra headers to attach to forwarded requests (replaces the set)
    pub headers: Option<HashMap<String, String>>,

    /// Delivery budget in milliseconds
    pub timeout_ms: Option<u64>,
}

impl ForwardingInput {
    fn validate(&self, errors: &mut Vec<FieldError>) {
        if let Some(Some(url)) = &self.url {
            match Url::parse(url) {
                Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
                _ => errors.push(FieldError::new(
                    "forwarding.url",
                    "must be a valid http(s) URL",
                )),
            }
        }
        if let Some(timeout) = self.timeout_ms {
            if !(MIN_FORWARD_TIMEOUT_MS..=MAX_FORWARD_TIMEOUT_MS).contains(&timeout) {
                errors.push(FieldError::new(
                    "forwarding.timeoutMs",
                    format!(
                        "must be between {} and {}",
                        MIN_FORWARD_TIMEOUT_MS, MAX_FORWARD_TIMEOUT_MS
                    ),
                ));
            }
        }
    }

    fn apply(&self, config: &mut ForwardingConfig) {
        if let Some(enabled) = self.enabled {
            config.enabled = enabled;
        }
        if let Some(url) = &self.url {
            config.url = url.clone();
        }
        if let Some(headers) = &self.headers {
            config.headers = headers.clone();
        }
        if let Some(timeout) = self.timeout_ms {
            config.timeout_ms = timeout;
        }
    }
}

/// Body of `POST /api/endpoints`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEndpointRequest {
    /// Display name, 1 to 100 characters after trimming
    pub name: String,

    /// Intake protocol, `classic` or `nextgen`
    pub kind: String,

    /// Classic only: credential used to fetch full resources
    pub credential_id: Option<Uuid>,

    /// Classic only: resource types to accept
    pub resource_type_filter: Option<Vec<String>>,

    /// Nextgen only: shared secret for signature verification
    pub shared_secret: Option<String>,

    /// Nextgen only: event types to accept
    pub event_type_filter: Option<Vec<String>>,

    /// Forwarding settings
    pub forwarding: Option<ForwardingInput>,

    /// Log retention in days
    pub retention_days: Option<u32>,
}

/// Body of `PATCH /api/endpoints/{id}`.
///
/// Nullable fields use absent-vs-null to distinguish "leave it" from
/// "clear it".
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEndpointRequest {
    /// New display name
    pub name: Option<String>,

    /// Enable or disable intake
    pub is_enabled: Option<bool>,

    /// Classic only: reassign or clear the fetch credential
    #[serde(default, deserialize_with = "double_option")]
    pub credential_id: Option<Option<Uuid>>,

    /// Classic only: replace or clear the resource-type filter
    #[serde(default, deserialize_with = "double_option")]
    pub resource_type_filter: Option<Option<Vec<String>>>,

    /// Nextgen only: rotate or clear the shared secret
    #[serde(default, deserialize_with = "double_option")]
    pub shared_secret: Option<Option<String>>,

    /// Nextgen only: replace or clear the event-type filter
    #[serde(default, deserialize_with = "double_option")]
    pub event_type_filter: Option<Option<Vec<String>>>,

    /// Forwarding settings
    pub forwarding: Option<ForwardingInput>,

    /// Replace or clear the retention window
    #[serde(default, deserialize_with = "double_option")]
    pub retention_days: Option<Option<u32>>,
}

/// Endpoint plus its derived intake URL
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointResponse {
    /// The endpoint record
    #[serde(flatten)]
    pub endpoint: Endpoint,

    /// Where the provider should deliver webhooks for this endpoint
    pub intake_url: String,
}

#[derive(Debug, Serialize)]
struct EndpointListResponse {
    endpoints: Vec<EndpointResponse>,
}

fn respond(state: &AppState, endpoint: Endpoint) -> EndpointResponse {
    let intake_url = endpoint.intake_url(&state.config().public_url);
    EndpointResponse {
        endpoint,
        intake_url,
    }
}

// ============================================================================
// Validation
// ============================================================================

fn validate_name(name: &str, errors: &mut Vec<FieldError>) -> Option<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_NAME_CHARS {
        errors.push(FieldError::new(
            "name",
            format!("must be between 1 and {} characters", MAX_NAME_CHARS),
        ));
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn validate_resource_type_filter(filter: &[String], errors: &mut Vec<FieldError>) {
    for value in filter {
        if !ResourceType::ALL.contains(&value.as_str()) {
            errors.push(FieldError::new(
                "resourceTypeFilter",
                format!("unknown resource type: {}", value),
            ));
        }
    }
}

fn validate_event_type_filter(filter: &[String], errors: &mut Vec<FieldError>) {
    if filter.iter().any(|v| v.trim().is_empty()) {
        errors.push(FieldError::new(
            "eventTypeFilter",
            "entries must be non-empty",
        ));
    }
}

fn validate_shared_secret(secret: &str, errors: &mut Vec<FieldError>) {
    if secret.is_empty() {
        errors.push(FieldError::new("sharedSecret", "must not be empty"));
    }
}

fn validate_credential(
    state: &AppState,
    owner_id: &str,
    credential_id: Uuid,
    errors: &mut Vec<FieldError>,
) {
    if state.store().get_credential(owner_id, credential_id).is_err() {
        errors.push(FieldError::new("credentialId", "credential not found"));
    }
}

fn validate_retention(days: u32, errors: &mut Vec<FieldError>) {
    if !(MIN_RETENTION_DAYS..=MAX_RETENTION_DAYS).contains(&days) {
        errors.push(FieldError::new(
            "retentionDays",
            format!(
                "must be between {} and {}",
                MIN_RETENTION_DAYS, MAX_RETENTION_DAYS
            ),
        ));
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn create_endpoint(
    State(state): State<Arc<AppState>>,
    owner: Owner,
    Json(req): Json<CreateEndpointRequest>,
) -> Result<(StatusCode, Json<EndpointResponse>), ApiError> {
    let mut errors = Vec::new();

    let name = validate_name(&req.name, &mut errors);
    let kind = match req.kind.parse::<EndpointKind>() {
        Ok(kind) => Some(kind),
        Err(_) => {
            errors.push(FieldError::new("kind", "must be one of: classic, nextgen"));
            None
        }
    };

    // Only the fields matching the endpoint's kind are validated; the other
    // kind's fields are ignored entirely.
    match kind {
        Some(EndpointKind::Classic) => {
            if let Some(credential_id) = req.credential_id {
                validate_credential(&state, &owner.0, credential_id, &mut errors);
            }
            if let Some(filter) = &req.resource_type_filter {
                validate_resource_type_filter(filter, &mut errors);
            }
        }
        Some(EndpointKind::Nextgen) => {
            if let Some(secret) = &req.shared_secret {
                validate_shared_secret(secret, &mut errors);
            }
            if let Some(filter) = &req.event_type_filter {
                validate_event_type_filter(filter, &mut errors);
            }
        }
        None => {}
    }
    if let Some(forwarding) = &req.forwarding {
        forwarding.validate(&mut errors);
    }
    if let Some(days) = req.retention_days {
        validate_retention(days, &mut errors);
    }

    let (name, kind) = match (name, kind) {
        (Some(name), Some(kind)) if errors.is_empty() => (name, kind),
        _ => return Err(ApiError::Validation(errors)),
    };

    let mut endpoint = Endpoint::new(owner.0, name, kind);
    match kind {
        EndpointKind::Classic => {
            endpoint.credential_id = req.credential_id;
            endpoint.resource_type_filter = req.resource_type_filter;
        }
        EndpointKind::Nextgen => {
            if let Some(secret) = &req.shared_secret {
                endpoint.encrypted_secret = Some(state.cipher().encrypt(secret).map_err(Error::Crypto)?);
            }
            endpoint.event_type_filter = req.event_type_filter;
        }
    }
    if let Some(forwarding) = &req.forwarding {
        forwarding.apply(&mut endpoint.forwarding);
    }
    endpoint.retention_days = req.retention_days;

    let endpoint = state.store().insert_endpoint(endpoint);
    info!(
        endpoint_id = %endpoint.id,
        kind = %endpoint.kind,
        "Endpoint created"
    );

    Ok((StatusCode::CREATED, Json(respond(&state, endpoint))))
}

async fn list_endpoints(
    State(state): State<Arc<AppState>>,
    owner: Owner,
) -> Json<EndpointListResponse> {
    let endpoints = state
        .store()
        .list_endpoints(&owner.0)
        .into_iter()
        .map(|e| respond(&state, e))
        .collect();
    Json(EndpointListResponse { endpoints })
}

async fn get_endpoint(
    State(state): State<Arc<AppState>>,
    owner: Owner,
    Path(id): Path<Uuid>,
) -> Result<Json<EndpointResponse>, ApiError> {
    let endpoint = state.store().get_endpoint(&owner.0, id)?;
    Ok(Json(respond(&state, endpoint)))
}

async fn update_endpoint(
    State(state): State<Arc<AppState>>,
    owner: Owner,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateEndpointRequest>,
) -> Result<Json<EndpointResponse>, ApiError> {
    // Kind decides which patch fields even get looked at, so resolve the
    // record first. The read-then-update pair is fine here since patches to
    // the same endpoint are last-writer-wins anyway.
    let existing = state.store().get_endpoint(&owner.0, id)?;

    let mut errors = Vec::new();
    let name = match &req.name {
        Some(name) => validate_name(name, &mut errors),
        None => None,
    };
    match existing.kind {
        EndpointKind::Classic => {
            if let Some(Some(credential_id)) = req.credential_id {
                validate_credential(&state, &owner.0, credential_id, &mut errors);
            }
            if let Some(Some(filter)) = &req.resource_type_filter {
                validate_resource_type_filter(filter, &mut errors);
            }
        }
        EndpointKind::Nextgen => {
            if let Some(Some(secret)) = &req.shared_secret {
                validate_shared_secret(secret, &mut errors);
            }
            if let Some(Some(filter)) = &req.event_type_filter {
                validate_event_type_filter(filter, &mut errors);
            }
        }
    }
    if let Some(forwarding) = &req.forwarding {
        forwarding.validate(&mut errors);
    }
    if let Some(Some(days)) = req.retention_days {
        validate_retention(days, &mut errors);
    }
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    // Encrypt outside the store lock
    let secret_update = match req.shared_secret {
        Some(Some(ref secret)) => Some(Some(
            state.cipher().encrypt(secret).map_err(Error::Crypto)?,
        )),
        Some(None) => Some(None),
        None => None,
    };

    let updated = state.store().update_endpoint(&owner.0, id, |e| {
        if let Some(name) = name {
            e.name = name;
        }
        if let Some(enabled) = req.is_enabled {
            e.is_enabled = enabled;
        }
        match e.kind {
            EndpointKind::Classic => {
                if let Some(credential) = req.credential_id {
                    e.credential_id = credential;
                }
                if let Some(filter) = req.resource_type_filter {
                    e.resource_type_filter = filter;
                }
            }
            EndpointKind::Nextgen => {
                if let Some(secret) = secret_update {
                    e.encrypted_secret = secret;
                }
                if let Some(filter) = req.event_type_filter {
                    e.event_type_filter = filter;
                }
            }
        }
        if let Some(forwarding) = &req.forwarding {
            forwarding.apply(&mut e.forwarding);
        }
        if let Some(retention) = req.retention_days {
            e.retention_days = retention;
        }
    })?;

    info!(endpoint_id = %updated.id, "Endpoint updated");
    Ok(Json(respond(&state, updated)))
}

async fn delete_endpoint(
    State(state): State<Arc<AppState>>,
    owner: Owner,
    Path(id): Path<Uuid>,
) -> Result<Json<OkResponse>, ApiError> {
    state.store().delete_endpoint(&owner.0, id)?;
    info!(endpoint_id = %id, "Endpoint deleted");
    Ok(Json(OkResponse::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn errors_for_create(req: &CreateEndpointRequest) -> Vec<String> {
        let mut errors = Vec::new();
        validate_name(&req.name, &mut errors);
        if req.kind.parse::<EndpointKind>().is_err() {
            errors.push(FieldError::new("kind", "must be one of: classic, nextgen"));
        }
        errors.into_iter().map(|e| e.field).collect()
    }

    #[test]
    fn test_name_validation_trims_and_bounds() {
        let mut errors = Vec::new();
        assert_eq!(
            validate_name("  payments  ", &mut errors),
            Some("payments".to_string())
        );
        assert!(errors.is_empty());

        assert_eq!(validate_name("   ", &mut errors), None);
        assert_eq!(validate_name(&"x".repeat(101), &mut errors), None);
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.field == "name"));
    }

    #[test]
    fn test_create_rejects_unknown_kind() {
        let req = CreateEndpointRequest {
            name: "ok".to_string(),
            kind: "legacy".to_string(),
            credential_id: None,
            resource_type_filter: None,
            shared_secret: None,
            event_type_filter: None,
            forwarding: None,
            retention_days: None,
        };
        assert_eq!(errors_for_create(&req), vec!["kind".to_string()]);
    }

    #[test]
    fn test_resource_type_filter_rejects_unknown_values() {
        let mut errors = Vec::new();
        validate_resource_type_filter(
            &["payment".to_string(), "invoice".to_string()],
            &mut errors,
        );
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "resourceTypeFilter");
        assert!(errors[0].message.contains("invoice"));
    }

    #[test]
    fn test_forwarding_validation() {
        let mut errors = Vec::new();
        let input = ForwardingInput {
            enabled: Some(true),
            url: Some(Some("ftp://example.com/hook".to_string())),
            headers: None,
            timeout_ms: Some(500),
        };
        input.validate(&mut errors);
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["forwarding.url", "forwarding.timeoutMs"]);
    }

    #[test]
    fn test_retention_bounds() {
        let mut errors = Vec::new();
        validate_retention(1, &mut errors);
        validate_retention(365, &mut errors);
        assert!(errors.is_empty());
        validate_retention(0, &mut errors);
        validate_retention(366, &mut errors);
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_forwarding_apply_merges_partial_input() {
        let mut config = ForwardingConfig::default();
        let input = ForwardingInput {
            enabled: Some(true),
            url: Some(Some("https://example.com/sink".to_string())),
            headers: None,
            timeout_ms: None,
        };
        input.apply(&mut config);
        assert!(config.enabled);
        assert_eq!(config.url.as_deref(), Some("https://example.com/sink"));
        assert_eq!(config.timeout_ms, crate::model::DEFAULT_FORWARD_TIMEOUT_MS);

        let clear = ForwardingInput {
            enabled: None,
            url: Some(None),
            headers: None,
            timeout_ms: None,
        };
        clear.apply(&mut config);
        assert!(config.enabled);
        assert_eq!(config.url, None);
    }
}
