//! Provider API credential management
//!
//! Credentials back classic intake: when a delivery arrives carrying only a
//! resource id, the endpoint's assigned credential is decrypted and used to
//! fetch the full resource. Keys are encrypted at rest and never leave this
//! process; responses expose only the last four characters.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::{ApiError, FieldError, OkResponse, Owner};
use crate::error::Error;
use crate::model::ApiCredential;
use crate::state::AppState;

const MAX_LABEL_CHARS: usize = 100;
const MIN_KEY_CHARS: usize = 8;

/// Routes under `/api/credentials`
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/credentials",
            get(list_credentials).post(create_credential),
        )
        .route("/api/credentials/:id", axum::routing::delete(delete_credential))
}

/// Body of `POST /api/credentials`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCredentialRequest {
    /// Display label, 1 to 100 characters after trimming
    pub label: String,

    /// Plaintext provider API key; encrypted before storage
    pub api_key: String,

    /// Make this the owner's default credential
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Serialize)]
struct CredentialListResponse {
    credentials: Vec<ApiCredential>,
}

async fn create_credential(
    State(state): State<Arc<AppState>>,
    owner: Owner,
    Json(req): Json<CreateCredentialRequest>,
) -> Result<(StatusCode, Json<ApiCredential>), ApiError> {
    let mut errors = Vec::new();

    let label = req.label.trim();
    if label.is_empty() || label.chars().count() > MAX_LABEL_CHARS {
        errors.push(FieldError::new(
            "label",
            format!("must be between 1 and {} characters", MAX_LABEL_CHARS),
        ));
    }
    let api_key = req.api_key.trim();
    if api_key.chars().count() < MIN_KEY_CHARS {
        errors.push(FieldError::new(
            "apiKey",
            format!("must be at least {} characters", MIN_KEY_CHARS),
        ));
    }
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let encrypted_key = state.cipher().encrypt(api_key).map_err(Error::Crypto)?;
    let last_four = last_four(api_key);

    let credential = state.store().insert_credential(ApiCredential {
        id: Uuid::new_v4(),
        owner_id: owner.0,
        label: label.to_string(),
        encrypted_key,
        last_four,
        is_default: req.is_default,
        is_valid: true,
        last_validated_at: None,
        created_at: Utc::now(),
    });
    info!(credential_id = %credential.id, "Credential created");

    Ok((StatusCode::CREATED, Json(credential)))
}

async fn list_credentials(
    State(state): State<Arc<AppState>>,
    owner: Owner,
) -> Json<CredentialListResponse> {
    Json(CredentialListResponse {
        credentials: state.store().list_credentials(&owner.0),
    })
}

/// Deleting a credential does not touch endpoints that reference it; their
/// next classic delivery records a fetch failure instead.
async fn delete_credential(
    State(state): State<Arc<AppState>>,
    owner: Owner,
    Path(id): Path<Uuid>,
) -> Result<Json<OkResponse>, ApiError> {
    state.store().delete_credential(&owner.0, id)?;
    info!(credential_id = %id, "Credential deleted");
    Ok(Json(OkResponse::new()))
}

fn last_four(key: &str) -> String {
    let count = key.chars().count();
    key.chars().skip(count.saturating_sub(4)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_four() {
        assert_eq!(last_four("test_abcdef123456"), "3456");
        assert_eq!(last_four("abc"), "abc");
        assert_eq!(last_four(""), "");
    }

    #[test]
    fn test_create_request_accepts_camel_case() {
        let req: CreateCredentialRequest = serde_json::from_str(
            r#"{"label": "Live key", "apiKey": "live_abcdef123456", "isDefault": true}"#,
        )
        .unwrap();
        assert_eq!(req.label, "Live key");
        assert_eq!(req.api_key, "live_abcdef123456");
        assert!(req.is_default);
    }

    #[test]
    fn test_is_default_defaults_to_false() {
        let req: CreateCredentialRequest =
            serde_json::from_str(r#"{"label": "k", "apiKey": "test_12345678"}"#).unwrap();
        assert!(!req.is_default);
    }
}
