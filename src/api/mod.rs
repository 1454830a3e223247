//! Management API
//!
//! Owner-facing CRUD over endpoints, credentials, and logs, plus the replay
//! trigger. Everything here requires the `x-owner-id` header; the intake
//! routes in [`crate::intake`] deliberately do not, since providers cannot
//! send it.
//!
//! Error policy: validation failures answer 400 with field-level details,
//! resolution failures answer 404 without revealing whether a foreign id
//! exists, and anything unexpected answers a generic 500 with the detail
//! kept in the server log.

pub mod credentials;
pub mod endpoints;
pub mod logs;

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use http::StatusCode;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::error;

use crate::error::StoreError;
use crate::state::AppState;

/// Header carrying the acting owner on every management request
pub const OWNER_HEADER: &str = "x-owner-id";

/// Build the management router
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .merge(endpoints::router())
        .merge(credentials::router())
        .merge(logs::router())
}

// ============================================================================
// Errors
// ============================================================================

/// One field-level validation failure
#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    /// Offending request field, camelCase as the client sent it
    pub field: String,

    /// What was wrong with it
    pub message: String,
}

impl FieldError {
    /// Create a field error
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Management API error, rendered as a JSON error envelope
#[derive(Debug, Error)]
pub enum ApiError {
    /// Request lacked the owner header
    #[error("Missing {OWNER_HEADER} header")]
    MissingOwner,

    /// Request failed field validation
    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    /// Target record does not exist for this owner
    #[error("{0}")]
    NotFound(String),

    /// Anything unexpected; detail stays server-side
    #[error("Internal server error")]
    Internal(crate::error::Error),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::NotFound(err.to_string())
    }
}

/// Store lookups stay 404s even when they surface wrapped in the general
/// error type; everything else is a 500.
impl From<crate::error::Error> for ApiError {
    fn from(err: crate::error::Error) -> Self {
        match err {
            crate::error::Error::Store(store) => store.into(),
            other => ApiError::Internal(other),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Vec<FieldError>>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::MissingOwner => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    error: self.to_string(),
                    details: None,
                },
            ),
            ApiError::Validation(details) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    error: "Validation failed".to_string(),
                    details: Some(details),
                },
            ),
            ApiError::NotFound(message) => (
                StatusCode::NOT_FOUND,
                ErrorBody {
                    error: message,
                    details: None,
                },
            ),
            ApiError::Internal(err) => {
                error!(error = %err, "Management API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        error: "Internal server error".to_string(),
                        details: None,
                    },
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

/// Generic `{ok: true}` acknowledgment for deletions
#[derive(Debug, Serialize)]
pub struct OkResponse {
    /// Always true
    pub ok: bool,
}

impl OkResponse {
    /// Create the acknowledgment
    pub fn new() -> Self {
        Self { ok: true }
    }
}

impl Default for OkResponse {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Owner extraction
// ============================================================================

/// The acting owner, extracted from the `x-owner-id` header.
///
/// Absence (or an empty value) rejects with 401 before the handler runs.
#[derive(Debug, Clone)]
pub struct Owner(pub String);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Owner {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(OWNER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| Owner(v.to_string()))
            .ok_or(ApiError::MissingOwner)
    }
}

/// Deserialize a JSON field distinguishing "absent" from "explicitly null".
///
/// `Option<Option<T>>` with this deserializer: `None` = field absent (leave
/// unchanged), `Some(None)` = field null (clear it), `Some(Some(v))` = set.
pub(crate) fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}
