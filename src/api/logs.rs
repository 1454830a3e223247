//! Webhook log API
//!
//! Read access to the append-only audit trail, single-log deletion, and the
//! replay trigger. List queries go through [`LogQuery`]; everything is scoped
//! to the owner from the `x-owner-id` header.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use uuid::Uuid;

use super::{ApiError, OkResponse, Owner};
use crate::model::WebhookLog;
use crate::replay::{execute_replay, ReplayOutcome, ReplayRequest};
use crate::state::AppState;
use crate::store::{LogPage, LogQuery};

/// Routes under `/api/webhook-logs`
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/webhook-logs", get(list_logs))
        .route(
            "/api/webhook-logs/:id",
            get(get_log).delete(delete_log),
        )
        .route("/api/webhook-logs/:id/replay", post(replay_log))
}

async fn list_logs(
    State(state): State<Arc<AppState>>,
    owner: Owner,
    Query(query): Query<LogQuery>,
) -> Json<LogPage> {
    Json(state.store().query_logs(&owner.0, &query))
}

async fn get_log(
    State(state): State<Arc<AppState>>,
    owner: Owner,
    Path(id): Path<Uuid>,
) -> Result<Json<WebhookLog>, ApiError> {
    Ok(Json(state.store().get_log(&owner.0, id)?))
}

async fn delete_log(
    State(state): State<Arc<AppState>>,
    owner: Owner,
    Path(id): Path<Uuid>,
) -> Result<Json<OkResponse>, ApiError> {
    state.store().delete_log(&owner.0, id)?;
    Ok(Json(OkResponse::new()))
}

/// Re-deliver a stored request body. The body is optional; an empty or
/// missing body replays to the originating endpoint.
async fn replay_log(
    State(state): State<Arc<AppState>>,
    owner: Owner,
    Path(id): Path<Uuid>,
    body: Option<Json<ReplayRequest>>,
) -> Result<Json<ReplayOutcome>, ApiError> {
    let request = body.map(|Json(req)| req).unwrap_or_default();
    let outcome = execute_replay(&state, &owner.0, id, request.target, &owner.0).await?;
    Ok(Json(outcome))
}
