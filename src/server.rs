//! HTTP server assembly
//!
//! Composes the three routers into one application:
//! - intake (`/api/webhooks/...`) - provider-facing, no CORS, no auth header
//! - management (`/api/...`) - owner-facing CRUD and replay, CORS-guarded
//! - status (`/health`, `/ready`, `/status`, `/metrics`) - monitoring

use std::sync::Arc;

use axum::Router;

use crate::cors::cors_layer_with_origins;
use crate::state::AppState;
use crate::{api, handlers, intake};

/// Build the complete application router.
///
/// CORS applies to the management and status routes only; intake traffic is
/// server-to-server and carries no browser origin.
pub fn app_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer_with_origins(&state.config().cors_origins);

    Router::new()
        .merge(intake::intake_router())
        .merge(api::api_router().layer(cors.clone()))
        .merge(handlers::status_router().layer(cors))
        .with_state(state)
}
