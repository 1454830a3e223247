//! Fire-and-forget dispatch for post-intake forwarding

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::forward::ForwardRequest;
use crate::metrics::global_metrics;
use crate::state::AppState;

/// Spawn a detached delivery task for a just-logged webhook.
///
/// Returns immediately so the intake handler can acknowledge the provider;
/// the outcome lands in the log later through the store's write-once update.
/// A semaphore inside the engine bounds how many of these run at once, so a
/// burst of deliveries queues instead of fanning out without limit.
pub fn spawn_forward(state: &Arc<AppState>, log_id: Uuid, request: ForwardRequest) {
    let state = Arc::clone(state);
    tokio::spawn(async move {
        let Ok(_permit) = state.forwarder().limiter().acquire_owned().await else {
            warn!(log_id = %log_id, "Forward limiter closed, dropping delivery");
            return;
        };

        state.increment_forwards_in_flight();
        global_metrics().inc_forwards_in_flight();
        let result = state.forwarder().forward(&request).await;
        global_metrics().record_forward(result.success, result.time_ms);

        if result.success {
            debug!(
                log_id = %log_id,
                status = ?result.status,
                time_ms = result.time_ms,
                "Forward delivered"
            );
        } else {
            warn!(
                log_id = %log_id,
                error = result.error.as_deref().unwrap_or("unknown"),
                time_ms = result.time_ms,
                "Forward failed"
            );
        }

        state
            .store()
            .apply_forwarding_result(log_id, &request.url, &result);
        state.decrement_forwards_in_flight();
        global_metrics().dec_forwards_in_flight();
    });
}
