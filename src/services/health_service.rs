use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report liveness, probing the quiz store on the way.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.quiz_store().await {
        Some(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "quiz store health check failed");
            }
        }
        None => warn!("no quiz store installed (degraded mode)"),
    }

    let active_sessions = state.registry().active_count();
    if state.is_degraded() {
        HealthResponse::degraded(active_sessions)
    } else {
        HealthResponse::ok(active_sessions)
    }
}
