use serde::Serialize;
use utoipa::ToSchema;

/// Simple health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Sessions currently registered.
    pub active_sessions: usize,
}

impl HealthResponse {
    /// The quiz store is reachable.
    pub fn ok(active_sessions: usize) -> Self {
        Self {
            status: "ok".to_string(),
            active_sessions,
        }
    }

    /// Running without a usable quiz store; live sessions with inline quizzes still work.
    pub fn degraded(active_sessions: usize) -> Self {
        Self {
            status: "degraded".to_string(),
            active_sessions,
        }
    }
}
