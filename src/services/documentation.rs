use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the live quiz backend.
///
/// The WebSocket protocol is documented through the `ClientMessage` and
/// `ServerMessage` schemas.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sessions::create_session,
        crate::routes::sessions::get_session,
        crate::routes::sessions::get_leaderboard,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::quiz::QuizInput,
            crate::dto::quiz::QuestionInput,
            crate::dto::quiz::QuestionView,
            crate::dto::session::CreateSessionRequest,
            crate::dto::session::SessionCreatedResponse,
            crate::dto::session::SessionSummary,
            crate::dto::session::LeaderboardEntry,
            crate::dto::session::LeaderboardResponse,
            crate::dto::ws::ClientMessage,
            crate::dto::ws::ServerMessage,
            crate::dto::ws::AckOutcome,
            crate::state::state_machine::SessionPhase,
            crate::state::state_machine::EndReason,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sessions", description = "Session creation and public lookups"),
        (name = "live", description = "WebSocket channel for hosts and participants"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/healthcheck",
            "/sessions",
            "/sessions/{code}",
            "/sessions/{code}/leaderboard",
            "/ws",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
