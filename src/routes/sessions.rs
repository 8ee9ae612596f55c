use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State},
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use validator::Validate;

use crate::{
    dto::session::{CreateSessionRequest, LeaderboardResponse, SessionCreatedResponse, SessionSummary},
    error::AppError,
    services::{
        public_service,
        session_service::{self, QuizSource},
    },
    state::SharedState,
};

const HOST_KEY_HEADER: &str = "x-host-key";

/// Session creation and public lookups by join code.
pub fn router(state: SharedState) -> Router<SharedState> {
    let guarded = Router::new()
        .route("/sessions", post(create_session))
        .route_layer(middleware::from_fn_with_state(state, require_host_key));

    Router::new()
        .route("/sessions/{code}", get(get_session))
        .route("/sessions/{code}/leaderboard", get(get_leaderboard))
        .merge(guarded)
}

#[utoipa::path(
    post,
    path = "/sessions",
    tag = "sessions",
    request_body = CreateSessionRequest,
    params(("x-host-key" = Option<String>, Header, description = "Shared host key, when configured")),
    responses(
        (status = 201, description = "Session created in the lobby", body = SessionCreatedResponse),
        (status = 400, description = "Invalid quiz or request"),
        (status = 401, description = "Missing or wrong host key"),
        (status = 429, description = "Too many active sessions"),
        (status = 503, description = "Stored quiz requested while degraded")
    )
)]
/// Open a new session. The host then attaches over `/ws` with `host_attach`.
pub async fn create_session(
    State(state): State<SharedState>,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionCreatedResponse>), AppError> {
    payload.validate()?;
    let source = QuizSource::from_parts(payload.quiz, payload.quiz_id)?;
    let (_, created) = session_service::create_session(&state, payload.host_id, source).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    get,
    path = "/sessions/{code}",
    tag = "sessions",
    params(("code" = String, Path, description = "Join code (case-insensitive)")),
    responses(
        (status = 200, description = "Session summary", body = SessionSummary),
        (status = 404, description = "No active session for this code")
    )
)]
/// Public summary of a live session.
pub async fn get_session(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Json<SessionSummary>, AppError> {
    let summary = public_service::session_summary(&state, &code).await?;
    Ok(Json(summary))
}

#[utoipa::path(
    get,
    path = "/sessions/{code}/leaderboard",
    tag = "sessions",
    params(("code" = String, Path, description = "Join code (case-insensitive)")),
    responses(
        (status = 200, description = "Ranked standings", body = LeaderboardResponse),
        (status = 404, description = "No active session for this code")
    )
)]
/// Current leaderboard of a live session.
pub async fn get_leaderboard(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Json<LeaderboardResponse>, AppError> {
    let board = public_service::leaderboard(&state, &code).await?;
    Ok(Json(board))
}

async fn require_host_key(
    State(state): State<SharedState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let provided = req
        .headers()
        .get(HOST_KEY_HEADER)
        .and_then(|value| value.to_str().ok());
    session_service::authorize_host_key(&state, provided)?;
    Ok(next.run(req).await)
}
