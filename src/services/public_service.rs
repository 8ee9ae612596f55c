//! Read-only projections of live sessions, looked up by join code.

use crate::{
    dto::session::{LeaderboardEntry, LeaderboardResponse, SessionSummary},
    error::ServiceError,
    state::SharedState,
};

/// Summary of the session behind `code`.
pub async fn session_summary(state: &SharedState, code: &str) -> Result<SessionSummary, ServiceError> {
    let handle = state.registry().resolve(code)?;
    let session = handle.lock().await;
    Ok(SessionSummary::from(&*session))
}

/// Current leaderboard of the session behind `code`.
pub async fn leaderboard(state: &SharedState, code: &str) -> Result<LeaderboardResponse, ServiceError> {
    let handle = state.registry().resolve(code)?;
    let session = handle.lock().await;
    Ok(LeaderboardResponse {
        session_id: session.id(),
        state: session.phase(),
        entries: LeaderboardEntry::ranked(session.standings()),
    })
}
