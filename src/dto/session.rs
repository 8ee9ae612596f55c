//! DTO definitions for session creation and the public session endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::{format_system_time, quiz::QuizInput},
    state::{leaderboard::Standing, session::Session, state_machine::SessionPhase},
};

/// Payload used by a host to open a new session.
///
/// Exactly one of `quiz` (inline definition) or `quiz_id` (stored definition) must be set.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct CreateSessionRequest {
    #[validate(length(min = 1, max = 128))]
    pub host_id: String,
    #[serde(default)]
    #[validate(nested)]
    pub quiz: Option<QuizInput>,
    #[serde(default)]
    pub quiz_id: Option<Uuid>,
}

/// Returned once a session exists. `host_token` is needed to re-attach as host.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionCreatedResponse {
    pub session_id: Uuid,
    pub join_code: String,
    pub host_token: String,
}

/// Public projection of a running session.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub join_code: String,
    pub quiz_title: String,
    pub state: SessionPhase,
    pub current_question_index: Option<usize>,
    pub question_count: usize,
    pub participant_count: usize,
    pub connected_participants: usize,
    pub host_connected: bool,
    pub version: usize,
    pub created_at: String,
}

impl From<&Session> for SessionSummary {
    fn from(session: &Session) -> Self {
        let snapshot = session.snapshot();
        Self {
            session_id: session.id(),
            join_code: session.join_code().to_owned(),
            quiz_title: session.quiz().title.clone(),
            state: snapshot.phase,
            current_question_index: session.current_question(),
            question_count: session.quiz().len(),
            participant_count: session.participants().count(),
            connected_participants: session.connected_participants(),
            host_connected: session.host_connected(),
            version: snapshot.version,
            created_at: format_system_time(session.created_at()),
        }
    }
}

/// One ranked row of a leaderboard.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct LeaderboardEntry {
    /// One-based rank; ties keep join order.
    pub rank: usize,
    pub participant_id: Uuid,
    pub name: String,
    pub score: u64,
}

impl LeaderboardEntry {
    /// Rank a leaderboard snapshot.
    pub fn ranked(standings: Vec<Standing>) -> Vec<Self> {
        standings
            .into_iter()
            .enumerate()
            .map(|(index, standing)| Self {
                rank: index + 1,
                participant_id: standing.participant_id,
                name: standing.name,
                score: standing.score,
            })
            .collect()
    }
}

/// Leaderboard of a running session.
#[derive(Debug, Serialize, ToSchema)]
pub struct LeaderboardResponse {
    pub session_id: Uuid,
    pub state: SessionPhase,
    pub entries: Vec<LeaderboardEntry>,
}
