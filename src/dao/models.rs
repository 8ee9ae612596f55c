use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

/// Quiz definition as stored by the definition provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuizEntity {
    /// Stable identifier for the quiz.
    pub id: Uuid,
    /// Human readable quiz title.
    pub title: String,
    /// Questions in play order.
    pub questions: Vec<QuestionEntity>,
}

/// Question entry inside a quiz.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionEntity {
    /// Text shown to participants.
    pub prompt: String,
    /// Answer options.
    pub options: Vec<String>,
    /// Index of the correct option.
    pub correct_option: usize,
    /// Time (milliseconds) participants have to answer.
    pub time_limit_ms: u64,
    /// Points for an instant correct answer.
    pub points: u32,
}

/// Final standings of an ended session, written once for later lookup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeaderboardArchiveEntity {
    /// Session the standings belong to.
    pub session_id: Uuid,
    /// Join code used while the session was active.
    pub join_code: String,
    /// Quiz that was played.
    pub quiz_id: Uuid,
    /// Title of the quiz that was played.
    pub quiz_title: String,
    /// Host identity that created the session.
    pub host_id: String,
    /// Why the session ended (snake_case reason).
    pub end_reason: String,
    /// Number of questions that were opened.
    pub questions_played: usize,
    /// Session creation time.
    pub created_at: SystemTime,
    /// Session end time.
    pub ended_at: SystemTime,
    /// Ranked standings.
    pub standings: Vec<ArchivedStandingEntity>,
}

/// One ranked row of an archived leaderboard.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArchivedStandingEntity {
    /// One-based rank.
    pub rank: usize,
    /// Participant identifier.
    pub participant_id: Uuid,
    /// Display name.
    pub name: String,
    /// Final cumulative score.
    pub score: u64,
}
