use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::{
        quiz::{QuestionView, QuizInput},
        session::LeaderboardEntry,
    },
    error::ServiceError,
    state::state_machine::{EndReason, SessionPhase},
};

/// Messages accepted from WebSocket clients (hosts and participants).
#[derive(Debug, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Host opens a new session from an inline or stored quiz.
    CreateSession {
        host_id: String,
        /// Shared host key, required when the server is configured with one.
        #[serde(default)]
        host_key: Option<String>,
        #[serde(default)]
        quiz: Option<QuizInput>,
        #[serde(default)]
        quiz_id: Option<Uuid>,
    },
    /// Host re-attaches to an existing session.
    HostAttach { session_id: Uuid, host_token: String },
    /// Host opens the first question.
    Start,
    /// Host opens the next question (or finishes when none remain).
    NextQuestion,
    /// Host closes the active question and reveals the answer.
    Reveal,
    /// Host shows the final leaderboard.
    Finish,
    /// Host terminates the session.
    EndSession,
    /// Participant joins with a join code and display name.
    Join { code: String, name: String },
    /// Participant resumes an earlier membership.
    Reconnect { code: String, participant_id: Uuid },
    /// Participant answers the open question.
    Answer { question_index: usize, choice: usize },
}

impl ClientMessage {
    /// Parse and validate a text frame.
    pub fn from_json_str(text: &str) -> Result<Self, ServiceError> {
        let message: Self = serde_json::from_str(text)
            .map_err(|err| ServiceError::InvalidInput(format!("malformed message: {err}")))?;
        if let ClientMessage::CreateSession {
            quiz: Some(quiz), ..
        } = &message
        {
            quiz.validate()?;
        }
        Ok(message)
    }

    /// Wire name of the message, used in acknowledgements and logs.
    pub fn command(&self) -> &'static str {
        match self {
            ClientMessage::CreateSession { .. } => "create_session",
            ClientMessage::HostAttach { .. } => "host_attach",
            ClientMessage::Start => "start",
            ClientMessage::NextQuestion => "next_question",
            ClientMessage::Reveal => "reveal",
            ClientMessage::Finish => "finish",
            ClientMessage::EndSession => "end_session",
            ClientMessage::Join { .. } => "join",
            ClientMessage::Reconnect { .. } => "reconnect",
            ClientMessage::Answer { .. } => "answer",
        }
    }

    /// Whether the message may open a socket.
    pub fn is_identification(&self) -> bool {
        matches!(
            self,
            ClientMessage::CreateSession { .. }
                | ClientMessage::HostAttach { .. }
                | ClientMessage::Join { .. }
                | ClientMessage::Reconnect { .. }
        )
    }
}

/// Result of an acknowledged host command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AckOutcome {
    /// The command was applied.
    Applied,
    /// The round was already closed by its timer; nothing changed.
    AlreadyClosed,
    /// `next_question` found no question left and finished the quiz instead.
    Finished,
}

/// Messages pushed to WebSocket clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Current lifecycle state, sent on every transition and on attach.
    SessionState {
        state: SessionPhase,
        current_question_index: Option<usize>,
        version: usize,
    },
    /// A question round opened.
    QuestionOpened {
        question_index: usize,
        question: QuestionView,
        /// RFC 3339 wall-clock deadline.
        close_at: String,
        time_limit_ms: u64,
    },
    /// A question round closed.
    QuestionClosed {
        question_index: usize,
        correct_option: usize,
    },
    /// Ranked standings.
    Leaderboard { entries: Vec<LeaderboardEntry> },
    /// The session is over.
    SessionEnded { reason: EndReason },
    /// Reply to `create_session`.
    SessionCreated {
        session_id: Uuid,
        join_code: String,
        host_token: String,
    },
    /// Reply to `join` and `reconnect`.
    Joined {
        session_id: Uuid,
        participant_id: Uuid,
        name: String,
        score: u64,
    },
    /// Reply to an accepted `answer`.
    AnswerAccepted { question_index: usize },
    /// Reply to an applied host command.
    Ack {
        command: String,
        outcome: AckOutcome,
    },
    /// Reply to a refused command.
    Error {
        code: String,
        message: String,
        retryable: bool,
    },
}

impl ServerMessage {
    /// Acknowledge `command`.
    pub fn ack(command: &str, outcome: AckOutcome) -> Self {
        ServerMessage::Ack {
            command: command.to_owned(),
            outcome,
        }
    }
}

impl From<&ServiceError> for ServerMessage {
    fn from(err: &ServiceError) -> Self {
        ServerMessage::Error {
            code: err.code().to_owned(),
            message: err.to_string(),
            retryable: err.retryable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::state::round::AnswerRejection;

    #[test]
    fn parses_participant_messages() {
        let message =
            ClientMessage::from_json_str(r#"{"type":"join","code":"abc123","name":"Ann"}"#)
                .unwrap();
        assert!(message.is_identification());
        assert_eq!(message.command(), "join");

        let answer =
            ClientMessage::from_json_str(r#"{"type":"answer","question_index":1,"choice":2}"#)
                .unwrap();
        assert!(matches!(
            answer,
            ClientMessage::Answer {
                question_index: 1,
                choice: 2
            }
        ));
        assert!(!answer.is_identification());
    }

    #[test]
    fn invalid_inline_quiz_is_refused() {
        let err = ClientMessage::from_json_str(
            r#"{"type":"create_session","host_id":"h","quiz":{"title":"t","questions":[]}}"#,
        )
        .unwrap_err();
        assert_eq!(err.code(), "invalid_input");
    }

    #[test]
    fn create_session_carries_optional_host_key() {
        let id = Uuid::nil();
        let keyed = ClientMessage::from_json_str(&format!(
            r#"{{"type":"create_session","host_id":"h","host_key":"k","quiz_id":"{id}"}}"#
        ))
        .unwrap();
        assert!(matches!(
            keyed,
            ClientMessage::CreateSession { host_key: Some(ref key), .. } if key == "k"
        ));

        let bare = ClientMessage::from_json_str(&format!(
            r#"{{"type":"create_session","host_id":"h","quiz_id":"{id}"}}"#
        ))
        .unwrap();
        assert!(matches!(
            bare,
            ClientMessage::CreateSession { host_key: None, .. }
        ));
    }

    #[test]
    fn unknown_type_is_invalid_input() {
        let err = ClientMessage::from_json_str(r#"{"type":"dance"}"#).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[test]
    fn server_messages_are_type_tagged() {
        let value = serde_json::to_value(ServerMessage::SessionState {
            state: SessionPhase::QuestionActive,
            current_question_index: Some(0),
            version: 3,
        })
        .unwrap();
        assert_eq!(
            value,
            json!({
                "type": "session_state",
                "state": "question_active",
                "current_question_index": 0,
                "version": 3
            })
        );

        let ended = serde_json::to_value(ServerMessage::SessionEnded {
            reason: EndReason::HostIdleTimeout,
        })
        .unwrap();
        assert_eq!(ended, json!({"type": "session_ended", "reason": "host_idle_timeout"}));
    }

    #[test]
    fn errors_carry_code_and_retry_flag() {
        let value = serde_json::to_value(ServerMessage::from(&ServiceError::from(
            AnswerRejection::TooLate,
        )))
        .unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["code"], "too_late");
        assert_eq!(value["retryable"], false);

        let ack = serde_json::to_value(ServerMessage::ack("reveal", AckOutcome::AlreadyClosed))
            .unwrap();
        assert_eq!(
            ack,
            json!({"type": "ack", "command": "reveal", "outcome": "already_closed"})
        );
    }
}
