use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;
use validator::ValidationErrors;

use crate::{
    dao::storage::StorageError,
    state::{round::AnswerRejection, state_machine::InvalidTransition},
};

/// Errors that can occur in service layer operations.
///
/// Each variant maps to a stable [`ServiceError::code`] so real-time clients can
/// decide whether to retry, ignore or surface the failure.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Unknown join code, session id or participant id.
    #[error("not found: {0}")]
    NotFound(String),
    /// The session state machine refused the command.
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    /// Registry or session limits reached.
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),
    /// An answer submission was refused.
    #[error("answer rejected: {0}")]
    Answer(#[from] AnswerRejection),
    /// No question remains after the current one.
    #[error("no question remains")]
    OutOfQuestions,
    /// Too few connected participants to open the first question.
    #[error("at least {required} connected participant(s) required, {connected} connected")]
    NotEnoughParticipants {
        /// Configured minimum.
        required: usize,
        /// Currently connected participants.
        connected: usize,
    },
    /// The session no longer accepts new participants.
    #[error("session is no longer accepting participants")]
    JoinClosed,
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Unauthorized access attempt.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
}

impl ServiceError {
    /// Machine-readable error code sent to real-time clients.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::NotFound(_) => "not_found",
            ServiceError::InvalidTransition(_) => "invalid_transition",
            ServiceError::CapacityExceeded(_) => "capacity_exceeded",
            ServiceError::Answer(AnswerRejection::TooLate) => "too_late",
            ServiceError::Answer(AnswerRejection::Duplicate) => "duplicate",
            ServiceError::Answer(AnswerRejection::WrongRound) => "wrong_round",
            ServiceError::Answer(AnswerRejection::UnknownParticipant) => "unknown_participant",
            ServiceError::Answer(AnswerRejection::InvalidChoice) => "invalid_choice",
            ServiceError::OutOfQuestions => "out_of_questions",
            ServiceError::NotEnoughParticipants { .. } => "not_enough_participants",
            ServiceError::JoinClosed => "join_closed",
            ServiceError::InvalidInput(_) => "invalid_input",
            ServiceError::Unauthorized(_) => "unauthorized",
            ServiceError::Unavailable(_) | ServiceError::Degraded => "unavailable",
        }
    }

    /// Whether repeating the same request later may succeed.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            ServiceError::CapacityExceeded(_)
                | ServiceError::NotEnoughParticipants { .. }
                | ServiceError::Unavailable(_)
                | ServiceError::Degraded
        )
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

impl From<ValidationErrors> for ServiceError {
    fn from(err: ValidationErrors) -> Self {
        ServiceError::InvalidInput(format!("validation failed: {}", err))
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Unauthorized access attempt.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Too many sessions.
    #[error("too many requests: {0}")]
    TooManyRequests(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::Unauthorized(message) => AppError::Unauthorized(message),
            ServiceError::CapacityExceeded(message) => AppError::TooManyRequests(message),
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
            other @ (ServiceError::InvalidTransition(_)
            | ServiceError::Answer(_)
            | ServiceError::OutOfQuestions
            | ServiceError::NotEnoughParticipants { .. }
            | ServiceError::JoinClosed) => AppError::Conflict(other.to_string()),
        }
    }
}

/// JSON body returned for failed REST calls.
#[derive(Serialize, ToSchema)]
pub struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}
