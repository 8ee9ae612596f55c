use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

/// Lifecycle phases of a live quiz session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Participants are joining; no question has been asked yet.
    Lobby,
    /// A question round is open and answers are being collected.
    QuestionActive,
    /// The round is closed and the correct answer and scores are revealed.
    QuestionClosed,
    /// All questions are done and the final standings are shown.
    FinalLeaderboard,
    /// The session is over; its join code has been released.
    Ended,
}

/// Why a question round was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The host pressed reveal before the deadline.
    HostReveal,
    /// The round deadline elapsed.
    TimerElapsed,
}

/// Why the session moved to the final leaderboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// Host asked to finish.
    HostFinish,
    /// Host asked for the next question but none remained.
    QuestionsExhausted,
    /// The last question was revealed and the auto-finish delay elapsed.
    AutoAfterLastQuestion,
}

/// Why the session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// Host explicitly terminated the session.
    HostEnded,
    /// Host stayed disconnected longer than the configured idle timeout.
    HostIdleTimeout,
    /// Final leaderboard was left idle longer than the configured timeout.
    IdleTimeout,
    /// Server is shutting down.
    ServerShutdown,
}

impl EndReason {
    /// Wire name of the reason.
    pub fn as_str(self) -> &'static str {
        match self {
            EndReason::HostEnded => "host_ended",
            EndReason::HostIdleTimeout => "host_idle_timeout",
            EndReason::IdleTimeout => "idle_timeout",
            EndReason::ServerShutdown => "server_shutdown",
        }
    }
}

/// Events that can be applied to the session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Open the next question round (host `start` or `next_question`).
    OpenQuestion,
    /// Close the active round.
    CloseQuestion(CloseReason),
    /// Show the final leaderboard.
    Finish(FinishReason),
    /// Terminate the session.
    End(EndReason),
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the state machine was in when the invalid event was received.
    pub from: SessionPhase,
    /// The event that cannot be applied from this phase.
    pub event: SessionEvent,
}

/// Snapshot of the current state machine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    /// Current phase of the state machine.
    pub phase: SessionPhase,
    /// Version number of the state machine (increments on each transition).
    pub version: usize,
}

/// Transition table for a single quiz session.
///
/// Preconditions that depend on session data (participant count, remaining
/// questions) are checked by [`crate::state::session::Session`] before an event
/// is applied; the machine only knows which phase pairs are legal.
#[derive(Debug, Clone)]
pub struct SessionStateMachine {
    phase: SessionPhase,
    version: usize,
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Lobby,
            version: 0,
        }
    }
}

impl SessionStateMachine {
    /// Create a new state machine initialised in the lobby.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect the current phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Number of transitions applied so far.
    pub fn version(&self) -> usize {
        self.version
    }

    /// Create a snapshot of the current state machine state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            phase: self.phase,
            version: self.version,
        }
    }

    /// Check whether `event` would be accepted without applying it.
    pub fn check(&self, event: SessionEvent) -> Result<SessionPhase, InvalidTransition> {
        self.compute_transition(event)
    }

    /// Apply `event`, returning the new phase. The phase is left untouched on error.
    pub fn apply(&mut self, event: SessionEvent) -> Result<SessionPhase, InvalidTransition> {
        let next = self.compute_transition(event)?;
        self.phase = next;
        self.version += 1;
        Ok(next)
    }

    fn compute_transition(&self, event: SessionEvent) -> Result<SessionPhase, InvalidTransition> {
        let next = match (self.phase, event) {
            (SessionPhase::Lobby, SessionEvent::OpenQuestion) => SessionPhase::QuestionActive,
            (SessionPhase::QuestionClosed, SessionEvent::OpenQuestion) => {
                SessionPhase::QuestionActive
            }
            (SessionPhase::QuestionActive, SessionEvent::CloseQuestion(_)) => {
                SessionPhase::QuestionClosed
            }
            (SessionPhase::QuestionClosed, SessionEvent::Finish(_)) => {
                SessionPhase::FinalLeaderboard
            }
            (from, SessionEvent::End(_)) if from != SessionPhase::Ended => SessionPhase::Ended,
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }
}
