use std::{sync::Arc, time::SystemTime};

use indexmap::IndexMap;
use tokio::{
    sync::{Mutex, MutexGuard},
    task::AbortHandle,
    time::Instant,
};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    error::ServiceError,
    services::scoring::{ScoringPolicy, score},
    state::{
        leaderboard::{Leaderboard, Standing},
        quiz::{Question, QuizDefinition},
        round::{AnswerRecord, AnswerRejection, QuestionRound},
        state_machine::{
            CloseReason, EndReason, FinishReason, InvalidTransition, SessionEvent, SessionPhase,
            SessionStateMachine, Snapshot,
        },
    },
};

/// Per-session admission rules taken from the application configuration.
#[derive(Debug, Clone, Copy)]
pub struct SessionLimits {
    /// Connected participants required to open the first question.
    pub min_participants_to_start: usize,
    /// Whether joining after the lobby is allowed.
    pub allow_late_join: bool,
    /// Participant ceiling.
    pub max_participants: usize,
}

impl From<&AppConfig> for SessionLimits {
    fn from(config: &AppConfig) -> Self {
        Self {
            min_participants_to_start: config.min_participants_to_start,
            allow_late_join: config.allow_late_join,
            max_participants: config.max_participants_per_session,
        }
    }
}

/// Outcome of one question for one participant, kept after the round closes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerOutcome {
    /// Question index.
    pub question_index: usize,
    /// Chosen option, `None` when the participant did not answer.
    pub choice: Option<usize>,
    /// Whether the choice was correct.
    pub correct: bool,
    /// Points awarded for this question.
    pub points: u32,
}

/// Participant info tracked during a session.
#[derive(Debug, Clone)]
pub struct Participant {
    /// Stable participant identifier handed out on join.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Whether a live connection is attached.
    pub connected: bool,
    /// Closed-round history in question order.
    pub history: Vec<AnswerOutcome>,
}

/// Data returned when a question round opens.
#[derive(Debug, Clone)]
pub struct OpenedQuestion {
    /// Index of the question.
    pub question_index: usize,
    /// The question itself.
    pub question: Question,
    /// Monotonic deadline.
    pub closes_at: Instant,
    /// Wall-clock deadline for clients.
    pub closes_at_wall: SystemTime,
}

/// Data returned when a question round closes.
#[derive(Debug, Clone)]
pub struct ClosedRound {
    /// Index of the closed question.
    pub question_index: usize,
    /// Correct option index.
    pub correct_option: usize,
    /// Points per participant, in join order; non-respondents get zero.
    pub awarded: Vec<(Uuid, u32)>,
    /// Whether this was the last question of the quiz.
    pub was_last: bool,
}

/// Abort handles of the timers scheduled for a session.
#[derive(Debug, Default)]
pub struct SessionTimers {
    /// Fires when the open round's deadline elapses.
    pub round_close: Option<AbortHandle>,
    /// Moves to the final leaderboard after the last reveal.
    pub auto_finish: Option<AbortHandle>,
    /// Ends the session when the host stays away or the final board idles.
    pub idle: Option<AbortHandle>,
}

impl SessionTimers {
    /// Replace the round-close timer, aborting any previous one.
    pub fn set_round_close(&mut self, handle: AbortHandle) {
        replace_timer(&mut self.round_close, handle);
    }

    /// Replace the auto-finish timer, aborting any previous one.
    pub fn set_auto_finish(&mut self, handle: AbortHandle) {
        replace_timer(&mut self.auto_finish, handle);
    }

    /// Replace the idle timer, aborting any previous one.
    pub fn set_idle(&mut self, handle: AbortHandle) {
        replace_timer(&mut self.idle, handle);
    }

    /// Abort the round-close timer.
    pub fn cancel_round_close(&mut self) {
        abort_timer(&mut self.round_close);
    }

    /// Abort the auto-finish timer.
    pub fn cancel_auto_finish(&mut self) {
        abort_timer(&mut self.auto_finish);
    }

    /// Abort the idle timer.
    pub fn cancel_idle(&mut self) {
        abort_timer(&mut self.idle);
    }

    /// Abort every pending timer.
    pub fn cancel_all(&mut self) {
        self.cancel_round_close();
        self.cancel_auto_finish();
        self.cancel_idle();
    }

    /// Whether any timer is still scheduled.
    pub fn any_pending(&self) -> bool {
        [&self.round_close, &self.auto_finish, &self.idle]
            .into_iter()
            .flatten()
            .any(|handle| !handle.is_finished())
    }
}

fn replace_timer(slot: &mut Option<AbortHandle>, handle: AbortHandle) {
    if let Some(previous) = slot.replace(handle) {
        previous.abort();
    }
}

fn abort_timer(slot: &mut Option<AbortHandle>) {
    if let Some(handle) = slot.take() {
        handle.abort();
    }
}

/// One running quiz: state machine, participants, current round and scores.
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    join_code: String,
    host_id: String,
    host_token: String,
    quiz: QuizDefinition,
    machine: SessionStateMachine,
    current_question: Option<usize>,
    participants: IndexMap<Uuid, Participant>,
    round: Option<QuestionRound>,
    leaderboard: Leaderboard,
    host_connected: bool,
    limits: SessionLimits,
    created_at: SystemTime,
    end_reason: Option<EndReason>,
    /// Pending timers; aborted when the session ends.
    pub timers: SessionTimers,
}

impl Session {
    /// Build a fresh session in the lobby.
    pub fn new(
        id: Uuid,
        join_code: String,
        host_id: String,
        quiz: QuizDefinition,
        limits: SessionLimits,
    ) -> Self {
        Self {
            id,
            join_code,
            host_id,
            host_token: Uuid::new_v4().simple().to_string(),
            quiz,
            machine: SessionStateMachine::new(),
            current_question: None,
            participants: IndexMap::new(),
            round: None,
            leaderboard: Leaderboard::new(),
            host_connected: false,
            limits,
            created_at: SystemTime::now(),
            end_reason: None,
            timers: SessionTimers::default(),
        }
    }

    /// Stable session identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Join code participants type in.
    pub fn join_code(&self) -> &str {
        &self.join_code
    }

    /// Identity of the host that created the session.
    pub fn host_id(&self) -> &str {
        &self.host_id
    }

    /// Secret the host presents to re-attach.
    pub fn host_token(&self) -> &str {
        &self.host_token
    }

    /// Quiz being played.
    pub fn quiz(&self) -> &QuizDefinition {
        &self.quiz
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> SessionPhase {
        self.machine.phase()
    }

    /// Phase and transition counter.
    pub fn snapshot(&self) -> Snapshot {
        self.machine.snapshot()
    }

    /// Index of the question most recently opened.
    pub fn current_question(&self) -> Option<usize> {
        self.current_question
    }

    /// Round currently collecting answers.
    pub fn round(&self) -> Option<&QuestionRound> {
        self.round.as_ref()
    }

    /// Question index of the open round, if any.
    pub fn open_round_index(&self) -> Option<usize> {
        self.round.as_ref().map(QuestionRound::question_index)
    }

    /// Participants in join order.
    pub fn participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values()
    }

    /// Look up a participant.
    pub fn participant(&self, id: &Uuid) -> Option<&Participant> {
        self.participants.get(id)
    }

    /// Number of participants with a live connection.
    pub fn connected_participants(&self) -> usize {
        self.participants.values().filter(|p| p.connected).count()
    }

    /// Whether the host connection is attached.
    pub fn host_connected(&self) -> bool {
        self.host_connected
    }

    /// Cumulative score aggregator.
    pub fn leaderboard(&self) -> &Leaderboard {
        &self.leaderboard
    }

    /// Ranked standings.
    pub fn standings(&self) -> Vec<Standing> {
        self.leaderboard.snapshot()
    }

    /// Creation timestamp.
    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// Why the session ended, once it has.
    pub fn end_reason(&self) -> Option<EndReason> {
        self.end_reason
    }

    /// Whether the session reached its terminal state.
    pub fn is_ended(&self) -> bool {
        self.phase() == SessionPhase::Ended
    }

    /// Whether another question follows the current one.
    pub fn has_next_question(&self) -> bool {
        self.next_question_index() < self.quiz.len()
    }

    fn next_question_index(&self) -> usize {
        self.current_question.map_or(0, |index| index + 1)
    }

    fn ensure_live(&self) -> Result<(), ServiceError> {
        if self.is_ended() {
            return Err(ServiceError::NotFound(format!(
                "session `{}` has ended",
                self.id
            )));
        }
        Ok(())
    }

    /// Add a participant and return its identifier.
    pub fn add_participant(&mut self, name: &str) -> Result<Uuid, ServiceError> {
        self.ensure_live()?;
        let accepting = match self.phase() {
            SessionPhase::Lobby => true,
            SessionPhase::QuestionActive | SessionPhase::QuestionClosed => {
                self.limits.allow_late_join
            }
            SessionPhase::FinalLeaderboard | SessionPhase::Ended => false,
        };
        if !accepting {
            return Err(ServiceError::JoinClosed);
        }
        if self.participants.len() >= self.limits.max_participants {
            return Err(ServiceError::CapacityExceeded(format!(
                "session is limited to {} participants",
                self.limits.max_participants
            )));
        }

        let name = name.trim();
        if name.is_empty() {
            return Err(ServiceError::InvalidInput(
                "display name must not be empty".into(),
            ));
        }
        if self
            .participants
            .values()
            .any(|p| p.name.eq_ignore_ascii_case(name))
        {
            return Err(ServiceError::InvalidInput(format!(
                "display name `{name}` is already taken"
            )));
        }

        let id = Uuid::new_v4();
        self.participants.insert(
            id,
            Participant {
                id,
                name: name.to_string(),
                connected: false,
                history: Vec::new(),
            },
        );
        self.leaderboard.register(id, name.to_string());
        Ok(id)
    }

    /// Flag a participant's connection status.
    pub fn set_participant_connected(
        &mut self,
        participant_id: &Uuid,
        connected: bool,
    ) -> Result<(), ServiceError> {
        let participant = self.participants.get_mut(participant_id).ok_or_else(|| {
            ServiceError::NotFound(format!("participant `{participant_id}` not found"))
        })?;
        participant.connected = connected;
        Ok(())
    }

    /// Flag the host connection status.
    pub fn set_host_connected(&mut self, connected: bool) {
        self.host_connected = connected;
    }

    /// Host `start`: open the first question from the lobby.
    pub fn start(&mut self, now: Instant) -> Result<OpenedQuestion, ServiceError> {
        self.ensure_live()?;
        if self.phase() != SessionPhase::Lobby {
            return Err(InvalidTransition {
                from: self.phase(),
                event: SessionEvent::OpenQuestion,
            }
            .into());
        }
        self.open_next_question(now)
    }

    /// Open the next question round. Fails with [`ServiceError::OutOfQuestions`]
    /// when the quiz is exhausted, leaving the state unchanged.
    pub fn open_next_question(&mut self, now: Instant) -> Result<OpenedQuestion, ServiceError> {
        self.ensure_live()?;
        self.machine.check(SessionEvent::OpenQuestion)?;

        let question_index = self.next_question_index();
        let question = self
            .quiz
            .question(question_index)
            .cloned()
            .ok_or(ServiceError::OutOfQuestions)?;

        if self.phase() == SessionPhase::Lobby {
            let connected = self.connected_participants();
            if connected < self.limits.min_participants_to_start {
                return Err(ServiceError::NotEnoughParticipants {
                    required: self.limits.min_participants_to_start,
                    connected,
                });
            }
        }

        self.machine.apply(SessionEvent::OpenQuestion)?;
        let round = QuestionRound::open(
            question_index,
            question.options.len(),
            now,
            question.time_limit,
        );
        let opened = OpenedQuestion {
            question_index,
            question,
            closes_at: round.closes_at(),
            closes_at_wall: round.closes_at_wall(),
        };
        self.round = Some(round);
        self.current_question = Some(question_index);
        Ok(opened)
    }

    /// Close the open round, score every participant and update the leaderboard.
    pub fn close_round(
        &mut self,
        reason: CloseReason,
        policy: &ScoringPolicy,
    ) -> Result<ClosedRound, ServiceError> {
        self.ensure_live()?;
        self.machine.check(SessionEvent::CloseQuestion(reason))?;
        let round = self.round.take().ok_or(InvalidTransition {
            from: self.phase(),
            event: SessionEvent::CloseQuestion(reason),
        })?;
        self.machine.apply(SessionEvent::CloseQuestion(reason))?;
        self.timers.cancel_round_close();

        let question_index = round.question_index();
        let question = self
            .quiz
            .question(question_index)
            .cloned()
            .ok_or(ServiceError::OutOfQuestions)?;
        let time_limit_ms = question.time_limit_ms();

        let opened_at = round.opened_at();
        let mut answers = round
            .close()
            .into_iter()
            .map(|record| {
                let elapsed_ms = record
                    .submitted_at
                    .saturating_duration_since(opened_at)
                    .as_millis() as u64;
                (record.participant_id, (record.choice, elapsed_ms))
            })
            .collect::<IndexMap<_, _>>();

        let mut awarded = Vec::with_capacity(self.participants.len());
        for participant in self.participants.values_mut() {
            let outcome = match answers.swap_remove(&participant.id) {
                Some((choice, elapsed_ms)) => {
                    let correct = choice == question.correct_option;
                    AnswerOutcome {
                        question_index,
                        choice: Some(choice),
                        correct,
                        points: score(
                            correct,
                            elapsed_ms,
                            time_limit_ms,
                            question.points,
                            policy,
                        ),
                    }
                }
                None => AnswerOutcome {
                    question_index,
                    choice: None,
                    correct: false,
                    points: 0,
                },
            };
            awarded.push((participant.id, outcome.points));
            participant.history.push(outcome);
        }
        self.leaderboard.apply_round(&awarded);

        Ok(ClosedRound {
            question_index,
            correct_option: question.correct_option,
            awarded,
            was_last: question_index + 1 >= self.quiz.len(),
        })
    }

    /// Move to the final leaderboard.
    pub fn finish(&mut self, reason: FinishReason) -> Result<(), ServiceError> {
        self.ensure_live()?;
        self.machine.apply(SessionEvent::Finish(reason))?;
        self.timers.cancel_auto_finish();
        Ok(())
    }

    /// Terminate the session and cancel every pending timer.
    pub fn end(&mut self, reason: EndReason) -> Result<(), ServiceError> {
        self.ensure_live()?;
        self.machine.apply(SessionEvent::End(reason))?;
        self.timers.cancel_all();
        self.round = None;
        self.end_reason = Some(reason);
        for participant in self.participants.values_mut() {
            participant.connected = false;
        }
        self.host_connected = false;
        Ok(())
    }

    /// Submit an answer stamped with the server receive time.
    pub fn submit_answer(
        &mut self,
        participant_id: Uuid,
        question_index: usize,
        choice: usize,
        submitted_at: Instant,
    ) -> Result<AnswerRecord, ServiceError> {
        self.ensure_live()?;
        let Some(participant) = self.participants.get(&participant_id) else {
            return Err(AnswerRejection::UnknownParticipant.into());
        };

        let Some(round) = self.round.as_mut() else {
            // The round for this index already closed: the participant either
            // answered in time or is late.
            if self.current_question == Some(question_index) {
                let answered = participant
                    .history
                    .iter()
                    .any(|outcome| outcome.question_index == question_index && outcome.choice.is_some());
                return Err(if answered {
                    AnswerRejection::Duplicate
                } else {
                    AnswerRejection::TooLate
                }
                .into());
            }
            return Err(AnswerRejection::WrongRound.into());
        };

        round
            .submit(participant_id, question_index, choice, submitted_at)
            .cloned()
            .map_err(Into::into)
    }
}

/// Shared, serialized access to one session.
///
/// Every mutation of a session (host commands, answers, attach/detach, timer
/// firings) goes through [`SessionHandle::lock`].
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: Uuid,
    join_code: Arc<str>,
    inner: Arc<Mutex<Session>>,
}

impl SessionHandle {
    /// Wrap a session for shared use.
    pub fn new(session: Session) -> Self {
        Self {
            id: session.id(),
            join_code: Arc::from(session.join_code()),
            inner: Arc::new(Mutex::new(session)),
        }
    }

    /// Session identifier, readable without locking.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Join code, readable without locking.
    pub fn join_code(&self) -> &str {
        &self.join_code
    }

    /// Acquire exclusive access to the session.
    pub async fn lock(&self) -> MutexGuard<'_, Session> {
        self.inner.lock().await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::time::Duration;

    use super::*;

    pub(crate) fn two_question_quiz() -> QuizDefinition {
        QuizDefinition {
            id: Uuid::new_v4(),
            title: "capitals".into(),
            questions: vec![
                Question {
                    prompt: "Capital of France?".into(),
                    options: vec!["Paris".into(), "Lyon".into(), "Nice".into()],
                    correct_option: 0,
                    time_limit: Duration::from_secs(10),
                    points: 100,
                },
                Question {
                    prompt: "Capital of Italy?".into(),
                    options: vec!["Milan".into(), "Rome".into()],
                    correct_option: 1,
                    time_limit: Duration::from_secs(5),
                    points: 50,
                },
            ],
        }
    }

    pub(crate) fn limits() -> SessionLimits {
        SessionLimits {
            min_participants_to_start: 1,
            allow_late_join: false,
            max_participants: 10,
        }
    }

    fn session() -> Session {
        Session::new(
            Uuid::new_v4(),
            "ABCDEF".into(),
            "host-1".into(),
            two_question_quiz(),
            limits(),
        )
    }

    fn join(session: &mut Session, name: &str) -> Uuid {
        let id = session.add_participant(name).unwrap();
        session.set_participant_connected(&id, true).unwrap();
        id
    }

    #[test]
    fn start_requires_connected_participant() {
        let mut session = session();
        let err = session.start(Instant::now()).unwrap_err();
        assert!(matches!(
            err,
            ServiceError::NotEnoughParticipants {
                required: 1,
                connected: 0
            }
        ));
        assert_eq!(session.phase(), SessionPhase::Lobby);

        let id = session.add_participant("Ann").unwrap();
        assert!(session.start(Instant::now()).is_err());
        session.set_participant_connected(&id, true).unwrap();
        let opened = session.start(Instant::now()).unwrap();
        assert_eq!(opened.question_index, 0);
        assert_eq!(session.phase(), SessionPhase::QuestionActive);
    }

    #[test]
    fn scenario_two_questions_leaderboard() {
        let mut session = session();
        let policy = ScoringPolicy::default();
        let a = join(&mut session, "A");
        let b = join(&mut session, "B");

        let opened_at = Instant::now();
        session.start(opened_at).unwrap();
        session
            .submit_answer(a, 0, 0, opened_at + Duration::from_secs(2))
            .unwrap();
        let closed = session.close_round(CloseReason::HostReveal, &policy).unwrap();
        assert_eq!(closed.awarded, vec![(a, 80), (b, 0)]);
        assert!(!closed.was_last);

        session.finish(FinishReason::HostFinish).unwrap();
        let standings = session
            .standings()
            .into_iter()
            .map(|s| (s.name, s.score))
            .collect::<Vec<_>>();
        assert_eq!(standings, vec![("A".to_string(), 80), ("B".to_string(), 0)]);
        assert_eq!(session.phase(), SessionPhase::FinalLeaderboard);
    }

    #[test]
    fn late_answer_rejected_before_reveal() {
        let mut session = session();
        let a = join(&mut session, "A");
        let opened_at = Instant::now();
        session.start(opened_at).unwrap();

        let late = opened_at + Duration::from_secs(10) + Duration::from_millis(1);
        let err = session.submit_answer(a, 0, 0, late).unwrap_err();
        assert!(matches!(err, ServiceError::Answer(AnswerRejection::TooLate)));
        assert_eq!(session.phase(), SessionPhase::QuestionActive);
    }

    #[test]
    fn answers_after_close_are_late_or_duplicate() {
        let mut session = session();
        let policy = ScoringPolicy::default();
        let a = join(&mut session, "A");
        let b = join(&mut session, "B");
        let now = Instant::now();
        session.start(now).unwrap();
        session.submit_answer(a, 0, 1, now).unwrap();
        session.close_round(CloseReason::TimerElapsed, &policy).unwrap();

        assert!(matches!(
            session.submit_answer(a, 0, 0, now).unwrap_err(),
            ServiceError::Answer(AnswerRejection::Duplicate)
        ));
        assert!(matches!(
            session.submit_answer(b, 0, 0, now).unwrap_err(),
            ServiceError::Answer(AnswerRejection::TooLate)
        ));
        assert!(matches!(
            session.submit_answer(b, 1, 0, now).unwrap_err(),
            ServiceError::Answer(AnswerRejection::WrongRound)
        ));
    }

    #[test]
    fn unknown_participant_is_rejected() {
        let mut session = session();
        join(&mut session, "A");
        session.start(Instant::now()).unwrap();
        assert!(matches!(
            session
                .submit_answer(Uuid::new_v4(), 0, 0, Instant::now())
                .unwrap_err(),
            ServiceError::Answer(AnswerRejection::UnknownParticipant)
        ));
    }

    #[test]
    fn next_question_out_of_questions_leaves_state() {
        let mut session = session();
        let policy = ScoringPolicy::default();
        join(&mut session, "A");
        session.start(Instant::now()).unwrap();
        session.close_round(CloseReason::HostReveal, &policy).unwrap();
        let opened = session.open_next_question(Instant::now()).unwrap();
        assert_eq!(opened.question_index, 1);
        let closed = session.close_round(CloseReason::HostReveal, &policy).unwrap();
        assert!(closed.was_last);

        let version = session.snapshot().version;
        assert!(matches!(
            session.open_next_question(Instant::now()).unwrap_err(),
            ServiceError::OutOfQuestions
        ));
        assert_eq!(session.phase(), SessionPhase::QuestionClosed);
        assert_eq!(session.snapshot().version, version);
        assert_eq!(session.current_question(), Some(1));
    }

    #[test]
    fn start_twice_is_invalid_transition() {
        let mut session = session();
        join(&mut session, "A");
        session.start(Instant::now()).unwrap();
        assert!(matches!(
            session.start(Instant::now()).unwrap_err(),
            ServiceError::InvalidTransition(_)
        ));
    }

    #[test]
    fn join_closed_after_lobby_unless_late_join() {
        let mut session = session();
        join(&mut session, "A");
        session.start(Instant::now()).unwrap();
        assert!(matches!(
            session.add_participant("B").unwrap_err(),
            ServiceError::JoinClosed
        ));

        let mut late = Session::new(
            Uuid::new_v4(),
            "ZZZZZZ".into(),
            "host".into(),
            two_question_quiz(),
            SessionLimits {
                allow_late_join: true,
                ..limits()
            },
        );
        join(&mut late, "A");
        late.start(Instant::now()).unwrap();
        assert!(late.add_participant("B").is_ok());
    }

    #[test]
    fn duplicate_names_rejected() {
        let mut session = session();
        session.add_participant("Ann").unwrap();
        assert!(matches!(
            session.add_participant(" ann ").unwrap_err(),
            ServiceError::InvalidInput(_)
        ));
    }

    #[test]
    fn leaderboard_sum_matches_awarded_points() {
        let mut session = session();
        let policy = ScoringPolicy::default();
        let a = join(&mut session, "A");
        let b = join(&mut session, "B");
        let now = Instant::now();
        session.start(now).unwrap();
        session.submit_answer(a, 0, 0, now).unwrap();
        session.submit_answer(b, 0, 0, now + Duration::from_secs(9)).unwrap();
        let first = session.close_round(CloseReason::HostReveal, &policy).unwrap();
        session.open_next_question(now).unwrap();
        session.submit_answer(b, 1, 1, now).unwrap();
        let second = session.close_round(CloseReason::HostReveal, &policy).unwrap();

        let awarded: u64 = first
            .awarded
            .iter()
            .chain(second.awarded.iter())
            .map(|(_, points)| u64::from(*points))
            .sum();
        let board: u64 = session.standings().iter().map(|s| s.score).sum();
        assert_eq!(awarded, board);
        assert_eq!(session.leaderboard().score_of(&b), Some(50 + 50));
        assert_eq!(session.leaderboard().score_of(&a), Some(100));
    }

    #[test]
    fn end_is_terminal_and_reports_not_found() {
        let mut session = session();
        join(&mut session, "A");
        session.start(Instant::now()).unwrap();
        session.end(EndReason::HostEnded).unwrap();
        assert!(session.is_ended());
        assert!(session.round().is_none());
        assert!(matches!(
            session.end(EndReason::HostEnded).unwrap_err(),
            ServiceError::NotFound(_)
        ));
        assert!(matches!(
            session.add_participant("B").unwrap_err(),
            ServiceError::NotFound(_)
        ));
    }
}
