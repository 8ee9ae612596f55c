use std::time::{Duration, SystemTime};

use axum::extract::ws::Message;
use tokio::{
    sync::mpsc,
    time::{Instant, sleep, sleep_until},
};
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{ArchivedStandingEntity, LeaderboardArchiveEntity},
    dto::{
        quiz::QuizInput,
        session::SessionCreatedResponse,
        ws::{AckOutcome, ServerMessage},
    },
    error::ServiceError,
    services::{broadcast, websocket_service::send_message_to_websocket},
    state::{
        SharedState,
        connections::{ConnectionHandle, ConnectionRole},
        quiz::QuizDefinition,
        session::{OpenedQuestion, Session, SessionHandle, SessionLimits},
        state_machine::{CloseReason, EndReason, FinishReason, SessionPhase},
    },
};

/// Where the quiz of a new session comes from.
#[derive(Debug)]
pub enum QuizSource {
    /// Definition supplied with the request.
    Inline(QuizInput),
    /// Definition looked up in the quiz store.
    Stored(Uuid),
}

impl QuizSource {
    /// Exactly one of `quiz` and `quiz_id` must be set.
    pub fn from_parts(quiz: Option<QuizInput>, quiz_id: Option<Uuid>) -> Result<Self, ServiceError> {
        match (quiz, quiz_id) {
            (Some(quiz), None) => Ok(QuizSource::Inline(quiz)),
            (None, Some(id)) => Ok(QuizSource::Stored(id)),
            (Some(_), Some(_)) => Err(ServiceError::InvalidInput(
                "provide either `quiz` or `quiz_id`, not both".into(),
            )),
            (None, None) => Err(ServiceError::InvalidInput(
                "either `quiz` or `quiz_id` is required".into(),
            )),
        }
    }
}

/// Host commands accepted over an attached host connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCommand {
    /// Open the first question.
    Start,
    /// Open the next question, finishing when none remain.
    NextQuestion,
    /// Close the active question.
    Reveal,
    /// Show the final leaderboard.
    Finish,
    /// Terminate the session.
    EndSession,
}

/// Check a caller-supplied host key against the configured one, if any.
pub fn authorize_host_key(state: &SharedState, provided: Option<&str>) -> Result<(), ServiceError> {
    let Some(expected) = state.config().host_api_key.as_deref() else {
        return Ok(());
    };
    match provided {
        Some(key) if key == expected => Ok(()),
        Some(_) => Err(ServiceError::Unauthorized("invalid host key".into())),
        None => Err(ServiceError::Unauthorized("missing host key".into())),
    }
}

async fn resolve_quiz(state: &SharedState, source: QuizSource) -> Result<QuizDefinition, ServiceError> {
    match source {
        QuizSource::Inline(quiz) => {
            quiz.validate()?;
            Ok(quiz.into_definition())
        }
        QuizSource::Stored(id) => {
            let store = state.quiz_store().await.ok_or(ServiceError::Degraded)?;
            let entity = store
                .find_quiz(id)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("quiz `{id}` not found")))?;
            QuizInput::from(&entity).validate()?;
            Ok(entity.into())
        }
    }
}

/// Create a session in the lobby. The host is not attached yet, so the host idle
/// timer starts right away.
pub async fn create_session(
    state: &SharedState,
    host_id: String,
    source: QuizSource,
) -> Result<(SessionHandle, SessionCreatedResponse), ServiceError> {
    let host_id = host_id.trim().to_owned();
    if host_id.is_empty() {
        return Err(ServiceError::InvalidInput("host id must not be empty".into()));
    }
    let quiz = resolve_quiz(state, source).await?;
    let handle = state.registry().create_session(
        quiz,
        host_id,
        SessionLimits::from(state.config()),
    )?;

    let mut session = handle.lock().await;
    arm_host_idle(state, &handle, &mut session);
    let response = SessionCreatedResponse {
        session_id: session.id(),
        join_code: session.join_code().to_owned(),
        host_token: session.host_token().to_owned(),
    };
    drop(session);

    Ok((handle, response))
}

/// Attach `tx` as the host connection of a session.
pub async fn attach_host(
    state: &SharedState,
    session_id: Uuid,
    host_token: &str,
    tx: mpsc::UnboundedSender<Message>,
) -> Result<(SessionHandle, ConnectionHandle), ServiceError> {
    let handle = state.registry().get(session_id)?;
    let mut session = handle.lock().await;
    ensure_not_ended(&session)?;
    if session.host_token() != host_token {
        warn!(session_id = %session_id, "host attach with wrong token");
        return Err(ServiceError::Unauthorized("invalid host token".into()));
    }

    let connection = state
        .connections()
        .attach(session_id, ConnectionRole::Host, tx.clone());
    session.set_host_connected(true);
    if session.phase() != SessionPhase::FinalLeaderboard {
        session.timers.cancel_idle();
    }
    for message in broadcast::snapshot(&session) {
        send_direct(session_id, &tx, &message);
    }
    info!(session_id = %session_id, "host attached");
    drop(session);

    Ok((handle, connection))
}

/// Join a session as a new participant.
pub async fn join(
    state: &SharedState,
    code: &str,
    name: &str,
    tx: mpsc::UnboundedSender<Message>,
) -> Result<(SessionHandle, ConnectionHandle), ServiceError> {
    let handle = state.registry().resolve(code)?;
    let mut session = handle.lock().await;
    let participant_id = session.add_participant(name)?;
    let connection = attach_participant(state, &mut session, participant_id, tx);
    info!(
        session_id = %session.id(),
        participant_id = %participant_id,
        "participant joined"
    );

    let message = broadcast::leaderboard(&session);
    publish_all(state, &handle, &mut session, &[message]);
    drop(session);

    Ok((handle, connection))
}

/// Resume an earlier membership; score and answers are kept.
pub async fn reconnect(
    state: &SharedState,
    code: &str,
    participant_id: Uuid,
    tx: mpsc::UnboundedSender<Message>,
) -> Result<(SessionHandle, ConnectionHandle), ServiceError> {
    let handle = state.registry().resolve(code)?;
    let mut session = handle.lock().await;
    ensure_not_ended(&session)?;
    if session.participant(&participant_id).is_none() {
        return Err(ServiceError::NotFound(format!(
            "participant `{participant_id}` not found"
        )));
    }
    let connection = attach_participant(state, &mut session, participant_id, tx);
    info!(
        session_id = %session.id(),
        participant_id = %participant_id,
        "participant reconnected"
    );
    drop(session);

    Ok((handle, connection))
}

fn attach_participant(
    state: &SharedState,
    session: &mut Session,
    participant_id: Uuid,
    tx: mpsc::UnboundedSender<Message>,
) -> ConnectionHandle {
    let connection = state.connections().attach(
        session.id(),
        ConnectionRole::Participant(participant_id),
        tx.clone(),
    );
    let _ = session.set_participant_connected(&participant_id, true);

    if let Some(participant) = session.participant(&participant_id) {
        let joined = ServerMessage::Joined {
            session_id: session.id(),
            participant_id,
            name: participant.name.clone(),
            score: session.leaderboard().score_of(&participant_id).unwrap_or(0),
        };
        send_direct(session.id(), &tx, &joined);
    }
    for message in broadcast::snapshot(session) {
        send_direct(session.id(), &tx, &message);
    }
    connection
}

/// Forget a closed socket. Superseded connections change nothing.
pub async fn detach(state: &SharedState, handle: &SessionHandle, connection: ConnectionHandle) {
    let mut session = handle.lock().await;
    if !state.connections().detach(&connection) || session.is_ended() {
        return;
    }
    match connection.role {
        ConnectionRole::Host => {
            session.set_host_connected(false);
            info!(session_id = %session.id(), "host detached");
            arm_host_idle(state, handle, &mut session);
        }
        ConnectionRole::Participant(participant_id) => {
            let _ = session.set_participant_connected(&participant_id, false);
            info!(
                session_id = %session.id(),
                participant_id = %participant_id,
                "participant detached"
            );
        }
    }
}

/// Run a host command sent over `connection`.
pub async fn host_command(
    state: &SharedState,
    handle: &SessionHandle,
    connection: &ConnectionHandle,
    command: HostCommand,
) -> Result<AckOutcome, ServiceError> {
    if connection.role != ConnectionRole::Host {
        return Err(ServiceError::Unauthorized(
            "only the host can control the session".into(),
        ));
    }

    let mut session = handle.lock().await;
    ensure_not_ended(&session)?;
    if !state.connections().is_current(connection) {
        return Err(ServiceError::Unauthorized(
            "host connection was superseded".into(),
        ));
    }
    debug!(session_id = %session.id(), command = ?command, "host command");

    match command {
        HostCommand::Start => {
            let opened = session.start(Instant::now())?;
            open_and_publish(state, handle, &mut session, opened);
            Ok(AckOutcome::Applied)
        }
        HostCommand::NextQuestion => match session.open_next_question(Instant::now()) {
            Ok(opened) => {
                open_and_publish(state, handle, &mut session, opened);
                Ok(AckOutcome::Applied)
            }
            Err(ServiceError::OutOfQuestions) => {
                finish_and_publish(state, handle, &mut session, FinishReason::QuestionsExhausted)?;
                Ok(AckOutcome::Finished)
            }
            Err(err) => Err(err),
        },
        HostCommand::Reveal => {
            if session.phase() == SessionPhase::QuestionClosed {
                return Ok(AckOutcome::AlreadyClosed);
            }
            close_and_publish(state, handle, &mut session, CloseReason::HostReveal)?;
            Ok(AckOutcome::Applied)
        }
        HostCommand::Finish => {
            finish_and_publish(state, handle, &mut session, FinishReason::HostFinish)?;
            Ok(AckOutcome::Applied)
        }
        HostCommand::EndSession => {
            end_and_release(state, &mut session, EndReason::HostEnded)?;
            Ok(AckOutcome::Applied)
        }
    }
}

/// Record an answer from the participant behind `connection`.
pub async fn submit_answer(
    state: &SharedState,
    handle: &SessionHandle,
    connection: &ConnectionHandle,
    question_index: usize,
    choice: usize,
) -> Result<(), ServiceError> {
    let received_at = Instant::now();
    let ConnectionRole::Participant(participant_id) = connection.role else {
        return Err(ServiceError::Unauthorized(
            "only participants can answer".into(),
        ));
    };

    let mut session = handle.lock().await;
    ensure_not_ended(&session)?;
    if !state.connections().is_current(connection) {
        return Err(ServiceError::Unauthorized(
            "participant connection was superseded".into(),
        ));
    }
    session.submit_answer(participant_id, question_index, choice, received_at)?;
    debug!(
        session_id = %session.id(),
        participant_id = %participant_id,
        question_index,
        answers = session.round().map_or(0, |round| round.answer_count()),
        "answer accepted"
    );
    Ok(())
}

fn ensure_not_ended(session: &Session) -> Result<(), ServiceError> {
    if session.is_ended() {
        return Err(ServiceError::NotFound(format!(
            "session `{}` has ended",
            session.id()
        )));
    }
    Ok(())
}

/// End every live session with `server_shutdown` and sever all sockets.
pub async fn shutdown(state: &SharedState) {
    for handle in state.registry().sessions() {
        let mut session = handle.lock().await;
        if session.is_ended() {
            continue;
        }
        if let Err(err) = end_and_release(state, &mut session, EndReason::ServerShutdown) {
            warn!(session_id = %handle.id(), error = %err, "failed to end session on shutdown");
        }
    }
    state.connections().sever_all();
}

/// Reply to a single connection outside the session broadcast.
fn send_direct(session_id: Uuid, tx: &mpsc::UnboundedSender<Message>, message: &ServerMessage) {
    if send_message_to_websocket(tx, message).is_err() {
        debug!(session_id = %session_id, "connection closed before direct message was queued");
    }
}

fn publish_all(
    state: &SharedState,
    handle: &SessionHandle,
    session: &mut Session,
    messages: &[ServerMessage],
) {
    let mut host_lost = false;
    for message in messages {
        host_lost |= broadcast::publish(state.connections(), session, message).host_lost;
    }
    if host_lost && !session.is_ended() {
        arm_host_idle(state, handle, session);
    }
}

fn open_and_publish(
    state: &SharedState,
    handle: &SessionHandle,
    session: &mut Session,
    opened: OpenedQuestion,
) {
    info!(
        session_id = %session.id(),
        question_index = opened.question_index,
        "question opened"
    );
    arm_round_close(state, handle, session, opened.question_index, opened.closes_at);
    let messages = [
        broadcast::session_state(session),
        broadcast::question_opened(&opened),
    ];
    publish_all(state, handle, session, &messages);
}

fn close_and_publish(
    state: &SharedState,
    handle: &SessionHandle,
    session: &mut Session,
    reason: CloseReason,
) -> Result<(), ServiceError> {
    let closed = session.close_round(reason, &state.config().scoring)?;
    info!(
        session_id = %session.id(),
        question_index = closed.question_index,
        reason = ?reason,
        "question closed"
    );
    let messages = [
        broadcast::session_state(session),
        broadcast::question_closed(&closed),
        broadcast::leaderboard(session),
    ];
    publish_all(state, handle, session, &messages);

    if closed.was_last {
        if let Some(delay) = state.config().auto_finish_delay {
            arm_auto_finish(state, handle, session, delay);
        }
    }
    Ok(())
}

fn finish_and_publish(
    state: &SharedState,
    handle: &SessionHandle,
    session: &mut Session,
    reason: FinishReason,
) -> Result<(), ServiceError> {
    session.finish(reason)?;
    info!(session_id = %session.id(), reason = ?reason, "final leaderboard");
    let messages = [
        broadcast::session_state(session),
        broadcast::leaderboard(session),
    ];
    publish_all(state, handle, session, &messages);
    arm_final_idle(state, handle, session);
    Ok(())
}

fn end_and_release(
    state: &SharedState,
    session: &mut Session,
    reason: EndReason,
) -> Result<(), ServiceError> {
    session.end(reason)?;
    info!(
        session_id = %session.id(),
        reason = ?reason,
        awarded = session.leaderboard().awarded_total(),
        "session ended"
    );

    let messages = [
        broadcast::session_state(session),
        broadcast::leaderboard(session),
        broadcast::session_ended(reason),
    ];
    for message in &messages {
        broadcast::publish(state.connections(), session, message);
    }
    state.connections().sever(session.id());
    state.registry().release(session.id());
    archive(state, archive_entity(session, reason));
    Ok(())
}

fn arm_round_close(
    state: &SharedState,
    handle: &SessionHandle,
    session: &mut Session,
    question_index: usize,
    deadline: Instant,
) {
    let state = state.clone();
    let handle = handle.clone();
    let task = tokio::spawn(async move {
        sleep_until(deadline).await;
        let mut session = handle.lock().await;
        if session.phase() != SessionPhase::QuestionActive
            || session.open_round_index() != Some(question_index)
        {
            return;
        }
        session.timers.round_close.take();
        if let Err(err) = close_and_publish(&state, &handle, &mut session, CloseReason::TimerElapsed)
        {
            warn!(session_id = %handle.id(), error = %err, "round timer failed to close question");
        }
    });
    session.timers.set_round_close(task.abort_handle());
}

fn arm_auto_finish(
    state: &SharedState,
    handle: &SessionHandle,
    session: &mut Session,
    delay: Duration,
) {
    let state = state.clone();
    let handle = handle.clone();
    let task = tokio::spawn(async move {
        sleep(delay).await;
        let mut session = handle.lock().await;
        if session.phase() != SessionPhase::QuestionClosed || session.has_next_question() {
            return;
        }
        session.timers.auto_finish.take();
        if let Err(err) = finish_and_publish(
            &state,
            &handle,
            &mut session,
            FinishReason::AutoAfterLastQuestion,
        ) {
            warn!(session_id = %handle.id(), error = %err, "auto finish failed");
        }
    });
    session.timers.set_auto_finish(task.abort_handle());
}

fn arm_host_idle(state: &SharedState, handle: &SessionHandle, session: &mut Session) {
    if matches!(
        session.phase(),
        SessionPhase::FinalLeaderboard | SessionPhase::Ended
    ) {
        return;
    }
    let timeout = state.config().host_idle_timeout;
    let state = state.clone();
    let handle = handle.clone();
    let task = tokio::spawn(async move {
        sleep(timeout).await;
        let mut session = handle.lock().await;
        if session.is_ended()
            || session.host_connected()
            || session.phase() == SessionPhase::FinalLeaderboard
        {
            return;
        }
        session.timers.idle.take();
        info!(session_id = %handle.id(), "host idle timeout");
        if let Err(err) = end_and_release(&state, &mut session, EndReason::HostIdleTimeout) {
            warn!(session_id = %handle.id(), error = %err, "host idle timeout failed to end session");
        }
    });
    session.timers.set_idle(task.abort_handle());
}

fn arm_final_idle(state: &SharedState, handle: &SessionHandle, session: &mut Session) {
    let timeout = state.config().final_leaderboard_idle;
    let state = state.clone();
    let handle = handle.clone();
    let task = tokio::spawn(async move {
        sleep(timeout).await;
        let mut session = handle.lock().await;
        if session.phase() != SessionPhase::FinalLeaderboard {
            return;
        }
        session.timers.idle.take();
        if let Err(err) = end_and_release(&state, &mut session, EndReason::IdleTimeout) {
            warn!(session_id = %handle.id(), error = %err, "final leaderboard timeout failed");
        }
    });
    session.timers.set_idle(task.abort_handle());
}

fn archive_entity(session: &Session, reason: EndReason) -> LeaderboardArchiveEntity {
    LeaderboardArchiveEntity {
        session_id: session.id(),
        join_code: session.join_code().to_owned(),
        quiz_id: session.quiz().id,
        quiz_title: session.quiz().title.clone(),
        host_id: session.host_id().to_owned(),
        end_reason: reason.as_str().to_owned(),
        questions_played: session.current_question().map_or(0, |index| index + 1),
        created_at: session.created_at(),
        ended_at: SystemTime::now(),
        standings: session
            .standings()
            .into_iter()
            .enumerate()
            .map(|(index, standing)| ArchivedStandingEntity {
                rank: index + 1,
                participant_id: standing.participant_id,
                name: standing.name,
                score: standing.score,
            })
            .collect(),
    }
}

fn archive(state: &SharedState, entity: LeaderboardArchiveEntity) {
    let state = state.clone();
    tokio::spawn(async move {
        let session_id = entity.session_id;
        let Some(store) = state.quiz_store().await else {
            warn!(session_id = %session_id, "no quiz store installed; leaderboard not archived");
            return;
        };
        if let Err(err) = store.archive_leaderboard(entity).await {
            warn!(session_id = %session_id, error = %err, "failed to archive leaderboard");
        }
    });
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::Value;
    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::quiz_store::InMemoryQuizStore,
        dto::quiz::QuestionInput,
        state::{AppState, round::AnswerRejection},
    };

    fn quiz_input() -> QuizInput {
        QuizInput {
            title: "capitals".into(),
            questions: vec![
                QuestionInput {
                    prompt: "Capital of France?".into(),
                    options: vec!["Paris".into(), "Lyon".into(), "Nice".into()],
                    correct_option: 0,
                    time_limit_ms: 10_000,
                    points: 100,
                },
                QuestionInput {
                    prompt: "Capital of Italy?".into(),
                    options: vec!["Milan".into(), "Rome".into()],
                    correct_option: 1,
                    time_limit_ms: 5_000,
                    points: 50,
                },
            ],
        }
    }

    async fn app(config: AppConfig) -> (SharedState, InMemoryQuizStore) {
        let state = AppState::new(config);
        let store = InMemoryQuizStore::new();
        state.install_quiz_store(Arc::new(store.clone())).await;
        (state, store)
    }

    fn quiet_config() -> AppConfig {
        AppConfig {
            auto_finish_delay: None,
            ..AppConfig::default()
        }
    }

    /// Drain every queued frame; close frames show up as `{"type": "close"}`.
    fn drain(rx: &mut UnboundedReceiver<Message>) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(message) = rx.try_recv() {
            frames.push(match message {
                Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
                Message::Close(_) => serde_json::json!({"type": "close"}),
                other => panic!("unexpected frame {other:?}"),
            });
        }
        frames
    }

    fn types(frames: &[Value]) -> Vec<&str> {
        frames
            .iter()
            .map(|frame| frame["type"].as_str().unwrap())
            .collect()
    }

    struct Table {
        handle: SessionHandle,
        host: ConnectionHandle,
        host_rx: UnboundedReceiver<Message>,
        players: Vec<(ConnectionHandle, UnboundedReceiver<Message>)>,
    }

    async fn table(state: &SharedState, names: &[&str]) -> Table {
        let (handle, created) =
            create_session(state, "host-1".into(), QuizSource::Inline(quiz_input()))
                .await
                .unwrap();
        let (host_tx, host_rx) = mpsc::unbounded_channel();
        let (_, host) = attach_host(state, created.session_id, &created.host_token, host_tx)
            .await
            .unwrap();

        let mut players = Vec::new();
        for name in names {
            let (tx, rx) = mpsc::unbounded_channel();
            let (_, connection) = join(state, &created.join_code, name, tx).await.unwrap();
            players.push((connection, rx));
        }
        Table {
            handle,
            host,
            host_rx,
            players,
        }
    }

    fn participant_id(connection: &ConnectionHandle) -> Uuid {
        match connection.role {
            ConnectionRole::Participant(id) => id,
            ConnectionRole::Host => panic!("host connection"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn two_player_round_scores_by_answer_time() {
        let (state, _) = app(quiet_config()).await;
        let mut table = table(&state, &["A", "B"]).await;
        let (a, _) = &table.players[0];
        let (b, _) = &table.players[1];
        let (a, b) = (*a, *b);

        let outcome = host_command(&state, &table.handle, &table.host, HostCommand::Start)
            .await
            .unwrap();
        assert_eq!(outcome, AckOutcome::Applied);

        tokio::time::advance(Duration::from_secs(2)).await;
        submit_answer(&state, &table.handle, &a, 0, 0).await.unwrap();
        let duplicate = submit_answer(&state, &table.handle, &a, 0, 1)
            .await
            .unwrap_err();
        assert!(matches!(
            duplicate,
            ServiceError::Answer(AnswerRejection::Duplicate)
        ));

        host_command(&state, &table.handle, &table.host, HostCommand::Reveal)
            .await
            .unwrap();
        host_command(&state, &table.handle, &table.host, HostCommand::Finish)
            .await
            .unwrap();

        let frames = drain(&mut table.host_rx);
        let closed = frames
            .iter()
            .find(|frame| frame["type"] == "question_closed")
            .unwrap();
        assert_eq!(closed["correct_option"], 0);

        let last_board = frames
            .iter()
            .rev()
            .find(|frame| frame["type"] == "leaderboard")
            .unwrap();
        let entries = last_board["entries"].as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["name"], "A");
        assert_eq!(entries[0]["score"], 80);
        assert_eq!(entries[0]["participant_id"], participant_id(&a).to_string());
        assert_eq!(entries[1]["name"], "B");
        assert_eq!(entries[1]["score"], 0);
        assert_eq!(entries[1]["participant_id"], participant_id(&b).to_string());

        let session = table.handle.lock().await;
        assert_eq!(session.phase(), SessionPhase::FinalLeaderboard);
    }

    #[tokio::test(start_paused = true)]
    async fn round_timer_closes_question_and_reveal_reports_already_closed() {
        let (state, _) = app(quiet_config()).await;
        let mut table = table(&state, &["A"]).await;
        let (a, mut a_rx) = table.players.remove(0);

        host_command(&state, &table.handle, &table.host, HostCommand::Start)
            .await
            .unwrap();
        drain(&mut a_rx);

        sleep(Duration::from_secs(11)).await;
        assert_eq!(
            table.handle.lock().await.phase(),
            SessionPhase::QuestionClosed
        );
        let frames = drain(&mut a_rx);
        assert_eq!(
            types(&frames),
            vec!["session_state", "question_closed", "leaderboard"]
        );

        let outcome = host_command(&state, &table.handle, &table.host, HostCommand::Reveal)
            .await
            .unwrap();
        assert_eq!(outcome, AckOutcome::AlreadyClosed);

        let late = submit_answer(&state, &table.handle, &a, 0, 0)
            .await
            .unwrap_err();
        assert!(matches!(late, ServiceError::Answer(AnswerRejection::TooLate)));
    }

    #[tokio::test(start_paused = true)]
    async fn last_reveal_auto_finishes_after_delay() {
        let config = AppConfig {
            auto_finish_delay: Some(Duration::from_secs(3)),
            ..AppConfig::default()
        };
        let (state, _) = app(config).await;
        let table = table(&state, &["A"]).await;

        for command in [
            HostCommand::Start,
            HostCommand::Reveal,
            HostCommand::NextQuestion,
            HostCommand::Reveal,
        ] {
            host_command(&state, &table.handle, &table.host, command)
                .await
                .unwrap();
        }
        assert_eq!(
            table.handle.lock().await.phase(),
            SessionPhase::QuestionClosed
        );

        sleep(Duration::from_secs(4)).await;
        assert_eq!(
            table.handle.lock().await.phase(),
            SessionPhase::FinalLeaderboard
        );
    }

    #[tokio::test(start_paused = true)]
    async fn next_question_after_last_finishes_quiz() {
        let (state, _) = app(quiet_config()).await;
        let table = table(&state, &["A"]).await;

        for command in [
            HostCommand::Start,
            HostCommand::Reveal,
            HostCommand::NextQuestion,
            HostCommand::Reveal,
        ] {
            host_command(&state, &table.handle, &table.host, command)
                .await
                .unwrap();
        }
        let outcome = host_command(&state, &table.handle, &table.host, HostCommand::NextQuestion)
            .await
            .unwrap();
        assert_eq!(outcome, AckOutcome::Finished);
        assert_eq!(
            table.handle.lock().await.phase(),
            SessionPhase::FinalLeaderboard
        );
    }

    #[tokio::test(start_paused = true)]
    async fn participants_cannot_run_host_commands() {
        let (state, _) = app(quiet_config()).await;
        let table = table(&state, &["A"]).await;
        let (a, _) = &table.players[0];

        let err = host_command(&state, &table.handle, a, HostCommand::Start)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
        assert_eq!(table.handle.lock().await.phase(), SessionPhase::Lobby);

        let err = submit_answer(&state, &table.handle, &table.host, 0, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn host_idle_timeout_ends_session() {
        let (state, store) = app(quiet_config()).await;
        let mut table = table(&state, &["A"]).await;
        let (_, mut a_rx) = table.players.remove(0);

        detach(&state, &table.handle, table.host).await;
        drain(&mut a_rx);

        sleep(state.config().host_idle_timeout + Duration::from_secs(1)).await;

        let session = table.handle.lock().await;
        assert_eq!(session.end_reason(), Some(EndReason::HostIdleTimeout));
        assert!(!session.timers.any_pending());
        drop(session);

        let frames = drain(&mut a_rx);
        let ended = frames
            .iter()
            .find(|frame| frame["type"] == "session_ended")
            .unwrap();
        assert_eq!(ended["reason"], "host_idle_timeout");
        assert_eq!(types(&frames).last(), Some(&"close"));
        assert!(state.registry().resolve(table.handle.join_code()).is_err());

        let archive = store.archive(&table.handle.id()).unwrap();
        assert_eq!(archive.end_reason, "host_idle_timeout");
    }

    #[tokio::test(start_paused = true)]
    async fn reattached_host_keeps_session_alive() {
        let (state, _) = app(quiet_config()).await;
        let table = table(&state, &["A"]).await;

        detach(&state, &table.handle, table.host).await;
        sleep(state.config().host_idle_timeout / 2).await;

        let token = table.handle.lock().await.host_token().to_owned();
        let (tx, _rx) = mpsc::unbounded_channel();
        attach_host(&state, table.handle.id(), &token, tx)
            .await
            .unwrap();

        sleep(state.config().host_idle_timeout).await;
        assert!(!table.handle.lock().await.is_ended());
    }

    #[tokio::test(start_paused = true)]
    async fn wrong_host_token_is_refused() {
        let (state, _) = app(quiet_config()).await;
        let table = table(&state, &[]).await;
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = attach_host(&state, table.handle.id(), "nope", tx)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn end_session_archives_final_standings() {
        let (state, store) = app(quiet_config()).await;
        let mut table = table(&state, &["A", "B"]).await;
        let (a, _) = table.players[0];

        host_command(&state, &table.handle, &table.host, HostCommand::Start)
            .await
            .unwrap();
        submit_answer(&state, &table.handle, &a, 0, 0).await.unwrap();
        host_command(&state, &table.handle, &table.host, HostCommand::Reveal)
            .await
            .unwrap();
        host_command(&state, &table.handle, &table.host, HostCommand::EndSession)
            .await
            .unwrap();

        let frames = drain(&mut table.host_rx);
        assert_eq!(
            &types(&frames)[frames.len() - 3..],
            &["leaderboard", "session_ended", "close"]
        );

        // Archiving runs on its own task.
        sleep(Duration::from_millis(1)).await;
        let archive = store.archive(&table.handle.id()).unwrap();
        assert_eq!(archive.end_reason, "host_ended");
        assert_eq!(archive.questions_played, 1);
        assert_eq!(archive.standings.len(), 2);
        assert_eq!(archive.standings[0].name, "A");
        assert_eq!(archive.standings[0].score, 100);
        assert_eq!(state.registry().active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stored_quiz_requires_a_store() {
        let state = AppState::new(quiet_config());
        let err = create_session(&state, "host".into(), QuizSource::Stored(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Degraded));

        let (state, _) = app(quiet_config()).await;
        let err = create_session(&state, "host".into(), QuizSource::Stored(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_restores_score_and_snapshot() {
        let (state, _) = app(quiet_config()).await;
        let table = table(&state, &["A"]).await;
        let (a, _) = table.players[0];

        host_command(&state, &table.handle, &table.host, HostCommand::Start)
            .await
            .unwrap();
        submit_answer(&state, &table.handle, &a, 0, 0).await.unwrap();
        host_command(&state, &table.handle, &table.host, HostCommand::Reveal)
            .await
            .unwrap();
        detach(&state, &table.handle, a).await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let code = table.handle.join_code().to_lowercase();
        reconnect(&state, &code, participant_id(&a), tx).await.unwrap();

        let frames = drain(&mut rx);
        assert_eq!(frames[0]["type"], "joined");
        assert_eq!(frames[0]["score"], 100);
        assert_eq!(frames[1]["state"], "question_closed");
        assert_eq!(table.handle.lock().await.standings().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_while_attached_closes_the_old_connection() {
        let (state, _) = app(quiet_config()).await;
        let mut table = table(&state, &["A"]).await;
        let (old, mut old_rx) = table.players.remove(0);
        drain(&mut old_rx);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let (_, new) = reconnect(&state, table.handle.join_code(), participant_id(&old), tx)
            .await
            .unwrap();

        assert_eq!(participant_id(&new), participant_id(&old));
        assert_eq!(types(&drain(&mut old_rx)), vec!["close"]);
        assert!(!state.connections().is_current(&old));
        assert!(state.connections().is_current(&new));
        assert_eq!(drain(&mut rx)[0]["type"], "joined");
        assert_eq!(table.handle.lock().await.standings().len(), 1);

        let err = submit_answer(&state, &table.handle, &old, 0, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn end_during_open_round_cancels_round_timer() {
        let (state, _) = app(quiet_config()).await;
        let mut table = table(&state, &["A"]).await;
        let (a, mut a_rx) = table.players.remove(0);

        host_command(&state, &table.handle, &table.host, HostCommand::Start)
            .await
            .unwrap();
        host_command(&state, &table.handle, &table.host, HostCommand::EndSession)
            .await
            .unwrap();
        assert_eq!(types(&drain(&mut a_rx)).last(), Some(&"close"));
        drain(&mut table.host_rx);

        sleep(Duration::from_secs(11)).await;
        assert!(drain(&mut a_rx).is_empty());
        assert!(drain(&mut table.host_rx).is_empty());

        let session = table.handle.lock().await;
        assert_eq!(session.phase(), SessionPhase::Ended);
        assert_eq!(session.end_reason(), Some(EndReason::HostEnded));
        assert!(!session.timers.any_pending());
        let token = session.host_token().to_owned();
        drop(session);

        let err = state.registry().resolve(table.handle.join_code()).unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = attach_host(&state, table.handle.id(), &token, tx)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn commands_on_an_ended_session_report_not_found() {
        let (state, _) = app(quiet_config()).await;
        let table = table(&state, &["A"]).await;
        let (a, _) = table.players[0];

        host_command(&state, &table.handle, &table.host, HostCommand::EndSession)
            .await
            .unwrap();

        let err = host_command(&state, &table.handle, &table.host, HostCommand::Start)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
        let err = submit_answer(&state, &table.handle, &a, 0, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn join_survives_a_socket_closed_before_the_snapshot() {
        let (state, _) = app(quiet_config()).await;
        let table = table(&state, &[]).await;

        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        join(&state, table.handle.join_code(), "A", tx).await.unwrap();
        assert_eq!(table.handle.lock().await.standings().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn host_key_is_checked_when_configured() {
        let (open, _) = app(quiet_config()).await;
        assert!(authorize_host_key(&open, None).is_ok());

        let config = AppConfig {
            host_api_key: Some("k".into()),
            ..quiet_config()
        };
        let (state, _) = app(config).await;
        assert!(matches!(
            authorize_host_key(&state, None),
            Err(ServiceError::Unauthorized(_))
        ));
        assert!(matches!(
            authorize_host_key(&state, Some("wrong")),
            Err(ServiceError::Unauthorized(_))
        ));
        assert!(authorize_host_key(&state, Some("k")).is_ok());
    }

    #[test]
    fn quiz_source_needs_exactly_one_part() {
        assert!(QuizSource::from_parts(None, None).is_err());
        assert!(QuizSource::from_parts(Some(quiz_input()), Some(Uuid::new_v4())).is_err());
        assert!(matches!(
            QuizSource::from_parts(None, Some(Uuid::nil())),
            Ok(QuizSource::Stored(_))
        ));
    }
}
