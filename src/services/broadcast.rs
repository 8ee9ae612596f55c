use axum::extract::ws::Message;
use tracing::{debug, warn};

use crate::{
    dto::{
        format_system_time,
        quiz::QuestionView,
        session::LeaderboardEntry,
        ws::ServerMessage,
    },
    state::{
        connections::{ConnectionManager, ConnectionRole},
        session::{ClosedRound, OpenedQuestion, Session},
        state_machine::EndReason,
    },
};

/// Outcome of a publish that matters to the caller.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    /// Connections that received the message.
    pub delivered: usize,
    /// The host connection failed and was detached.
    pub host_lost: bool,
}

/// Deliver `message` to every connection attached to `session`.
///
/// Must be called while holding the session lock so that messages of one session
/// are queued in publish order. A connection whose queue is gone is detached and
/// marked disconnected; the others are unaffected.
pub fn publish(
    connections: &ConnectionManager,
    session: &mut Session,
    message: &ServerMessage,
) -> Delivery {
    let payload = match serde_json::to_string(message) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, "failed to serialize message `{message:?}`");
            return Delivery::default();
        }
    };
    let frame = Message::Text(payload.into());

    let mut delivery = Delivery::default();
    for target in connections.targets(session.id()) {
        if target.tx.send(frame.clone()).is_ok() {
            delivery.delivered += 1;
            continue;
        }

        warn!(
            session_id = %session.id(),
            role = ?target.handle.role,
            "connection queue closed; detaching"
        );
        if !connections.detach(&target.handle) {
            continue;
        }
        match target.handle.role {
            ConnectionRole::Host => {
                session.set_host_connected(false);
                delivery.host_lost = true;
            }
            ConnectionRole::Participant(participant_id) => {
                let _ = session.set_participant_connected(&participant_id, false);
            }
        }
    }

    debug!(
        session_id = %session.id(),
        delivered = delivery.delivered,
        "published message"
    );
    delivery
}

/// Lifecycle state of the session.
pub fn session_state(session: &Session) -> ServerMessage {
    let snapshot = session.snapshot();
    ServerMessage::SessionState {
        state: snapshot.phase,
        current_question_index: session.current_question(),
        version: snapshot.version,
    }
}

/// A freshly opened question round.
pub fn question_opened(opened: &OpenedQuestion) -> ServerMessage {
    ServerMessage::QuestionOpened {
        question_index: opened.question_index,
        question: QuestionView::from(&opened.question),
        close_at: format_system_time(opened.closes_at_wall),
        time_limit_ms: opened.question.time_limit_ms(),
    }
}

/// The answer key of a closed round.
pub fn question_closed(closed: &ClosedRound) -> ServerMessage {
    ServerMessage::QuestionClosed {
        question_index: closed.question_index,
        correct_option: closed.correct_option,
    }
}

/// Current standings.
pub fn leaderboard(session: &Session) -> ServerMessage {
    ServerMessage::Leaderboard {
        entries: LeaderboardEntry::ranked(session.standings()),
    }
}

/// Terminal notice.
pub fn session_ended(reason: EndReason) -> ServerMessage {
    ServerMessage::SessionEnded { reason }
}

/// Everything a newly attached client needs to render the session.
pub fn snapshot(session: &Session) -> Vec<ServerMessage> {
    let mut messages = vec![session_state(session)];
    if let Some(round) = session.round() {
        if let Some(question) = session.quiz().question(round.question_index()) {
            messages.push(ServerMessage::QuestionOpened {
                question_index: round.question_index(),
                question: QuestionView::from(question),
                close_at: format_system_time(round.closes_at_wall()),
                time_limit_ms: question.time_limit_ms(),
            });
        }
    }
    messages.push(leaderboard(session));
    messages
}

#[cfg(test)]
mod tests {
    use tokio::{sync::mpsc, time::Instant};
    use uuid::Uuid;

    use super::*;
    use crate::state::session::tests::{limits, two_question_quiz};

    fn session() -> Session {
        Session::new(
            Uuid::new_v4(),
            "QWERTY".into(),
            "host".into(),
            two_question_quiz(),
            limits(),
        )
    }

    fn text(message: Message) -> serde_json::Value {
        match message {
            Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn delivers_in_publish_order_to_every_connection() {
        let connections = ConnectionManager::new();
        let mut session = session();
        let participant = session.add_participant("Ann").unwrap();
        let (host_tx, mut host_rx) = mpsc::unbounded_channel();
        let (part_tx, mut part_rx) = mpsc::unbounded_channel();
        connections.attach(session.id(), ConnectionRole::Host, host_tx);
        connections.attach(session.id(), ConnectionRole::Participant(participant), part_tx);

        let state = session_state(&session);
        let board = leaderboard(&session);
        let first = publish(&connections, &mut session, &state);
        let second = publish(&connections, &mut session, &board);
        assert_eq!(first.delivered, 2);
        assert_eq!(second.delivered, 2);

        for rx in [&mut host_rx, &mut part_rx] {
            assert_eq!(text(rx.try_recv().unwrap())["type"], "session_state");
            assert_eq!(text(rx.try_recv().unwrap())["type"], "leaderboard");
        }
    }

    #[test]
    fn failing_connection_is_detached_without_affecting_others() {
        let connections = ConnectionManager::new();
        let mut session = session();
        let gone = session.add_participant("Gone").unwrap();
        let alive = session.add_participant("Alive").unwrap();
        session.set_participant_connected(&gone, true).unwrap();
        session.set_participant_connected(&alive, true).unwrap();

        let (gone_tx, gone_rx) = mpsc::unbounded_channel();
        let (alive_tx, mut alive_rx) = mpsc::unbounded_channel();
        connections.attach(session.id(), ConnectionRole::Participant(gone), gone_tx);
        connections.attach(session.id(), ConnectionRole::Participant(alive), alive_tx);
        drop(gone_rx);

        let message = session_state(&session);
        let delivery = publish(&connections, &mut session, &message);
        assert_eq!(delivery.delivered, 1);
        assert!(!delivery.host_lost);
        assert!(!session.participant(&gone).unwrap().connected);
        assert!(session.participant(&alive).unwrap().connected);
        assert_eq!(connections.connection_count(session.id()), 1);
        assert_eq!(text(alive_rx.try_recv().unwrap())["type"], "session_state");
    }

    #[test]
    fn snapshot_includes_open_question_without_answer_key() {
        let mut session = session();
        let id = session.add_participant("Ann").unwrap();
        session.set_participant_connected(&id, true).unwrap();
        session.start(Instant::now()).unwrap();

        let messages = snapshot(&session)
            .into_iter()
            .map(|message| serde_json::to_value(message).unwrap())
            .collect::<Vec<_>>();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1]["type"], "question_opened");
        assert_eq!(messages[1]["time_limit_ms"], 10_000);
        assert!(messages[1]["question"].get("correct_option").is_none());
    }
}
