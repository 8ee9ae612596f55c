use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    dto::ws::{ClientMessage, ServerMessage},
    error::ServiceError,
    services::session_service::{self, HostCommand, QuizSource},
    state::{SharedState, connections::ConnectionHandle, session::SessionHandle},
};

const IDENT_TIMEOUT: Duration = Duration::from_secs(10);

/// The writer task of a socket is gone; nothing more can be sent to it.
#[derive(Debug, Error)]
#[error("connection closed")]
pub struct ConnectionClosed;

/// Handle the full lifecycle of a host or participant WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let closing = matches!(message, Message::Close(_));
            if sender.send(message).await.is_err() || closing {
                break;
            }
        }
    });

    let initial_message = match tokio::time::timeout(IDENT_TIMEOUT, receiver.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(Some(Ok(Message::Close(_)))) => {
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Ok(_))) => {
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Err(err))) => {
            warn!(error = %err, "websocket receive error");
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(None) | Err(_) => {
            warn!("websocket identification timed out");
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let identified = match ClientMessage::from_json_str(&initial_message) {
        Ok(message) if message.is_identification() => {
            identify(&state, message, &outbound_tx).await
        }
        Ok(message) => Err(ServiceError::InvalidInput(format!(
            "`{}` is not allowed before identification",
            message.command()
        ))),
        Err(err) => Err(err),
    };

    let (session, connection) = match identified {
        Ok(pair) => pair,
        Err(err) => {
            warn!(error = %err, "websocket identification refused");
            if send_message_to_websocket(&outbound_tx, &ServerMessage::from(&err)).is_err() {
                debug!("connection closed before identification error was queued");
            }
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                let reply = match ClientMessage::from_json_str(&text) {
                    Ok(message) => dispatch(&state, &session, &connection, message).await,
                    Err(err) => Err(err),
                };
                let reply = reply.unwrap_or_else(|err| {
                    debug!(
                        session_id = %session.id(),
                        code = err.code(),
                        error = %err,
                        "command refused"
                    );
                    ServerMessage::from(&err)
                });
                if send_message_to_websocket(&outbound_tx, &reply).is_err() {
                    break;
                }
            }
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {}
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(session_id = %session.id(), error = %err, "websocket error");
                break;
            }
        }
    }

    session_service::detach(&state, &session, connection).await;
    info!(
        session_id = %session.id(),
        role = ?connection.role,
        remaining = state.connections().connection_count(session.id()),
        "websocket closed"
    );

    finalize(writer_task, outbound_tx).await;
}

/// Turn the first message of a socket into a session attachment.
async fn identify(
    state: &SharedState,
    message: ClientMessage,
    tx: &mpsc::UnboundedSender<Message>,
) -> Result<(SessionHandle, ConnectionHandle), ServiceError> {
    match message {
        ClientMessage::CreateSession {
            host_id,
            host_key,
            quiz,
            quiz_id,
        } => {
            session_service::authorize_host_key(state, host_key.as_deref())?;
            let source = QuizSource::from_parts(quiz, quiz_id)?;
            let (handle, created) = session_service::create_session(state, host_id, source).await?;
            let reply = ServerMessage::SessionCreated {
                session_id: created.session_id,
                join_code: created.join_code.clone(),
                host_token: created.host_token.clone(),
            };
            if send_message_to_websocket(tx, &reply).is_err() {
                debug!(session_id = %created.session_id, "connection closed before session_created was queued");
            }
            session_service::attach_host(state, handle.id(), &created.host_token, tx.clone()).await
        }
        ClientMessage::HostAttach {
            session_id,
            host_token,
        } => session_service::attach_host(state, session_id, &host_token, tx.clone()).await,
        ClientMessage::Join { code, name } => {
            session_service::join(state, &code, &name, tx.clone()).await
        }
        ClientMessage::Reconnect {
            code,
            participant_id,
        } => session_service::reconnect(state, &code, participant_id, tx.clone()).await,
        other => Err(ServiceError::InvalidInput(format!(
            "`{}` cannot identify a connection",
            other.command()
        ))),
    }
}

/// Route a message from an identified connection and build the caller's reply.
async fn dispatch(
    state: &SharedState,
    session: &SessionHandle,
    connection: &ConnectionHandle,
    message: ClientMessage,
) -> Result<ServerMessage, ServiceError> {
    let command = message.command();
    let host_command = match message {
        ClientMessage::Start => HostCommand::Start,
        ClientMessage::NextQuestion => HostCommand::NextQuestion,
        ClientMessage::Reveal => HostCommand::Reveal,
        ClientMessage::Finish => HostCommand::Finish,
        ClientMessage::EndSession => HostCommand::EndSession,
        ClientMessage::Answer {
            question_index,
            choice,
        } => {
            session_service::submit_answer(state, session, connection, question_index, choice)
                .await?;
            return Ok(ServerMessage::AnswerAccepted { question_index });
        }
        ClientMessage::CreateSession { .. }
        | ClientMessage::HostAttach { .. }
        | ClientMessage::Join { .. }
        | ClientMessage::Reconnect { .. } => {
            return Err(ServiceError::InvalidInput(
                "connection is already identified".into(),
            ));
        }
    };

    let outcome = session_service::host_command(state, session, connection, host_command).await?;
    Ok(ServerMessage::ack(command, outcome))
}

/// Serialize a payload and push it onto the provided WebSocket sender.
///
/// Serialization failures are logged and swallowed (they are bugs, not transport
/// errors). Returns [`ConnectionClosed`] when the writer task is gone.
pub fn send_message_to_websocket<T>(
    tx: &mpsc::UnboundedSender<Message>,
    value: &T,
) -> Result<(), ConnectionClosed>
where
    T: ?Sized + serde::Serialize + std::fmt::Debug,
{
    let payload = match serde_json::to_string(value) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, "failed to serialize message `{value:?}`");
            return Ok(());
        }
    };

    tx.send(Message::Text(payload.into()))
        .map_err(|_| ConnectionClosed)
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
