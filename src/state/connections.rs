use axum::extract::ws::Message;
use dashmap::DashMap;
use indexmap::IndexMap;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

/// Identifier of one attached socket.
pub type ConnectionId = Uuid;

/// Who is on the other end of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionRole {
    /// The session host.
    Host,
    /// A participant, identified by its participant id.
    Participant(Uuid),
}

/// Proof of attachment returned by [`ConnectionManager::attach`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionHandle {
    /// Connection identifier.
    pub id: ConnectionId,
    /// Session the connection is attached to.
    pub session_id: Uuid,
    /// Role of the connection in the session.
    pub role: ConnectionRole,
}

/// Outbound queue of an attached connection, as used by the broadcaster.
#[derive(Clone)]
pub struct ConnectionTarget {
    /// Handle of the connection.
    pub handle: ConnectionHandle,
    /// FIFO queue drained by the socket writer task.
    pub tx: mpsc::UnboundedSender<Message>,
}

struct Connection {
    handle: ConnectionHandle,
    tx: mpsc::UnboundedSender<Message>,
}

#[derive(Default)]
struct SessionConnections {
    host: Option<ConnectionId>,
    participants: IndexMap<Uuid, ConnectionId>,
}

impl SessionConnections {
    fn slot(&mut self, role: ConnectionRole) -> Option<&mut ConnectionId> {
        match role {
            ConnectionRole::Host => self.host.as_mut(),
            ConnectionRole::Participant(id) => self.participants.get_mut(&id),
        }
    }

    fn replace(&mut self, role: ConnectionRole, id: ConnectionId) -> Option<ConnectionId> {
        match role {
            ConnectionRole::Host => self.host.replace(id),
            ConnectionRole::Participant(participant_id) => {
                self.participants.insert(participant_id, id)
            }
        }
    }

    fn clear(&mut self, role: ConnectionRole) {
        match role {
            ConnectionRole::Host => {
                self.host = None;
            }
            ConnectionRole::Participant(participant_id) => {
                self.participants.shift_remove(&participant_id);
            }
        }
    }

    fn ids(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.host
            .iter()
            .copied()
            .chain(self.participants.values().copied())
    }
}

/// Live socket bookkeeping: which connection speaks for which host or participant.
///
/// Holds at most one live connection per role and session; attaching again
/// supersedes and closes the previous connection.
#[derive(Default)]
pub struct ConnectionManager {
    connections: DashMap<ConnectionId, Connection>,
    sessions: DashMap<Uuid, SessionConnections>,
}

impl ConnectionManager {
    /// Empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a socket's outbound queue to a session role.
    pub fn attach(
        &self,
        session_id: Uuid,
        role: ConnectionRole,
        tx: mpsc::UnboundedSender<Message>,
    ) -> ConnectionHandle {
        let handle = ConnectionHandle {
            id: Uuid::new_v4(),
            session_id,
            role,
        };
        self.connections
            .insert(handle.id, Connection { handle, tx });

        let superseded = self
            .sessions
            .entry(session_id)
            .or_default()
            .replace(role, handle.id);

        let previous = superseded.and_then(|previous| self.connections.remove(&previous));
        if let Some((_, connection)) = previous {
            info!(
                session_id = %session_id,
                role = ?role,
                "superseding previous connection"
            );
            let _ = connection.tx.send(Message::Close(None));
        }

        handle
    }

    /// Detach a connection. Returns `false` when the handle was already
    /// superseded or severed, in which case nothing changes.
    pub fn detach(&self, handle: &ConnectionHandle) -> bool {
        self.connections.remove(&handle.id);

        let Some(mut session) = self.sessions.get_mut(&handle.session_id) else {
            return false;
        };
        let current = session
            .slot(handle.role)
            .is_some_and(|slot| *slot == handle.id);
        if current {
            session.clear(handle.role);
            debug!(session_id = %handle.session_id, role = ?handle.role, "connection detached");
        }
        current
    }

    /// Whether `handle` is still the live connection for its role.
    pub fn is_current(&self, handle: &ConnectionHandle) -> bool {
        self.connections.contains_key(&handle.id)
    }

    /// Every attached connection of a session: host first, then participants in
    /// attach order.
    pub fn targets(&self, session_id: Uuid) -> Vec<ConnectionTarget> {
        let ids = match self.sessions.get(&session_id) {
            Some(session) => session.ids().collect::<Vec<_>>(),
            None => return Vec::new(),
        };
        ids.into_iter()
            .filter_map(|id| {
                self.connections.get(&id).map(|connection| ConnectionTarget {
                    handle: connection.handle,
                    tx: connection.tx.clone(),
                })
            })
            .collect()
    }

    /// Number of attached connections for a session.
    pub fn connection_count(&self, session_id: Uuid) -> usize {
        self.sessions
            .get(&session_id)
            .map_or(0, |session| session.ids().count())
    }

    /// Close and forget every connection of a session.
    pub fn sever(&self, session_id: Uuid) {
        let Some((_, session)) = self.sessions.remove(&session_id) else {
            return;
        };
        let mut severed = 0usize;
        for id in session.ids() {
            if let Some((_, connection)) = self.connections.remove(&id) {
                let _ = connection.tx.send(Message::Close(None));
                severed += 1;
            }
        }
        info!(session_id = %session_id, severed, "session connections severed");
    }

    /// Close every connection of every session.
    pub fn sever_all(&self) {
        let session_ids = self
            .sessions
            .iter()
            .map(|entry| *entry.key())
            .collect::<Vec<_>>();
        for session_id in session_ids {
            self.sever(session_id);
        }
    }
}
