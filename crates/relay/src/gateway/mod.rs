// Connection gateway: connection identity, room membership, delivery.
//
// Every live connection registers an outbound channel here. Rooms are
// explicit sets of connection ids keyed by session; a connection belongs to
// at most one room at a time. Empty rooms are dropped.

use std::collections::{HashMap, HashSet};

use pairsync_common::protocol::events::{ConnectionId, ServerEvent, SessionKey};
use tokio::sync::{mpsc, RwLock};

/// Members of one session's room.
#[derive(Debug, Default)]
pub struct Room {
    members: HashSet<ConnectionId>,
}

impl Room {
    /// Adds a member and returns the resulting size.
    pub fn join(&mut self, connection: ConnectionId) -> usize {
        self.members.insert(connection);
        self.members.len()
    }

    /// Removes a member and returns the resulting size.
    pub fn leave(&mut self, connection: ConnectionId) -> usize {
        self.members.remove(&connection);
        self.members.len()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn members(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.members.iter().copied()
    }
}

/// Result of adding a connection to a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    /// Room size after the join.
    pub occupancy: usize,
    /// The other session this connection was bound to before, if any.
    pub previous: Option<SessionKey>,
}

#[derive(Debug)]
struct ConnectionEntry {
    outbound: mpsc::UnboundedSender<ServerEvent>,
    session: Option<SessionKey>,
}

#[derive(Debug, Default)]
struct DirectoryState {
    rooms: HashMap<SessionKey, Room>,
    connections: HashMap<ConnectionId, ConnectionEntry>,
}

impl DirectoryState {
    fn remove_from_room(&mut self, session: &SessionKey, connection: ConnectionId) -> usize {
        let Some(room) = self.rooms.get_mut(session) else {
            return 0;
        };
        let remaining = room.leave(connection);
        if remaining == 0 {
            self.rooms.remove(session);
        }
        remaining
    }
}

#[derive(Debug, Default)]
pub struct RoomDirectory {
    state: RwLock<DirectoryState>,
}

impl RoomDirectory {
    /// Register a live connection and the channel its frames are written to.
    pub async fn register(
        &self,
        connection: ConnectionId,
        outbound: mpsc::UnboundedSender<ServerEvent>,
    ) {
        let mut guard = self.state.write().await;
        guard.connections.insert(connection, ConnectionEntry { outbound, session: None });
    }

    /// Forget a connection, removing it from its room.
    ///
    /// Returns the session it was bound to and that room's remaining size.
    pub async fn unregister(&self, connection: ConnectionId) -> Option<(SessionKey, usize)> {
        let mut guard = self.state.write().await;
        let entry = guard.connections.remove(&connection)?;
        let session = entry.session?;
        let remaining = guard.remove_from_room(&session, connection);
        Some((session, remaining))
    }

    /// Add a registered connection to a session's room.
    ///
    /// A connection bound to another session leaves that room first. Returns
    /// `None` when the connection is not registered.
    pub async fn join(&self, session: &SessionKey, connection: ConnectionId) -> Option<JoinOutcome> {
        let mut guard = self.state.write().await;
        let entry = guard.connections.get_mut(&connection)?;
        let previous = entry.session.replace(session.clone()).filter(|previous| previous != session);

        if let Some(previous) = &previous {
            guard.remove_from_room(previous, connection);
        }

        let occupancy = guard.rooms.entry(session.clone()).or_default().join(connection);
        Some(JoinOutcome { occupancy, previous })
    }

    /// Number of connections currently in a session's room.
    pub async fn occupancy(&self, session: &SessionKey) -> usize {
        self.state.read().await.rooms.get(session).map(Room::len).unwrap_or(0)
    }

    /// The session a connection is currently bound to.
    pub async fn room_of(&self, connection: ConnectionId) -> Option<SessionKey> {
        self.state.read().await.connections.get(&connection).and_then(|entry| entry.session.clone())
    }

    /// Send an event to every member of a room, optionally skipping one.
    ///
    /// Returns the number of members the event was queued for.
    pub async fn broadcast(
        &self,
        session: &SessionKey,
        event: ServerEvent,
        except: Option<ConnectionId>,
    ) -> usize {
        let recipients = {
            let guard = self.state.read().await;
            let Some(room) = guard.rooms.get(session) else {
                return 0;
            };
            room.members()
                .filter(|member| Some(*member) != except)
                .filter_map(|member| guard.connections.get(&member))
                .map(|entry| entry.outbound.clone())
                .collect::<Vec<_>>()
        };

        recipients.into_iter().filter(|recipient| recipient.send(event.clone()).is_ok()).count()
    }

    /// Send an event to exactly one connection, bypassing rooms.
    pub async fn unicast(&self, connection: ConnectionId, event: ServerEvent) -> bool {
        let recipient = {
            let guard = self.state.read().await;
            match guard.connections.get(&connection) {
                Some(entry) => entry.outbound.clone(),
                None => return false,
            }
        };
        recipient.send(event).is_ok()
    }

    #[cfg(test)]
    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections.len()
    }
}
