// Relay dispatcher: routes client events between the members of a room.
//
// Payloads are forwarded untouched. Every membership change ends with a room
// monitor check so the abandonment timer follows occupancy.

use std::sync::Arc;

use pairsync_common::protocol::events::{
    ClientEvent, CodeDelta, ConnectionId, ServerEvent, SessionKey,
};
use tracing::{debug, info, warn};

use crate::gateway::RoomDirectory;
use crate::metrics;
use crate::session::RoomMonitor;
use crate::submission::SubmissionCoordinator;

#[derive(Clone)]
pub struct RelayDispatcher {
    rooms: Arc<RoomDirectory>,
    monitor: RoomMonitor,
    submissions: SubmissionCoordinator,
}

impl RelayDispatcher {
    pub fn new(
        rooms: Arc<RoomDirectory>,
        monitor: RoomMonitor,
        submissions: SubmissionCoordinator,
    ) -> Self {
        Self { rooms, monitor, submissions }
    }

    pub fn rooms(&self) -> &Arc<RoomDirectory> {
        &self.rooms
    }

    pub async fn dispatch(&self, connection: ConnectionId, event: ClientEvent) {
        match event {
            ClientEvent::JoinSession { session_id } => self.join(&session_id, connection).await,
            ClientEvent::SendCode { delta } => {
                self.relay_delta(connection, delta).await;
            }
            ClientEvent::SendFullCode { code, target_id } => {
                self.relay_full_document(code, target_id).await;
            }
            ClientEvent::SubmitCode { session_id, code } => {
                // Persistence runs detached; this connection keeps processing events.
                drop(self.submissions.submit(session_id, code).await);
            }
        }
    }

    /// Put `connection` in the session's room and introduce it to the others.
    pub async fn join(&self, session: &SessionKey, connection: ConnectionId) {
        let Some(outcome) = self.rooms.join(session, connection).await else {
            warn!(connection = %connection, session = %session, "join from unregistered connection");
            return;
        };
        metrics::increment_session_joins();
        info!(connection = %connection, session = %session, occupancy = outcome.occupancy, "joined session");

        if let Some(previous) = outcome.previous {
            self.monitor.notify_departure(&previous).await;
        }

        if outcome.occupancy > 1 {
            debug!(session = %session, requester = %connection, "requesting full code for new member");
            self.rooms
                .broadcast(
                    session,
                    ServerEvent::GetFullCode { requester_id: connection },
                    Some(connection),
                )
                .await;
        }

        match self.rooms.room_of(connection).await {
            Some(room) => {
                self.rooms.broadcast(&room, ServerEvent::PartnerConnect, Some(connection)).await;
            }
            None => warn!(connection = %connection, "no room found after join"),
        }

        self.monitor.check_room_state(session).await;
    }

    /// Forward an edit to every other member of the sender's room.
    ///
    /// Returns the number of peers it was queued for.
    pub async fn relay_delta(&self, connection: ConnectionId, delta: CodeDelta) -> usize {
        let Some(session) = self.rooms.room_of(connection).await else {
            warn!(connection = %connection, "sent code but is not in a room");
            return 0;
        };

        metrics::increment_deltas_relayed();
        self.rooms.broadcast(&session, ServerEvent::ReceiveCode { delta }, Some(connection)).await
    }

    /// Deliver a full document to the member that asked for it.
    pub async fn relay_full_document(&self, code: CodeDelta, target: ConnectionId) -> bool {
        debug!(target = %target, "relaying full code");
        let delivered = self.rooms.unicast(target, ServerEvent::ReceiveFullCode { code }).await;
        if delivered {
            metrics::increment_full_syncs_relayed();
        } else {
            debug!(target = %target, "full code target is gone");
        }
        delivered
    }

    /// Drop a closed connection from its room and reassess that room.
    pub async fn disconnect(&self, connection: ConnectionId) {
        let Some((session, remaining)) = self.rooms.unregister(connection).await else {
            return;
        };
        info!(connection = %connection, session = %session, remaining, "left session");
        self.monitor.notify_departure(&session).await;
    }
}
