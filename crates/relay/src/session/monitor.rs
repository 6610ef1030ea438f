// Room state monitor: arms, keeps, or cancels the abandonment timer each time
// a room's membership changes.
//
// All decisions run under the registry mutex and read occupancy fresh from
// the room directory inside that critical section. Lock order is registry
// then directory.

use std::sync::Arc;
use std::time::Duration;

use pairsync_common::protocol::events::{ServerEvent, SessionKey};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::registry::{SessionRegistry, TimerId};
use crate::gateway::RoomDirectory;
use crate::metrics;

pub(crate) const SESSION_TIMEOUT_MS: u64 = 10_000;

/// How long a room may hold a single participant before it is terminated.
pub const SESSION_TIMEOUT: Duration = Duration::from_millis(SESSION_TIMEOUT_MS);

#[derive(Debug, Clone)]
pub struct RoomMonitor {
    registry: Arc<Mutex<SessionRegistry>>,
    rooms: Arc<RoomDirectory>,
}

impl RoomMonitor {
    pub fn new(rooms: Arc<RoomDirectory>) -> Self {
        Self { registry: Arc::new(Mutex::new(SessionRegistry::default())), rooms }
    }

    /// Re-evaluate a session after a join or disconnect.
    pub async fn check_room_state(&self, session: &SessionKey) {
        let mut registry = self.registry.lock().await;
        self.reassess(&mut registry, session).await;
    }

    /// Tell the remaining members that someone left, unless the session is
    /// already completed, then re-evaluate. Both steps share one critical
    /// section so a concurrent submission cannot slip in between.
    pub async fn notify_departure(&self, session: &SessionKey) {
        let mut registry = self.registry.lock().await;
        if !registry.is_completed(session) {
            self.rooms.broadcast(session, ServerEvent::PartnerDisconnect, None).await;
        }
        self.reassess(&mut registry, session).await;
    }

    async fn reassess(&self, registry: &mut SessionRegistry, session: &SessionKey) {
        let occupancy = self.rooms.occupancy(session).await;

        if registry.is_completed(session) {
            if occupancy == 0 {
                registry.clear_completed(session);
                debug!(session = %session, "completed session emptied, marker cleared");
            }
            return;
        }

        match (occupancy, registry.has_timer(session)) {
            (1, false) => {
                let monitor = self.clone();
                let expiring = session.clone();
                registry.arm_timer(session, SESSION_TIMEOUT, move |timer_id| async move {
                    monitor.on_timer_expired(expiring, timer_id).await;
                });
                metrics::increment_timers_armed();
                info!(
                    session = %session,
                    timeout_ms = SESSION_TIMEOUT_MS,
                    "single participant left in room, abandonment timer armed"
                );
            }
            (1, true) => {}
            (_, true) => {
                registry.cancel_timer(session);
                metrics::increment_timers_cancelled();
                info!(session = %session, occupancy, "abandonment timer cleared");
            }
            (_, false) => {}
        }
    }

    async fn on_timer_expired(&self, session: SessionKey, timer_id: TimerId) {
        let mut registry = self.registry.lock().await;
        if registry.timer_id(&session) != Some(timer_id) {
            return;
        }

        let occupancy = self.rooms.occupancy(&session).await;
        if occupancy == 1 && !registry.is_completed(&session) {
            info!(session = %session, "abandonment timeout reached, terminating session");
            self.rooms.broadcast(&session, ServerEvent::TerminateSession, None).await;
            metrics::increment_sessions_terminated();
        } else {
            debug!(session = %session, occupancy, "abandonment timer expired on a live room");
        }

        registry.release_timer(&session, timer_id);
    }

    /// Mark a session completed and cancel its pending timer in one critical
    /// section. Returns true when a timer was cancelled.
    pub async fn finalize_session(&self, session: &SessionKey) -> bool {
        let mut registry = self.registry.lock().await;
        registry.mark_completed(session);
        let cancelled = registry.cancel_timer(session);
        if cancelled {
            metrics::increment_timers_cancelled();
        }
        cancelled
    }

    #[cfg(test)]
    pub async fn is_completed(&self, session: &SessionKey) -> bool {
        self.registry.lock().await.is_completed(session)
    }

    #[cfg(test)]
    pub async fn has_pending_timer(&self, session: &SessionKey) -> bool {
        self.registry.lock().await.has_timer(session)
    }

    #[cfg(test)]
    pub async fn pending_timer_id(&self, session: &SessionKey) -> Option<TimerId> {
        self.registry.lock().await.timer_id(session)
    }
}
