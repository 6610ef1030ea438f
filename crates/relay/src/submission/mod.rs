// Session submission: freeze the session, tell the room, then hand the final
// code to the persistence API without holding anything up.

pub mod http;

use std::sync::Arc;

use async_trait::async_trait;
use pairsync_common::protocol::events::{ServerEvent, SessionKey};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::error::PersistenceError;
use crate::gateway::RoomDirectory;
use crate::metrics;
use crate::session::RoomMonitor;

pub use http::HttpSubmissionStore;

/// Body of the submission call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSubmission {
    pub session_id: SessionKey,
    pub code_solution: String,
}

/// Destination for finished sessions.
///
/// Called once per submission, never retried.
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn submit_session(&self, submission: &SessionSubmission) -> Result<(), PersistenceError>;
}

#[derive(Clone)]
pub struct SubmissionCoordinator {
    rooms: Arc<RoomDirectory>,
    monitor: RoomMonitor,
    store: Arc<dyn SubmissionStore>,
}

impl SubmissionCoordinator {
    pub fn new(
        rooms: Arc<RoomDirectory>,
        monitor: RoomMonitor,
        store: Arc<dyn SubmissionStore>,
    ) -> Self {
        Self { rooms, monitor, store }
    }

    /// Complete a session and persist its final code in the background.
    ///
    /// The session is marked completed and its abandonment timer cancelled
    /// before anything else, so no later disconnect or expiry can terminate
    /// it. The returned handle resolves once the persistence attempt is over;
    /// failures are logged there and never reach clients.
    pub async fn submit(&self, session: SessionKey, code: String) -> JoinHandle<()> {
        self.monitor.finalize_session(&session).await;

        let notified = self.rooms.broadcast(&session, ServerEvent::CompleteSession, None).await;
        metrics::increment_sessions_submitted();
        info!(session = %session, notified, "session completed");
        // A submission for an empty room has no later departure to clear it.
        self.monitor.check_room_state(&session).await;

        let store = Arc::clone(&self.store);
        let submission = SessionSubmission { session_id: session, code_solution: code };
        tokio::spawn(async move {
            match store.submit_session(&submission).await {
                Ok(()) => {
                    info!(session = %submission.session_id, "session submission persisted");
                }
                Err(error) => {
                    metrics::increment_persistence_failures();
                    error!(
                        session = %submission.session_id,
                        error = %error,
                        "failed to persist session submission"
                    );
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pairsync_common::protocol::events::ConnectionId;
    use tokio::sync::{mpsc, Mutex};
    use tokio::time::sleep;

    use super::*;
    use crate::session::SESSION_TIMEOUT;

    #[derive(Default)]
    struct RecordingStore {
        submissions: Mutex<Vec<SessionSubmission>>,
    }

    #[async_trait]
    impl SubmissionStore for RecordingStore {
        async fn submit_session(
            &self,
            submission: &SessionSubmission,
        ) -> Result<(), PersistenceError> {
            self.submissions.lock().await.push(submission.clone());
            Ok(())
        }
    }

    struct RejectingStore;

    #[async_trait]
    impl SubmissionStore for RejectingStore {
        async fn submit_session(
            &self,
            _submission: &SessionSubmission,
        ) -> Result<(), PersistenceError> {
            Err(PersistenceError::Rejected(reqwest::StatusCode::SERVICE_UNAVAILABLE))
        }
    }

    async fn join(
        rooms: &RoomDirectory,
        monitor: &RoomMonitor,
        session: &SessionKey,
    ) -> mpsc::UnboundedReceiver<ServerEvent> {
        let connection = ConnectionId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        rooms.register(connection, tx).await;
        rooms.join(session, connection).await.expect("registered connection");
        monitor.check_room_state(session).await;
        rx
    }

    #[tokio::test(start_paused = true)]
    async fn submit_notifies_room_and_persists_once() {
        let rooms = Arc::new(RoomDirectory::default());
        let monitor = RoomMonitor::new(Arc::clone(&rooms));
        let store = Arc::new(RecordingStore::default());
        let coordinator =
            SubmissionCoordinator::new(Arc::clone(&rooms), monitor.clone(), store.clone());
        let session = SessionKey::from_id(42);
        let mut rx_a = join(&rooms, &monitor, &session).await;
        let mut rx_b = join(&rooms, &monitor, &session).await;

        coordinator
            .submit(session.clone(), "fn solve() {}".to_string())
            .await
            .await
            .expect("persistence task should not panic");

        assert_eq!(rx_a.try_recv().ok(), Some(ServerEvent::CompleteSession));
        assert_eq!(rx_b.try_recv().ok(), Some(ServerEvent::CompleteSession));
        assert!(monitor.is_completed(&session).await);
        assert_eq!(
            *store.submissions.lock().await,
            vec![SessionSubmission {
                session_id: session,
                code_solution: "fn solve() {}".to_string(),
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn submit_cancels_pending_abandonment_timer() {
        let rooms = Arc::new(RoomDirectory::default());
        let monitor = RoomMonitor::new(Arc::clone(&rooms));
        let coordinator = SubmissionCoordinator::new(
            Arc::clone(&rooms),
            monitor.clone(),
            Arc::new(RecordingStore::default()),
        );
        let session = SessionKey::from_id(7);
        let mut rx = join(&rooms, &monitor, &session).await;
        assert!(monitor.has_pending_timer(&session).await);

        sleep(Duration::from_secs(5)).await;
        let _ = coordinator.submit(session.clone(), String::new()).await.await;
        assert!(!monitor.has_pending_timer(&session).await);

        monitor.check_room_state(&session).await;
        sleep(SESSION_TIMEOUT * 2).await;

        assert_eq!(rx.try_recv().ok(), Some(ServerEvent::CompleteSession));
        assert!(rx.try_recv().is_err(), "no termination after submission");
    }

    #[tokio::test]
    async fn persistence_failure_is_contained() {
        let rooms = Arc::new(RoomDirectory::default());
        let monitor = RoomMonitor::new(Arc::clone(&rooms));
        let coordinator =
            SubmissionCoordinator::new(Arc::clone(&rooms), monitor.clone(), Arc::new(RejectingStore));
        let session = SessionKey::from_id(8);
        let mut rx = join(&rooms, &monitor, &session).await;

        let handle = coordinator.submit(session.clone(), "x".to_string()).await;
        assert_eq!(rx.try_recv().ok(), Some(ServerEvent::CompleteSession));
        handle.await.expect("persistence failure must not panic the task");
        assert!(monitor.is_completed(&session).await);
    }
}
