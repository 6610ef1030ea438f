// Session registry: pending abandonment timers and completed sessions.
//
// Pure bookkeeping. Policy (when to arm, cancel, or clear) lives in the room
// monitor; the registry only guarantees one timer per session key.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::time::Duration;

use pairsync_common::protocol::events::SessionKey;
use tokio::task::JoinHandle;

/// Identifies one arming of an abandonment timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

#[derive(Debug)]
struct PendingTimer {
    id: TimerId,
    task: JoinHandle<()>,
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    timers: HashMap<SessionKey, PendingTimer>,
    completed: HashSet<SessionKey>,
    next_timer_id: u64,
}

impl SessionRegistry {
    /// Schedule `on_expire` to run after `delay`, unless a timer is already
    /// pending for `session`, in which case nothing is scheduled and the
    /// existing timer's id is returned.
    ///
    /// `on_expire` receives the id of its own arming so it can release
    /// exactly its own entry.
    pub fn arm_timer<F, Fut>(&mut self, session: &SessionKey, delay: Duration, on_expire: F) -> TimerId
    where
        F: FnOnce(TimerId) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if let Some(existing) = self.timers.get(session) {
            return existing.id;
        }

        self.next_timer_id += 1;
        let id = TimerId(self.next_timer_id);
        let expiry = on_expire(id);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            expiry.await;
        });
        self.timers.insert(session.clone(), PendingTimer { id, task });
        id
    }

    /// Abort and remove the pending timer. Returns false when none was pending.
    pub fn cancel_timer(&mut self, session: &SessionKey) -> bool {
        match self.timers.remove(session) {
            Some(timer) => {
                timer.task.abort();
                true
            }
            None => false,
        }
    }

    /// Remove the timer entry without aborting it, but only if it is still
    /// the arming identified by `id`. Used by the expiry task on itself.
    pub fn release_timer(&mut self, session: &SessionKey, id: TimerId) -> bool {
        if self.timer_id(session) != Some(id) {
            return false;
        }
        self.timers.remove(session);
        true
    }

    pub fn timer_id(&self, session: &SessionKey) -> Option<TimerId> {
        self.timers.get(session).map(|timer| timer.id)
    }

    pub fn has_timer(&self, session: &SessionKey) -> bool {
        self.timers.contains_key(session)
    }

    #[cfg(test)]
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    pub fn mark_completed(&mut self, session: &SessionKey) {
        self.completed.insert(session.clone());
    }

    pub fn is_completed(&self, session: &SessionKey) -> bool {
        self.completed.contains(session)
    }

    pub fn clear_completed(&mut self, session: &SessionKey) -> bool {
        self.completed.remove(session)
    }
}
