//! Shared registry of live sessions and the participant roster
//!
//! The registry is the only state touched by more than one task: every
//! session reader mutates it on register/disconnect and the broadcaster reads
//! it on every fan-out. A single mutex guards both the session set and the
//! roster so they can never drift apart, and the connect/disconnect notices
//! are enqueued inside the same critical section — every roster update that
//! reaches the queue is consistent with the notices around it.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::protocol::Outbound;
use crate::server::queue::MessageQueue;
use crate::server::session::Session;

#[derive(Default)]
struct RegistryInner {
    /// Live sessions, member from accept until close
    sessions: HashMap<Uuid, Arc<Session>>,
    /// One entry per registered session, in registration order.
    /// Names are not unique; the session id disambiguates removal.
    participants: Vec<(Uuid, String)>,
}

impl RegistryInner {
    fn names(&self) -> Vec<String> {
        self.participants
            .iter()
            .map(|(_, name)| name.clone())
            .collect()
    }
}

/// Thread-safe collection of active sessions plus the ordered roster
pub struct Registry {
    queue: MessageQueue,
    inner: Mutex<RegistryInner>,
}

impl Registry {
    pub fn new(queue: MessageQueue) -> Self {
        Self {
            queue,
            inner: Mutex::new(RegistryInner::default()),
        }
    }

    /// Track a newly accepted session (not yet registered)
    pub async fn add(&self, session: Arc<Session>) {
        let mut inner = self.inner.lock().await;
        inner.sessions.insert(session.id(), session);
    }

    /// Record a session's display name and announce it.
    ///
    /// Appends the roster entry and enqueues the connect notice plus a fresh
    /// roster in one atomic step. A session that was already removed (closed
    /// while its registration frame was in flight) is ignored.
    pub async fn activate(&self, id: Uuid, name: String) {
        let mut inner = self.inner.lock().await;
        if !inner.sessions.contains_key(&id) {
            return;
        }
        inner.participants.push((id, name.clone()));
        self.queue
            .enqueue(Outbound::system_notice(format!("{} connected", name)));
        self.queue.enqueue(Outbound::roster(inner.names()));
        info!("client added: {}", name);
    }

    /// Drop a session and, if it was registered, announce the disconnect.
    ///
    /// Session-set removal, roster removal, and the disconnect notice plus
    /// fresh roster all happen under the one lock; no concurrent snapshot can
    /// observe a half-removed session.
    pub async fn remove(&self, id: Uuid) {
        let mut inner = self.inner.lock().await;
        inner.sessions.remove(&id);
        if let Some(pos) = inner.participants.iter().position(|(sid, _)| *sid == id) {
            let (_, name) = inner.participants.remove(pos);
            self.queue
                .enqueue(Outbound::system_notice(format!("{} disconnected", name)));
            self.queue.enqueue(Outbound::roster(inner.names()));
            info!("client removed: {}", name);
        }
    }

    /// Consistent point-in-time view of all live sessions
    pub async fn snapshot(&self) -> Vec<Arc<Session>> {
        let inner = self.inner.lock().await;
        inner.sessions.values().cloned().collect()
    }

    /// Current roster, in registration order
    pub async fn participant_names(&self) -> Vec<String> {
        let inner = self.inner.lock().await;
        inner.names()
    }

    /// Number of live sessions (registered or not)
    pub async fn session_count(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.sessions.len()
    }
}
