//! Session registry.
//!
//! Maps session ids to live sessions. Each session sits behind its own async
//! mutex, so turns in one session are serialized while distinct sessions
//! proceed concurrently.

use crate::session::TurnSession;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Shared handle to one session.
pub type SessionHandle = Arc<Mutex<TurnSession>>;

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, SessionHandle>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `session`, replacing any session with the same id.
    pub fn put(&self, session: TurnSession) -> SessionHandle {
        let id = session.id().to_string();
        let handle = Arc::new(Mutex::new(session));
        self.sessions.insert(id, Arc::clone(&handle));
        handle
    }

    pub fn get(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.get(id).map(|s| Arc::clone(s.value()))
    }

    pub fn delete(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.remove(id).map(|(_, s)| s)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Whether `handle` is still the session registered under `id`.
    pub fn holds(&self, id: &str, handle: &SessionHandle) -> bool {
        self.sessions
            .get(id)
            .is_some_and(|s| Arc::ptr_eq(s.value(), handle))
    }
}
