// Session registry: session key -> `SessionManager`.
//
// The transport resolves every attaching connection through
// `get_or_create`, which creates the manager on first reference. The map sits
// behind one mutex that covers lookup, insert and removal only. It is never
// held while a manager operation runs, so sessions stay independent.
//
// Disposal: `remove_if_empty` drops a manager when it has no tracked
// connections AND the registry holds the only `Arc` to it. The second check
// covers a connection that has resolved the manager but not joined yet; that
// connection's handle keeps the entry alive, so it can never join a manager
// that has already been unregistered. Callers must drop their own handle
// before asking for removal.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::info;

use crate::connection::Connection;
use crate::session::{SessionManager, SessionOptions};

/// Owns every live session in the process.
pub struct SessionRegistry<C: Connection> {
    options: SessionOptions,
    sessions: Mutex<HashMap<String, Arc<SessionManager<C>>>>,
}

impl<C: Connection> Default for SessionRegistry<C> {
    fn default() -> Self {
        Self::new(SessionOptions::default())
    }
}

impl<C: Connection> SessionRegistry<C> {
    pub fn new(options: SessionOptions) -> Self {
        Self {
            options,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<SessionManager<C>>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the manager for `key`, creating an empty one if none exists.
    pub fn get_or_create(&self, key: &str) -> Arc<SessionManager<C>> {
        let mut sessions = self.lock();
        if let Some(existing) = sessions.get(key) {
            return Arc::clone(existing);
        }
        let manager = Arc::new(SessionManager::new(key, self.options));
        sessions.insert(key.to_owned(), Arc::clone(&manager));
        info!(session = key, live_sessions = sessions.len(), "session created");
        manager
    }

    /// Unregister `key` if its manager is empty and unreferenced elsewhere.
    /// Returns whether an entry was removed. Safe to call repeatedly.
    pub fn remove_if_empty(&self, key: &str) -> bool {
        let mut sessions = self.lock();
        let removable = sessions
            .get(key)
            .is_some_and(|m| Arc::strong_count(m) == 1 && m.is_empty());
        if removable {
            sessions.remove(key);
            info!(session = key, live_sessions = sessions.len(), "session removed");
        }
        removable
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    /// Tracked connections of the session under `key`, if it exists. Does
    /// not hand out the manager, so it never holds disposal up.
    pub fn connection_count(&self, key: &str) -> Option<usize> {
        self.lock().get(key).map(|m| m.connection_count())
    }
}
