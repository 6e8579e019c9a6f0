//! Session state store.
//!
//! Keyed, concurrent access to [`BattleSession`]s. Each session sits behind its
//! own mutex; the map itself is sharded, so there is no lock spanning sessions.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::state::session::{BattleSession, SessionState};

/// Shared handle to one session.
pub type SessionHandle = Arc<Mutex<BattleSession>>;

/// Lock a session, recovering the data if a previous holder panicked.
pub fn lock(handle: &SessionHandle) -> MutexGuard<'_, BattleSession> {
    handle.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Session store - tracks every known session.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<String, SessionHandle>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a session handle.
    pub fn get(&self, session_id: &str) -> Option<SessionHandle> {
        self.sessions.get(session_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Get a session handle, creating the session if needed.
    ///
    /// The flag is `true` when the session was created by this call.
    pub fn get_or_insert_with(
        &self,
        session_id: &str,
        create: impl FnOnce() -> BattleSession,
    ) -> (SessionHandle, bool) {
        match self.sessions.entry(session_id.to_string()) {
            Entry::Occupied(entry) => (Arc::clone(entry.get()), false),
            Entry::Vacant(entry) => {
                let handle = Arc::new(Mutex::new(create()));
                entry.insert(Arc::clone(&handle));
                (handle, true)
            }
        }
    }

    /// Remove a session.
    pub fn remove(&self, session_id: &str) -> Option<SessionHandle> {
        self.sessions.remove(session_id).map(|(_, handle)| handle)
    }

    /// Run `f` against a session under its lock.
    pub fn with_session<R>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut BattleSession) -> R,
    ) -> Option<R> {
        let handle = self.get(session_id)?;
        let mut session = lock(&handle);
        Some(f(&mut session))
    }

    /// Snapshot of a session, if it exists.
    pub fn snapshot(&self, session_id: &str) -> Option<SessionState> {
        self.with_session(session_id, |s| s.snapshot())
    }

    /// Remove every session for which `expired` returns true.
    ///
    /// Sessions whose lock is currently held are skipped. Returns the removed
    /// keys.
    pub fn remove_where(&self, mut expired: impl FnMut(&BattleSession) -> bool) -> Vec<String> {
        let mut removed = Vec::new();
        self.sessions.retain(|key, handle| {
            let Ok(session) = handle.try_lock() else {
                return true;
            };
            if expired(&session) {
                removed.push(key.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_insert() {
        let store = SessionStore::new();

        let (_, created) = store.get_or_insert_with("host", || BattleSession::new("host", 5));
        assert!(created);

        let (handle, created) = store.get_or_insert_with("host", || BattleSession::new("host", 9));
        assert!(!created);
        assert_eq!(lock(&handle).battle_mode, 5);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_with_session_and_snapshot() {
        let store = SessionStore::new();
        assert!(store.snapshot("host").is_none());

        store.get_or_insert_with("host", || BattleSession::new("host", 5));
        store.with_session("host", |s| s.connected = true);

        assert!(store.snapshot("host").unwrap().connected);
    }

    #[test]
    fn test_remove() {
        let store = SessionStore::new();
        store.get_or_insert_with("host", || BattleSession::new("host", 5));

        assert!(store.remove("host").is_some());
        assert!(store.remove("host").is_none());
        assert!(!store.contains("host"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_remove_where_skips_locked() {
        let store = SessionStore::new();
        let (busy, _) = store.get_or_insert_with("busy", || BattleSession::new("busy", 5));
        store.get_or_insert_with("idle", || BattleSession::new("idle", 5));

        let guard = lock(&busy);
        let removed = store.remove_where(|_| true);
        drop(guard);

        assert_eq!(removed, vec!["idle".to_string()]);
        assert_eq!(store.session_ids(), vec!["busy".to_string()]);
    }
}
