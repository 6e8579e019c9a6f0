//! Subscriber registry.
//!
//! Listeners are registered per session and receive every published
//! [`SessionState`]. Fan-out is synchronous and best-effort: a listener that
//! errors or panics is logged and skipped, and never prevents delivery to the
//! rest.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::warn;

use crate::error::PublishError;
use crate::state::session::SessionState;

/// Callback receiving session snapshots.
///
/// Listeners run while the session is locked and must not call back into the
/// manager.
pub type Listener = Arc<dyn Fn(&SessionState) -> Result<(), PublishError> + Send + Sync>;

/// Wrap a closure as a [`Listener`].
pub fn listener<F>(f: F) -> Listener
where
    F: Fn(&SessionState) -> Result<(), PublishError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Outcome of one publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Default)]
pub struct SubscriberRegistry {
    listeners: DashMap<String, Vec<(SubscriptionId, Listener)>>,
    next_id: AtomicU64,
}

impl fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("sessions", &self.listeners.len())
            .finish()
    }
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for a session.
    pub fn subscribe(&self, session_id: &str, listener: Listener) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.listeners
            .entry(session_id.to_string())
            .or_default()
            .push((id, listener));
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, session_id: &str, id: SubscriptionId) -> bool {
        let removed = match self.listeners.get_mut(session_id) {
            Some(mut entry) => {
                let before = entry.len();
                entry.retain(|(sub, _)| *sub != id);
                entry.len() != before
            }
            None => false,
        };
        self.listeners.remove_if(session_id, |_, subs| subs.is_empty());
        removed
    }

    /// Number of listeners registered for a session.
    pub fn count(&self, session_id: &str) -> usize {
        self.listeners.get(session_id).map_or(0, |subs| subs.len())
    }

    /// Deliver a snapshot to every listener of the session.
    pub fn publish(&self, session_id: &str, state: &SessionState) -> PublishReport {
        // Clone out so no map guard is held while listeners run.
        let targets: Vec<(SubscriptionId, Listener)> = match self.listeners.get(session_id) {
            Some(subs) => subs.iter().map(|(id, l)| (*id, Arc::clone(l))).collect(),
            None => return PublishReport::default(),
        };

        let mut report = PublishReport::default();
        for (id, target) in targets {
            if deliver(session_id, id, &target, state) {
                report.delivered += 1;
            } else {
                report.failed += 1;
            }
        }
        report
    }
}

/// Deliver to a single listener, isolating its failure.
pub(crate) fn deliver(
    session_id: &str,
    id: SubscriptionId,
    target: &Listener,
    state: &SessionState,
) -> bool {
    match catch_unwind(AssertUnwindSafe(|| target(state))) {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            warn!(session_id, subscription = %id, error = %err, "listener rejected state");
            false
        }
        Err(_) => {
            warn!(session_id, subscription = %id, "listener panicked");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recorder() -> (Listener, Arc<Mutex<Vec<SessionState>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let l = listener(move |state| {
            sink.lock().unwrap().push(state.clone());
            Ok(())
        });
        (l, seen)
    }

    #[test]
    fn test_subscribe_publish() {
        let registry = SubscriberRegistry::new();
        let (l, seen) = recorder();
        registry.subscribe("host", l);

        let report = registry.publish("host", &SessionState::idle("host"));
        assert_eq!(report, PublishReport { delivered: 1, failed: 0 });
        assert_eq!(seen.lock().unwrap().len(), 1);

        // Other sessions are untouched.
        registry.publish("other", &SessionState::idle("other"));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_unsubscribe() {
        let registry = SubscriberRegistry::new();
        let (l, seen) = recorder();
        let id = registry.subscribe("host", l);

        assert!(registry.unsubscribe("host", id));
        assert!(!registry.unsubscribe("host", id));
        assert_eq!(registry.count("host"), 0);

        registry.publish("host", &SessionState::idle("host"));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_failing_listeners_do_not_block_others() {
        let registry = SubscriberRegistry::new();
        registry.subscribe("host", listener(|_| Err(PublishError("closed".into()))));
        registry.subscribe("host", listener(|_| panic!("listener bug")));
        let (l, seen) = recorder();
        registry.subscribe("host", l);

        let report = registry.publish("host", &SessionState::idle("host"));
        assert_eq!(report, PublishReport { delivered: 1, failed: 2 });
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_ids_are_unique() {
        let registry = SubscriberRegistry::new();
        let a = registry.subscribe("host", listener(|_| Ok(())));
        let b = registry.subscribe("host", listener(|_| Ok(())));
        assert_ne!(a, b);
        assert_eq!(registry.count("host"), 2);
    }
}
