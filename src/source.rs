//! Live-event source seam.
//!
//! The platform integration (websocket client, polling bridge, test double)
//! implements [`EventSource`]. The manager hands it an [`EventSink`] per
//! session; everything the source observes flows back through that sink.

use std::sync::Weak;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::SourceError;
use crate::event::{LiveEvent, RoomInfo};
use crate::manager::ManagerInner;

/// Upstream live-event provider.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Open a subscription for `session_id` and push its events into `sink`.
    ///
    /// Awaited once per connect attempt. The sink may be used before this
    /// returns.
    async fn connect(&self, session_id: &str, sink: EventSink) -> Result<RoomInfo, SourceError>;

    /// Close the subscription. Best-effort; unknown sessions are ignored.
    fn disconnect(&self, session_id: &str);
}

/// Handle a source uses to deliver events for one session.
///
/// Holds only a weak reference to the manager, so a sink kept alive by the
/// source does not keep the manager alive. Events emitted after the manager is
/// dropped are discarded.
#[derive(Clone)]
pub struct EventSink {
    inner: Weak<ManagerInner>,
    session_id: String,
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink")
            .field("session_id", &self.session_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl EventSink {
    pub(crate) fn new(inner: Weak<ManagerInner>, session_id: impl Into<String>) -> Self {
        Self {
            inner,
            session_id: session_id.into(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Whether the manager behind this sink is gone.
    pub fn is_closed(&self) -> bool {
        self.inner.strong_count() == 0
    }

    /// Deliver a typed event.
    pub fn emit(&self, event: LiveEvent) {
        if let Some(inner) = self.inner.upgrade() {
            inner.handle_event(&self.session_id, event);
        }
    }

    /// Deliver a raw platform notification, decoded by [`crate::payload`].
    pub fn emit_raw(&self, kind: &str, payload: &Value) {
        if let Some(inner) = self.inner.upgrade() {
            inner.handle_raw_event(&self.session_id, kind, payload);
        }
    }
}
