//! Session lifecycle manager.
//!
//! [`BattleManager`] owns the session store, the subscriber registry and the
//! event source. Every path that mutates a session (upstream events, operator
//! commands, timer expiry) takes that session's lock, applies a transition
//! from [`crate::engine::round`] and publishes before releasing it, so
//! subscribers observe states in mutation order.
//!
//! # Lock order
//!
//! ```text
//! store shard ──▶ session mutex ──▶ subscriber registry
//! ```
//!
//! No lock is held across an await; the only suspension point is
//! [`EventSource::connect`].

use std::sync::{Arc, OnceLock, Weak};

use serde_json::Value;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{clamp_battle_mode, BattleConfig};
use crate::engine::round::{self, ScoreOutcome, Settlement, WinOutcome};
use crate::engine::timer;
use crate::error::{BattleError, SourceError};
use crate::event::LiveEvent;
use crate::payload;
use crate::source::{EventSink, EventSource};
use crate::state::participant::Side;
use crate::state::round::SettleBlocked;
use crate::state::session::{BattleSession, LinkStatus, SessionState};
use crate::state::store::{lock, SessionStore};
use crate::subscribers::{self, Listener, SubscriberRegistry, SubscriptionId};

/// Result of a successful `connect`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// A new live subscription was opened.
    Connected(SessionState),
    /// A subscription already exists (or is being opened) for this session.
    AlreadyConnected(SessionState),
}

impl ConnectOutcome {
    pub fn state(&self) -> &SessionState {
        match self {
            Self::Connected(state) | Self::AlreadyConnected(state) => state,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Self::Connected(_))
    }
}

pub(crate) struct ManagerInner {
    source: Arc<dyn EventSource>,
    store: SessionStore,
    subscribers: SubscriberRegistry,
    config: BattleConfig,
    /// Runtime the winner timers are spawned on. Events may arrive on threads
    /// outside it.
    runtime: OnceLock<Handle>,
    self_ref: Weak<ManagerInner>,
}

/// Entry point for everything session related. Cheap to clone.
#[derive(Clone)]
pub struct BattleManager {
    inner: Arc<ManagerInner>,
}

impl std::fmt::Debug for BattleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BattleManager")
            .field("sessions", &self.inner.store.len())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl BattleManager {
    pub fn new(source: Arc<dyn EventSource>) -> Self {
        Self::with_config(source, BattleConfig::default())
    }

    /// Build a manager. Timers use the runtime current at construction, or
    /// the one the first `connect` runs on.
    pub fn with_config(source: Arc<dyn EventSource>, config: BattleConfig) -> Self {
        Self::build(source, config, Handle::try_current().ok())
    }

    /// Build a manager whose timers always run on `runtime`.
    pub fn with_runtime(source: Arc<dyn EventSource>, config: BattleConfig, runtime: Handle) -> Self {
        Self::build(source, config, Some(runtime))
    }

    fn build(source: Arc<dyn EventSource>, config: BattleConfig, runtime: Option<Handle>) -> Self {
        let inner = Arc::new_cyclic(|self_ref| ManagerInner {
            source,
            store: SessionStore::new(),
            subscribers: SubscriberRegistry::new(),
            config,
            runtime: runtime.map(OnceLock::from).unwrap_or_default(),
            self_ref: self_ref.clone(),
        });
        Self { inner }
    }

    pub fn config(&self) -> &BattleConfig {
        &self.inner.config
    }

    /// Open the live subscription for a session.
    ///
    /// Connecting a session that is already linked (or mid-connect) is not an
    /// error and returns [`ConnectOutcome::AlreadyConnected`]. On failure the
    /// key is left free for a retry.
    pub async fn connect(&self, session_id: &str) -> Result<ConnectOutcome, BattleError> {
        let inner = &self.inner;
        if inner.runtime.get().is_none() {
            if let Ok(runtime) = Handle::try_current() {
                let _ = inner.runtime.set(runtime);
            }
        }
        let (handle, created) = inner.store.get_or_insert_with(session_id, || {
            BattleSession::new(session_id, inner.config.default_hearts)
        });

        {
            let mut session = lock(&handle);
            if session.is_linked() {
                debug!(session_id, link = ?session.link, "already connected");
                return Ok(ConnectOutcome::AlreadyConnected(session.snapshot()));
            }
            session.link = LinkStatus::Connecting;
            session.touch();
        }

        info!(session_id, "connecting");
        let sink = EventSink::new(Arc::downgrade(inner), session_id);
        let result = inner.source.connect(session_id, sink).await;

        let mut session = lock(&handle);
        let err = match result {
            Ok(_) if session.link != LinkStatus::Connecting => {
                // disconnect() ran while the source was still connecting
                drop(session);
                inner.source.disconnect(session_id);
                SourceError::new("disconnected while connecting")
            }
            Ok(room) => {
                session.link = LinkStatus::Live;
                session.connected = true;
                session.touch();
                info!(
                    session_id,
                    room_id = ?room.room_id,
                    created_at = %session.created_at,
                    "connected"
                );
                inner.publish(&session);
                return Ok(ConnectOutcome::Connected(session.snapshot()));
            }
            Err(err) => {
                session.link = LinkStatus::Down;
                session.connected = false;
                drop(session);
                if created {
                    inner.store.remove(session_id);
                }
                err
            }
        };

        warn!(session_id, error = %err, "connect failed");
        Err(BattleError::Connection {
            session_id: session_id.to_string(),
            source: err,
        })
    }

    /// Tear down the live subscription and return the session to idle.
    ///
    /// The battle mode is kept. Unknown sessions are ignored.
    pub fn disconnect(&self, session_id: &str) {
        let Some(handle) = self.inner.store.get(session_id) else {
            debug!(session_id, "disconnect for unknown session");
            return;
        };

        {
            let mut session = lock(&handle);
            session.link = LinkStatus::Down;
            session.connected = false;
            session.clear_battle();
            session.touch();
            self.inner.publish(&session);
        }

        self.inner.source.disconnect(session_id);
        info!(session_id, "disconnected");
    }

    /// Operator override: add `delta` hearts to one side. Returns the new
    /// count, or `None` when there is no such participant.
    pub fn adjust_hearts(&self, session_id: &str, side: Side, delta: i64) -> Option<u8> {
        self.inner.mutate(session_id, |session| {
            round::adjust_hearts(session, side, delta)
        })?
    }

    /// Set the hearts granted at the next battle start. Clamped to `[1, 10]`.
    pub fn set_battle_mode(&self, session_id: &str, hearts: i64) -> Option<u8> {
        let mode = clamp_battle_mode(hearts);
        self.inner.store.with_session(session_id, |session| {
            session.battle_mode = mode;
            session.touch();
            debug!(session_id, battle_mode = mode, "battle mode set");
            mode
        })
    }

    pub fn battle_mode(&self, session_id: &str) -> u8 {
        self.inner
            .store
            .with_session(session_id, |session| session.battle_mode)
            .unwrap_or(self.inner.config.default_hearts)
    }

    /// Overwrite both participants' hearts. Clamped to `[1, 10]`.
    pub fn reset_hearts(&self, session_id: &str, count: i64) -> bool {
        let hearts = clamp_battle_mode(count);
        self.inner
            .mutate(session_id, |session| {
                round::reset_hearts(session, hearts).then_some(())
            })
            .flatten()
            .is_some()
    }

    /// Drop the current battle. The live link is left alone.
    pub fn reset_battle(&self, session_id: &str) -> bool {
        self.inner
            .mutate(session_id, |session| {
                session.clear_battle();
                info!(session_id, "battle reset");
                Some(())
            })
            .is_some()
    }

    /// Register a listener. The current state is delivered before this
    /// returns.
    pub fn subscribe(&self, session_id: &str, listener: Listener) -> SubscriptionId {
        let inner = &self.inner;
        match inner.store.get(session_id) {
            Some(handle) => {
                // Under the session lock so no publish slips in between.
                let session = lock(&handle);
                let id = inner.subscribers.subscribe(session_id, Arc::clone(&listener));
                subscribers::deliver(session_id, id, &listener, &session.snapshot());
                id
            }
            None => {
                let id = inner.subscribers.subscribe(session_id, Arc::clone(&listener));
                subscribers::deliver(session_id, id, &listener, &SessionState::idle(session_id));
                id
            }
        }
    }

    pub fn unsubscribe(&self, session_id: &str, id: SubscriptionId) -> bool {
        self.inner.subscribers.unsubscribe(session_id, id)
    }

    pub fn subscriber_count(&self, session_id: &str) -> usize {
        self.inner.subscribers.count(session_id)
    }

    /// Current snapshot; the idle state for unknown sessions.
    pub fn state(&self, session_id: &str) -> SessionState {
        self.inner
            .store
            .snapshot(session_id)
            .unwrap_or_else(|| SessionState::idle(session_id))
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.inner.store.session_ids()
    }

    pub fn handle_event(&self, session_id: &str, event: LiveEvent) {
        self.inner.handle_event(session_id, event);
    }

    pub fn handle_raw_event(&self, session_id: &str, kind: &str, payload: &Value) {
        self.inner.handle_raw_event(session_id, kind, payload);
    }

    /// Drop sessions with no live link, no subscribers and no activity for
    /// longer than `max_idle`. Returns the removed keys.
    pub fn collect_idle(&self, max_idle: chrono::Duration) -> Vec<String> {
        let subscribers = &self.inner.subscribers;
        let removed = self.inner.store.remove_where(|session| {
            !session.is_linked()
                && subscribers.count(&session.session_id) == 0
                && session.idle_time() > max_idle
        });
        if !removed.is_empty() {
            info!(count = removed.len(), "collected idle sessions");
        }
        removed
    }
}

impl ManagerInner {
    /// Run `f` under the session lock. Publishes if it returns `Some`.
    fn mutate<R>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut BattleSession) -> Option<R>,
    ) -> Option<Option<R>> {
        self.store.with_session(session_id, |session| {
            let result = f(session);
            if result.is_some() {
                session.touch();
                self.publish(session);
            }
            result
        })
    }

    fn publish(&self, session: &BattleSession) {
        let report = self
            .subscribers
            .publish(&session.session_id, &session.snapshot());
        if report.failed > 0 {
            debug!(
                session_id = %session.session_id,
                delivered = report.delivered,
                failed = report.failed,
                "partial fan-out"
            );
        }
    }

    pub(crate) fn handle_raw_event(&self, session_id: &str, kind: &str, payload: &Value) {
        match payload::decode(kind, payload) {
            Ok(Some(event)) => self.handle_event(session_id, event),
            Ok(None) => debug!(session_id, kind, "ignoring unknown event kind"),
            Err(err) => warn!(session_id, error = %err, "dropping malformed event"),
        }
    }

    pub(crate) fn handle_event(&self, session_id: &str, event: LiveEvent) {
        let Some(handle) = self.store.get(session_id) else {
            debug!(session_id, kind = event.kind(), "event for unknown session");
            return;
        };
        let mut session = lock(&handle);
        if self.apply_event(&mut session, event) {
            session.touch();
            self.publish(&session);
        }
    }

    /// Apply one event. Returns whether anything observable changed.
    fn apply_event(&self, session: &mut BattleSession, event: LiveEvent) -> bool {
        let now = Instant::now();
        let id = session.session_id.clone();
        let session_id = id.as_str();

        match event {
            LiveEvent::Connected { room_id } => {
                if !session.is_linked() {
                    debug!(session_id, "connected event after disconnect");
                    return false;
                }
                debug!(session_id, room_id = ?room_id, "source connected");
                session.connected = true;
                true
            }
            LiveEvent::Disconnected => {
                info!(session_id, "source disconnected");
                session.connected = false;
                session.link = LinkStatus::Down;
                true
            }
            LiveEvent::Error { message } => {
                warn!(session_id, error = %message, "source error");
                false
            }
            LiveEvent::BattleStarted {
                battle_id,
                participants,
            } => {
                let start = round::start_battle(session, battle_id, participants, now);
                info!(
                    session_id,
                    battle_id = %start.battle_id,
                    same_opponents = start.same_opponents,
                    swapped = start.swapped,
                    hearts_a = start.hearts.0,
                    hearts_b = start.hearts.1,
                    "battle started"
                );
                true
            }
            LiveEvent::ScoreUpdate { board, status } => {
                match round::apply_score(session, &board, status, now, &self.config) {
                    ScoreOutcome::NoBattle => {
                        debug!(session_id, status = status.code(), "score update without battle");
                        false
                    }
                    ScoreOutcome::Stale(rejection) => {
                        debug!(session_id, status = status.code(), reason = %rejection, "stale score update");
                        false
                    }
                    ScoreOutcome::Applied { status, round_end } => {
                        if let Some(result) = round_end {
                            self.finish_round(session, result, status.code());
                        }
                        true
                    }
                }
            }
            LiveEvent::RoundWinAnnounced {
                win,
                winner_id,
                rival_id,
            } => match round::apply_win_announcement(session, win, &winner_id, &rival_id, now, &self.config) {
                WinOutcome::NoBattle | WinOutcome::NotAWin => false,
                WinOutcome::Stale(rejection) => {
                    debug!(session_id, reason = %rejection, "stale win announcement");
                    false
                }
                WinOutcome::RoundEnd(result) => self.finish_round(session, result, 0),
            },
            LiveEvent::PunishFinished { battle_id } => {
                if round::reopen_round(session, now, self.config.settle_debounce()) {
                    debug!(session_id, battle_id = %battle_id, "round reopened");
                }
                false
            }
        }
    }

    /// Log a round-end attempt and arm the winner display if it settled.
    fn finish_round(
        &self,
        session: &mut BattleSession,
        result: Result<Settlement, SettleBlocked>,
        status: i64,
    ) -> bool {
        let (battle_id, battle_started, hearts_per_battle) = session
            .round
            .as_ref()
            .map(|r| (r.battle_id.clone(), r.started_at_utc.to_rfc3339(), r.hearts_per_battle))
            .unwrap_or_default();

        match result {
            Ok(settlement) => {
                info!(
                    session_id = %session.session_id,
                    battle_id = %battle_id,
                    status,
                    winner = %settlement.label,
                    battle_started = %battle_started,
                    hearts_per_battle,
                    hearts_a = settlement.hearts.0,
                    hearts_b = settlement.hearts.1,
                    "round settled"
                );
                self.arm_winner_timer(session);
                true
            }
            Err(blocked) => {
                debug!(
                    session_id = %session.session_id,
                    battle_id = %battle_id,
                    status,
                    reason = %blocked,
                    "round end ignored"
                );
                false
            }
        }
    }

    fn arm_winner_timer(&self, session: &mut BattleSession) {
        let weak = self.self_ref.clone();
        let session_id = session.session_id.clone();
        timer::arm(session, self.runtime.get(), self.config.winner_display(), move |generation| {
            if let Some(inner) = weak.upgrade() {
                inner.expire_winner(&session_id, generation);
            }
        });
    }

    fn expire_winner(&self, session_id: &str, generation: u64) {
        let Some(handle) = self.store.get(session_id) else {
            return;
        };
        let mut session = lock(&handle);
        if timer::expire(&mut session, generation) {
            debug!(session_id, "round winner cleared");
            session.touch();
            self.publish(&session);
        }
    }
}
