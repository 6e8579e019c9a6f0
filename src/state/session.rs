//! Per-session battle state.
//!
//! A [`BattleSession`] is the single aggregate for one session key: the
//! broadcastable fields, the round context, the sticky battle mode, the link
//! status and the pending winner timer all live together so they cannot drift.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::timer::WinnerTimer;
use crate::state::participant::{BattleParticipant, Side};
use crate::state::round::RoundContext;

/// Snapshot delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub connected: bool,
    pub battle_active: bool,
    pub participant_a: Option<BattleParticipant>,
    pub participant_b: Option<BattleParticipant>,
    pub round_winner: Option<String>,
    pub session_id: String,
}

impl SessionState {
    /// State of a session with no battle and no live link.
    pub fn idle(session_id: impl Into<String>) -> Self {
        Self {
            connected: false,
            battle_active: false,
            participant_a: None,
            participant_b: None,
            round_winner: None,
            session_id: session_id.into(),
        }
    }

    pub fn participant(&self, side: Side) -> Option<&BattleParticipant> {
        match side {
            Side::A => self.participant_a.as_ref(),
            Side::B => self.participant_b.as_ref(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Status of the external live subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkStatus {
    #[default]
    Down,
    /// A connect call is in flight
    Connecting,
    Live,
}

/// Battle state for one session.
#[derive(Debug)]
pub struct BattleSession {
    pub session_id: String,

    /// Live subscription reported connected
    pub connected: bool,

    pub battle_active: bool,
    pub participant_a: Option<BattleParticipant>,
    pub participant_b: Option<BattleParticipant>,

    /// Transient winner label, cleared by the winner timer
    pub round_winner: Option<String>,

    /// Present while a battle is active
    pub round: Option<RoundContext>,

    /// Hearts granted at the next battle start
    pub battle_mode: u8,

    pub link: LinkStatus,

    pub(crate) winner_timer: Option<WinnerTimer>,
    pub(crate) timer_seq: u64,

    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl BattleSession {
    pub fn new(session_id: impl Into<String>, battle_mode: u8) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            connected: false,
            battle_active: false,
            participant_a: None,
            participant_b: None,
            round_winner: None,
            round: None,
            battle_mode,
            link: LinkStatus::Down,
            winner_timer: None,
            timer_seq: 0,
            created_at: now,
            last_activity: now,
        }
    }

    pub fn snapshot(&self) -> SessionState {
        SessionState {
            connected: self.connected,
            battle_active: self.battle_active,
            participant_a: self.participant_a.clone(),
            participant_b: self.participant_b.clone(),
            round_winner: self.round_winner.clone(),
            session_id: self.session_id.clone(),
        }
    }

    pub fn participant(&self, side: Side) -> Option<&BattleParticipant> {
        match side {
            Side::A => self.participant_a.as_ref(),
            Side::B => self.participant_b.as_ref(),
        }
    }

    pub fn participant_mut(&mut self, side: Side) -> Option<&mut BattleParticipant> {
        match side {
            Side::A => self.participant_a.as_mut(),
            Side::B => self.participant_b.as_mut(),
        }
    }

    /// Both participants, if the battle has two sides.
    pub fn pair_mut(&mut self) -> Option<(&mut BattleParticipant, &mut BattleParticipant)> {
        match (self.participant_a.as_mut(), self.participant_b.as_mut()) {
            (Some(a), Some(b)) => Some((a, b)),
            _ => None,
        }
    }

    /// Anchor ids of the current participants, `None` when unknown.
    pub fn anchors(&self) -> (Option<&str>, Option<&str>) {
        fn anchor(p: Option<&BattleParticipant>) -> Option<&str> {
            p.map(|p| p.anchor_id.as_str()).filter(|id| !id.is_empty())
        }
        (anchor(self.participant_a.as_ref()), anchor(self.participant_b.as_ref()))
    }

    /// Whether a live subscription exists or is being set up.
    pub fn is_linked(&self) -> bool {
        self.link != LinkStatus::Down
    }

    pub fn has_pending_timer(&self) -> bool {
        self.winner_timer.is_some()
    }

    /// Return to idle: no participants, no round, no winner, no timer.
    ///
    /// The battle mode and link status are kept.
    pub fn clear_battle(&mut self) {
        self.battle_active = false;
        self.participant_a = None;
        self.participant_b = None;
        self.round_winner = None;
        self.round = None;
        self.winner_timer = None;
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    /// Time since the last mutation.
    pub fn idle_time(&self) -> chrono::Duration {
        Utc::now() - self.last_activity
    }
}
