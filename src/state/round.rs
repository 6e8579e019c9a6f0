//! Round context.
//!
//! One context exists per active battle. It replaces loose per-session flags
//! with an explicit sub-state machine.
//!
//! # Phases
//!
//! ```text
//!   battle start
//!        │
//!        ▼
//! ┌────────────────────┐  first non-terminal score  ┌────────────┐
//! │ AwaitingFirstScore │───────────────────────────▶│ InProgress │
//! └────────────────────┘                            └─────┬──────┘
//!                                     round-end signal    │   ▲ punish finished
//!                              (debounced, in-progress    ▼   │ (debounced)
//!                                     score observed)  ┌─────────┐
//!                                                      │ Settled │
//!                                                      └─────────┘
//! ```

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::event::BattleStatus;

/// Derived phase of the current round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    AwaitingFirstScore,
    InProgress,
    Settled,
}

impl RoundPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AwaitingFirstScore => "awaiting_first_score",
            Self::InProgress => "in_progress",
            Self::Settled => "settled",
        }
    }
}

impl fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a round-end signal was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleBlocked {
    /// No active battle with both participants.
    NoBattle,
    /// The round outcome was already applied.
    AlreadySettled,
    /// The battle is younger than the debounce.
    TooEarly { age: Duration },
    /// No in-progress score was seen since the last settlement.
    NoInProgressScore,
}

impl fmt::Display for SettleBlocked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoBattle => write!(f, "no active battle"),
            Self::AlreadySettled => write!(f, "round already settled"),
            Self::TooEarly { age } => write!(f, "battle too new ({}ms)", age.as_millis()),
            Self::NoInProgressScore => write!(f, "no in-progress score observed"),
        }
    }
}

/// Per-battle reconciliation state.
#[derive(Debug, Clone)]
pub struct RoundContext {
    pub battle_id: String,

    /// Monotonic start time, drives the debounce
    pub started_at: Instant,

    /// Wall-clock start time
    pub started_at_utc: DateTime<Utc>,

    /// Round outcome already applied
    pub settled: bool,

    /// A legitimate non-terminal score update arrived
    pub score_event_seen: bool,

    /// An in-progress status arrived since start or the last settlement
    pub in_progress_observed: bool,

    /// Battle mode captured when the battle started
    pub hearts_per_battle: u8,
}

impl RoundContext {
    pub fn new(battle_id: impl Into<String>, hearts_per_battle: u8, now: Instant) -> Self {
        Self {
            battle_id: battle_id.into(),
            started_at: now,
            started_at_utc: Utc::now(),
            settled: false,
            score_event_seen: false,
            in_progress_observed: false,
            hearts_per_battle,
        }
    }

    pub fn phase(&self) -> RoundPhase {
        if self.settled {
            RoundPhase::Settled
        } else if self.score_event_seen {
            RoundPhase::InProgress
        } else {
            RoundPhase::AwaitingFirstScore
        }
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }

    pub fn is_debounced(&self, now: Instant, debounce: Duration) -> bool {
        self.age(now) >= debounce
    }

    /// Record the status of an accepted score update.
    pub fn observe_score(&mut self, status: BattleStatus) {
        if !self.score_event_seen && !status.is_terminal() {
            // A terminal status before any real scoring says nothing about
            // this round.
            self.score_event_seen = true;
            self.settled = false;
        }
        if status.is_in_progress() {
            self.in_progress_observed = true;
        }
    }

    /// Check the round-end guards without mutating anything.
    pub fn check_settle(&self, now: Instant, debounce: Duration) -> Result<(), SettleBlocked> {
        if self.settled {
            return Err(SettleBlocked::AlreadySettled);
        }
        if !self.is_debounced(now, debounce) {
            return Err(SettleBlocked::TooEarly { age: self.age(now) });
        }
        if !self.in_progress_observed {
            return Err(SettleBlocked::NoInProgressScore);
        }
        Ok(())
    }

    /// Mark the round outcome as applied.
    pub fn settle(&mut self) {
        self.settled = true;
        self.in_progress_observed = false;
    }

    /// Allow the next round to settle. Ignored while the battle is too new.
    pub fn reopen(&mut self, now: Instant, debounce: Duration) -> bool {
        if !self.is_debounced(now, debounce) {
            return false;
        }
        self.settled = false;
        true
    }
}
