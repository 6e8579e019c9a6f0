//! Typed live events.
//!
//! The event source delivers these for one session. Raw platform payloads are
//! turned into [`LiveEvent`] by [`crate::payload::decode`].

use crate::state::participant::ParticipantInfo;

/// Round status carried by a score update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BattleStatus {
    /// Status missing or zero.
    #[default]
    Unknown,
    /// Round still being played.
    InProgress(i64),
    /// Round finished (codes 4 and 5 upstream).
    Terminal(i64),
}

impl BattleStatus {
    pub fn from_code(code: i64) -> Self {
        match code {
            4 | 5 => Self::Terminal(code),
            c if c > 0 => Self::InProgress(c),
            _ => Self::Unknown,
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            Self::Unknown => 0,
            Self::InProgress(c) | Self::Terminal(c) => *c,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal(_))
    }

    pub fn is_in_progress(&self) -> bool {
        matches!(self, Self::InProgress(_))
    }
}

/// Score contribution of one side in a score update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArmyEntry {
    /// Anchor identity carried inside the entry, if any.
    pub anchor_id: Option<String>,
    pub points: u64,
    /// Avatar of the top supporter, used when the participant has none.
    pub avatar_url: Option<String>,
}

impl ArmyEntry {
    pub fn new(anchor_id: impl Into<String>, points: u64) -> Self {
        Self {
            anchor_id: Some(anchor_id.into()),
            points,
            avatar_url: None,
        }
    }

    /// An entry without identity (array payloads).
    pub fn anonymous(points: u64) -> Self {
        Self {
            anchor_id: None,
            points,
            avatar_url: None,
        }
    }
}

/// Per-side score breakdown, in the order the upstream sent it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScoreBoard {
    /// Entries keyed by anchor id.
    Keyed(Vec<(String, ArmyEntry)>),
    /// Bare array of entries.
    Positional(Vec<ArmyEntry>),
}

impl ScoreBoard {
    pub fn len(&self) -> usize {
        match self {
            Self::Keyed(entries) => entries.len(),
            Self::Positional(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What the live subscription reported when it came up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomInfo {
    pub room_id: Option<String>,
}

/// A notification from the live-event source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveEvent {
    Connected {
        room_id: Option<String>,
    },
    Disconnected,
    Error {
        message: String,
    },
    BattleStarted {
        battle_id: String,
        participants: [ParticipantInfo; 2],
    },
    ScoreUpdate {
        board: ScoreBoard,
        status: BattleStatus,
    },
    RoundWinAnnounced {
        win: bool,
        winner_id: String,
        rival_id: String,
    },
    PunishFinished {
        battle_id: String,
    },
}

impl LiveEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Disconnected => "disconnected",
            Self::Error { .. } => "error",
            Self::BattleStarted { .. } => "battle_started",
            Self::ScoreUpdate { .. } => "score_update",
            Self::RoundWinAnnounced { .. } => "round_win_announced",
            Self::PunishFinished { .. } => "punish_finished",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(BattleStatus::from_code(0), BattleStatus::Unknown);
        assert_eq!(BattleStatus::from_code(-3), BattleStatus::Unknown);
        assert!(BattleStatus::from_code(1).is_in_progress());
        assert!(BattleStatus::from_code(4).is_terminal());
        assert!(BattleStatus::from_code(5).is_terminal());
        assert!(!BattleStatus::from_code(5).is_in_progress());
        assert_eq!(BattleStatus::from_code(5).code(), 5);
    }

    #[test]
    fn test_board_len() {
        let board = ScoreBoard::Keyed(vec![("1".to_string(), ArmyEntry::new("1", 10))]);
        assert_eq!(board.len(), 1);
        assert!(ScoreBoard::Positional(Vec::new()).is_empty());
    }
}
