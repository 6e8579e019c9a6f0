//! Battle participants.
//!
//! A participant is one side of a head-to-head battle. Identity comes from the
//! battle-start notification; points and hearts are mutated by the engine.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{clamp_hearts, HEARTS_MAX};

/// Which side of the battle a participant sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    #[serde(alias = "A")]
    A,
    #[serde(alias = "B")]
    B,
}

impl Side {
    pub fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A => "a",
            Self::B => "b",
        }
    }

    /// Placeholder name used when the upstream gives no identity.
    pub fn placeholder(&self) -> &'static str {
        match self {
            Self::A => "Player A",
            Self::B => "Player B",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a participant as announced by a battle start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParticipantInfo {
    pub anchor_id: String,
    pub unique_id: String,
    pub nickname: String,
    pub avatar_url: String,
}

impl ParticipantInfo {
    pub fn new(
        anchor_id: impl Into<String>,
        unique_id: impl Into<String>,
        nickname: impl Into<String>,
    ) -> Self {
        Self {
            anchor_id: anchor_id.into(),
            unique_id: unique_id.into(),
            nickname: nickname.into(),
            avatar_url: String::new(),
        }
    }

    pub fn with_avatar(mut self, url: impl Into<String>) -> Self {
        self.avatar_url = url.into();
        self
    }

    /// Stable identity used for opponent continuity.
    pub fn identity(&self) -> &str {
        if self.anchor_id.is_empty() {
            &self.unique_id
        } else {
            &self.anchor_id
        }
    }
}

/// One side of an active battle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BattleParticipant {
    pub anchor_id: String,
    pub unique_id: String,
    pub nickname: String,
    pub avatar_url: String,
    pub points: u64,
    pub hearts: u8,
}

impl BattleParticipant {
    /// Build a participant with zero points, applying the placeholder
    /// fallbacks for missing identity fields.
    pub fn from_info(info: ParticipantInfo, side: Side, hearts: u8) -> Self {
        let unique_id = if info.unique_id.is_empty() {
            side.placeholder().to_string()
        } else {
            info.unique_id
        };
        let nickname = if info.nickname.is_empty() {
            unique_id.clone()
        } else {
            info.nickname
        };

        Self {
            anchor_id: info.anchor_id,
            unique_id,
            nickname,
            avatar_url: info.avatar_url,
            points: 0,
            hearts: hearts.min(HEARTS_MAX),
        }
    }

    /// Stable identity used for opponent continuity.
    pub fn identity(&self) -> &str {
        if self.anchor_id.is_empty() {
            &self.unique_id
        } else {
            &self.anchor_id
        }
    }

    /// Overwrite hearts, clamped to `[0, 10]`.
    pub fn set_hearts(&mut self, value: i64) -> u8 {
        self.hearts = clamp_hearts(value);
        self.hearts
    }

    /// Add `delta` hearts, clamped to `[0, 10]`.
    pub fn adjust_hearts(&mut self, delta: i64) -> u8 {
        self.set_hearts((self.hearts as i64).saturating_add(delta))
    }

    /// Remove one heart, never going below zero.
    pub fn lose_heart(&mut self) -> u8 {
        self.hearts = self.hearts.saturating_sub(1);
        self.hearts
    }
}
