//! Tunable thresholds for round reconciliation.
//!
//! The debounce and the winner display duration are empirical values. The
//! upstream event stream is order-unstable, so both are exposed here rather
//! than hard-coded in the engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Upper bound for a participant's hearts.
pub const HEARTS_MAX: u8 = 10;

/// Lower bound for a battle mode / heart reset.
pub const BATTLE_MODE_MIN: u8 = 1;

/// Hearts granted per battle when no mode has been set.
pub const DEFAULT_HEARTS_PER_BATTLE: u8 = 5;

/// Minimum battle age before a round-end signal is trusted.
pub const DEFAULT_SETTLE_DEBOUNCE: Duration = Duration::from_secs(8);

/// How long the round winner stays on screen.
pub const DEFAULT_WINNER_DISPLAY: Duration = Duration::from_secs(5);

/// Label shown instead of a nickname when a round ends level.
pub const DEFAULT_TIE_LABEL: &str = "Empate";

/// Clamp an arbitrary heart count into `[0, HEARTS_MAX]`.
pub fn clamp_hearts(value: i64) -> u8 {
    value.clamp(0, HEARTS_MAX as i64) as u8
}

/// Clamp a battle mode / reset count into `[BATTLE_MODE_MIN, HEARTS_MAX]`.
pub fn clamp_battle_mode(value: i64) -> u8 {
    value.clamp(BATTLE_MODE_MIN as i64, HEARTS_MAX as i64) as u8
}

/// Engine configuration.
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```
/// use heartbattle_state::config::BattleConfig;
///
/// let config = BattleConfig::from_json(r#"{"winner_display_ms": 3000}"#).unwrap();
/// assert_eq!(config.winner_display().as_secs(), 3);
/// assert_eq!(config.settle_debounce().as_secs(), 8);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BattleConfig {
    /// Minimum battle age (ms) before a round may settle or be reopened.
    pub settle_debounce_ms: u64,

    /// Winner display duration (ms).
    pub winner_display_ms: u64,

    /// Hearts per battle for sessions that never set a mode.
    pub default_hearts: u8,

    /// Round winner label for ties.
    pub tie_label: String,
}

impl Default for BattleConfig {
    fn default() -> Self {
        Self {
            settle_debounce_ms: DEFAULT_SETTLE_DEBOUNCE.as_millis() as u64,
            winner_display_ms: DEFAULT_WINNER_DISPLAY.as_millis() as u64,
            default_hearts: DEFAULT_HEARTS_PER_BATTLE,
            tie_label: DEFAULT_TIE_LABEL.to_string(),
        }
    }
}

impl BattleConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON document, filling missing fields with defaults.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let mut config: Self = serde_json::from_str(raw)?;
        config.default_hearts = clamp_battle_mode(config.default_hearts as i64);
        Ok(config)
    }

    pub fn settle_debounce(&self) -> Duration {
        Duration::from_millis(self.settle_debounce_ms)
    }

    pub fn winner_display(&self) -> Duration {
        Duration::from_millis(self.winner_display_ms)
    }

    #[must_use]
    pub fn with_settle_debounce(mut self, debounce: Duration) -> Self {
        self.settle_debounce_ms = debounce.as_millis() as u64;
        self
    }

    #[must_use]
    pub fn with_winner_display(mut self, display: Duration) -> Self {
        self.winner_display_ms = display.as_millis() as u64;
        self
    }

    /// Set the fallback battle mode. Clamped to `[1, 10]`.
    #[must_use]
    pub fn with_default_hearts(mut self, hearts: u8) -> Self {
        self.default_hearts = clamp_battle_mode(hearts as i64);
        self
    }

    #[must_use]
    pub fn with_tie_label(mut self, label: impl Into<String>) -> Self {
        self.tie_label = label.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = BattleConfig::new();
        assert_eq!(config.settle_debounce(), Duration::from_secs(8));
        assert_eq!(config.winner_display(), Duration::from_secs(5));
        assert_eq!(config.default_hearts, 5);
        assert_eq!(config.tie_label, "Empate");
    }

    #[test]
    fn test_from_json_partial() {
        let config = BattleConfig::from_json(r#"{"tie_label": "Tie", "default_hearts": 40}"#).unwrap();
        assert_eq!(config.tie_label, "Tie");
        assert_eq!(config.default_hearts, 10);
        assert_eq!(config.settle_debounce_ms, 8000);
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(BattleConfig::from_json("not json").is_err());
    }

    #[test]
    fn test_clamps() {
        assert_eq!(clamp_hearts(-5), 0);
        assert_eq!(clamp_hearts(7), 7);
        assert_eq!(clamp_hearts(99), 10);
        assert_eq!(clamp_battle_mode(0), 1);
        assert_eq!(clamp_battle_mode(11), 10);
    }

    #[test]
    fn test_builders() {
        let config = BattleConfig::new()
            .with_settle_debounce(Duration::from_millis(250))
            .with_winner_display(Duration::from_secs(1))
            .with_default_hearts(0);
        assert_eq!(config.settle_debounce_ms, 250);
        assert_eq!(config.winner_display_ms, 1000);
        assert_eq!(config.default_hearts, 1);
    }
}
