//! Battle reconciliation engine.
//!
//! - `filter` - decides whether an upstream event belongs to the current battle
//! - `round` - pure transitions over a session (start, score, settle, reopen)
//! - `timer` - winner-display timer with a generation guard
//!
//! None of these publish; the [`BattleManager`](crate::manager::BattleManager)
//! wraps them with locking and fan-out.

pub mod filter;
pub mod round;
pub mod timer;

pub use filter::{attribute_scores, check_win_announcement, Attribution, KnownAnchors, Rejection};
pub use round::{BattleStart, ScoreOutcome, Settlement, WinOutcome};
