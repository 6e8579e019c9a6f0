//! State types for live battles.
//!
//! - `participant` - the two sides of a battle and their hearts
//! - `round` - per-battle round flags and the settle guards
//! - `session` - the per-session aggregate and its broadcast snapshot
//! - `store` - concurrent keyed access to sessions
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                          SessionStore                              │
//! │                                                                    │
//! │   session_id ──▶ Arc<Mutex<BattleSession>>                         │
//! │                                                                    │
//! │   ┌────────────────────────────────────────────────────────────┐   │
//! │   │ BattleSession                                               │   │
//! │   │                                                             │   │
//! │   │  participant_a / participant_b   (BattleParticipant)        │   │
//! │   │  round                           (RoundContext)             │   │
//! │   │  round_winner, battle_mode, link, winner timer              │   │
//! │   │                                                             │   │
//! │   │  snapshot() ──▶ SessionState  (what subscribers receive)    │   │
//! │   └────────────────────────────────────────────────────────────┘   │
//! └───────────────────────────────────────────────────────────────────┘
//! ```

pub mod participant;
pub mod round;
pub mod session;
pub mod store;

pub use participant::{BattleParticipant, ParticipantInfo, Side};
pub use round::{RoundContext, RoundPhase, SettleBlocked};
pub use session::{BattleSession, LinkStatus, SessionState};
pub use store::{SessionHandle, SessionStore};
