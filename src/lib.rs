//! HeartBattle State Library
//!
//! Round reconciliation and heart tracking for live head-to-head battles.
//!
//! # Overview
//!
//! - **Session State** - One aggregate per tracked session: both participants,
//!   their points and hearts, the round context and the winner on display.
//!
//! - **Stale-Event Filter** - Score and win notifications are matched against
//!   the current participants' anchor ids; leftovers from a previous battle
//!   are dropped.
//!
//! - **Round Reconciliation** - Round-end signals are debounced, require
//!   in-progress evidence and settle at most once. The loser drops a heart.
//!
//! - **Subscribers** - Every change is pushed to the session's listeners in
//!   mutation order.
//!
//! # Design Principles
//!
//! 1. **One lock per session** - Events, commands and timers for a session
//!    serialize on its mutex. Sessions never contend with each other.
//!
//! 2. **Pure transitions** - `engine::round` mutates a `BattleSession` and
//!    returns an outcome; locking, logging and fan-out live in the manager.
//!
//! 3. **No transport** - The live platform sits behind [`EventSource`];
//!    consumers get snapshots through listeners.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use heartbattle_state::{
//!     BattleManager, EventSink, EventSource, LiveEvent, ParticipantInfo, RoomInfo, Side,
//!     SourceError,
//! };
//!
//! struct Offline;
//!
//! #[async_trait]
//! impl EventSource for Offline {
//!     async fn connect(&self, _: &str, _: EventSink) -> Result<RoomInfo, SourceError> {
//!         Ok(RoomInfo::default())
//!     }
//!     fn disconnect(&self, _: &str) {}
//! }
//!
//! # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
//! let manager = BattleManager::new(Arc::new(Offline));
//! manager.connect("streamer").await.unwrap();
//! manager.set_battle_mode("streamer", 3);
//!
//! manager.handle_event(
//!     "streamer",
//!     LiveEvent::BattleStarted {
//!         battle_id: "7001".to_string(),
//!         participants: [
//!             ParticipantInfo::new("111", "alice", "Alice"),
//!             ParticipantInfo::new("222", "bob", "Bob"),
//!         ],
//!     },
//! );
//!
//! manager.adjust_hearts("streamer", Side::B, -1);
//! let state = manager.state("streamer");
//! assert_eq!(state.participant_b.unwrap().hearts, 2);
//! # });
//! ```

pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod manager;
pub mod payload;
pub mod source;
pub mod state;
pub mod subscribers;

pub use command::{normalize_session_id, ClientMessage, Command, ServerMessage};
pub use config::BattleConfig;
pub use error::{BattleError, PublishError, SourceError};
pub use event::{ArmyEntry, BattleStatus, LiveEvent, RoomInfo, ScoreBoard};
pub use manager::{BattleManager, ConnectOutcome};
pub use source::{EventSink, EventSource};
pub use state::*;
pub use subscribers::{listener, Listener, SubscriptionId};
