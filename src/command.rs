//! Consumer protocol.
//!
//! Control panels and overlays talk to the manager with small JSON messages:
//!
//! ```text
//! client → {"type": "adjust_hearts", "payload": {"side": "a", "delta": -1}}
//! server → {"type": "battle_state",  "payload": { ...SessionState... }}
//! server → {"type": "error",         "payload": {"message": "..."}}
//! ```
//!
//! Transport (websocket, IPC) is left to the embedding process; this module
//! only covers parsing, dispatch and the listener adapter.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::config::DEFAULT_HEARTS_PER_BATTLE;
use crate::error::{BattleError, PublishError};
use crate::manager::BattleManager;
use crate::state::participant::Side;
use crate::state::session::SessionState;
use crate::subscribers::{listener, Listener};

/// Trim a session id and strip a leading `@`. Returns `None` if nothing is
/// left.
///
/// ```
/// use heartbattle_state::command::normalize_session_id;
///
/// assert_eq!(normalize_session_id("  @streamer "), Some("streamer".to_string()));
/// assert_eq!(normalize_session_id("@"), None);
/// ```
pub fn normalize_session_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let id = trimmed.strip_prefix('@').unwrap_or(trimmed).trim();
    (!id.is_empty()).then(|| id.to_string())
}

/// An operator command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Connect,
    Disconnect,
    AdjustHearts { side: Side, delta: i64 },
    ResetHearts { count: i64 },
    SetBattleMode { hearts: i64 },
    ResetBattle,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::AdjustHearts { .. } => "adjust_hearts",
            Self::ResetHearts { .. } => "reset_hearts",
            Self::SetBattleMode { .. } => "set_battle_mode",
            Self::ResetBattle => "reset_battle",
        }
    }
}

#[derive(Deserialize)]
struct AdjustHeartsPayload {
    side: Side,
    delta: i64,
}

#[derive(Deserialize)]
struct ResetHeartsPayload {
    #[serde(default = "default_reset_count")]
    count: i64,
}

fn default_reset_count() -> i64 {
    DEFAULT_HEARTS_PER_BATTLE as i64
}

#[derive(Deserialize)]
struct SetBattleModePayload {
    hearts: i64,
}

/// Raw message from a consumer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClientMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

impl ClientMessage {
    pub fn from_json(raw: &str) -> Result<Self, BattleError> {
        serde_json::from_str(raw).map_err(|e| BattleError::InvalidCommand(e.to_string()))
    }

    /// Session named in the payload, normalized.
    pub fn username(&self) -> Option<String> {
        self.payload
            .get("username")
            .and_then(Value::as_str)
            .and_then(normalize_session_id)
    }

    pub fn into_command(self) -> Result<Command, BattleError> {
        let payload = match self.payload {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };

        let command = match self.kind.as_str() {
            "connect" => Command::Connect,
            "disconnect" => Command::Disconnect,
            "reset_battle" => Command::ResetBattle,
            "adjust_hearts" => {
                let p: AdjustHeartsPayload = parse(&self.kind, payload)?;
                Command::AdjustHearts {
                    side: p.side,
                    delta: p.delta,
                }
            }
            "reset_hearts" => {
                let p: ResetHeartsPayload = parse(&self.kind, payload)?;
                Command::ResetHearts { count: p.count }
            }
            "set_battle_mode" => {
                let p: SetBattleModePayload = parse(&self.kind, payload)?;
                Command::SetBattleMode { hearts: p.hearts }
            }
            other => {
                return Err(BattleError::InvalidCommand(format!(
                    "unknown message type {:?}",
                    other
                )))
            }
        };
        Ok(command)
    }
}

fn parse<T: serde::de::DeserializeOwned>(kind: &str, payload: Value) -> Result<T, BattleError> {
    serde_json::from_value(payload).map_err(|e| BattleError::InvalidCommand(format!("{}: {}", kind, e)))
}

/// Message sent to a consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerMessage {
    BattleState(SessionState),
    Error { message: String },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl From<Result<SessionState, BattleError>> for ServerMessage {
    fn from(result: Result<SessionState, BattleError>) -> Self {
        match result {
            Ok(state) => Self::BattleState(state),
            Err(err) => Self::error(err.to_string()),
        }
    }
}

/// Listener forwarding every snapshot into a channel as a
/// [`ServerMessage::BattleState`]. Fails once the receiver is dropped.
pub fn channel_listener(tx: mpsc::UnboundedSender<ServerMessage>) -> Listener {
    listener(move |state| {
        tx.send(ServerMessage::BattleState(state.clone()))
            .map_err(|_| PublishError("receiver dropped".to_string()))
    })
}

impl BattleManager {
    /// Run an operator command and return the resulting state.
    ///
    /// Only `connect` can fail. Commands for unknown sessions change nothing
    /// and return the idle state.
    pub async fn execute(&self, session_id: &str, command: Command) -> Result<SessionState, BattleError> {
        tracing::debug!(session_id, command = command.name(), "executing command");
        match command {
            Command::Connect => return Ok(self.connect(session_id).await?.state().clone()),
            Command::Disconnect => self.disconnect(session_id),
            Command::AdjustHearts { side, delta } => {
                self.adjust_hearts(session_id, side, delta);
            }
            Command::ResetHearts { count } => {
                self.reset_hearts(session_id, count);
            }
            Command::SetBattleMode { hearts } => {
                self.set_battle_mode(session_id, hearts);
            }
            Command::ResetBattle => {
                self.reset_battle(session_id);
            }
        }
        Ok(self.state(session_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn command(raw: &str) -> Result<Command, BattleError> {
        ClientMessage::from_json(raw)?.into_command()
    }

    #[test]
    fn test_normalize_session_id() {
        assert_eq!(normalize_session_id("streamer"), Some("streamer".to_string()));
        assert_eq!(normalize_session_id(" @streamer"), Some("streamer".to_string()));
        assert_eq!(normalize_session_id("   "), None);
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(command(r#"{"type":"connect","payload":{"username":"x"}}"#).unwrap(), Command::Connect);
        assert_eq!(command(r#"{"type":"reset_battle"}"#).unwrap(), Command::ResetBattle);
        assert_eq!(
            command(r#"{"type":"adjust_hearts","payload":{"side":"b","delta":-2}}"#).unwrap(),
            Command::AdjustHearts {
                side: Side::B,
                delta: -2
            }
        );
        assert_eq!(
            command(r#"{"type":"set_battle_mode","payload":{"hearts":3}}"#).unwrap(),
            Command::SetBattleMode { hearts: 3 }
        );
    }

    #[test]
    fn test_reset_hearts_defaults_to_five() {
        assert_eq!(command(r#"{"type":"reset_hearts"}"#).unwrap(), Command::ResetHearts { count: 5 });
        assert_eq!(
            command(r#"{"type":"reset_hearts","payload":{"count":2}}"#).unwrap(),
            Command::ResetHearts { count: 2 }
        );
    }

    #[test]
    fn test_invalid_commands() {
        assert!(matches!(command("not json"), Err(BattleError::InvalidCommand(_))));
        assert!(matches!(command(r#"{"type":"explode"}"#), Err(BattleError::InvalidCommand(_))));
        assert!(matches!(
            command(r#"{"type":"adjust_hearts","payload":{"side":"c","delta":1}}"#),
            Err(BattleError::InvalidCommand(_))
        ));
        assert!(matches!(
            command(r#"{"type":"set_battle_mode","payload":{}}"#),
            Err(BattleError::InvalidCommand(_))
        ));
    }

    #[test]
    fn test_username_from_payload() {
        let msg = ClientMessage::from_json(r#"{"type":"connect","payload":{"username":"@host"}}"#).unwrap();
        assert_eq!(msg.username(), Some("host".to_string()));

        let msg = ClientMessage::from_json(r#"{"type":"disconnect"}"#).unwrap();
        assert_eq!(msg.username(), None);
    }

    #[test]
    fn test_server_message_shape() {
        let msg = ServerMessage::BattleState(SessionState::idle("host"));
        assert_eq!(
            msg.to_json(),
            json!({
                "type": "battle_state",
                "payload": {
                    "connected": false,
                    "battleActive": false,
                    "participantA": null,
                    "participantB": null,
                    "roundWinner": null,
                    "sessionId": "host"
                }
            })
        );

        assert_eq!(
            ServerMessage::error("boom").to_json(),
            json!({"type": "error", "payload": {"message": "boom"}})
        );
    }

    #[test]
    fn test_channel_listener() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let l = channel_listener(tx);
        l(&SessionState::idle("host")).unwrap();
        assert_eq!(rx.try_recv().unwrap(), ServerMessage::BattleState(SessionState::idle("host")));

        drop(rx);
        assert!(l(&SessionState::idle("host")).is_err());
    }
}
