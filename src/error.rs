//! Error types.
//!
//! Every failure here is scoped to one session. Stale events are not errors;
//! see [`crate::engine::filter::Rejection`].

use thiserror::Error;

/// Failure reported by the live-event source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SourceError {
    pub message: String,
}

impl SourceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A listener could not take a state snapshot (closed socket, dropped channel).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("listener unavailable: {0}")]
pub struct PublishError(pub String);

#[derive(Debug, Error)]
pub enum BattleError {
    /// The live subscription could not be established.
    #[error("failed to connect session {session_id}: {source}")]
    Connection {
        session_id: String,
        #[source]
        source: SourceError,
    },

    /// An upstream payload had an unexpected shape.
    #[error("malformed {kind} event: {reason}")]
    MalformedEvent { kind: String, reason: String },

    /// A consumer message could not be understood.
    #[error("invalid command: {0}")]
    InvalidCommand(String),
}

impl BattleError {
    pub(crate) fn malformed(kind: &str, reason: impl Into<String>) -> Self {
        Self::MalformedEvent {
            kind: kind.to_string(),
            reason: reason.into(),
        }
    }
}
