//! Connection state machine for the single data-plane client.
//!
//! ```text
//!  Negotiating ──► Streaming ──► Closed
//!       │                          ▲
//!       └──────────────────────────┘
//! ```
//!
//! At most one live connection exists; a new incoming connection
//! supersedes the previous one, which transitions to `Closed` and is
//! discarded.

use crate::error::CastError;

/// Lifecycle of one data-plane connection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Waiting for the client's codec offer.
    #[default]
    Negotiating,

    /// Handshake done; frames are being forwarded.
    Streaming {
        /// Codec key negotiated for this connection.
        codec: String,
    },

    /// Disconnected or superseded. Terminal.
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Negotiating => write!(f, "Negotiating"),
            Self::Streaming { .. } => write!(f, "Streaming"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

impl ConnectionState {
    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming { .. })
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// The negotiated codec, once streaming.
    pub fn codec(&self) -> Option<&str> {
        match self {
            Self::Streaming { codec } => Some(codec),
            _ => None,
        }
    }

    /// Transition to `Streaming` after a successful handshake.
    ///
    /// Valid from: `Negotiating`.
    pub fn begin_streaming(&mut self, codec: String) -> Result<(), CastError> {
        match self {
            Self::Negotiating => {
                *self = Self::Streaming { codec };
                Ok(())
            }
            _ => Err(CastError::ProtocolViolation(
                "cannot start streaming: handshake not in progress",
            )),
        }
    }

    /// Transition to `Closed` from any state. Idempotent.
    pub fn close(&mut self) {
        *self = Self::Closed;
    }
}

// ── Tests ────────────────────────────────────────────────────────
