//! Error taxonomy for the mirroring core.
//!
//! All fallible operations return `Result<T, CastError>`.
//! Per-frame send failures are the only class that is intentionally
//! swallowed (the relay drops the frame and moves on); everything else
//! propagates, and multi-step start sequences unwind the resources
//! they already acquired before surfacing the error.

use thiserror::Error;

/// The canonical error type for the mirroring core.
#[derive(Debug, Error)]
pub enum CastError {
    // ── Capture session ──────────────────────────────────────────
    /// A step of the capture-session open sequence failed
    /// (non-zero status, timeout, or a missing field in the reply).
    #[error("capture session '{step}' failed: {reason}")]
    Session {
        step: &'static str,
        reason: String,
    },

    /// `source_id()` was queried while no session is open.
    #[error("capture session is closed")]
    SessionClosed,

    // ── Codecs ───────────────────────────────────────────────────
    /// The startup probe found no installed encoder at all.
    #[error("no usable encoder found; install at least one encoder plugin")]
    NoCodecsAvailable,

    /// A codec key does not exist in the registry.
    #[error("unknown codec key: {0}")]
    UnknownCodec(String),

    // ── Pipeline ─────────────────────────────────────────────────
    /// The encoder engine failed to instantiate a pipeline.
    #[error("pipeline build failed for codec '{codec}': {reason}")]
    PipelineBuild { codec: String, reason: String },

    // ── Stream start ─────────────────────────────────────────────
    /// The reverse-tunnel / remote-launch step failed.
    #[error("tunnel setup failed: {0}")]
    TunnelSetup(String),

    /// A listen port is already bound, most likely by a previous
    /// instance that was not stopped.
    #[error("port {0} already in use; did you stop the previous stream?")]
    PortInUse(u16),

    // ── Relay ────────────────────────────────────────────────────
    /// A frame could not be delivered. Transient; never escalated.
    #[error("frame send failed: {0}")]
    Send(String),

    /// An operation was attempted in a state that forbids it.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    // ── Plumbing ─────────────────────────────────────────────────
    /// An internal channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    /// The I/O layer reported an error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A control-plane message could not be serialized.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for CastError {
    fn from(s: String) -> Self {
        CastError::Other(s)
    }
}

impl From<&str> for CastError {
    fn from(s: &str) -> Self {
        CastError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for CastError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        CastError::ChannelClosed
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for CastError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        CastError::ChannelClosed
    }
}

/// Map a bind error to [`CastError::PortInUse`] when the address is
/// taken, preserving the port for the operator-facing message.
pub fn bind_error(port: u16, err: std::io::Error) -> CastError {
    if err.kind() == std::io::ErrorKind::AddrInUse {
        CastError::PortInUse(port)
    } else {
        CastError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = CastError::Session {
            step: "SelectSources",
            reason: "response code 1".into(),
        };
        assert!(e.to_string().contains("SelectSources"));

        let e = CastError::PortInUse(8767);
        assert!(e.to_string().contains("8767"));

        let e = CastError::UnknownCodec("av1".into());
        assert!(e.to_string().contains("av1"));
    }

    #[test]
    fn from_string() {
        let e: CastError = "something broke".into();
        assert!(matches!(e, CastError::Other(_)));
    }

    #[test]
    fn bind_error_maps_addr_in_use() {
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "taken");
        assert!(matches!(bind_error(8000, io), CastError::PortInUse(8000)));

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        assert!(matches!(bind_error(8000, io), CastError::Io(_)));
    }
}
