//! Trait seams for the external collaborators.
//!
//! The core never talks to the desktop portal, the media engine, or
//! the device tunnel directly; it drives them through these narrow
//! contracts. Production implementations live in the server binary,
//! test doubles live next to the tests.

use async_trait::async_trait;

use crate::error::CastError;
use crate::frame::SampleSink;

// ── Capture portal ───────────────────────────────────────────────

/// The desktop's screen-sharing subsystem.
///
/// Mirrors the xdg-desktop-portal ScreenCast flow: a session is
/// created, sources are selected (possibly interactively), and
/// starting the session yields the numeric id of the capturable
/// source. Each step is fallible; `close_session` must be safe to
/// call on a session in any state.
#[async_trait]
pub trait CapturePortal: Send + Sync {
    /// Create a capture session; returns the opaque session handle.
    async fn create_session(&self) -> Result<String, CastError>;

    /// Select which sources the session will expose.
    async fn select_sources(&self, session: &str) -> Result<(), CastError>;

    /// Start the session; returns the source id the pipeline binds to.
    async fn start_session(&self, session: &str) -> Result<u32, CastError>;

    /// Close the session. Best-effort; called during error unwinding.
    async fn close_session(&self, session: &str) -> Result<(), CastError>;
}

// ── Encoder engine ───────────────────────────────────────────────

/// A live, playing encoding pipeline.
///
/// Dropping a handle without calling [`stop`](PipelineHandle::stop)
/// must still release the underlying resources eventually, but `stop`
/// is the deterministic path and must be idempotent.
#[async_trait]
pub trait PipelineHandle: Send {
    /// Stop the pipeline and release its resources.
    async fn stop(&mut self);
}

/// The media-processing engine that turns a capture source into a
/// stream of encoded samples.
#[async_trait]
pub trait EncoderEngine: Send + Sync {
    /// Whether the named encoder element is installed.
    fn has_plugin(&self, plugin: &str) -> bool;

    /// Instantiate the pipeline `description` and start it playing.
    ///
    /// Encoded samples are delivered through `sink` as owned
    /// snapshots; the engine must never hand out a buffer it will
    /// mutate afterwards. The engine-side buffering must keep at most
    /// one sample in flight per stage, dropping excess production.
    async fn build(
        &self,
        description: &str,
        sink: SampleSink,
    ) -> Result<Box<dyn PipelineHandle>, CastError>;
}

// ── Tunnel ───────────────────────────────────────────────────────

/// The side-channel step that exposes the local ports on the remote
/// device and launches its viewer. A single fallible action with no
/// state of its own; failure aborts the whole start sequence.
#[async_trait]
pub trait Tunnel: Send + Sync {
    async fn setup(&self, http_port: u16, data_port: u16) -> Result<(), CastError>;
}

// ── Static assets ────────────────────────────────────────────────

/// The static-asset HTTP surface serving the viewer page.
///
/// Stateless per request; the supervisor only needs to start it after
/// the tunnel step and tear it down on stop.
#[async_trait]
pub trait StaticAssets: Send + Sync {
    /// Bind `addr` and serve until `cancel` fires.
    ///
    /// Returns once the listener is bound; serving continues in a
    /// background task owned by the implementation.
    async fn start(
        &self,
        addr: std::net::SocketAddr,
        cancel: tokio_util::sync::CancellationToken,
    ) -> Result<(), CastError>;
}
