//! # deskcast-core
//!
//! Core library for mirroring a desktop's screen to a single remote
//! thin client in near real time.
//!
//! This crate contains:
//! - **Registry**: codec descriptors, preference order, and the
//!   startup probe producing the immutable `AvailableCodecSet`
//! - **Session**: the capture-session lifecycle manager
//! - **Pipeline**: `PipelineBuilder` — one encoder pipeline at a time,
//!   teardown-then-build on every codec switch
//! - **Frame**: the data-plane wire format and the depth-one,
//!   latest-wins producer→consumer handoff slot
//! - **Relay**: the single-client WebSocket data plane with codec
//!   negotiation and best-effort frame forwarding
//! - **Supervisor**: start/stop orchestration across the pipeline,
//!   relay, and asset-server tasks
//! - **Engine**: trait seams for the external collaborators (capture
//!   portal, encoder engine, device tunnel, static assets)
//! - **Error**: `CastError` — typed, `thiserror`-based error hierarchy

pub mod engine;
pub mod error;
pub mod frame;
pub mod pipeline;
pub mod registry;
pub mod relay;
pub mod session;
pub mod supervisor;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use engine::{CapturePortal, EncoderEngine, PipelineHandle, StaticAssets, Tunnel};
pub use error::CastError;
pub use frame::{Frame, FrameSlot, SampleSink, frame_slot};
pub use pipeline::{PipelineBuilder, PipelineState};
pub use registry::{AvailableCodecSet, CodecDescriptor, CodecRegistry, DEFAULT_CODEC};
pub use relay::{ClientHello, ConnectionState, RebuildCommand, RelayServer, ServerMessage};
pub use session::{SessionManager, SessionState};
pub use supervisor::{NetworkConfig, Supervisor};
