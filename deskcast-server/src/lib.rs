//! # deskcast-server — Screen Mirroring Server
//!
//! Background service that captures the desktop through the
//! ScreenCast portal, encodes it with a GStreamer pipeline, and
//! relays the encoded frames to a single thin client over WebSocket.
//!
//! Production implementations of the `deskcast-core` collaborator
//! traits live here:
//!
//! - [`portal::CommandPortal`] — capture sessions via the portal
//!   helper process
//! - [`gst::GstEngine`] — encoder probing and pipeline processes
//! - [`tunnel::AdbReverse`] — `adb reverse` port tunnel plus viewer
//!   launch on the device
//! - [`assets::EmbeddedAssets`] — the embedded viewer page over HTTP

pub mod assets;
pub mod config;
pub mod gst;
pub mod portal;
pub mod tunnel;
