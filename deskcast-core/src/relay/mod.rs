//! Frame relay: the data-plane WebSocket server, codec negotiation,
//! and the per-connection state machine.

pub mod connection;
pub mod negotiate;
pub mod server;

pub use connection::ConnectionState;
pub use negotiate::{ClientHello, ServerMessage};
pub use server::{RebuildCommand, RelayServer};
