//! Data-plane relay server.
//!
//! Accepts one WebSocket client at a time, runs codec negotiation,
//! then forwards encoded frames as binary messages. Delivery is
//! best-effort: a frame that cannot be sent is dropped, never queued.
//! A new incoming connection supersedes the current one
//! (last-connect-wins); a client disconnect resets negotiation but
//! leaves the pipeline running.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_tungstenite::WebSocketStream;
use async_tungstenite::tokio::{TokioAdapter, accept_async};
use async_tungstenite::tungstenite::Message;
use futures::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{CastError, bind_error};
use crate::frame::FrameSlot;
use crate::registry::{AvailableCodecSet, CodecRegistry};
use crate::relay::connection::ConnectionState;
use crate::relay::negotiate::{ServerMessage, choose, parse_offer};

type Ws = WebSocketStream<TokioAdapter<TcpStream>>;

// ── Rebuild channel ──────────────────────────────────────────────

/// Request from the relay to the pipeline scheduler to (re)build the
/// pipeline for a freshly negotiated codec.
pub struct RebuildCommand {
    pub codec: String,
    /// Answered once the build finished (or failed).
    pub done: oneshot::Sender<Result<(), CastError>>,
}

// ── RelayServer ──────────────────────────────────────────────────

/// What happened to the connection currently being driven.
enum Verdict {
    /// Client went away; wait for the next connection.
    Closed,
    /// A new client connected; the old one is discarded.
    Superseded {
        old: Ws,
        next: (TcpStream, SocketAddr),
    },
    /// The server is shutting down.
    Shutdown(Option<Ws>),
}

/// The data-plane server. Owns the listener, the frame consumer, and
/// the negotiation inputs; drives at most one connection at a time.
pub struct RelayServer {
    listener: TcpListener,
    registry: Arc<CodecRegistry>,
    available: AvailableCodecSet,
    forced: Option<String>,
    rebuild: mpsc::Sender<RebuildCommand>,
    frames: FrameSlot,
    cancel: CancellationToken,
}

impl RelayServer {
    /// Bind the data-plane listener, mapping an already-bound port to
    /// [`CastError::PortInUse`].
    pub async fn bind(addr: SocketAddr) -> Result<TcpListener, CastError> {
        TcpListener::bind(addr)
            .await
            .map_err(|e| bind_error(addr.port(), e))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn new(
        listener: TcpListener,
        registry: Arc<CodecRegistry>,
        available: AvailableCodecSet,
        forced: Option<String>,
        rebuild: mpsc::Sender<RebuildCommand>,
        frames: FrameSlot,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            listener,
            registry,
            available,
            forced,
            rebuild,
            frames,
            cancel,
        }
    }

    /// Serve connections until cancelled.
    pub async fn run(mut self) {
        if let Ok(addr) = self.listener.local_addr() {
            info!("data-plane relay listening on {addr}");
        }

        let mut pending: Option<(TcpStream, SocketAddr)> = None;
        loop {
            let (stream, peer) = match pending.take() {
                Some(pair) => pair,
                None => tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    accepted = self.listener.accept() => match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            warn!("accept error: {e}");
                            continue;
                        }
                    },
                },
            };

            let ws = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    warn!("websocket handshake failed with {peer}: {e}");
                    continue;
                }
            };
            info!("client connected from {peer}");

            match self.drive(ws).await {
                Verdict::Closed => {
                    info!("client {peer} disconnected");
                }
                Verdict::Superseded { old, next } => {
                    info!("client {peer} superseded by {}", next.1);
                    close_quietly(old).await;
                    pending = Some(next);
                }
                Verdict::Shutdown(ws) => {
                    if let Some(ws) = ws {
                        close_quietly(ws).await;
                    }
                    break;
                }
            }
        }
        info!("relay stopped");
    }

    /// Drive one connection from handshake to its end.
    async fn drive(&mut self, mut ws: Ws) -> Verdict {
        let mut state = ConnectionState::default();

        // Phase 1: the client's codec offer. With a forced codec the
        // message is still consumed, just never inspected.
        let offer_text = loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return Verdict::Shutdown(Some(ws)),
                accepted = self.listener.accept() => match accepted {
                    Ok(next) => {
                        state.close();
                        return Verdict::Superseded { old: ws, next };
                    }
                    Err(e) => {
                        warn!("accept error: {e}");
                        continue;
                    }
                },
                msg = ws.next() => match msg {
                    Some(Ok(Message::Text(text))) => break Some(text),
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(_))) | None => {
                        state.close();
                        return Verdict::Closed;
                    }
                    Some(Ok(_)) => break None,
                    Some(Err(e)) => {
                        debug!("read error during negotiation: {e}");
                        state.close();
                        return Verdict::Closed;
                    }
                },
            }
        };

        let offer = offer_text
            .as_deref()
            .map(parse_offer)
            .unwrap_or_default();
        let chosen = choose(
            &offer,
            &self.available,
            &self.registry,
            self.forced.as_deref(),
        );
        let wire = self
            .registry
            .wire_id(&chosen)
            .unwrap_or(chosen.as_str())
            .to_string();
        info!(codec = %chosen, wire = %wire, "negotiated");

        // Phase 2: announce the choice, rebuild, confirm. Every await
        // on the socket or the scheduler races cancellation so that a
        // stuck peer can never hold up shutdown.
        let config = ServerMessage::Config { codec: wire.clone() };
        match self.send_or_cancel(&mut ws, &config).await {
            SendOutcome::Sent => {}
            SendOutcome::Failed => {
                state.close();
                return Verdict::Closed;
            }
            SendOutcome::Cancelled => {
                state.close();
                return Verdict::Shutdown(Some(ws));
            }
        }

        let (done_tx, done_rx) = oneshot::channel();
        let command = RebuildCommand {
            codec: chosen.clone(),
            done: done_tx,
        };
        if self.rebuild.send(command).await.is_err() {
            // Scheduler is gone; the stream is stopping.
            state.close();
            return Verdict::Shutdown(Some(ws));
        }
        let done = tokio::select! {
            _ = self.cancel.cancelled() => {
                state.close();
                return Verdict::Shutdown(Some(ws));
            }
            done = done_rx => done,
        };
        match done {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("pipeline rebuild failed: {e}");
                state.close();
                close_quietly(ws).await;
                return Verdict::Closed;
            }
            Err(_) => {
                state.close();
                return Verdict::Shutdown(Some(ws));
            }
        }

        let info_msg = ServerMessage::CodecInfo { codec: wire };
        match self.send_or_cancel(&mut ws, &info_msg).await {
            SendOutcome::Sent => {}
            SendOutcome::Failed => {
                state.close();
                return Verdict::Closed;
            }
            SendOutcome::Cancelled => {
                state.close();
                return Verdict::Shutdown(Some(ws));
            }
        }

        if let Err(e) = state.begin_streaming(chosen) {
            error!("{e}");
            return Verdict::Closed;
        }

        // Phase 3: forward frames until the connection ends.
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    state.close();
                    return Verdict::Shutdown(Some(ws));
                }
                accepted = self.listener.accept() => match accepted {
                    Ok(next) => {
                        state.close();
                        return Verdict::Superseded { old: ws, next };
                    }
                    Err(e) => {
                        warn!("accept error: {e}");
                        continue;
                    }
                },
                frame = self.frames.recv() => match frame {
                    Some(frame) => {
                        // Best-effort: a failed send drops the frame; a
                        // dead socket ends the connection. A send parked
                        // on a non-reading peer is abandoned the moment
                        // shutdown is requested.
                        let sent = tokio::select! {
                            _ = self.cancel.cancelled() => {
                                state.close();
                                return Verdict::Shutdown(Some(ws));
                            }
                            sent = ws.send(Message::binary(frame.encode())) => sent,
                        };
                        if let Err(e) = sent {
                            debug!("frame dropped: {e}");
                            state.close();
                            return Verdict::Closed;
                        }
                    }
                    None => {
                        // Every producer is gone: the stream stopped.
                        state.close();
                        return Verdict::Shutdown(Some(ws));
                    }
                },
                msg = ws.next() => match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        state.close();
                        return Verdict::Closed;
                    }
                    Some(Ok(_)) => {} // client chatter is ignored while streaming
                    Some(Err(e)) => {
                        debug!("read error while streaming: {e}");
                        state.close();
                        return Verdict::Closed;
                    }
                },
            }
        }
    }
}

/// How long a closing handshake may take before the socket is simply
/// dropped. A peer that is not reading does not get to stall anyone.
const CLOSE_GRACE: Duration = Duration::from_millis(250);

/// Close the connection politely, but give up after [`CLOSE_GRACE`].
async fn close_quietly(mut ws: Ws) {
    let _ = tokio::time::timeout(CLOSE_GRACE, ws.close(None)).await;
}

/// How a cancellable control-plane send ended.
enum SendOutcome {
    Sent,
    Failed,
    Cancelled,
}

impl RelayServer {
    /// Send a control message, abandoning the attempt if the server is
    /// cancelled while the socket is not accepting writes.
    async fn send_or_cancel(&self, ws: &mut Ws, msg: &ServerMessage) -> SendOutcome {
        let text = match serde_json::to_string(msg) {
            Ok(text) => text,
            Err(e) => {
                error!("control message serialization failed: {e}");
                return SendOutcome::Failed;
            }
        };
        tokio::select! {
            _ = self.cancel.cancelled() => SendOutcome::Cancelled,
            sent = ws.send(Message::text(text)) => match sent {
                Ok(()) => SendOutcome::Sent,
                Err(e) => {
                    debug!("control send failed: {e}");
                    SendOutcome::Failed
                }
            },
        }
    }
}
