//! Stream supervisor: wires the capture session, the pipeline
//! scheduler, the data-plane relay, and the asset server together and
//! owns their start/stop ordering.
//!
//! Start: open capture session → tunnel setup (abort, closing the
//! session, on failure) → bind and start the servers → start the
//! pipeline scheduler. Stop unwinds in the opposite order. The two
//! operations are serialized by `&mut self`: a single in-flight
//! lifecycle transition at a time.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::engine::{CapturePortal, EncoderEngine, StaticAssets, Tunnel};
use crate::error::CastError;
use crate::frame::frame_slot;
use crate::pipeline::PipelineBuilder;
use crate::registry::{AvailableCodecSet, CodecRegistry};
use crate::relay::server::{RebuildCommand, RelayServer};
use crate::session::SessionManager;

// ── NetworkConfig ────────────────────────────────────────────────

/// Bind address and the two listen ports.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub bind: IpAddr,
    /// Static asset / viewer page port.
    pub http_port: u16,
    /// Persistent data/control connection port.
    pub data_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            http_port: 8000,
            data_port: 8767,
        }
    }
}

// ── Supervisor ───────────────────────────────────────────────────

struct RunningStream {
    servers_cancel: CancellationToken,
    scheduler_cancel: CancellationToken,
    relay: JoinHandle<()>,
    scheduler: JoinHandle<()>,
    data_addr: SocketAddr,
}

/// Top-level lifecycle supervisor. The only control surface is
/// [`start`](Self::start), [`stop`](Self::stop), and
/// [`set_codec`](Self::set_codec).
pub struct Supervisor {
    registry: Arc<CodecRegistry>,
    available: AvailableCodecSet,
    portal: Arc<dyn CapturePortal>,
    engine: Arc<dyn EncoderEngine>,
    tunnel: Arc<dyn Tunnel>,
    assets: Arc<dyn StaticAssets>,
    network: NetworkConfig,
    forced_codec: Option<String>,
    running: Option<RunningStream>,
}

impl Supervisor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<CodecRegistry>,
        available: AvailableCodecSet,
        portal: Arc<dyn CapturePortal>,
        engine: Arc<dyn EncoderEngine>,
        tunnel: Arc<dyn Tunnel>,
        assets: Arc<dyn StaticAssets>,
        network: NetworkConfig,
    ) -> Self {
        Self {
            registry,
            available,
            portal,
            engine,
            tunnel,
            assets,
            network,
            forced_codec: None,
            running: None,
        }
    }

    /// Force a codec for subsequent streams, overriding client
    /// preference in negotiation.
    pub fn set_codec(&mut self, key: &str) -> Result<(), CastError> {
        if self.registry.get(key).is_none() {
            return Err(CastError::UnknownCodec(key.to_string()));
        }
        self.forced_codec = Some(key.to_string());
        Ok(())
    }

    /// Return to client-driven negotiation.
    pub fn clear_codec(&mut self) {
        self.forced_codec = None;
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Actual data-plane address while running (useful when the
    /// configured port is 0).
    pub fn data_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.data_addr)
    }

    /// Start streaming.
    ///
    /// Every failure after the capture session opened closes it again
    /// before surfacing — no leaked sessions, and no server is left
    /// listening after an aborted start.
    pub async fn start(&mut self) -> Result<(), CastError> {
        if self.running.is_some() {
            return Err(CastError::ProtocolViolation("stream already running"));
        }

        let mut session = SessionManager::new(Arc::clone(&self.portal));
        session.open().await?;
        let source_id = session.source_id()?;

        if let Err(e) = self
            .tunnel
            .setup(self.network.http_port, self.network.data_port)
            .await
        {
            session.close().await;
            return Err(e);
        }

        let data_addr = SocketAddr::new(self.network.bind, self.network.data_port);
        let listener = match RelayServer::bind(data_addr).await {
            Ok(listener) => listener,
            Err(e) => {
                session.close().await;
                return Err(e);
            }
        };
        let data_addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                session.close().await;
                return Err(e.into());
            }
        };

        let servers_cancel = CancellationToken::new();
        let scheduler_cancel = CancellationToken::new();

        let http_addr = SocketAddr::new(self.network.bind, self.network.http_port);
        if let Err(e) = self
            .assets
            .start(http_addr, servers_cancel.child_token())
            .await
        {
            session.close().await;
            return Err(e);
        }

        let (sink, frames) = frame_slot();
        let (rebuild_tx, rebuild_rx) = mpsc::channel(4);

        let builder = PipelineBuilder::new(
            Arc::clone(&self.engine),
            Arc::clone(&self.registry),
            sink,
        );
        let scheduler = tokio::spawn(pipeline_scheduler(
            builder,
            session,
            source_id,
            rebuild_rx,
            scheduler_cancel.clone(),
        ));

        let relay = RelayServer::new(
            listener,
            Arc::clone(&self.registry),
            self.available.clone(),
            self.forced_codec.clone(),
            rebuild_tx,
            frames,
            servers_cancel.child_token(),
        );
        let relay = tokio::spawn(relay.run());

        self.running = Some(RunningStream {
            servers_cancel,
            scheduler_cancel,
            relay,
            scheduler,
            data_addr,
        });
        info!(%data_addr, "stream started");
        Ok(())
    }

    /// Stop streaming: servers first (no frame in flight afterwards),
    /// then pipeline teardown and session close inside the scheduler.
    /// A no-op when not running.
    pub async fn stop(&mut self) {
        let Some(run) = self.running.take() else {
            return;
        };

        run.servers_cancel.cancel();
        let _ = run.relay.await;

        run.scheduler_cancel.cancel();
        let _ = run.scheduler.await;
        info!("stream stopped");
    }
}

// ── Pipeline scheduler ───────────────────────────────────────────

/// Task driving the capture/pipeline subsystem. Serves rebuild
/// requests from the relay until cancelled, then tears down the
/// pipeline and closes the capture session.
async fn pipeline_scheduler(
    mut builder: PipelineBuilder,
    mut session: SessionManager,
    source_id: u32,
    mut commands: mpsc::Receiver<RebuildCommand>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            cmd = commands.recv() => match cmd {
                Some(RebuildCommand { codec, done }) => {
                    let result = builder.build(&codec, source_id).await;
                    if let Err(e) = &result {
                        error!("pipeline build failed: {e}");
                    }
                    let _ = done.send(result);
                }
                None => break,
            },
        }
    }

    builder.teardown().await;
    session.close().await;
}

// ── Tests ────────────────────────────────────────────────────────
