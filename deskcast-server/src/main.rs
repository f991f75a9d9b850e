//! deskcast server — entry point.
//!
//! ```text
//! deskcast-server                  Start mirroring (Ctrl-C stops)
//! deskcast-server --config <path>  Load a custom config TOML
//! deskcast-server --codec <key>    Force a codec, skip negotiation
//! deskcast-server --no-tunnel      Skip the adb reverse tunnel
//! deskcast-server --gen-config     Write default config to stdout
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use deskcast_core::registry::CodecRegistry;
use deskcast_core::supervisor::Supervisor;

use deskcast_server::assets::EmbeddedAssets;
use deskcast_server::config::CastConfig;
use deskcast_server::gst::GstEngine;
use deskcast_server::portal::CommandPortal;
use deskcast_server::tunnel::{AdbReverse, NoTunnel};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "deskcast-server", about = "Mirror the desktop to a thin client")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "deskcast.toml")]
    config: PathBuf,

    /// Force this codec for every stream, skipping negotiation.
    #[arg(long)]
    codec: Option<String>,

    /// Do not set up the adb reverse tunnel.
    #[arg(long)]
    no_tunnel: bool,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&CastConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    // Load config.
    let config = CastConfig::load(&cli.config);

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("deskcast-server v{}", env!("CARGO_PKG_VERSION"));
    info!("viewer page port: {}", config.network.http_port);
    info!("data port: {}", config.network.data_port);

    // Codec table: builtin plus operator entries, then the startup
    // probe against the installed encoders. No encoder at all is
    // fatal — there is nothing to stream with.
    let registry = Arc::new(
        CodecRegistry::builtin()
            .extend(config.codec_descriptors(), config.codecs.preference.clone())?,
    );
    let engine = GstEngine::new(
        config.helpers.gst_probe.clone(),
        config.helpers.gst_launch.clone(),
    );
    let available = registry.probe_available(&engine)?;
    info!("available codecs: {}", available.preferred_order().join(", "));

    let portal = Arc::new(CommandPortal::new(config.helpers.portal.clone()));
    let tunnel: Arc<dyn deskcast_core::engine::Tunnel> =
        if cli.no_tunnel || !config.tunnel.adb {
            Arc::new(NoTunnel)
        } else {
            Arc::new(AdbReverse::new(
                config.tunnel.adb_path.clone(),
                config.tunnel.launch_viewer,
            ))
        };

    let mut supervisor = Supervisor::new(
        Arc::clone(&registry),
        available,
        portal,
        Arc::new(engine),
        tunnel,
        Arc::new(EmbeddedAssets),
        config.to_network(),
    );

    if let Some(codec) = cli.codec.as_deref().or(config.codecs.force.as_deref()) {
        supervisor.set_codec(codec)?;
        info!("codec forced to {codec}");
    }

    supervisor.start().await?;

    tokio::signal::ctrl_c().await.ok();
    info!("Ctrl-C received — shutting down");
    supervisor.stop().await;

    Ok(())
}
