//! Reverse tunnel to a USB-attached Android device via adb.
//!
//! `adb reverse` makes both local listeners reachable from the device
//! at `127.0.0.1:<port>`, then an intent launches the viewer page in
//! the device browser. The forwards are mandatory (the device cannot
//! reach us without them); the launch is best-effort.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{info, warn};

use deskcast_core::engine::Tunnel;
use deskcast_core::error::CastError;

/// [`Tunnel`] implemented with the adb command-line tool.
pub struct AdbReverse {
    adb: String,
    launch_viewer: bool,
}

impl AdbReverse {
    pub fn new(adb: impl Into<String>, launch_viewer: bool) -> Self {
        Self {
            adb: adb.into(),
            launch_viewer,
        }
    }

    async fn run(&self, args: &[String]) -> Result<(), CastError> {
        let output = Command::new(&self.adb)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| CastError::TunnelSetup(format!("failed to run {}: {e}", self.adb)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CastError::TunnelSetup(format!(
                "{} {} failed: {}",
                self.adb,
                args.join(" "),
                stderr.trim(),
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Tunnel for AdbReverse {
    async fn setup(&self, http_port: u16, data_port: u16) -> Result<(), CastError> {
        for port in [http_port, data_port] {
            let spec = format!("tcp:{port}");
            self.run(&["reverse".into(), spec.clone(), spec]).await?;
        }
        info!(http_port, data_port, "adb reverse forwards established");

        if self.launch_viewer {
            // Best-effort: the user can always open the page by hand.
            let url = format!("http://127.0.0.1:{http_port}");
            let launch = [
                "shell".into(),
                "am".into(),
                "start".into(),
                "-a".into(),
                "android.intent.action.VIEW".into(),
                "-d".into(),
                url,
            ];
            if let Err(e) = self.run(&launch).await {
                warn!("viewer launch failed: {e}");
            }
        }
        Ok(())
    }
}

/// No-op tunnel for clients that reach the server over the network
/// directly.
pub struct NoTunnel;

#[async_trait]
impl Tunnel for NoTunnel {
    async fn setup(&self, _http_port: u16, _data_port: u16) -> Result<(), CastError> {
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
