//! Configuration for the deskcast server.

use std::net::IpAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};

use deskcast_core::registry::CodecDescriptor;
use deskcast_core::supervisor::NetworkConfig;

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CastConfig {
    /// Network settings.
    pub network: NetworkSection,
    /// Codec table overrides.
    pub codecs: CodecsSection,
    /// Device tunnel settings.
    pub tunnel: TunnelSection,
    /// Helper process command lines.
    pub helpers: HelpersSection,
    /// Logging settings.
    pub logging: LoggingSection,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSection {
    /// Address to bind both listeners to.
    pub bind: String,
    /// HTTP port serving the viewer page.
    pub http_port: u16,
    /// WebSocket port carrying negotiation and frames.
    pub data_port: u16,
}

/// Codec table overrides and the forced-codec override.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecsSection {
    /// Force this codec for every stream, skipping negotiation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub force: Option<String>,
    /// Replace the builtin preference order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preference: Option<Vec<String>>,
    /// Extra codec entries; an entry with a builtin key replaces it.
    pub entries: Vec<CodecEntry>,
}

/// One operator-supplied codec table entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodecEntry {
    pub key: String,
    /// Encoder fragment of the pipeline description.
    pub pipeline: String,
    /// Codec string sent to the client.
    pub wire_id: String,
}

/// Device tunnel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelSection {
    /// Reverse-forward both ports to a USB-attached device via adb.
    pub adb: bool,
    /// The adb executable.
    pub adb_path: String,
    /// Open the viewer page on the device after forwarding.
    pub launch_viewer: bool,
}

/// Helper process command lines. Each is a full argv prefix; the
/// server appends its own arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HelpersSection {
    /// Capture portal helper (`<cmd> create|select|start|close ...`).
    pub portal: Vec<String>,
    /// Encoder probe (`<cmd> <plugin>`, exit 0 when installed).
    pub gst_probe: Vec<String>,
    /// Pipeline runner (`<cmd> <description>`, framed samples on stdout).
    pub gst_launch: Vec<String>,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for CastConfig {
    fn default() -> Self {
        Self {
            network: NetworkSection::default(),
            codecs: CodecsSection::default(),
            tunnel: TunnelSection::default(),
            helpers: HelpersSection::default(),
            logging: LoggingSection::default(),
        }
    }
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            http_port: 8000,
            data_port: 8767,
        }
    }
}

impl Default for CodecsSection {
    fn default() -> Self {
        Self {
            force: None,
            preference: None,
            entries: Vec::new(),
        }
    }
}

impl Default for TunnelSection {
    fn default() -> Self {
        Self {
            adb: true,
            adb_path: "adb".into(),
            launch_viewer: true,
        }
    }
}

impl Default for HelpersSection {
    fn default() -> Self {
        Self {
            portal: vec!["deskcast-portal".into()],
            gst_probe: vec!["gst-inspect-1.0".into(), "--exists".into()],
            gst_launch: vec!["deskcast-gst-launch".into()],
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self { level: "info".into() }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl CastConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Network settings in the form the supervisor takes.
    pub fn to_network(&self) -> NetworkConfig {
        let bind: IpAddr = self.network.bind.parse().unwrap_or_else(|_| {
            tracing::warn!("invalid bind address {:?}; using 0.0.0.0", self.network.bind);
            NetworkConfig::default().bind
        });
        NetworkConfig {
            bind,
            http_port: self.network.http_port,
            data_port: self.network.data_port,
        }
    }

    /// Operator codec entries as registry descriptors.
    pub fn codec_descriptors(&self) -> Vec<CodecDescriptor> {
        self.codecs
            .entries
            .iter()
            .map(|e| CodecDescriptor::new(&e.key, &e.pipeline, &e.wire_id))
            .collect()
    }
}

// ── Tests ────────────────────────────────────────────────────────
