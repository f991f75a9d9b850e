//! Encoder engine backed by GStreamer helper processes.
//!
//! Two helpers, both configurable:
//!
//! - the probe (`gst-inspect-1.0 --exists <plugin>` by default), run
//!   once per registry entry at startup;
//! - the pipeline runner, which instantiates a pipeline description
//!   and writes every appsink sample to stdout as
//!
//! ```text
//! pts:     u64 (8, big-endian, capture-clock units)
//! length:  u32 (4, big-endian)
//! payload: [u8; length]
//! ```
//!
//! A reader task turns that stream into [`Frame`]s and offers each to
//! the [`SampleSink`]. The handoff snapshots the payload, so the
//! helper's stdout buffer is never shared across the boundary.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use deskcast_core::engine::{EncoderEngine, PipelineHandle};
use deskcast_core::error::CastError;
use deskcast_core::frame::{Frame, SampleSink};

/// Upper bound on a single encoded sample. Anything larger means the
/// helper's output is out of sync.
const MAX_SAMPLE_SIZE: u32 = 32 * 1024 * 1024;

/// [`EncoderEngine`] that probes and runs pipelines via subprocesses.
pub struct GstEngine {
    probe_argv: Vec<String>,
    launch_argv: Vec<String>,
}

impl GstEngine {
    pub fn new(probe_argv: Vec<String>, launch_argv: Vec<String>) -> Self {
        Self {
            probe_argv,
            launch_argv,
        }
    }
}

#[async_trait]
impl EncoderEngine for GstEngine {
    /// Startup-time probe; runs the probe command synchronously.
    fn has_plugin(&self, plugin: &str) -> bool {
        let Some((program, args)) = self.probe_argv.split_first() else {
            return false;
        };
        match std::process::Command::new(program)
            .args(args)
            .arg(plugin)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
        {
            Ok(status) => status.success(),
            Err(e) => {
                warn!("encoder probe failed to run: {e}");
                false
            }
        }
    }

    async fn build(
        &self,
        description: &str,
        sink: SampleSink,
    ) -> Result<Box<dyn PipelineHandle>, CastError> {
        let element = encoder_element(description);
        let (program, args) = self.launch_argv.split_first().ok_or_else(|| {
            CastError::PipelineBuild {
                codec: element.clone(),
                reason: "empty pipeline runner command".into(),
            }
        })?;

        let mut child = Command::new(program)
            .args(args)
            .arg(description)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CastError::PipelineBuild {
                codec: element.clone(),
                reason: format!("failed to spawn {program}: {e}"),
            })?;

        let stdout = child.stdout.take().ok_or_else(|| CastError::PipelineBuild {
            codec: element.clone(),
            reason: "pipeline runner has no stdout".into(),
        })?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "gst", "{line}");
                }
            });
        }

        info!(encoder = %element, "pipeline process started");
        let reader = tokio::spawn(read_samples(stdout, sink));
        Ok(Box::new(GstPipelineHandle {
            child: Some(child),
            reader: Some(reader),
        }))
    }
}

/// Handle to a running pipeline process.
pub struct GstPipelineHandle {
    child: Option<Child>,
    reader: Option<JoinHandle<()>>,
}

#[async_trait]
impl PipelineHandle for GstPipelineHandle {
    async fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
        // Killing the child ends its stdout; the reader exits on EOF.
        if let Some(reader) = self.reader.take() {
            let _ = reader.await;
        }
    }
}

/// Decode framed samples from the helper's stdout until EOF or a
/// framing error, offering each to the sink.
async fn read_samples(stdout: tokio::process::ChildStdout, sink: SampleSink) {
    let mut reader = BufReader::new(stdout);
    let mut header = [0u8; Frame::TIMESTAMP_SIZE + 4];
    loop {
        if let Err(e) = reader.read_exact(&mut header).await {
            if e.kind() != std::io::ErrorKind::UnexpectedEof {
                warn!("sample stream read error: {e}");
            }
            break;
        }
        let pts = u64::from_be_bytes(header[..8].try_into().unwrap());
        let len = u32::from_be_bytes(header[8..].try_into().unwrap());
        if len > MAX_SAMPLE_SIZE {
            warn!(len, "sample exceeds size limit; stream out of sync");
            break;
        }

        let mut payload = vec![0u8; len as usize];
        if let Err(e) = reader.read_exact(&mut payload).await {
            warn!("sample stream truncated: {e}");
            break;
        }
        sink.offer(Frame::new(pts, payload));
    }
    debug!("sample stream ended");
}

/// The encoder element name, for error messages: the element right
/// after `videoconvert`, falling back to the first element.
fn encoder_element(description: &str) -> String {
    let segments = description.split('!').map(str::trim);
    let first = segments.clone().next().unwrap_or_default();
    segments
        .skip_while(|seg| !seg.starts_with("videoconvert"))
        .nth(1)
        .or(Some(first))
        .and_then(|seg| seg.split_whitespace().next())
        .unwrap_or("pipeline")
        .to_string()
}

// ── Tests ────────────────────────────────────────────────────────
