//! Capture sessions through the portal helper process.
//!
//! The helper speaks the desktop's ScreenCast portal on our behalf
//! and exposes one subcommand per lifecycle step:
//!
//! ```text
//! <helper> create              → prints the session handle
//! <helper> select <handle>     → user picks the monitor to share
//! <helper> start  <handle>     → prints the PipeWire node id
//! <helper> close  <handle>
//! ```
//!
//! A non-zero exit, unusable output, or a timeout maps to
//! [`CastError::Session`] with the failing step named.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use deskcast_core::engine::CapturePortal;
use deskcast_core::error::CastError;

/// How long a single helper invocation may take. `select` includes a
/// user interaction (the source chooser dialog), so this is generous.
const STEP_TIMEOUT: Duration = Duration::from_secs(120);

/// [`CapturePortal`] backed by the portal helper process.
pub struct CommandPortal {
    argv: Vec<String>,
    step_timeout: Duration,
}

impl CommandPortal {
    /// `argv` is the helper command prefix; subcommand and handle are
    /// appended per call.
    pub fn new(argv: Vec<String>) -> Self {
        Self {
            argv,
            step_timeout: STEP_TIMEOUT,
        }
    }

    #[cfg(test)]
    fn with_timeout(argv: Vec<String>, step_timeout: Duration) -> Self {
        Self { argv, step_timeout }
    }

    /// Run one helper step and return its trimmed stdout.
    async fn invoke(&self, step: &'static str, extra: &[&str]) -> Result<String, CastError> {
        let (program, base) = self
            .argv
            .split_first()
            .ok_or(CastError::Session {
                step,
                reason: "empty portal helper command".into(),
            })?;

        let mut cmd = Command::new(program);
        cmd.args(base)
            .arg(step)
            .args(extra)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        debug!(step, "invoking portal helper");

        let output = timeout(self.step_timeout, cmd.output())
            .await
            .map_err(|_| CastError::Session {
                step,
                reason: format!("helper timed out after {:?}", self.step_timeout),
            })?
            .map_err(|e| CastError::Session {
                step,
                reason: format!("failed to run {program}: {e}"),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CastError::Session {
                step,
                reason: format!("helper exited with {}: {}", output.status, stderr.trim()),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl CapturePortal for CommandPortal {
    async fn create_session(&self) -> Result<String, CastError> {
        let handle = self.invoke("create", &[]).await?;
        if handle.is_empty() {
            return Err(CastError::Session {
                step: "create",
                reason: "helper printed no session handle".into(),
            });
        }
        Ok(handle)
    }

    async fn select_sources(&self, handle: &str) -> Result<(), CastError> {
        self.invoke("select", &[handle]).await.map(|_| ())
    }

    async fn start_session(&self, handle: &str) -> Result<u32, CastError> {
        let out = self.invoke("start", &[handle]).await?;
        out.parse().map_err(|_| CastError::Session {
            step: "start",
            reason: format!("helper printed {out:?} instead of a PipeWire node id"),
        })
    }

    async fn close_session(&self, handle: &str) -> Result<(), CastError> {
        self.invoke("close", &[handle]).await.map(|_| ())
    }
}

// ── Tests ────────────────────────────────────────────────────────
