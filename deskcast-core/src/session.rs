//! Capture-session lifecycle manager.
//!
//! Owns the portal session handle exclusively and guarantees that an
//! opened session is always closed again, even when a later step of
//! the open sequence fails.
//!
//! ```text
//!  Closed ──open()──► Open ──close()──► Closed
//! ```

use std::sync::Arc;

use tracing::{info, warn};

use crate::engine::CapturePortal;
use crate::error::CastError;

/// Lifecycle state of the capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Closed,
    Open,
}

/// Manages the external capture session.
pub struct SessionManager {
    portal: Arc<dyn CapturePortal>,
    state: SessionState,
    handle: Option<String>,
    source_id: Option<u32>,
}

impl SessionManager {
    pub fn new(portal: Arc<dyn CapturePortal>) -> Self {
        Self {
            portal,
            state: SessionState::Closed,
            handle: None,
            source_id: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    /// The source id the pipeline binds to.
    ///
    /// Only valid while the session is open; querying it on a closed
    /// session is a caller bug and is reported as an error.
    pub fn source_id(&self) -> Result<u32, CastError> {
        self.source_id.ok_or(CastError::SessionClosed)
    }

    /// Open a capture session: create, select sources, start.
    ///
    /// If any step fails, whatever was created so far is closed
    /// best-effort before the error surfaces — no partially-open
    /// session is ever left behind.
    pub async fn open(&mut self) -> Result<(), CastError> {
        if self.is_open() {
            return Err(CastError::ProtocolViolation("session already open"));
        }

        let handle = self.portal.create_session().await?;

        if let Err(e) = self.portal.select_sources(&handle).await {
            self.abandon(&handle).await;
            return Err(e);
        }

        let source_id = match self.portal.start_session(&handle).await {
            Ok(id) => id,
            Err(e) => {
                self.abandon(&handle).await;
                return Err(e);
            }
        };

        info!(source_id, "capture session open");
        self.handle = Some(handle);
        self.source_id = Some(source_id);
        self.state = SessionState::Open;
        Ok(())
    }

    /// Close the session. Idempotent: closing a closed session is a
    /// no-op, never an error; a portal failure on close is logged and
    /// the manager still ends up `Closed`.
    pub async fn close(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        if let Err(e) = self.portal.close_session(&handle).await {
            warn!("portal close failed: {e}");
        } else {
            info!("capture session closed");
        }
        self.source_id = None;
        self.state = SessionState::Closed;
    }

    async fn abandon(&self, handle: &str) {
        if let Err(e) = self.portal.close_session(handle).await {
            warn!("best-effort close of partial session failed: {e}");
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Which step of the open sequence should fail.
    #[derive(Clone, Copy, PartialEq)]
    enum FailAt {
        Nothing,
        Create,
        Select,
        Start,
    }

    struct FakePortal {
        fail_at: FailAt,
        close_calls: Mutex<Vec<String>>,
    }

    impl FakePortal {
        fn new(fail_at: FailAt) -> Arc<Self> {
            Arc::new(Self {
                fail_at,
                close_calls: Mutex::new(Vec::new()),
            })
        }

        fn closed(&self) -> Vec<String> {
            self.close_calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CapturePortal for FakePortal {
        async fn create_session(&self) -> Result<String, CastError> {
            if self.fail_at == FailAt::Create {
                return Err(CastError::Session {
                    step: "CreateSession",
                    reason: "response code 2".into(),
                });
            }
            Ok("sess-1".into())
        }

        async fn select_sources(&self, _session: &str) -> Result<(), CastError> {
            if self.fail_at == FailAt::Select {
                return Err(CastError::Session {
                    step: "SelectSources",
                    reason: "cancelled by user".into(),
                });
            }
            Ok(())
        }

        async fn start_session(&self, _session: &str) -> Result<u32, CastError> {
            if self.fail_at == FailAt::Start {
                return Err(CastError::Session {
                    step: "Start",
                    reason: "no streams in response".into(),
                });
            }
            Ok(42)
        }

        async fn close_session(&self, session: &str) -> Result<(), CastError> {
            self.close_calls.lock().unwrap().push(session.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn open_exposes_source_id() {
        let portal = FakePortal::new(FailAt::Nothing);
        let mut mgr = SessionManager::new(portal.clone());

        mgr.open().await.unwrap();
        assert!(mgr.is_open());
        assert_eq!(mgr.source_id().unwrap(), 42);

        mgr.close().await;
        assert_eq!(mgr.state(), SessionState::Closed);
        assert_eq!(portal.closed(), vec!["sess-1"]);
    }

    #[tokio::test]
    async fn source_id_on_closed_session_is_an_error() {
        let portal = FakePortal::new(FailAt::Nothing);
        let mgr = SessionManager::new(portal);
        assert!(matches!(mgr.source_id(), Err(CastError::SessionClosed)));
    }

    #[tokio::test]
    async fn select_failure_closes_partial_session() {
        let portal = FakePortal::new(FailAt::Select);
        let mut mgr = SessionManager::new(portal.clone());

        let err = mgr.open().await.unwrap_err();
        assert!(matches!(err, CastError::Session { step: "SelectSources", .. }));
        assert_eq!(mgr.state(), SessionState::Closed);
        assert_eq!(portal.closed(), vec!["sess-1"]);
    }

    #[tokio::test]
    async fn start_failure_closes_partial_session() {
        let portal = FakePortal::new(FailAt::Start);
        let mut mgr = SessionManager::new(portal.clone());

        assert!(mgr.open().await.is_err());
        assert_eq!(portal.closed(), vec!["sess-1"]);
        assert!(matches!(mgr.source_id(), Err(CastError::SessionClosed)));
    }

    #[tokio::test]
    async fn create_failure_leaves_nothing_to_close() {
        let portal = FakePortal::new(FailAt::Create);
        let mut mgr = SessionManager::new(portal.clone());

        assert!(mgr.open().await.is_err());
        assert!(portal.closed().is_empty());
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let portal = FakePortal::new(FailAt::Nothing);
        let mut mgr = SessionManager::new(portal.clone());

        mgr.open().await.unwrap();
        mgr.close().await;
        mgr.close().await;
        assert_eq!(mgr.state(), SessionState::Closed);
        assert_eq!(portal.closed().len(), 1);
    }

    #[tokio::test]
    async fn double_open_rejected() {
        let portal = FakePortal::new(FailAt::Nothing);
        let mut mgr = SessionManager::new(portal);

        mgr.open().await.unwrap();
        assert!(matches!(
            mgr.open().await,
            Err(CastError::ProtocolViolation(_))
        ));
    }
}
