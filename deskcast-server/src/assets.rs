//! The embedded viewer page, served over HTTP.
//!
//! Everything under `static/` is compiled into the binary, so the
//! server ships as a single executable. The router falls back to
//! `index.html` for unknown paths.

use std::net::SocketAddr;

use async_trait::async_trait;
use axum::Router;
use axum_embed::{FallbackBehavior, ServeEmbed};
use rust_embed::RustEmbed;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use deskcast_core::engine::StaticAssets;
use deskcast_core::error::{CastError, bind_error};

#[derive(RustEmbed, Clone)]
#[folder = "static/"]
struct ViewerAssets;

/// [`StaticAssets`] serving the embedded viewer page with axum.
pub struct EmbeddedAssets;

#[async_trait]
impl StaticAssets for EmbeddedAssets {
    async fn start(
        &self,
        addr: SocketAddr,
        cancel: CancellationToken,
    ) -> Result<(), CastError> {
        let serve = ServeEmbed::<ViewerAssets>::with_parameters(
            Some("index.html".to_string()),
            FallbackBehavior::Ok,
            Some("index.html".to_string()),
        );
        let app = Router::new().fallback_service(serve);

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| bind_error(addr.port(), e))?;
        info!("viewer page on http://{addr}");

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(cancel.cancelled_owned())
                .await
            {
                error!("asset server error: {e}");
            }
        });
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
