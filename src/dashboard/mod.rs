//! Dashboard Module
//!
//! Provides an HTTP API for monitoring LaunchGate and submitting proposals.
//! Only compiled when the `dashboard` feature is enabled.

mod api;
mod types;

pub use api::create_router;
pub use types::*;

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use crate::engine::DeploymentEngine;

/// Serve the API until the shutdown flag flips
pub async fn serve(
    engine: Arc<DeploymentEngine>,
    bind: &str,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind dashboard on {}", bind))?;
    info!(bind = %bind, "🖥️ Dashboard listening");

    axum::serve(listener, create_router(engine))
        .with_graceful_shutdown(async move {
            while shutdown.changed().await.is_ok() {
                if *shutdown.borrow() {
                    break;
                }
            }
        })
        .await
        .context("Dashboard server failed")?;
    Ok(())
}
