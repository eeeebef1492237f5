//! LaunchGate daemon
//!
//! Runs the admission gate and the position tracker until Ctrl-C.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use launchgate::config::AppConfig;
use launchgate::engine::{Collaborators, DeploymentEngine};
use launchgate::execution::UnconfiguredVenue;
use launchgate::paper_trading::{PaperConfig, PaperVenue};
use launchgate::persistence::CsvDeploymentStore;
use launchgate::summary::SummaryStore;

fn init_logging(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,launchgate=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[cfg(feature = "dashboard")]
fn spawn_dashboard(config: &AppConfig, engine: &Arc<DeploymentEngine>) -> Option<JoinHandle<()>> {
    if !config.dashboard.enabled {
        return None;
    }
    let engine = engine.clone();
    let bind = config.dashboard.bind.clone();
    let shutdown = engine.subscribe_shutdown();
    Some(tokio::spawn(async move {
        if let Err(e) = launchgate::dashboard::serve(engine, &bind, shutdown).await {
            error!(error = %e, "Dashboard stopped");
        }
    }))
}

#[cfg(not(feature = "dashboard"))]
fn spawn_dashboard(config: &AppConfig, _engine: &Arc<DeploymentEngine>) -> Option<JoinHandle<()>> {
    if config.dashboard.enabled {
        warn!("Dashboard requested but the `dashboard` feature is not compiled in");
    }
    None
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_logging(config.bot.json_logs);

    info!("🚀 LaunchGate starting");
    info!(config = %config.digest(), "Configuration loaded");

    let data_dir = config.data_dir();
    let store = Arc::new(CsvDeploymentStore::open(&data_dir).context("Failed to open deployment store")?);
    let summary = Arc::new(
        SummaryStore::open(&data_dir, config.summary_config()).context("Failed to open summary store")?,
    );

    let mut paper_venue = None;
    let (collaborators, capability_error) = if config.bot.paper {
        let venue = Arc::new(
            PaperVenue::new(PaperConfig {
                initial_balance: config.paper.initial_balance,
                fee_bps: config.paper.fee_bps,
                volatility: config.paper.volatility,
            })
            .with_state_file(data_dir.join("paper_state.json")),
        );
        if let Err(e) = venue.load_state() {
            warn!(error = %e, "Failed to load paper state, starting fresh");
        }
        info!(balance = venue.balance(), "📝 Paper mode");
        paper_venue = Some(venue.clone());
        (
            Collaborators {
                store: store.clone(),
                executor: venue.clone(),
                wallet: venue.clone(),
                market: venue,
            },
            None,
        )
    } else {
        let reason = config
            .capability_error()
            .unwrap_or_else(|| "live venue not available in this build".to_string());
        error!(reason = %reason, "Live deployment disabled; proposals will be rejected");
        let venue = Arc::new(UnconfiguredVenue::new(reason.clone()));
        (
            Collaborators {
                store: store.clone(),
                executor: venue.clone(),
                wallet: venue.clone(),
                market: venue,
            },
            Some(reason),
        )
    };

    let engine = Arc::new(DeploymentEngine::new(
        config.gate_config(),
        config.tracker_config(),
        collaborators,
        summary,
        capability_error,
    ));
    engine.warm_up().await.context("Failed to warm up admission gate")?;

    let tracker = engine.spawn_tracker();

    let dashboard = spawn_dashboard(&config, &engine);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    engine.shutdown();

    if let Err(e) = tracker.await {
        error!(error = %e, "Tracker task panicked");
    }
    if let Some(handle) = dashboard {
        let _ = handle.await;
    }

    let pending = engine.pending_reconciliation().await;
    if !pending.is_empty() {
        error!(
            reconcile = true,
            count = pending.len(),
            "Exiting with unpersisted records; reconcile from executor history"
        );
    }
    if let Some(venue) = paper_venue {
        venue.save_state()?;
    }

    info!("👋 LaunchGate stopped");
    Ok(())
}
