//! Rebuild the rolling summary from the deployment log
//!
//! Usage: cargo run --bin rebuild_summary
//!
//! Replays every deployment record and overwrites `summary.json`.

use launchgate::config::AppConfig;
use launchgate::persistence::{CsvDeploymentStore, DeploymentStore};
use launchgate::summary::SummaryStore;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = AppConfig::load()?;
    let data_dir = config.data_dir();
    info!(data_dir = %data_dir.display(), "🔄 Rebuilding rolling summary...");

    let store = CsvDeploymentStore::open(&data_dir)?;
    let records = store.list_all().await?;
    info!("✅ Loaded {} deployment records", records.len());

    let summary = SummaryStore::open(&data_dir, config.summary_config())?;
    let rebuilt = summary.rebuild(&records).await;

    info!("");
    info!("🎉 SUMMARY REBUILT");
    info!("============================");
    info!("Deployed: {}", rebuilt.total_deployed);
    info!("Closed: {}", rebuilt.total_closed);
    info!("Realized profit: {:+.4} SOL", rebuilt.realized_profit);
    for learning in &rebuilt.key_learnings {
        info!("  - {}", learning);
    }

    Ok(())
}
