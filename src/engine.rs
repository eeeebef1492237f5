//! Deployment engine
//!
//! Wires the admission gate, position tracker and rolling summary around a
//! shared deployment store and exposes the proposal and query interface.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::execution::Executor;
use crate::gate::{AdmissionGate, GateConfig, WalletBalance};
use crate::market::MarketDataProvider;
use crate::persistence::{DeploymentStore, ReconcileQueue};
use crate::summary::{RollingSummary, SummaryStore};
use crate::tracker::{CycleReport, PositionTracker, TrackerConfig};
use crate::types::{AdmissionResult, DeploySpec, DeploymentRecord, Position};

/// External collaborators the engine drives
pub struct Collaborators {
    pub store: Arc<dyn DeploymentStore>,
    pub executor: Arc<dyn Executor>,
    pub wallet: Arc<dyn WalletBalance>,
    pub market: Arc<dyn MarketDataProvider>,
}

pub struct DeploymentEngine {
    gate: AdmissionGate,
    tracker: Arc<PositionTracker>,
    summary: Arc<SummaryStore>,
    store: Arc<dyn DeploymentStore>,
    reconcile: Arc<ReconcileQueue>,
    shutdown_tx: watch::Sender<bool>,
}

impl DeploymentEngine {
    pub fn new(
        gate_config: GateConfig,
        tracker_config: TrackerConfig,
        collaborators: Collaborators,
        summary: Arc<SummaryStore>,
        capability_error: Option<String>,
    ) -> Self {
        let reconcile = Arc::new(ReconcileQueue::new());
        let gate = AdmissionGate::new(
            gate_config,
            collaborators.store.clone(),
            collaborators.executor.clone(),
            collaborators.wallet,
            summary.clone(),
            reconcile.clone(),
        )
        .with_capability_error(capability_error);
        let tracker = Arc::new(PositionTracker::new(
            tracker_config,
            collaborators.store.clone(),
            collaborators.market,
            collaborators.executor,
            summary.clone(),
            reconcile.clone(),
        ));
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            gate,
            tracker,
            summary,
            store: collaborators.store,
            reconcile,
            shutdown_tx,
        }
    }

    /// Restore gate state from the store
    pub async fn warm_up(&self) -> Result<()> {
        self.gate.warm_up().await
    }

    pub async fn propose_action(&self, spec: DeploySpec) -> AdmissionResult {
        self.gate.propose(spec).await
    }

    pub async fn list_positions(&self) -> Vec<Position> {
        self.tracker.list_positions().await
    }

    pub async fn get_summary(&self) -> RollingSummary {
        self.summary.snapshot().await
    }

    pub async fn decision_context(&self) -> String {
        self.summary.decision_context().await
    }

    /// Records waiting for a successful write-back
    pub async fn pending_reconciliation(&self) -> Vec<DeploymentRecord> {
        self.reconcile.pending().await
    }

    pub async fn run_tracker_cycle(&self) -> Result<CycleReport> {
        self.tracker.run_cycle().await
    }

    /// Start the tracker loop on the runtime
    pub fn spawn_tracker(&self) -> JoinHandle<()> {
        tokio::spawn(self.tracker.clone().run(self.subscribe_shutdown()))
    }

    /// Recompute the rolling summary from the store
    pub async fn rebuild_summary(&self) -> Result<RollingSummary> {
        let records = self.store.list_all().await?;
        Ok(self.summary.rebuild(&records).await)
    }

    /// Stop admitting proposals and signal the tracker. In-flight executor
    /// calls and the running cycle are left to complete.
    pub fn shutdown(&self) {
        info!("🛑 Shutdown requested");
        self.gate.begin_shutdown();
        self.shutdown_tx.send_replace(true);
    }

    /// Receiver that flips to `true` once shutdown begins
    pub fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.gate.is_shutting_down()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paper_trading::{PaperConfig, PaperVenue};
    use crate::persistence::CsvDeploymentStore;
    use crate::summary::SummaryConfig;
    use crate::types::{RejectReason, Strategy};
    use std::time::Duration;

    fn engine() -> DeploymentEngine {
        let venue = Arc::new(PaperVenue::new(PaperConfig::default()));
        DeploymentEngine::new(
            GateConfig::default(),
            TrackerConfig {
                interval: Duration::from_millis(10),
                ..Default::default()
            },
            Collaborators {
                store: Arc::new(CsvDeploymentStore::ephemeral()),
                executor: venue.clone(),
                wallet: venue.clone(),
                market: venue,
            },
            Arc::new(SummaryStore::ephemeral(SummaryConfig::default())),
            None,
        )
    }

    fn spec() -> DeploySpec {
        DeploySpec {
            name: "Engine Dog".to_string(),
            symbol: "EDOG".to_string(),
            strategy: Strategy::Narrative,
            description: None,
            image_uri: None,
            trigger_ref: Some("https://x.com/a/status/314".to_string()),
            spend: 0.1,
            confidence: 85.0,
        }
    }

    #[tokio::test]
    async fn proposal_flows_into_positions_and_summary() {
        let engine = engine();
        engine.warm_up().await.unwrap();
        assert!(engine.propose_action(spec()).await.is_admitted());
        assert_eq!(engine.get_summary().await.total_deployed, 1);

        engine.run_tracker_cycle().await.unwrap();
        let positions = engine.list_positions().await;
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].symbol, "EDOG");
    }

    #[tokio::test]
    async fn shutdown_stops_tracker_and_gate() {
        let engine = engine();
        let handle = engine.spawn_tracker();
        engine.shutdown();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("tracker should stop")
            .unwrap();

        assert_eq!(
            engine.propose_action(spec()).await.reject_reason(),
            Some(&RejectReason::ShuttingDown)
        );
    }
}
