//! Deployment admission gate
//!
//! Sequences the dedup, cooldown, confidence and balance checks for every
//! proposed deployment. The read of `last_deployment_at` and its update form
//! one critical section under the gate lock, so two concurrent proposals can
//! never both observe an expired cooldown. The lock is released while the
//! executor runs; the admitted trigger stays reserved in the dedup cache
//! until the executor returns.

mod balance;
mod dedup;

pub use balance::{BalanceCheck, BalanceGuard, WalletBalance};
pub use dedup::{normalize_trigger, DedupCache, DedupCheck, IN_FLIGHT_LABEL};

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::execution::Executor;
use crate::persistence::{DeploymentStore, ReconcileQueue};
use crate::summary::SummaryStore;
use crate::types::{
    ActionSpec, AdmissionResult, DeploySpec, DeploymentRecord, Performance, RejectReason,
};

/// Gate thresholds
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Minimum interval between two admitted deployments
    pub cooldown: Duration,
    /// Minimum confidence score (0-100)
    pub min_confidence: f64,
    /// SOL never spent
    pub reserve: f64,
    /// Smallest headroom that allows any deployment
    pub min_action_floor: f64,
    pub dedup_ttl: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(240),
            min_confidence: 70.0,
            reserve: 0.3,
            min_action_floor: 0.01,
            dedup_ttl: Duration::from_secs(300),
        }
    }
}

/// Mutable gate state, only touched under the gate lock
#[derive(Debug)]
pub struct GateState {
    pub last_deployment_at: Option<DateTime<Utc>>,
    pub dedup: DedupCache,
}

/// Seconds left on the cooldown, rounded up; `None` once it has expired
fn cooldown_remaining(
    last: Option<DateTime<Utc>>,
    cooldown: Duration,
    now: DateTime<Utc>,
) -> Option<u64> {
    let last = last?;
    let elapsed_ms = (now - last).num_milliseconds().max(0) as u128;
    let cooldown_ms = cooldown.as_millis();
    if elapsed_ms >= cooldown_ms {
        return None;
    }
    let remaining_ms = cooldown_ms - elapsed_ms;
    Some(((remaining_ms + 999) / 1000).max(1) as u64)
}

fn validate(spec: &DeploySpec) -> Option<String> {
    if spec.name.trim().is_empty() {
        return Some("name is empty".to_string());
    }
    if spec.symbol.trim().is_empty() {
        return Some("symbol is empty".to_string());
    }
    if !spec.spend.is_finite() || spec.spend <= 0.0 {
        return Some(format!("spend must be positive, got {}", spec.spend));
    }
    if !spec.confidence.is_finite() || !(0.0..=100.0).contains(&spec.confidence) {
        return Some(format!("confidence must be in [0, 100], got {}", spec.confidence));
    }
    None
}

/// Admission gate for proposed deployments
pub struct AdmissionGate {
    config: GateConfig,
    state: Mutex<GateState>,
    balance: BalanceGuard,
    store: Arc<dyn DeploymentStore>,
    executor: Arc<dyn Executor>,
    summary: Arc<SummaryStore>,
    reconcile: Arc<ReconcileQueue>,
    capability_error: Option<String>,
    shutting_down: AtomicBool,
}

impl AdmissionGate {
    pub fn new(
        config: GateConfig,
        store: Arc<dyn DeploymentStore>,
        executor: Arc<dyn Executor>,
        wallet: Arc<dyn WalletBalance>,
        summary: Arc<SummaryStore>,
        reconcile: Arc<ReconcileQueue>,
    ) -> Self {
        let balance = BalanceGuard::new(wallet, config.reserve, config.min_action_floor);
        let dedup = DedupCache::new(config.dedup_ttl);
        Self {
            config,
            state: Mutex::new(GateState {
                last_deployment_at: None,
                dedup,
            }),
            balance,
            store,
            executor,
            summary,
            reconcile,
            capability_error: None,
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Disable deployments with a reason reported as `not_configured`
    pub fn with_capability_error(mut self, reason: Option<String>) -> Self {
        self.capability_error = reason;
        self
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Load the dedup set and restore the cooldown from the latest deployment
    pub async fn warm_up(&self) -> Result<()> {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        let entries = state.dedup.rebuild(self.store.as_ref(), now).await?;
        let latest = self.store.list_recent(1).await?;
        state.last_deployment_at = latest.first().map(|r| r.created_at);
        info!(
            dedup_entries = entries,
            last_deployment = ?state.last_deployment_at,
            "[GATE] Warmed up from deployment store"
        );
        Ok(())
    }

    pub async fn last_deployment_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().await.last_deployment_at
    }

    /// Reject every new proposal from now on
    pub fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    pub async fn propose(&self, spec: DeploySpec) -> AdmissionResult {
        self.propose_at(spec, Utc::now()).await
    }

    /// Evaluate a proposal as of `now`
    pub async fn propose_at(&self, spec: DeploySpec, now: DateTime<Utc>) -> AdmissionResult {
        if self.is_shutting_down() {
            return AdmissionResult::rejected(RejectReason::ShuttingDown, "gate is shutting down");
        }
        if let Some(reason) = &self.capability_error {
            warn!(symbol = %spec.symbol, reason = %reason, "[GATE] Deploy capability not configured");
            return AdmissionResult::rejected(RejectReason::NotConfigured, reason.clone());
        }
        if let Some(detail) = validate(&spec) {
            warn!(symbol = %spec.symbol, detail = %detail, "[GATE] Invalid proposal");
            return AdmissionResult::rejected(RejectReason::InvalidProposal, detail);
        }

        // Critical section: every check plus the cooldown/dedup mutation
        let trigger_key = {
            let mut state = self.state.lock().await;

            if state.dedup.is_stale(now) && !self.reconcile.is_empty().await {
                let flushed = self.reconcile.flush(self.store.as_ref()).await;
                info!(flushed, "[GATE] Reconciliation queue flushed");
            }

            let mut trigger_key = None;
            if let Some(trigger_ref) = spec.trigger_ref.as_deref() {
                let check = state.dedup.check(trigger_ref, self.store.as_ref(), now).await;
                if check.duplicate {
                    let label = check.existing_label.unwrap_or_default();
                    info!(trigger = %trigger_ref, existing = %label, "🚫 [GATE] Duplicate trigger");
                    return AdmissionResult::rejected(
                        RejectReason::Duplicate {
                            existing_label: label.clone(),
                        },
                        format!("trigger already deployed as {}", label),
                    );
                }
                trigger_key = check.key;
            }

            if let Some(wait_secs) =
                cooldown_remaining(state.last_deployment_at, self.config.cooldown, now)
            {
                info!(symbol = %spec.symbol, wait_secs, "⏳ [GATE] Cooldown active");
                return AdmissionResult::rejected(
                    RejectReason::Cooldown { wait_secs },
                    format!("cooldown active, retry in {}s", wait_secs),
                );
            }

            if spec.confidence < self.config.min_confidence {
                info!(
                    symbol = %spec.symbol,
                    confidence = spec.confidence,
                    minimum = self.config.min_confidence,
                    "[GATE] Confidence below threshold"
                );
                return AdmissionResult::rejected(
                    RejectReason::LowConfidence {
                        confidence: spec.confidence,
                        minimum: self.config.min_confidence,
                    },
                    format!(
                        "confidence {:.1} below minimum {:.1}",
                        spec.confidence, self.config.min_confidence
                    ),
                );
            }

            match self.balance.check().await {
                Ok(check) if check.covers(spec.spend) => {}
                Ok(check) => {
                    info!(
                        spendable = check.spendable,
                        available = check.available,
                        requested = spec.spend,
                        reserve = check.reserve,
                        "💸 [GATE] Insufficient headroom"
                    );
                    return AdmissionResult::rejected(
                        RejectReason::InsufficientFunds {
                            available: check.available,
                            requested: spec.spend,
                        },
                        format!(
                            "available {:.4} SOL (spendable {:.4} minus reserve {:.4}) cannot cover {:.4}",
                            check.available, check.spendable, check.reserve, spec.spend
                        ),
                    );
                }
                Err(e) => {
                    warn!(error = %e, "[GATE] Balance query failed, rejecting");
                    return AdmissionResult::rejected(
                        RejectReason::InsufficientFunds {
                            available: 0.0,
                            requested: spec.spend,
                        },
                        format!("balance unavailable: {}", e),
                    );
                }
            }

            state.last_deployment_at = Some(now);
            if let Some(key) = &trigger_key {
                state.dedup.reserve(key, &spec.symbol);
            }
            trigger_key
        };

        info!(
            symbol = %spec.symbol,
            strategy = %spec.strategy,
            spend = spec.spend,
            confidence = spec.confidence,
            "✅ [GATE] Admitted, executing deploy"
        );

        let receipt = match self.executor.execute(&ActionSpec::Deploy(spec.clone())).await {
            Ok(receipt) => receipt,
            Err(e) => {
                if let Some(key) = &trigger_key {
                    self.state.lock().await.dedup.release(key);
                }
                error!(symbol = %spec.symbol, error = %e, "❌ [GATE] Deploy failed, cooldown kept");
                return AdmissionResult::Failed {
                    error: e.to_string(),
                };
            }
        };

        let record = DeploymentRecord {
            id: uuid::Uuid::new_v4().to_string(),
            mint: receipt.mint.clone().unwrap_or_else(|| receipt.reference.clone()),
            name: spec.name.clone(),
            symbol: spec.symbol.clone(),
            strategy: spec.strategy,
            trigger_ref: spec.trigger_ref.clone(),
            trigger_key: trigger_key.clone(),
            created_at: now,
            initial_spend: spec.spend,
            // Zero when the venue does not report holdings; the tracker infers it from the first quote
            token_amount: receipt.token_amount.unwrap_or(0.0),
            confidence: spec.confidence,
            deploy_reference: Some(receipt.reference.clone()),
            performance: Performance {
                updated_at: Some(now),
                ..Default::default()
            },
        };

        let persisted = match self.store.save(&record).await {
            Ok(()) => true,
            Err(e) => {
                self.reconcile.push(record.clone(), &e.to_string()).await;
                false
            }
        };

        if let Some(key) = &trigger_key {
            self.state.lock().await.dedup.confirm(key, record.label());
        }
        self.summary.record_deployment(&record).await;

        info!(
            mint = %record.mint,
            symbol = %record.symbol,
            reference = %receipt.reference,
            persisted,
            "🚀 [GATE] Deployment recorded"
        );
        AdmissionResult::Admitted { record, persisted }
    }
}
