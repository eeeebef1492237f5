//! Position lifecycle tracker
//!
//! Re-evaluates every active deployment on a fixed interval, independent of
//! the admission gate. Positions are evaluated with bounded concurrency; each
//! position's fetch -> compute -> sell -> persist sequence runs under its own
//! lock so overlapping cycles never evaluate the same position twice.

pub mod exit_policy;

pub use exit_policy::{compute_roi, ExitDecision, ExitPolicy, ExitReason};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures_util::{stream, StreamExt};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::execution::Executor;
use crate::market::{MarketDataProvider, MarketSnapshot};
use crate::persistence::{DeploymentStore, ReconcileQueue};
use crate::summary::SummaryStore;
use crate::types::{ActionSpec, DeploymentRecord, Outcome, Position, SellSpec};

/// Tracker loop configuration
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub interval: Duration,
    /// Positions evaluated at once
    pub max_concurrency: usize,
    pub policy: ExitPolicy,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            max_concurrency: 4,
            policy: ExitPolicy::default(),
        }
    }
}

/// What one cycle did with one position
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EvaluationStatus {
    Held,
    Sold {
        reason: ExitReason,
        outcome: Outcome,
        reference: String,
    },
    Dead,
    Skipped {
        reason: String,
    },
    Failed {
        error: String,
    },
}

impl EvaluationStatus {
    /// Whether the position is still open after this evaluation
    fn keeps_position(&self) -> bool {
        !matches!(self, EvaluationStatus::Sold { .. } | EvaluationStatus::Dead)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PositionEvaluation {
    pub id: String,
    pub mint: String,
    pub symbol: String,
    pub status: EvaluationStatus,
    pub position: Option<Position>,
}

/// Result of one tracking cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Queued write-backs persisted at cycle start
    pub reconciled: usize,
    pub evaluations: Vec<PositionEvaluation>,
}

impl CycleReport {
    fn count(&self, pred: impl Fn(&EvaluationStatus) -> bool) -> usize {
        self.evaluations.iter().filter(|e| pred(&e.status)).count()
    }

    pub fn held(&self) -> usize {
        self.count(|s| matches!(s, EvaluationStatus::Held))
    }

    pub fn sold(&self) -> usize {
        self.count(|s| matches!(s, EvaluationStatus::Sold { .. }))
    }

    pub fn dead(&self) -> usize {
        self.count(|s| matches!(s, EvaluationStatus::Dead))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, EvaluationStatus::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, EvaluationStatus::Failed { .. }))
    }

    pub fn get(&self, mint: &str) -> Option<&PositionEvaluation> {
        self.evaluations.iter().find(|e| e.mint == mint)
    }
}

fn position_from_record(record: &DeploymentRecord, now: DateTime<Utc>) -> Position {
    Position {
        mint: record.mint.clone(),
        symbol: record.symbol.clone(),
        strategy: record.strategy,
        initial_spend: record.initial_spend,
        token_amount: record.token_amount,
        price: 0.0,
        market_cap: 0.0,
        holders: record.performance.holders,
        holder_delta: 0,
        current_value: record.performance.current_value,
        fees_collected: record.performance.fees_accrued,
        roi_pct: compute_roi(
            record.performance.current_value,
            record.performance.fees_accrued,
            record.initial_spend,
        ),
        inactivity_hours: 0.0,
        evaluated_at: now,
        last_error: None,
    }
}

/// Periodic evaluator of open positions
pub struct PositionTracker {
    config: TrackerConfig,
    store: Arc<dyn DeploymentStore>,
    market: Arc<dyn MarketDataProvider>,
    executor: Arc<dyn Executor>,
    summary: Arc<SummaryStore>,
    reconcile: Arc<ReconcileQueue>,
    /// record id -> evaluation lock
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    /// mint -> position from the latest cycle
    positions: RwLock<HashMap<String, Position>>,
}

impl PositionTracker {
    pub fn new(
        config: TrackerConfig,
        store: Arc<dyn DeploymentStore>,
        market: Arc<dyn MarketDataProvider>,
        executor: Arc<dyn Executor>,
        summary: Arc<SummaryStore>,
        reconcile: Arc<ReconcileQueue>,
    ) -> Self {
        Self {
            config,
            store,
            market,
            executor,
            summary,
            reconcile,
            locks: Mutex::new(HashMap::new()),
            positions: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Positions computed by the latest cycle
    pub async fn list_positions(&self) -> Vec<Position> {
        let mut positions: Vec<Position> = self.positions.read().await.values().cloned().collect();
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol).then_with(|| a.mint.cmp(&b.mint)));
        positions
    }

    /// Tick until shutdown is signalled. A running cycle always completes;
    /// no new cycle starts once shutdown is observed.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            interval_secs = self.config.interval.as_secs(),
            concurrency = self.config.max_concurrency,
            "[TRACKER] Started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if *shutdown.borrow() {
                        break;
                    }
                    match self.run_cycle().await {
                        Ok(report) => {
                            if !report.evaluations.is_empty() {
                                info!(
                                    held = report.held(),
                                    sold = report.sold(),
                                    dead = report.dead(),
                                    skipped = report.skipped(),
                                    failed = report.failed(),
                                    "[TRACKER] Cycle complete"
                                );
                            }
                        }
                        Err(e) => warn!(error = %e, "[TRACKER] Cycle aborted"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("[TRACKER] Stopped");
    }

    pub async fn run_cycle(&self) -> Result<CycleReport> {
        self.run_cycle_at(Utc::now()).await
    }

    /// One pass over all active positions as of `now`
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> Result<CycleReport> {
        let reconciled = self.reconcile.flush(self.store.as_ref()).await;
        let records = self
            .store
            .list_active()
            .await
            .context("Failed to list active deployments")?;

        let mut evaluations = Vec::with_capacity(records.len());
        let mut candidates = Vec::with_capacity(records.len());
        for record in records {
            if self.reconcile.contains_mint(&record.mint).await {
                evaluations.push(PositionEvaluation {
                    id: record.id.clone(),
                    mint: record.mint.clone(),
                    symbol: record.symbol.clone(),
                    status: EvaluationStatus::Skipped {
                        reason: "pending reconciliation".to_string(),
                    },
                    position: None,
                });
            } else {
                candidates.push(record);
            }
        }

        let evaluated: Vec<PositionEvaluation> = stream::iter(candidates)
            .map(|record| self.evaluate(record, now))
            .buffer_unordered(self.config.max_concurrency.max(1))
            .collect()
            .await;
        evaluations.extend(evaluated);

        let mut next = HashMap::new();
        let mut closed = HashSet::new();
        for evaluation in &evaluations {
            if !evaluation.status.keeps_position() {
                closed.insert(evaluation.id.clone());
                continue;
            }
            if let Some(position) = &evaluation.position {
                next.insert(position.mint.clone(), position.clone());
            }
        }
        *self.positions.write().await = next;
        if !closed.is_empty() {
            self.locks.lock().await.retain(|id, _| !closed.contains(id));
        }

        Ok(CycleReport {
            started_at: now,
            finished_at: Utc::now(),
            reconciled,
            evaluations,
        })
    }

    async fn lock_for(&self, id: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .await
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn evaluate(&self, listed: DeploymentRecord, now: DateTime<Utc>) -> PositionEvaluation {
        let previous = self.positions.read().await.get(&listed.mint).cloned();
        let lock = self.lock_for(&listed.id).await;
        let Ok(_guard) = lock.try_lock_owned() else {
            debug!(mint = %listed.mint, "[TRACKER] Evaluation already in flight");
            return PositionEvaluation {
                id: listed.id,
                mint: listed.mint,
                symbol: listed.symbol,
                status: EvaluationStatus::Skipped {
                    reason: "evaluation in progress".to_string(),
                },
                position: previous,
            };
        };

        // A close from an overlapping cycle may be waiting for write-back
        if self.reconcile.contains_mint(&listed.mint).await {
            debug!(mint = %listed.mint, "[TRACKER] Close pending reconciliation");
            return PositionEvaluation {
                id: listed.id,
                mint: listed.mint,
                symbol: listed.symbol,
                status: EvaluationStatus::Skipped {
                    reason: "pending reconciliation".to_string(),
                },
                position: None,
            };
        }

        // Another cycle may have closed it between listing and locking
        let mut record = match self.store.find_by_id(&listed.id).await {
            Ok(Some(latest)) if !latest.is_active() => {
                return PositionEvaluation {
                    id: latest.id,
                    mint: latest.mint,
                    symbol: latest.symbol,
                    status: EvaluationStatus::Skipped {
                        reason: "already closed".to_string(),
                    },
                    position: None,
                };
            }
            Ok(Some(latest)) => latest,
            Ok(None) => listed,
            Err(e) => {
                warn!(id = %listed.id, error = %e, "[TRACKER] Re-read failed, using listed record");
                listed
            }
        };

        let quote = match self.market.quote(&record.mint).await {
            Ok(quote) => quote.normalize(&record.mint),
            Err(e) => Err(e),
        };
        let snapshot = match quote {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(mint = %record.mint, symbol = %record.symbol, error = %e, "[TRACKER] Market data unavailable");
                let mut position = previous.unwrap_or_else(|| position_from_record(&record, now));
                position.evaluated_at = now;
                position.last_error = Some(e.to_string());
                return self.finish(&record, EvaluationStatus::Failed { error: e.to_string() }, Some(position));
            }
        };

        // The receipt did not report holdings: infer them from the first priced quote
        if record.token_amount <= 0.0 {
            if snapshot.price <= 0.0 {
                debug!(mint = %record.mint, "[TRACKER] Token amount unknown, waiting for a price");
                return self.finish(
                    &record,
                    EvaluationStatus::Skipped {
                        reason: "token amount unknown".to_string(),
                    },
                    previous,
                );
            }
            record.token_amount = record.initial_spend / snapshot.price;
            info!(
                mint = %record.mint,
                token_amount = record.token_amount,
                price = snapshot.price,
                "[TRACKER] Token amount inferred from first quote"
            );
            let position = self.build_position(&record, &snapshot, previous.as_ref(), now);
            record.performance.current_value = position.current_value;
            record.performance.peak_value = record.performance.peak_value.max(position.current_value);
            record.performance.updated_at = Some(now);
            if let Err(e) = self.store.save(&record).await {
                warn!(mint = %record.mint, error = %e, "[TRACKER] Failed to persist inferred token amount");
            }
            return self.finish(&record, EvaluationStatus::Held, Some(position));
        }

        let mut position = self.build_position(&record, &snapshot, previous.as_ref(), now);
        let policy = &self.config.policy;

        if snapshot.price == 0.0 && position.inactivity_hours > policy.dead_window_hours {
            self.close_dead(&mut record, &position, now).await;
            return self.finish(&record, EvaluationStatus::Dead, Some(position));
        }

        match policy.evaluate(position.roi_pct, position.inactivity_hours) {
            ExitDecision::Hold => {
                let perf = &mut record.performance;
                perf.current_value = position.current_value;
                perf.peak_value = perf.peak_value.max(position.current_value);
                perf.holders = position.holders;
                perf.fees_accrued = position.fees_collected;
                perf.profit = position.current_value + position.fees_collected - record.initial_spend;
                perf.updated_at = Some(now);
                if let Err(e) = self.store.save(&record).await {
                    warn!(mint = %record.mint, error = %e, "[TRACKER] Failed to persist performance update");
                }
                debug!(mint = %record.mint, roi_pct = position.roi_pct, "[TRACKER] Hold");
                self.finish(&record, EvaluationStatus::Held, Some(position))
            }
            ExitDecision::Sell(reason) => {
                let status = self.sell(&mut record, &position, reason, now).await;
                if let EvaluationStatus::Failed { error } = &status {
                    position.last_error = Some(error.clone());
                }
                self.finish(&record, status, Some(position))
            }
        }
    }

    fn build_position(
        &self,
        record: &DeploymentRecord,
        snapshot: &MarketSnapshot,
        previous: Option<&Position>,
        now: DateTime<Utc>,
    ) -> Position {
        let current_value = record.token_amount * snapshot.price;
        let prior_holders = previous
            .map(|p| p.holders)
            .unwrap_or(record.performance.holders);
        Position {
            mint: record.mint.clone(),
            symbol: record.symbol.clone(),
            strategy: record.strategy,
            initial_spend: record.initial_spend,
            token_amount: record.token_amount,
            price: snapshot.price,
            market_cap: snapshot.market_cap,
            holders: snapshot.holders,
            holder_delta: snapshot.holders as i64 - prior_holders as i64,
            current_value,
            fees_collected: snapshot.fees,
            roi_pct: compute_roi(current_value, snapshot.fees, record.initial_spend),
            inactivity_hours: snapshot.inactivity_hours(now),
            evaluated_at: now,
            last_error: None,
        }
    }

    async fn sell(
        &self,
        record: &mut DeploymentRecord,
        position: &Position,
        reason: ExitReason,
        now: DateTime<Utc>,
    ) -> EvaluationStatus {
        info!(
            mint = %record.mint,
            symbol = %record.symbol,
            roi_pct = position.roi_pct,
            reason = %reason,
            "💰 [TRACKER] Exit triggered, selling"
        );
        let action = ActionSpec::Sell(SellSpec {
            mint: record.mint.clone(),
            token_amount: record.token_amount,
            reason: reason.to_string(),
        });
        let receipt = match self.executor.execute(&action).await {
            Ok(receipt) => receipt,
            Err(e) => {
                error!(mint = %record.mint, error = %e, "[TRACKER] Sell failed, position stays active");
                return EvaluationStatus::Failed {
                    error: e.to_string(),
                };
            }
        };

        let proceeds = receipt.proceeds.unwrap_or(position.current_value);
        let outcome = if position.roi_pct > 0.0 {
            Outcome::Profitable
        } else {
            Outcome::Loss
        };
        let perf = &mut record.performance;
        perf.current_value = proceeds;
        perf.peak_value = perf.peak_value.max(position.current_value);
        perf.holders = position.holders;
        perf.fees_accrued = position.fees_collected;
        perf.profit = proceeds + position.fees_collected - record.initial_spend;
        perf.outcome = outcome;
        perf.updated_at = Some(now);

        if let Err(e) = self.store.save(record).await {
            self.reconcile.push(record.clone(), &e.to_string()).await;
        }
        self.summary
            .record_close(record, position.roi_pct, "sell", Some(receipt.reference.clone()))
            .await;

        info!(
            mint = %record.mint,
            outcome = %outcome,
            profit = record.performance.profit,
            reference = %receipt.reference,
            "[TRACKER] Position closed"
        );
        EvaluationStatus::Sold {
            reason,
            outcome,
            reference: receipt.reference,
        }
    }

    /// Nothing left to sell: realize fees against the spend
    async fn close_dead(&self, record: &mut DeploymentRecord, position: &Position, now: DateTime<Utc>) {
        let perf = &mut record.performance;
        perf.current_value = 0.0;
        perf.holders = position.holders;
        perf.fees_accrued = position.fees_collected;
        perf.profit = position.fees_collected - record.initial_spend;
        perf.outcome = Outcome::Dead;
        perf.updated_at = Some(now);

        if let Err(e) = self.store.save(record).await {
            self.reconcile.push(record.clone(), &e.to_string()).await;
        }
        self.summary
            .record_close(record, position.roi_pct, "dead", None)
            .await;
        info!(
            mint = %record.mint,
            inactivity_hours = position.inactivity_hours,
            "☠️ [TRACKER] Position marked dead"
        );
    }

    fn finish(
        &self,
        record: &DeploymentRecord,
        status: EvaluationStatus,
        position: Option<Position>,
    ) -> PositionEvaluation {
        PositionEvaluation {
            id: record.id.clone(),
            mint: record.mint.clone(),
            symbol: record.symbol.clone(),
            status,
            position,
        }
    }
}
