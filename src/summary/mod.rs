//! Rolling summary of deployment outcomes
//!
//! Keeps per-strategy counters, a compressed narrative of recent outcomes and
//! a short list of key learnings. The aggregate is derived: `rebuild` can
//! recompute it from the deployment store at any time. Every deployment and
//! close is also appended to the action history CSV.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::persistence::{ActionLog, ActionLogRecord};
use crate::types::{DeploymentRecord, Outcome, Strategy};

const SUMMARY_FILE: &str = "summary.json";

#[derive(Debug, Clone)]
pub struct SummaryConfig {
    /// Outcomes kept for the narrative
    pub recent_window: usize,
    pub max_learnings: usize,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            recent_window: 20,
            max_learnings: 10,
        }
    }
}

/// Counters for one strategy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyStats {
    pub deployed: u32,
    pub profitable: u32,
    pub loss: u32,
    pub dead: u32,
    pub total_spend: f64,
    pub realized_profit: f64,
}

impl StrategyStats {
    pub fn closed(&self) -> u32 {
        self.profitable + self.loss + self.dead
    }

    pub fn win_rate(&self) -> f64 {
        let closed = self.closed();
        if closed == 0 {
            0.0
        } else {
            self.profitable as f64 / closed as f64
        }
    }
}

/// One closed position, as remembered by the narrative
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeNote {
    pub at: DateTime<Utc>,
    pub symbol: String,
    pub strategy: Strategy,
    pub outcome: Outcome,
    pub profit: f64,
    pub roi_pct: f64,
}

/// Aggregate view over all deployments
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RollingSummary {
    pub narrative: String,
    pub strategies: BTreeMap<Strategy, StrategyStats>,
    pub key_learnings: Vec<String>,
    pub recent: VecDeque<OutcomeNote>,
    pub total_deployed: u32,
    pub total_closed: u32,
    pub realized_profit: f64,
    pub updated_at: Option<DateTime<Utc>>,
}

impl RollingSummary {
    pub fn stats(&self, strategy: Strategy) -> StrategyStats {
        self.strategies.get(&strategy).cloned().unwrap_or_default()
    }

    fn apply_deployment(&mut self, record: &DeploymentRecord) {
        let stats = self.strategies.entry(record.strategy).or_default();
        stats.deployed += 1;
        stats.total_spend += record.initial_spend;
        self.total_deployed += 1;
    }

    fn apply_close(&mut self, record: &DeploymentRecord, roi_pct: f64, window: usize) {
        let stats = self.strategies.entry(record.strategy).or_default();
        match record.performance.outcome {
            Outcome::Profitable => stats.profitable += 1,
            Outcome::Loss => stats.loss += 1,
            Outcome::Dead => stats.dead += 1,
            Outcome::Active => return,
        }
        stats.realized_profit += record.performance.profit;
        self.total_closed += 1;
        self.realized_profit += record.performance.profit;

        self.recent.push_back(OutcomeNote {
            at: record.performance.updated_at.unwrap_or(record.created_at),
            symbol: record.symbol.clone(),
            strategy: record.strategy,
            outcome: record.performance.outcome,
            profit: record.performance.profit,
            roi_pct,
        });
        while self.recent.len() > window {
            self.recent.pop_front();
        }
    }

    /// Regenerate the narrative and learnings from the counters
    fn refresh_text(&mut self, max_learnings: usize, now: DateTime<Utc>) {
        let (mut profitable, mut loss, mut dead) = (0, 0, 0);
        for stats in self.strategies.values() {
            profitable += stats.profitable;
            loss += stats.loss;
            dead += stats.dead;
        }

        let mut narrative = format!(
            "Deployed {} tokens, closed {} ({} profitable, {} loss, {} dead), net {:+.4} SOL.",
            self.total_deployed, self.total_closed, profitable, loss, dead, self.realized_profit
        );
        if !self.recent.is_empty() {
            let recent: Vec<String> = self
                .recent
                .iter()
                .rev()
                .map(|n| {
                    format!(
                        "${} {} {} {:+.4} SOL ({:+.0}%)",
                        n.symbol, n.strategy, n.outcome, n.profit, n.roi_pct
                    )
                })
                .collect();
            narrative.push_str(" Recent: ");
            narrative.push_str(&recent.join("; "));
            narrative.push('.');
        }
        self.narrative = narrative;

        let mut learnings = Vec::new();
        let mut ranked: Vec<(&Strategy, &StrategyStats)> = self
            .strategies
            .iter()
            .filter(|(_, s)| s.closed() > 0)
            .collect();
        ranked.sort_by(|a, b| {
            b.1.realized_profit
                .partial_cmp(&a.1.realized_profit)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        if ranked.len() > 1 {
            if let (Some(best), Some(worst)) = (ranked.first(), ranked.last()) {
                learnings.push(format!(
                    "{} outperforms {} ({:+.4} vs {:+.4} SOL realized)",
                    best.0, worst.0, best.1.realized_profit, worst.1.realized_profit
                ));
            }
        }
        for (strategy, stats) in &ranked {
            let mut line = format!(
                "{}: {}/{} closed profitable ({:.0}%), net {:+.4} SOL",
                strategy,
                stats.profitable,
                stats.closed(),
                stats.win_rate() * 100.0,
                stats.realized_profit
            );
            if stats.dead > 0 {
                line.push_str(&format!(", {} went dead", stats.dead));
            }
            learnings.push(line);
        }
        learnings.truncate(max_learnings);
        self.key_learnings = learnings;
        self.updated_at = Some(now);
    }
}

fn roi_pct_of(record: &DeploymentRecord) -> f64 {
    if record.initial_spend > 0.0 {
        record.performance.profit / record.initial_spend * 100.0
    } else {
        0.0
    }
}

fn log_row(record: &DeploymentRecord, action: &str, roi_pct: f64, reference: Option<String>) -> ActionLogRecord {
    ActionLogRecord {
        timestamp: Utc::now().timestamp_millis(),
        action: action.to_string(),
        mint: record.mint.clone(),
        symbol: record.symbol.clone(),
        strategy: record.strategy.as_str().to_string(),
        spend: record.initial_spend,
        value: record.performance.current_value,
        fees: record.performance.fees_accrued,
        profit: record.performance.profit,
        roi_pct,
        outcome: record.performance.outcome.as_str().to_string(),
        reference,
        detail: record.trigger_ref.clone(),
    }
}

/// Owner of the rolling summary and the action history
pub struct SummaryStore {
    config: SummaryConfig,
    state: RwLock<RollingSummary>,
    path: Option<PathBuf>,
    log: ActionLog,
}

impl SummaryStore {
    /// Open under `data_dir`, restoring `summary.json` when present
    pub fn open(data_dir: &Path, config: SummaryConfig) -> Result<Self> {
        fs::create_dir_all(data_dir).context("Failed to create data directory")?;
        let path = data_dir.join(SUMMARY_FILE);
        let state = if path.exists() {
            let json = fs::read_to_string(&path).context("Failed to read summary file")?;
            match serde_json::from_str::<RollingSummary>(&json) {
                Ok(state) => {
                    info!(
                        path = %path.display(),
                        deployed = state.total_deployed,
                        closed = state.total_closed,
                        "💾 [SUMMARY] State restored"
                    );
                    state
                }
                Err(e) => {
                    warn!(error = %e, path = %path.display(), "[SUMMARY] Unreadable summary, starting empty");
                    RollingSummary::default()
                }
            }
        } else {
            RollingSummary::default()
        };

        Ok(Self {
            config,
            state: RwLock::new(state),
            path: Some(path),
            log: ActionLog::open(data_dir)?,
        })
    }

    /// In-memory summary with no files
    pub fn ephemeral(config: SummaryConfig) -> Self {
        Self {
            config,
            state: RwLock::new(RollingSummary::default()),
            path: None,
            log: ActionLog::ephemeral(),
        }
    }

    pub async fn snapshot(&self) -> RollingSummary {
        self.state.read().await.clone()
    }

    pub async fn record_deployment(&self, record: &DeploymentRecord) {
        {
            let mut state = self.state.write().await;
            state.apply_deployment(record);
            state.refresh_text(self.config.max_learnings, Utc::now());
            self.persist(&state);
        }
        if let Err(e) = self
            .log
            .append(&log_row(record, "deploy", 0.0, record.deploy_reference.clone()))
            .await
        {
            warn!(error = %e, mint = %record.mint, "[SUMMARY] Failed to append deploy history");
        }
    }

    /// Record a closed position. `action` is "sell" or "dead".
    pub async fn record_close(
        &self,
        record: &DeploymentRecord,
        roi_pct: f64,
        action: &str,
        reference: Option<String>,
    ) {
        if !record.performance.outcome.is_closed() {
            warn!(mint = %record.mint, "[SUMMARY] Ignoring close of an active record");
            return;
        }
        {
            let mut state = self.state.write().await;
            state.apply_close(record, roi_pct, self.config.recent_window);
            state.refresh_text(self.config.max_learnings, Utc::now());
            self.persist(&state);
        }
        if let Err(e) = self
            .log
            .append(&log_row(record, action, roi_pct, reference))
            .await
        {
            warn!(error = %e, mint = %record.mint, "[SUMMARY] Failed to append close history");
        }
        info!(
            mint = %record.mint,
            strategy = %record.strategy,
            outcome = %record.performance.outcome,
            profit = record.performance.profit,
            "[SUMMARY] Outcome recorded"
        );
    }

    /// Recompute the aggregate from scratch
    pub async fn rebuild(&self, records: &[DeploymentRecord]) -> RollingSummary {
        let mut fresh = RollingSummary::default();
        let mut ordered: Vec<&DeploymentRecord> = records.iter().collect();
        ordered.sort_by_key(|r| r.created_at);
        for record in &ordered {
            fresh.apply_deployment(record);
        }
        let mut closed: Vec<&DeploymentRecord> = ordered
            .into_iter()
            .filter(|r| r.performance.outcome.is_closed())
            .collect();
        closed.sort_by_key(|r| r.performance.updated_at.unwrap_or(r.created_at));
        for record in closed {
            fresh.apply_close(record, roi_pct_of(record), self.config.recent_window);
        }
        fresh.refresh_text(self.config.max_learnings, Utc::now());

        {
            let mut state = self.state.write().await;
            *state = fresh.clone();
            self.persist(&state);
        }
        info!(
            deployed = fresh.total_deployed,
            closed = fresh.total_closed,
            "[SUMMARY] Rebuilt from deployment records"
        );
        fresh
    }

    /// Summary text handed to the decision-maker as context
    pub async fn decision_context(&self) -> String {
        let state = self.state.read().await;
        let mut out = state.narrative.clone();
        if !state.key_learnings.is_empty() {
            out.push_str("\nKey learnings:");
            for learning in &state.key_learnings {
                out.push_str("\n- ");
                out.push_str(learning);
            }
        }
        let untried: Vec<&str> = Strategy::ALL
            .iter()
            .filter(|s| state.stats(**s).deployed == 0)
            .map(|s| s.as_str())
            .collect();
        if !untried.is_empty() {
            out.push_str("\nUntried strategies: ");
            out.push_str(&untried.join(", "));
        }
        out
    }

    pub fn history(&self) -> Result<Vec<ActionLogRecord>> {
        self.log.load()
    }

    /// Writes `summary.json`. Callers hold the state write lock so snapshots land in order.
    fn persist(&self, state: &RollingSummary) {
        let Some(path) = &self.path else {
            return;
        };
        match serde_json::to_string_pretty(state) {
            Ok(json) => {
                if let Err(e) = fs::write(path, json) {
                    warn!(error = %e, path = %path.display(), "Failed to save summary state");
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize summary state"),
        }
    }
}
