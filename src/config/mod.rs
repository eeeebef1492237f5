//! Configuration management for LaunchGate
//!
//! Loads from config files + environment variables via .env

mod types;

pub use types::*;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::gate::GateConfig;
use crate::summary::SummaryConfig;
use crate::tracker::{ExitPolicy, TrackerConfig};

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub bot: BotSettings,
    pub gate: GateSettings,
    pub tracker: TrackerSettings,
    pub summary: SummarySettings,
    pub persistence: PersistenceSettings,
    pub paper: PaperSettings,
    pub dashboard: DashboardSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotSettings {
    /// Version tag for logging
    pub tag: String,
    /// Run against the simulated venue instead of a live executor
    pub paper: bool,
    /// Emit JSON log lines
    pub json_logs: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GateSettings {
    /// Minimum seconds between two admitted deployments
    pub cooldown_secs: u64,
    /// Minimum confidence score (0-100)
    pub min_confidence: f64,
    /// SOL kept untouched in the wallet
    pub reserve_sol: f64,
    /// Smallest headroom that still allows a deployment
    pub min_action_sol: f64,
    /// Dedup cache staleness bound in seconds
    pub dedup_ttl_secs: u64,
    /// Deploying wallet (required outside paper mode)
    pub wallet_address: Option<String>,
    /// Signer key for the live executor (required outside paper mode)
    pub signer_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackerSettings {
    pub interval_secs: u64,
    /// Max positions evaluated concurrently
    pub max_concurrency: usize,
    /// Take-profit ROI in percent
    pub take_profit_pct: f64,
    /// Stop-loss ROI in percent (negative)
    pub stop_loss_pct: f64,
    /// Hours without trades before a position counts as dead
    pub dead_window_hours: f64,
    /// Minimum ROI in percent for exiting a dead position
    pub dead_min_roi_pct: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SummarySettings {
    /// Outcomes kept in the narrative
    pub recent_window: usize,
    pub max_learnings: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceSettings {
    pub data_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaperSettings {
    /// Starting virtual balance in SOL
    pub initial_balance: f64,
    /// Simulated fee in basis points
    pub fee_bps: f64,
    /// Per-quote price volatility (e.g. 0.05 = 5%)
    pub volatility: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DashboardSettings {
    pub enabled: bool,
    pub bind: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .set_default("bot.tag", env!("CARGO_PKG_VERSION"))?
            .set_default("bot.paper", true)?
            .set_default("bot.json_logs", false)?
            // Gate defaults
            .set_default("gate.cooldown_secs", 240)?
            .set_default("gate.min_confidence", 70.0)?
            .set_default("gate.reserve_sol", 0.3)?
            .set_default("gate.min_action_sol", 0.01)?
            .set_default("gate.dedup_ttl_secs", 300)?
            // Tracker defaults
            .set_default("tracker.interval_secs", 60)?
            .set_default("tracker.max_concurrency", 4)?
            .set_default("tracker.take_profit_pct", 100.0)?
            .set_default("tracker.stop_loss_pct", -50.0)?
            .set_default("tracker.dead_window_hours", 24.0)?
            .set_default("tracker.dead_min_roi_pct", 5.0)?
            // Summary defaults
            .set_default("summary.recent_window", 20)?
            .set_default("summary.max_learnings", 10)?
            // Persistence defaults
            .set_default("persistence.data_dir", "./data")?
            // Paper defaults
            .set_default("paper.initial_balance", 2.0)?
            .set_default("paper.fee_bps", 100.0)?
            .set_default("paper.volatility", 0.08)?
            // Dashboard defaults
            .set_default("dashboard.enabled", false)?
            .set_default("dashboard.bind", "127.0.0.1:8787")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (LAUNCHGATE_*)
            .add_source(Environment::with_prefix("LAUNCHGATE").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let mut app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Credentials come from flat env vars so they never live in config files
        if app_config.gate.wallet_address.is_none() {
            app_config.gate.wallet_address = std::env::var("LAUNCHGATE_WALLET_ADDRESS").ok();
        }
        if app_config.gate.signer_key.is_none() {
            app_config.gate.signer_key = std::env::var("LAUNCHGATE_SIGNER_KEY").ok();
        }

        Ok(app_config)
    }

    /// Generate a digest of the config (without secrets) for logging
    pub fn digest(&self) -> String {
        format!(
            "bot={} paper={} cooldown={}s min_conf={:.0} reserve={:.3} tp={:.0}% sl={:.0}%",
            self.bot.tag,
            self.bot.paper,
            self.gate.cooldown_secs,
            self.gate.min_confidence,
            self.gate.reserve_sol,
            self.tracker.take_profit_pct,
            self.tracker.stop_loss_pct
        )
    }

    /// Reason live deployment cannot run, if any.
    ///
    /// Paper mode needs no credentials. A missing credential disables the
    /// deploy capability only; the gate reports it as a rejection.
    pub fn capability_error(&self) -> Option<String> {
        if self.bot.paper {
            return None;
        }
        let mut missing = Vec::new();
        if self
            .gate
            .wallet_address
            .as_deref()
            .map(str::is_empty)
            .unwrap_or(true)
        {
            missing.push("LAUNCHGATE_WALLET_ADDRESS");
        }
        if self
            .gate
            .signer_key
            .as_deref()
            .map(str::is_empty)
            .unwrap_or(true)
        {
            missing.push("LAUNCHGATE_SIGNER_KEY");
        }
        if missing.is_empty() {
            None
        } else {
            Some(format!("missing {}", missing.join(", ")))
        }
    }

    pub fn gate_config(&self) -> GateConfig {
        GateConfig {
            cooldown: Duration::from_secs(self.gate.cooldown_secs),
            min_confidence: self.gate.min_confidence,
            reserve: self.gate.reserve_sol,
            min_action_floor: self.gate.min_action_sol,
            dedup_ttl: Duration::from_secs(self.gate.dedup_ttl_secs),
        }
    }

    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            interval: Duration::from_secs(self.tracker.interval_secs.max(1)),
            max_concurrency: self.tracker.max_concurrency.max(1),
            policy: ExitPolicy {
                take_profit_pct: self.tracker.take_profit_pct,
                stop_loss_pct: self.tracker.stop_loss_pct,
                dead_window_hours: self.tracker.dead_window_hours,
                dead_min_roi_pct: self.tracker.dead_min_roi_pct,
            },
        }
    }

    pub fn summary_config(&self) -> SummaryConfig {
        SummaryConfig {
            recent_window: self.summary.recent_window.max(1),
            max_learnings: self.summary.max_learnings,
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.persistence.data_dir)
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}
