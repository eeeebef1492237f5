//! Core types used throughout LaunchGate
//!
//! Defines deployment records, proposals, positions and admission outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Deployment strategy tags (closed set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Reacting to a single viral post
    ViralMoment,
    /// Riding a multi-post trend
    TrendRider,
    /// Original narrative with no external trigger
    Narrative,
    /// Low-size experiments
    Experimental,
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy::ViralMoment
    }
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::ViralMoment,
        Strategy::TrendRider,
        Strategy::Narrative,
        Strategy::Experimental,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::ViralMoment => "viral_moment",
            Strategy::TrendRider => "trend_rider",
            Strategy::Narrative => "narrative",
            Strategy::Experimental => "experimental",
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "viral_moment" | "viral" => Some(Strategy::ViralMoment),
            "trend_rider" | "trend" => Some(Strategy::TrendRider),
            "narrative" => Some(Strategy::Narrative),
            "experimental" | "experiment" => Some(Strategy::Experimental),
            _ => None,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle outcome of a deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Active,
    Profitable,
    Loss,
    Dead,
}

impl Default for Outcome {
    fn default() -> Self {
        Outcome::Active
    }
}

impl Outcome {
    pub fn is_closed(&self) -> bool {
        !matches!(self, Outcome::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Active => "active",
            Outcome::Profitable => "profitable",
            Outcome::Loss => "loss",
            Outcome::Dead => "dead",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "active" => Some(Outcome::Active),
            "profitable" => Some(Outcome::Profitable),
            "loss" => Some(Outcome::Loss),
            "dead" => Some(Outcome::Dead),
            _ => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Mutable performance sub-record of a deployment (amounts in SOL)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Performance {
    pub current_value: f64,
    pub peak_value: f64,
    pub holders: u64,
    pub fees_accrued: f64,
    /// Realized profit once closed, mark-to-market while active
    pub profit: f64,
    pub outcome: Outcome,
    pub updated_at: Option<DateTime<Utc>>,
}

/// One deployment, as appended to the store.
///
/// Identity fields never change; a new version of the record is appended
/// whenever `performance` changes and the latest version supersedes the rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub id: String,
    /// Asset identifier (mint address)
    pub mint: String,
    pub name: String,
    pub symbol: String,
    pub strategy: Strategy,
    /// Raw trigger reference as proposed (e.g. a post URL)
    pub trigger_ref: Option<String>,
    /// Canonical dedup key derived from `trigger_ref`
    pub trigger_key: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Initial spend in SOL
    pub initial_spend: f64,
    /// Token quantity received for the initial spend
    pub token_amount: f64,
    /// Confidence score [0, 100]
    pub confidence: f64,
    /// Settlement reference of the deploy transaction
    pub deploy_reference: Option<String>,
    pub performance: Performance,
}

impl DeploymentRecord {
    /// Human label used when surfacing dedup conflicts
    pub fn label(&self) -> String {
        format!("${} ({}) {}", self.symbol, self.name, self.mint)
    }

    pub fn is_active(&self) -> bool {
        self.performance.outcome == Outcome::Active
    }
}

/// Proposed deployment handed to the gate by the decision-maker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploySpec {
    pub name: String,
    pub symbol: String,
    #[serde(default)]
    pub strategy: Strategy,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_uri: Option<String>,
    /// External event that triggered the proposal (e.g. a post URL)
    #[serde(default)]
    pub trigger_ref: Option<String>,
    /// Requested spend in SOL
    pub spend: f64,
    /// Confidence score [0, 100]
    pub confidence: f64,
}

/// Sell instruction issued by the tracker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SellSpec {
    pub mint: String,
    pub token_amount: f64,
    pub reason: String,
}

/// Irreversible action delegated to the executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionSpec {
    Deploy(DeploySpec),
    Sell(SellSpec),
}

impl ActionSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            ActionSpec::Deploy(_) => "deploy",
            ActionSpec::Sell(_) => "sell",
        }
    }
}

/// Read-model of an active deployment, computed fresh every tracking cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub mint: String,
    pub symbol: String,
    pub strategy: Strategy,
    pub initial_spend: f64,
    pub token_amount: f64,
    pub price: f64,
    pub market_cap: f64,
    pub holders: u64,
    /// Holder change since the previous evaluation
    pub holder_delta: i64,
    pub current_value: f64,
    pub fees_collected: f64,
    /// ROI as a percentage
    pub roi_pct: f64,
    pub inactivity_hours: f64,
    pub evaluated_at: DateTime<Utc>,
    /// Set when this cycle could not evaluate the position
    pub last_error: Option<String>,
}

/// Machine-readable rejection reasons
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum RejectReason {
    Duplicate { existing_label: String },
    Cooldown { wait_secs: u64 },
    LowConfidence { confidence: f64, minimum: f64 },
    InsufficientFunds { available: f64, requested: f64 },
    NotConfigured,
    InvalidProposal,
    ShuttingDown,
}

impl RejectReason {
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::Duplicate { .. } => "duplicate",
            RejectReason::Cooldown { .. } => "cooldown",
            RejectReason::LowConfidence { .. } => "low_confidence",
            RejectReason::InsufficientFunds { .. } => "insufficient_funds",
            RejectReason::NotConfigured => "not_configured",
            RejectReason::InvalidProposal => "invalid_proposal",
            RejectReason::ShuttingDown => "shutting_down",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Result of proposing a deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AdmissionResult {
    /// Executed and recorded. `persisted` is false when the write-back failed
    /// and the record waits in the reconciliation queue.
    Admitted {
        record: DeploymentRecord,
        persisted: bool,
    },
    /// Never attempted
    Rejected { reason: RejectReason, detail: String },
    /// Attempted, executor failed
    Failed { error: String },
}

impl AdmissionResult {
    pub fn rejected(reason: RejectReason, detail: impl Into<String>) -> Self {
        AdmissionResult::Rejected {
            reason,
            detail: detail.into(),
        }
    }

    pub fn is_admitted(&self) -> bool {
        matches!(self, AdmissionResult::Admitted { .. })
    }

    pub fn reject_reason(&self) -> Option<&RejectReason> {
        match self {
            AdmissionResult::Rejected { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_parses_aliases() {
        assert_eq!(Strategy::from_str("viral"), Some(Strategy::ViralMoment));
        assert_eq!(Strategy::from_str("Trend-Rider"), Some(Strategy::TrendRider));
        assert_eq!(Strategy::from_str("unknown"), None);
    }

    #[test]
    fn rejection_serializes_with_code_tag() {
        let result = AdmissionResult::rejected(RejectReason::Cooldown { wait_secs: 140 }, "wait");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "rejected");
        assert_eq!(json["reason"]["code"], "cooldown");
        assert_eq!(json["reason"]["wait_secs"], 140);
    }

    #[test]
    fn only_active_outcome_is_open() {
        assert!(!Outcome::Active.is_closed());
        assert!(Outcome::Dead.is_closed());
        assert_eq!(Outcome::from_str("LOSS"), Some(Outcome::Loss));
    }
}
