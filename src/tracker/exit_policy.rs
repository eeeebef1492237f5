//! Exit policy - pure hold/sell decision
//!
//! Thresholds are strict: a position sitting exactly on a threshold is held
//! and reconsidered next cycle.

use serde::{Deserialize, Serialize};

/// Exit thresholds (percentages)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExitPolicy {
    /// Sell when ROI rises above this (e.g. 100.0 = doubled)
    pub take_profit_pct: f64,
    /// Sell when ROI falls below this (negative)
    pub stop_loss_pct: f64,
    /// Hours without trades before the dead-token exit applies
    pub dead_window_hours: f64,
    /// A dead token is only exited above this ROI
    pub dead_min_roi_pct: f64,
}

impl Default for ExitPolicy {
    fn default() -> Self {
        Self {
            take_profit_pct: 100.0,
            stop_loss_pct: -50.0,
            dead_window_hours: 24.0,
            dead_min_roi_pct: 5.0,
        }
    }
}

/// Exit reason
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    Inactive,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::TakeProfit => write!(f, "TAKE_PROFIT"),
            ExitReason::StopLoss => write!(f, "STOP_LOSS"),
            ExitReason::Inactive => write!(f, "INACTIVE"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitDecision {
    Hold,
    Sell(ExitReason),
}

impl ExitPolicy {
    pub fn evaluate(&self, roi_pct: f64, inactivity_hours: f64) -> ExitDecision {
        if !roi_pct.is_finite() {
            return ExitDecision::Hold;
        }
        if roi_pct > self.take_profit_pct {
            return ExitDecision::Sell(ExitReason::TakeProfit);
        }
        if roi_pct < self.stop_loss_pct {
            return ExitDecision::Sell(ExitReason::StopLoss);
        }
        if inactivity_hours > self.dead_window_hours && roi_pct > self.dead_min_roi_pct {
            return ExitDecision::Sell(ExitReason::Inactive);
        }
        ExitDecision::Hold
    }
}

/// ROI in percent: `(value + fees - spend) / spend * 100`, zero without spend
pub fn compute_roi(current_value: f64, fees: f64, initial_spend: f64) -> f64 {
    if initial_spend <= 0.0 || !initial_spend.is_finite() {
        return 0.0;
    }
    (current_value + fees - initial_spend) / initial_spend * 100.0
}
