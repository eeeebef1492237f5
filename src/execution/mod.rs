//! Executor seam
//!
//! Every irreversible action (token deploy, sell) goes through an
//! [`Executor`]. Callers invoke it at most once per admitted action and never
//! retry; the next proposal or tracker tick is the retry mechanism.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ExecutorError, MarketDataError, WalletError};
use crate::gate::WalletBalance;
use crate::market::{MarketDataProvider, Quote};
use crate::types::ActionSpec;

/// Settlement details of a completed action
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExecutionReceipt {
    /// Settlement reference (transaction signature)
    pub reference: String,
    /// Mint of a freshly deployed asset
    pub mint: Option<String>,
    /// Tokens received on deploy
    pub token_amount: Option<f64>,
    /// SOL received on sell
    pub proceeds: Option<f64>,
}

/// Performs irreversible transfers/trades
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, action: &ActionSpec) -> Result<ExecutionReceipt, ExecutorError>;
}

/// Stand-in used when no live venue is available to this process.
///
/// Every call fails, so the gate and tracker keep running and report the
/// missing capability per request.
#[derive(Debug, Clone)]
pub struct UnconfiguredVenue {
    reason: String,
}

impl UnconfiguredVenue {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Executor for UnconfiguredVenue {
    async fn execute(&self, action: &ActionSpec) -> Result<ExecutionReceipt, ExecutorError> {
        tracing::warn!(action = action.kind(), reason = %self.reason, "Executor not configured");
        Err(ExecutorError::NotConfigured(self.reason.clone()))
    }
}

#[async_trait]
impl WalletBalance for UnconfiguredVenue {
    async fn spendable_balance(&self) -> Result<f64, WalletError> {
        Err(WalletError::NotConfigured)
    }
}

#[async_trait]
impl MarketDataProvider for UnconfiguredVenue {
    async fn quote(&self, mint: &str) -> Result<Quote, MarketDataError> {
        Err(MarketDataError::Unavailable {
            mint: mint.to_string(),
            reason: self.reason.clone(),
        })
    }
}
