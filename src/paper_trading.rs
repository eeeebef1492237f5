//! Paper venue
//!
//! Simulated wallet, executor and market data source for running the whole
//! deploy/track loop without moving real funds.
//!
//! - **Virtual balance**: deploys debit spend plus fee, sells credit proceeds
//! - **Random-walk prices**: each quote moves the price by up to `volatility`
//! - **Simulated activity**: holder counts drift and creator fees accrue on trades
//! - **State persistence**: saves/loads state to JSON for recovery on restart

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::info;

use crate::error::{ExecutorError, MarketDataError, WalletError};
use crate::execution::{ExecutionReceipt, Executor};
use crate::gate::WalletBalance;
use crate::market::{MarketDataProvider, Quote};
use crate::types::{ActionSpec, DeploySpec, SellSpec};

/// Share of simulated trade volume paid to the creator
const CREATOR_FEE_RATE: f64 = 0.01;

/// Paper venue configuration
#[derive(Debug, Clone)]
pub struct PaperConfig {
    /// Starting balance (SOL)
    pub initial_balance: f64,
    /// Fee charged on deploys and sells, in basis points
    pub fee_bps: f64,
    /// Max relative price move per quote (0.08 = 8%)
    pub volatility: f64,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            initial_balance: 2.0,
            fee_bps: 100.0,
            volatility: 0.08,
        }
    }
}

/// Simulated token launched on the paper venue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperToken {
    pub mint: String,
    pub symbol: String,
    pub price: f64,
    /// Tokens held by the deployer
    pub held: f64,
    pub initial_spend: f64,
    pub holders: u64,
    pub fees: f64,
    pub created_at: DateTime<Utc>,
    pub last_trade_at: DateTime<Utc>,
    pub sold: bool,
}

/// Serializable venue state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperState {
    pub balance: f64,
    pub tokens: HashMap<String, PaperToken>,
    pub deploys: u32,
    pub sells: u32,
    pub saved_at: i64,
}

impl PaperState {
    fn fresh(balance: f64) -> Self {
        Self {
            balance,
            tokens: HashMap::new(),
            deploys: 0,
            sells: 0,
            saved_at: 0,
        }
    }
}

pub struct PaperVenue {
    config: PaperConfig,
    state: RwLock<PaperState>,
    state_file: Option<PathBuf>,
}

impl PaperVenue {
    pub fn new(config: PaperConfig) -> Self {
        let state = PaperState::fresh(config.initial_balance);
        Self {
            config,
            state: RwLock::new(state),
            state_file: None,
        }
    }

    pub fn with_state_file(mut self, path: PathBuf) -> Self {
        self.state_file = Some(path);
        self
    }

    fn read(&self) -> RwLockReadGuard<'_, PaperState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, PaperState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn balance(&self) -> f64 {
        self.read().balance
    }

    pub fn token(&self, mint: &str) -> Option<PaperToken> {
        self.read().tokens.get(mint).cloned()
    }

    /// Save state to the configured JSON file
    pub fn save_state(&self) -> Result<()> {
        let Some(path) = &self.state_file else {
            return Ok(());
        };
        let mut state = self.read().clone();
        state.saved_at = Utc::now().timestamp_millis();
        let json = serde_json::to_string_pretty(&state)?;
        fs::write(path, json)?;
        info!(path = %path.display(), balance = state.balance, "💾 [PAPER] State saved");
        Ok(())
    }

    /// Load state from the configured JSON file, if present
    pub fn load_state(&self) -> Result<()> {
        let Some(path) = &self.state_file else {
            return Ok(());
        };
        if !path.exists() {
            info!(path = %path.display(), "💾 [PAPER] No state file found, starting fresh");
            return Ok(());
        }
        let json = fs::read_to_string(path)?;
        let state: PaperState = serde_json::from_str(&json)?;
        info!(
            path = %path.display(),
            balance = state.balance,
            tokens = state.tokens.len(),
            deploys = state.deploys,
            "💾 [PAPER] State loaded"
        );
        *self.write() = state;
        Ok(())
    }

    fn fee(&self, amount: f64) -> f64 {
        amount * self.config.fee_bps / 10_000.0
    }

    fn deploy(&self, spec: &DeploySpec) -> Result<ExecutionReceipt, ExecutorError> {
        let need = spec.spend + self.fee(spec.spend);
        let mut state = self.write();
        if state.balance < need {
            return Err(ExecutorError::InsufficientFunds {
                have: state.balance,
                need,
            });
        }

        let mut rng = rand::thread_rng();
        let price = rng.gen_range(0.000_000_5..0.000_005);
        let held = spec.spend / price;
        let mint = format!("paper{}", uuid::Uuid::new_v4().simple());
        let now = Utc::now();

        state.balance -= need;
        state.deploys += 1;
        state.tokens.insert(
            mint.clone(),
            PaperToken {
                mint: mint.clone(),
                symbol: spec.symbol.clone(),
                price,
                held,
                initial_spend: spec.spend,
                holders: 1,
                fees: 0.0,
                created_at: now,
                last_trade_at: now,
                sold: false,
            },
        );
        info!(
            mint = %mint,
            symbol = %spec.symbol,
            spend = spec.spend,
            balance = state.balance,
            "📝 [PAPER] Token deployed"
        );

        Ok(ExecutionReceipt {
            reference: format!("paper-deploy-{}", uuid::Uuid::new_v4().simple()),
            mint: Some(mint),
            token_amount: Some(held),
            proceeds: None,
        })
    }

    fn sell(&self, spec: &SellSpec) -> Result<ExecutionReceipt, ExecutorError> {
        let fee_rate = self.config.fee_bps / 10_000.0;
        let mut state = self.write();
        let Some(token) = state.tokens.get_mut(&spec.mint) else {
            return Err(ExecutorError::Rejected(format!("unknown mint {}", spec.mint)));
        };
        if token.sold {
            return Err(ExecutorError::Rejected(format!("{} already sold", spec.mint)));
        }

        let amount = spec.token_amount.min(token.held).max(0.0);
        let proceeds = amount * token.price * (1.0 - fee_rate);
        token.held -= amount;
        token.sold = true;
        token.last_trade_at = Utc::now();
        let symbol = token.symbol.clone();

        state.balance += proceeds;
        state.sells += 1;
        info!(
            mint = %spec.mint,
            symbol = %symbol,
            reason = %spec.reason,
            proceeds,
            balance = state.balance,
            "📝 [PAPER] Position sold"
        );

        Ok(ExecutionReceipt {
            reference: format!("paper-sell-{}", uuid::Uuid::new_v4().simple()),
            mint: Some(spec.mint.clone()),
            token_amount: Some(amount),
            proceeds: Some(proceeds),
        })
    }

    /// Advance the token's random walk and report it
    fn simulate_quote(&self, mint: &str) -> Result<Quote, MarketDataError> {
        let volatility = self.config.volatility.max(0.0);
        let mut state = self.write();
        let Some(token) = state.tokens.get_mut(mint) else {
            return Err(MarketDataError::Unavailable {
                mint: mint.to_string(),
                reason: "unknown paper token".to_string(),
            });
        };

        let mut rng = rand::thread_rng();
        if volatility > 0.0 {
            let step: f64 = rng.gen_range(-volatility..volatility);
            token.price = (token.price * (1.0 + step)).max(0.0);
        }

        // Roughly one quote in five sees no trading
        if rng.gen_bool(0.8) {
            let volume = token.initial_spend * rng.gen_range(0.0..0.5);
            token.fees += volume * CREATOR_FEE_RATE;
            token.last_trade_at = Utc::now();
            let drift: i64 = rng.gen_range(-2..=5);
            token.holders = (token.holders as i64 + drift).max(0) as u64;
        }

        let supply = 1_000_000_000.0;
        Ok(Quote {
            price: Some(token.price),
            market_cap: Some(token.price * supply),
            holders: Some(token.holders),
            fees: Some(token.fees),
            last_trade_at: Some(token.last_trade_at),
        })
    }
}

#[async_trait]
impl Executor for PaperVenue {
    async fn execute(&self, action: &ActionSpec) -> Result<ExecutionReceipt, ExecutorError> {
        match action {
            ActionSpec::Deploy(spec) => self.deploy(spec),
            ActionSpec::Sell(spec) => self.sell(spec),
        }
    }
}

#[async_trait]
impl WalletBalance for PaperVenue {
    async fn spendable_balance(&self) -> Result<f64, WalletError> {
        Ok(self.balance())
    }
}

#[async_trait]
impl MarketDataProvider for PaperVenue {
    async fn quote(&self, mint: &str) -> Result<Quote, MarketDataError> {
        self.simulate_quote(mint)
    }
}
