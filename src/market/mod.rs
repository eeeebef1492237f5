//! Market data seam
//!
//! Providers may return partial or stale quotes. [`Quote::normalize`] turns
//! them into a [`MarketSnapshot`] where every missing field is zero, except
//! the price: a quote without a price cannot value a position.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MarketDataError;

/// Raw quote as reported by a provider
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Quote {
    /// Price per token in SOL
    pub price: Option<f64>,
    pub market_cap: Option<f64>,
    pub holders: Option<u64>,
    /// Fees accrued to the deployer in SOL
    pub fees: Option<f64>,
    pub last_trade_at: Option<DateTime<Utc>>,
}

/// Quote with conservative defaults applied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub price: f64,
    pub market_cap: f64,
    pub holders: u64,
    pub fees: f64,
    pub last_trade_at: Option<DateTime<Utc>>,
}

fn non_negative(v: Option<f64>) -> f64 {
    match v {
        Some(x) if x.is_finite() && x > 0.0 => x,
        _ => 0.0,
    }
}

impl Quote {
    pub fn normalize(&self, mint: &str) -> Result<MarketSnapshot, MarketDataError> {
        let price = match self.price {
            Some(p) if p.is_finite() => p.max(0.0),
            _ => return Err(MarketDataError::MissingPrice(mint.to_string())),
        };
        Ok(MarketSnapshot {
            price,
            market_cap: non_negative(self.market_cap),
            holders: self.holders.unwrap_or(0),
            fees: non_negative(self.fees),
            last_trade_at: self.last_trade_at,
        })
    }
}

impl MarketSnapshot {
    /// Hours since the last observed trade; zero when unknown
    pub fn inactivity_hours(&self, now: DateTime<Utc>) -> f64 {
        self.last_trade_at
            .map(|t| ((now - t).num_milliseconds() as f64 / 3_600_000.0).max(0.0))
            .unwrap_or(0.0)
    }
}

/// Source of per-asset market data
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn quote(&self, mint: &str) -> Result<Quote, MarketDataError>;
}
