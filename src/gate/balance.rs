//! Balance guard: headroom above a fixed reserve

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::WalletError;

/// Source of the spendable balance (SOL)
#[async_trait]
pub trait WalletBalance: Send + Sync {
    async fn spendable_balance(&self) -> Result<f64, WalletError>;
}

/// Outcome of a balance query
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BalanceCheck {
    pub spendable: f64,
    /// `max(0, spendable - reserve)`
    pub available: f64,
    /// `available >= min_action_floor`
    pub sufficient: bool,
    pub reserve: f64,
}

impl BalanceCheck {
    pub fn covers(&self, requested: f64) -> bool {
        self.sufficient && self.available >= requested
    }
}

/// Queries the wallet on every call; results are never cached
pub struct BalanceGuard {
    wallet: Arc<dyn WalletBalance>,
    reserve: f64,
    min_action_floor: f64,
}

impl BalanceGuard {
    pub fn new(wallet: Arc<dyn WalletBalance>, reserve: f64, min_action_floor: f64) -> Self {
        Self {
            wallet,
            reserve: reserve.max(0.0),
            min_action_floor: min_action_floor.max(0.0),
        }
    }

    pub async fn check(&self) -> Result<BalanceCheck, WalletError> {
        let spendable = self.wallet.spendable_balance().await?;
        Ok(self.evaluate(spendable))
    }

    /// Pure headroom computation
    pub fn evaluate(&self, spendable: f64) -> BalanceCheck {
        let spendable = if spendable.is_finite() {
            spendable.max(0.0)
        } else {
            0.0
        };
        let available = (spendable - self.reserve).max(0.0);
        BalanceCheck {
            spendable,
            available,
            sufficient: available >= self.min_action_floor,
            reserve: self.reserve,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedWallet(f64);

    #[async_trait]
    impl WalletBalance for FixedWallet {
        async fn spendable_balance(&self) -> Result<f64, WalletError> {
            Ok(self.0)
        }
    }

    #[tokio::test]
    async fn reserve_eats_nominal_balance() {
        let guard = BalanceGuard::new(Arc::new(FixedWallet(0.32)), 0.3, 0.01);
        let check = guard.check().await.unwrap();
        assert!((check.available - 0.02).abs() < 1e-9);
        assert!(check.sufficient);
        assert!(!check.covers(0.05));
        assert!(check.covers(0.015));
    }

    #[test]
    fn headroom_never_negative() {
        let guard = BalanceGuard::new(Arc::new(FixedWallet(0.0)), 0.3, 0.01);
        let check = guard.evaluate(0.1);
        assert_eq!(check.available, 0.0);
        assert!(!check.sufficient);

        let check = guard.evaluate(f64::NAN);
        assert_eq!(check.spendable, 0.0);
        assert!(!check.sufficient);
    }

    #[test]
    fn floor_is_inclusive() {
        let guard = BalanceGuard::new(Arc::new(FixedWallet(0.0)), 0.5, 0.25);
        assert!(guard.evaluate(0.75).sufficient);
        assert!(!guard.evaluate(0.74).sufficient);
    }
}
