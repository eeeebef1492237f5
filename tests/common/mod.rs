//! Shared fakes and mocks for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use launchgate::error::{ExecutorError, MarketDataError, StoreError, WalletError};
use launchgate::execution::{ExecutionReceipt, Executor};
use launchgate::gate::WalletBalance;
use launchgate::market::{MarketDataProvider, Quote};
use launchgate::persistence::{CsvDeploymentStore, DeploymentStore};
use launchgate::types::{ActionSpec, DeploySpec, DeploymentRecord, Performance, Strategy};
use mockall::mock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

mock! {
    pub Wallet {}

    #[async_trait]
    impl WalletBalance for Wallet {
        async fn spendable_balance(&self) -> Result<f64, WalletError>;
    }
}

mock! {
    pub Market {}

    #[async_trait]
    impl MarketDataProvider for Market {
        async fn quote(&self, mint: &str) -> Result<Quote, MarketDataError>;
    }
}

mock! {
    pub Exec {}

    #[async_trait]
    impl Executor for Exec {
        async fn execute(&self, action: &ActionSpec) -> Result<ExecutionReceipt, ExecutorError>;
    }
}

/// In-memory store whose reads or writes can be switched off
pub struct FlakyStore {
    inner: CsvDeploymentStore,
    pub fail_saves: AtomicBool,
    pub fail_reads: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: CsvDeploymentStore::ephemeral(),
            fail_saves: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
        }
    }

    fn read_guard(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DeploymentStore for FlakyStore {
    async fn save(&self, record: &DeploymentRecord) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("disk full".to_string()));
        }
        self.inner.save(record).await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<DeploymentRecord>, StoreError> {
        self.read_guard()?;
        self.inner.find_by_id(id).await
    }

    async fn find_by_trigger(
        &self,
        trigger_key: &str,
    ) -> Result<Option<DeploymentRecord>, StoreError> {
        self.read_guard()?;
        self.inner.find_by_trigger(trigger_key).await
    }

    async fn list_active(&self) -> Result<Vec<DeploymentRecord>, StoreError> {
        self.read_guard()?;
        self.inner.list_active().await
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<DeploymentRecord>, StoreError> {
        self.read_guard()?;
        self.inner.list_recent(limit).await
    }

    async fn list_all(&self) -> Result<Vec<DeploymentRecord>, StoreError> {
        self.read_guard()?;
        self.inner.list_all().await
    }
}

/// Executor that succeeds after an optional delay and counts calls
pub struct SlowExecutor {
    pub delay: Duration,
    pub calls: AtomicUsize,
    pub proceeds: Option<f64>,
}

impl SlowExecutor {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            calls: AtomicUsize::new(0),
            proceeds: None,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Executor for SlowExecutor {
    async fn execute(&self, action: &ActionSpec) -> Result<ExecutionReceipt, ExecutorError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(match action {
            ActionSpec::Deploy(_) => ExecutionReceipt {
                reference: format!("deploy-sig-{}", n),
                mint: Some(format!("mint-{}", n)),
                token_amount: Some(1_000_000.0),
                proceeds: None,
            },
            ActionSpec::Sell(sell) => ExecutionReceipt {
                reference: format!("sell-sig-{}", n),
                mint: Some(sell.mint.clone()),
                token_amount: Some(sell.token_amount),
                proceeds: self.proceeds,
            },
        })
    }
}

pub fn proposal(symbol: &str, trigger: Option<&str>) -> DeploySpec {
    DeploySpec {
        name: format!("{} Token", symbol),
        symbol: symbol.to_string(),
        strategy: Strategy::ViralMoment,
        description: Some("test".to_string()),
        image_uri: None,
        trigger_ref: trigger.map(str::to_string),
        spend: 0.05,
        confidence: 85.0,
    }
}

/// Active record: 1 SOL for 1000 tokens
pub fn active_record(id: &str, strategy: Strategy) -> DeploymentRecord {
    DeploymentRecord {
        id: id.to_string(),
        mint: format!("mint-{}", id),
        name: format!("{} Token", id),
        symbol: id.to_uppercase(),
        strategy,
        trigger_ref: None,
        trigger_key: None,
        created_at: Utc::now(),
        initial_spend: 1.0,
        token_amount: 1000.0,
        confidence: 80.0,
        deploy_reference: Some(format!("sig-{}", id)),
        performance: Performance::default(),
    }
}

pub fn quote(price: f64) -> Quote {
    Quote {
        price: Some(price),
        market_cap: Some(price * 1_000_000_000.0),
        holders: Some(25),
        fees: None,
        last_trade_at: Some(Utc::now()),
    }
}
