//! CSV Persistence Module
//!
//! Append-only storage of deployment records and the action history.
//! The deployment log is the source of truth: every other view (dedup cache,
//! positions, rolling summary) is rebuilt from it.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex as AsyncMutex, RwLock as AsyncRwLock};
use tracing::{error, info, warn};

use crate::error::StoreError;
use crate::types::{DeploymentRecord, Outcome, Performance, Strategy};

const DEPLOYMENTS_DIR: &str = "deployments";
const DEPLOYMENTS_FILE: &str = "deployments.csv";
const HISTORY_DIR: &str = "history";
const HISTORY_FILE: &str = "actions.csv";

/// Persistent store of deployment records
#[async_trait]
pub trait DeploymentStore: Send + Sync {
    /// Append a record version; the latest version of an id supersedes older ones
    async fn save(&self, record: &DeploymentRecord) -> Result<(), StoreError>;

    /// Latest version of one record
    async fn find_by_id(&self, id: &str) -> Result<Option<DeploymentRecord>, StoreError>;

    /// Point lookup by canonical trigger key
    async fn find_by_trigger(
        &self,
        trigger_key: &str,
    ) -> Result<Option<DeploymentRecord>, StoreError>;

    /// All records whose latest version is still active
    async fn list_active(&self) -> Result<Vec<DeploymentRecord>, StoreError>;

    /// Latest versions, newest deployment first
    async fn list_recent(&self, limit: usize) -> Result<Vec<DeploymentRecord>, StoreError>;

    /// Latest version of every record, oldest deployment first
    async fn list_all(&self) -> Result<Vec<DeploymentRecord>, StoreError>;
}

/// Flat CSV row for a deployment record version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRow {
    pub id: String,
    pub mint: String,
    pub name: String,
    pub symbol: String,
    pub strategy: String,
    pub trigger_ref: Option<String>,
    pub trigger_key: Option<String>,
    pub created_at: i64,
    pub initial_spend: f64,
    pub token_amount: f64,
    pub confidence: f64,
    pub deploy_reference: Option<String>,
    pub current_value: f64,
    pub peak_value: f64,
    pub holders: u64,
    pub fees_accrued: f64,
    pub profit: f64,
    pub outcome: String,
    pub updated_at: Option<i64>,
}

impl From<&DeploymentRecord> for DeploymentRow {
    fn from(record: &DeploymentRecord) -> Self {
        Self {
            id: record.id.clone(),
            mint: record.mint.clone(),
            name: record.name.clone(),
            symbol: record.symbol.clone(),
            strategy: record.strategy.as_str().to_string(),
            trigger_ref: record.trigger_ref.clone(),
            trigger_key: record.trigger_key.clone(),
            created_at: record.created_at.timestamp_millis(),
            initial_spend: record.initial_spend,
            token_amount: record.token_amount,
            confidence: record.confidence,
            deploy_reference: record.deploy_reference.clone(),
            current_value: record.performance.current_value,
            peak_value: record.performance.peak_value,
            holders: record.performance.holders,
            fees_accrued: record.performance.fees_accrued,
            profit: record.performance.profit,
            outcome: record.performance.outcome.as_str().to_string(),
            updated_at: record.performance.updated_at.map(|t| t.timestamp_millis()),
        }
    }
}

impl TryFrom<DeploymentRow> for DeploymentRecord {
    type Error = StoreError;

    fn try_from(row: DeploymentRow) -> Result<Self, Self::Error> {
        let strategy = Strategy::from_str(&row.strategy)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown strategy {}", row.strategy)))?;
        let outcome = Outcome::from_str(&row.outcome)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown outcome {}", row.outcome)))?;
        let created_at = millis_to_datetime(row.created_at)
            .ok_or_else(|| StoreError::Corrupt(format!("bad created_at {}", row.created_at)))?;

        Ok(DeploymentRecord {
            id: row.id,
            mint: row.mint,
            name: row.name,
            symbol: row.symbol,
            strategy,
            trigger_ref: row.trigger_ref.filter(|s| !s.is_empty()),
            trigger_key: row.trigger_key.filter(|s| !s.is_empty()),
            created_at,
            initial_spend: row.initial_spend,
            token_amount: row.token_amount,
            confidence: row.confidence,
            deploy_reference: row.deploy_reference.filter(|s| !s.is_empty()),
            performance: Performance {
                current_value: row.current_value,
                peak_value: row.peak_value,
                holders: row.holders,
                fees_accrued: row.fees_accrued,
                profit: row.profit,
                outcome,
                updated_at: row.updated_at.and_then(millis_to_datetime),
            },
        })
    }
}

fn millis_to_datetime(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

/// Latest-version index over the append-only log
#[derive(Debug, Default)]
struct StoreIndex {
    records: HashMap<String, DeploymentRecord>,
    /// Ids in first-seen order
    order: Vec<String>,
    /// trigger key -> record id
    by_trigger: HashMap<String, String>,
}

impl StoreIndex {
    fn apply(&mut self, record: DeploymentRecord) {
        if !self.records.contains_key(&record.id) {
            self.order.push(record.id.clone());
        }
        if let Some(key) = &record.trigger_key {
            self.by_trigger.insert(key.clone(), record.id.clone());
        }
        self.records.insert(record.id.clone(), record);
    }

    fn ordered(&self) -> Vec<DeploymentRecord> {
        let mut out: Vec<DeploymentRecord> = self
            .order
            .iter()
            .filter_map(|id| self.records.get(id).cloned())
            .collect();
        out.sort_by_key(|r| r.created_at);
        out
    }
}

/// CSV-backed deployment store.
///
/// Every `save` appends one row; on open the log is replayed so the latest
/// version of each id wins.
pub struct CsvDeploymentStore {
    path: Option<PathBuf>,
    writer: Option<AsyncMutex<csv::Writer<std::fs::File>>>,
    index: AsyncRwLock<StoreIndex>,
}

impl CsvDeploymentStore {
    /// Open (or create) the deployment log under `data_dir`
    pub fn open(data_dir: &Path) -> Result<Self> {
        let dir = data_dir.join(DEPLOYMENTS_DIR);
        fs::create_dir_all(&dir).context("Failed to create deployments directory")?;
        let path = dir.join(DEPLOYMENTS_FILE);

        let mut index = StoreIndex::default();
        let mut rows = 0usize;
        let mut skipped = 0usize;
        if path.exists() {
            let file = std::fs::File::open(&path).context("Failed to open deployment log")?;
            let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);
            for result in reader.deserialize::<DeploymentRow>() {
                rows += 1;
                match result
                    .map_err(StoreError::from)
                    .and_then(DeploymentRecord::try_from)
                {
                    Ok(record) => index.apply(record),
                    Err(e) => {
                        skipped += 1;
                        warn!(error = %e, path = %path.display(), "Skipping unreadable deployment row");
                    }
                }
            }
        }

        let writer = create_writer(&path)?;
        info!(
            path = %path.display(),
            rows,
            skipped,
            records = index.records.len(),
            "💾 Deployment log loaded"
        );

        Ok(Self {
            path: Some(path),
            writer: Some(AsyncMutex::new(writer)),
            index: AsyncRwLock::new(index),
        })
    }

    /// In-memory store with no backing file
    pub fn ephemeral() -> Self {
        Self {
            path: None,
            writer: None,
            index: AsyncRwLock::new(StoreIndex::default()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

#[async_trait]
impl DeploymentStore for CsvDeploymentStore {
    async fn save(&self, record: &DeploymentRecord) -> Result<(), StoreError> {
        // Log append and index update happen under the same writer guard
        let mut guard = match &self.writer {
            Some(writer) => Some(writer.lock().await),
            None => None,
        };
        if let Some(writer) = guard.as_mut() {
            writer.serialize(DeploymentRow::from(record))?;
            writer.flush()?;
        }
        self.index.write().await.apply(record.clone());
        drop(guard);
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<DeploymentRecord>, StoreError> {
        Ok(self.index.read().await.records.get(id).cloned())
    }

    async fn find_by_trigger(
        &self,
        trigger_key: &str,
    ) -> Result<Option<DeploymentRecord>, StoreError> {
        let index = self.index.read().await;
        Ok(index
            .by_trigger
            .get(trigger_key)
            .and_then(|id| index.records.get(id))
            .filter(|r| r.trigger_key.as_deref() == Some(trigger_key))
            .cloned())
    }

    async fn list_active(&self) -> Result<Vec<DeploymentRecord>, StoreError> {
        let index = self.index.read().await;
        Ok(index.ordered().into_iter().filter(|r| r.is_active()).collect())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<DeploymentRecord>, StoreError> {
        let index = self.index.read().await;
        let mut records = index.ordered();
        records.reverse();
        records.truncate(limit);
        Ok(records)
    }

    async fn list_all(&self) -> Result<Vec<DeploymentRecord>, StoreError> {
        Ok(self.index.read().await.ordered())
    }
}

/// Records whose write-back failed after the external action completed.
///
/// Money already moved for every entry here, so entries are never dropped
/// until the store accepts them.
#[derive(Debug, Default)]
pub struct ReconcileQueue {
    pending: AsyncMutex<Vec<DeploymentRecord>>,
}

impl ReconcileQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a record, replacing any older queued version of the same id
    pub async fn push(&self, record: DeploymentRecord, cause: &str) {
        error!(
            reconcile = true,
            id = %record.id,
            mint = %record.mint,
            outcome = %record.performance.outcome,
            cause = %cause,
            "Write-back failed after external action; queued for reconciliation"
        );
        let mut pending = self.pending.lock().await;
        pending.retain(|r| r.id != record.id);
        pending.push(record);
    }

    pub async fn pending(&self) -> Vec<DeploymentRecord> {
        self.pending.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pending.lock().await.is_empty()
    }

    pub async fn contains_mint(&self, mint: &str) -> bool {
        self.pending.lock().await.iter().any(|r| r.mint == mint)
    }

    /// Retry every queued write. Returns how many were persisted.
    pub async fn flush(&self, store: &dyn DeploymentStore) -> usize {
        let mut pending = self.pending.lock().await;
        if pending.is_empty() {
            return 0;
        }
        let mut still_pending = Vec::new();
        let mut flushed = 0usize;
        for record in pending.drain(..) {
            match store.save(&record).await {
                Ok(()) => {
                    flushed += 1;
                    info!(id = %record.id, mint = %record.mint, "Reconciled queued record");
                }
                Err(e) => {
                    warn!(reconcile = true, id = %record.id, error = %e, "Reconciliation write still failing");
                    still_pending.push(record);
                }
            }
        }
        *pending = still_pending;
        flushed
    }
}

/// Action history row (audit log)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionLogRecord {
    pub timestamp: i64,
    /// deploy, sell, dead
    pub action: String,
    pub mint: String,
    pub symbol: String,
    pub strategy: String,
    pub spend: f64,
    pub value: f64,
    pub fees: f64,
    pub profit: f64,
    pub roi_pct: f64,
    pub outcome: String,
    pub reference: Option<String>,
    pub detail: Option<String>,
}

/// Append-only CSV history of actions
pub struct ActionLog {
    path: Option<PathBuf>,
    writer: Option<AsyncMutex<csv::Writer<std::fs::File>>>,
}

impl ActionLog {
    pub fn open(data_dir: &Path) -> Result<Self> {
        let dir = data_dir.join(HISTORY_DIR);
        fs::create_dir_all(&dir).context("Failed to create history directory")?;
        let path = dir.join(HISTORY_FILE);
        let writer = create_writer(&path)?;
        Ok(Self {
            path: Some(path),
            writer: Some(AsyncMutex::new(writer)),
        })
    }

    pub fn ephemeral() -> Self {
        Self {
            path: None,
            writer: None,
        }
    }

    pub async fn append(&self, record: &ActionLogRecord) -> Result<()> {
        if let Some(writer) = &self.writer {
            let mut writer = writer.lock().await;
            writer
                .serialize(record)
                .context("Failed to write action record")?;
            writer.flush().context("Failed to flush action writer")?;
        }
        Ok(())
    }

    /// Load the full history (empty for ephemeral logs)
    pub fn load(&self) -> Result<Vec<ActionLogRecord>> {
        let Some(path) = &self.path else {
            return Ok(Vec::new());
        };
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = std::fs::File::open(path).context("Failed to open action history")?;
        let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);
        let mut records = Vec::new();
        for result in reader.deserialize() {
            let record: ActionLogRecord =
                result.context("Failed to deserialize action record")?;
            records.push(record);
        }
        records.sort_by_key(|r| r.timestamp);
        Ok(records)
    }
}

fn create_writer(path: &Path) -> Result<csv::Writer<std::fs::File>> {
    let file_has_data = path.exists() && fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false);

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .context("Failed to open CSV file")?;

    let writer = WriterBuilder::new()
        .has_headers(!file_has_data)
        .from_writer(file);

    Ok(writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("launchgate_store_{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn record(id: &str, trigger: Option<&str>, minutes_ago: i64) -> DeploymentRecord {
        DeploymentRecord {
            id: id.to_string(),
            mint: format!("mint-{}", id),
            name: format!("Token {}", id),
            symbol: id.to_uppercase(),
            strategy: Strategy::ViralMoment,
            trigger_ref: trigger.map(|t| format!("https://x.com/user/status/{}", t)),
            trigger_key: trigger.map(str::to_string),
            created_at: Utc::now() - Duration::minutes(minutes_ago),
            initial_spend: 0.1,
            token_amount: 1_000_000.0,
            confidence: 80.0,
            deploy_reference: Some(format!("sig-{}", id)),
            performance: Performance::default(),
        }
    }

    #[tokio::test]
    async fn latest_version_supersedes_after_reload() {
        let dir = temp_dir();
        {
            let store = CsvDeploymentStore::open(&dir).unwrap();
            let mut r = record("a", Some("111"), 10);
            store.save(&r).await.unwrap();
            r.performance.outcome = Outcome::Profitable;
            r.performance.profit = 0.05;
            store.save(&r).await.unwrap();
            store.save(&record("b", None, 5)).await.unwrap();
        }

        let store = CsvDeploymentStore::open(&dir).unwrap();
        let all = store.list_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, "a");
        assert_eq!(all[0].performance.outcome, Outcome::Profitable);

        let active = store.list_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "b");
        assert!(active[0].trigger_ref.is_none());

        let hit = store.find_by_trigger("111").await.unwrap();
        assert_eq!(hit.map(|r| r.id), Some("a".to_string()));
        assert!(store.find_by_trigger("999").await.unwrap().is_none());
        assert_eq!(
            store.find_by_id("a").await.unwrap().map(|r| r.performance.profit),
            Some(0.05)
        );

        let _ = fs::remove_dir_all(dir);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_saves_reload_to_the_indexed_version() {
        let dir = temp_dir();
        let store = std::sync::Arc::new(CsvDeploymentStore::open(&dir).unwrap());
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    let mut r = record("a", None, 1);
                    r.performance.profit = i as f64;
                    store.save(&r).await.unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let in_memory = store.find_by_id("a").await.unwrap().unwrap();
        drop(store);
        let reloaded = CsvDeploymentStore::open(&dir).unwrap();
        let on_disk = reloaded.find_by_id("a").await.unwrap().unwrap();
        assert_eq!(in_memory.performance.profit, on_disk.performance.profit);

        let _ = fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn list_recent_is_newest_first_and_limited() {
        let store = CsvDeploymentStore::ephemeral();
        store.save(&record("old", None, 30)).await.unwrap();
        store.save(&record("mid", None, 20)).await.unwrap();
        store.save(&record("new", None, 10)).await.unwrap();

        let recent = store.list_recent(2).await.unwrap();
        let ids: Vec<&str> = recent.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid"]);
    }

    #[test]
    fn ephemeral_store_starts_empty() {
        let store = CsvDeploymentStore::ephemeral();
        let all = tokio_test::block_on(store.list_all()).unwrap();
        assert!(all.is_empty());
        assert!(tokio_test::block_on(store.find_by_trigger("1")).unwrap().is_none());
    }

    #[tokio::test]
    async fn reconcile_queue_keeps_latest_version_and_flushes() {
        let queue = ReconcileQueue::new();
        let mut r = record("a", None, 1);
        queue.push(r.clone(), "disk full").await;
        r.performance.outcome = Outcome::Loss;
        queue.push(r.clone(), "disk full").await;
        assert_eq!(queue.len().await, 1);
        assert!(queue.contains_mint("mint-a").await);

        let store = CsvDeploymentStore::ephemeral();
        assert_eq!(queue.flush(&store).await, 1);
        assert!(queue.is_empty().await);
        let saved = store.list_all().await.unwrap();
        assert_eq!(saved[0].performance.outcome, Outcome::Loss);
    }

    #[tokio::test]
    async fn action_log_round_trips_from_disk() {
        let dir = temp_dir();
        let log = ActionLog::open(&dir).unwrap();
        let row = ActionLogRecord {
            timestamp: 1_700_000_000_000,
            action: "deploy".to_string(),
            mint: "mint-a".to_string(),
            symbol: "A".to_string(),
            strategy: "viral_moment".to_string(),
            spend: 0.1,
            value: 0.0,
            fees: 0.0,
            profit: 0.0,
            roi_pct: 0.0,
            outcome: "active".to_string(),
            reference: Some("sig".to_string()),
            detail: None,
        };
        log.append(&row).await.unwrap();
        let loaded = log.load().unwrap();
        assert_eq!(loaded, vec![row]);
        let _ = fs::remove_dir_all(dir);
    }
}
