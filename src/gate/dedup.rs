//! Trigger dedup cache
//!
//! Two-tier read: the in-memory set answers first, the deployment store is
//! consulted on every miss so the cache can never yield a false negative.
//! The whole set is rebuilt from the store once it is older than the TTL,
//! which bounds staleness independently of query volume.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::persistence::DeploymentStore;

/// Label reported for a trigger whose deployment is still executing
pub const IN_FLIGHT_LABEL: &str = "in-flight";

/// Canonical dedup key for a trigger reference.
///
/// Post URLs (`.../status/<id>`) and bare numeric ids map to the numeric id.
/// Anything else is not deduplicable and yields `None`.
pub fn normalize_trigger(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Some(trimmed.to_string());
    }

    for marker in ["/status/", "/statuses/"] {
        if let Some(pos) = trimmed.find(marker) {
            let id: String = trimmed[pos + marker.len()..]
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            if !id.is_empty() {
                return Some(id);
            }
        }
    }
    None
}

/// Result of a dedup lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupCheck {
    pub duplicate: bool,
    pub existing_label: Option<String>,
    /// Canonical key, `None` when the reference is not deduplicable
    pub key: Option<String>,
}

impl DedupCheck {
    fn fresh(key: Option<String>) -> Self {
        Self {
            duplicate: false,
            existing_label: None,
            key,
        }
    }

    fn hit(key: String, label: String) -> Self {
        Self {
            duplicate: true,
            existing_label: Some(label),
            key: Some(key),
        }
    }
}

/// In-memory projection of the trigger keys in the deployment store
#[derive(Debug)]
pub struct DedupCache {
    /// trigger key -> record label
    entries: HashMap<String, String>,
    /// Keys admitted but not yet executed
    in_flight: HashMap<String, String>,
    refreshed_at: Option<DateTime<Utc>>,
    ttl: Duration,
}

impl DedupCache {
    pub fn new(ttl: std::time::Duration) -> Self {
        Self {
            entries: HashMap::new(),
            in_flight: HashMap::new(),
            refreshed_at: None,
            ttl: Duration::from_std(ttl).unwrap_or_else(|_| Duration::seconds(300)),
        }
    }

    /// True when the set has never been loaded or is older than the TTL
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        match self.refreshed_at {
            Some(at) => now - at > self.ttl,
            None => true,
        }
    }

    /// Reload every trigger key from the store.
    ///
    /// Entries are only ever added: keys confirmed in memory but not yet
    /// persisted survive the rebuild. On error the previous state is kept and
    /// `refreshed_at` is left untouched so the next lookup retries.
    pub async fn rebuild(
        &mut self,
        store: &dyn DeploymentStore,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let records = store.list_all().await?;
        let before = self.entries.len();
        for record in records {
            if let Some(key) = record.trigger_key.clone() {
                self.entries.insert(key, record.label());
            }
        }
        self.refreshed_at = Some(now);
        let added = self.entries.len() - before;
        info!(
            entries = self.entries.len(),
            added,
            "[DEDUP] Cache rebuilt from deployment store"
        );
        Ok(added)
    }

    /// Look up a raw trigger reference.
    ///
    /// Never fails: a store outage degrades to the last refreshed state and
    /// is logged as a correctness risk.
    pub async fn check(
        &mut self,
        trigger_ref: &str,
        store: &dyn DeploymentStore,
        now: DateTime<Utc>,
    ) -> DedupCheck {
        let Some(key) = normalize_trigger(trigger_ref) else {
            debug!(trigger = %trigger_ref, "[DEDUP] Trigger not deduplicable");
            return DedupCheck::fresh(None);
        };

        if self.is_stale(now) {
            if let Err(e) = self.rebuild(store, now).await {
                warn!(
                    reconcile = true,
                    error = %e,
                    entries = self.entries.len(),
                    "[DEDUP] Rebuild failed, serving last known state"
                );
            }
        }

        if let Some(label) = self.entries.get(&key) {
            return DedupCheck::hit(key, label.clone());
        }
        if self.in_flight.contains_key(&key) {
            return DedupCheck::hit(key, IN_FLIGHT_LABEL.to_string());
        }

        match store.find_by_trigger(&key).await {
            Ok(Some(record)) => {
                let label = record.label();
                self.entries.insert(key.clone(), label.clone());
                DedupCheck::hit(key, label)
            }
            Ok(None) => DedupCheck::fresh(Some(key)),
            Err(e) => {
                warn!(
                    reconcile = true,
                    key = %key,
                    error = %e,
                    "[DEDUP] Store lookup failed, answering from cache only"
                );
                DedupCheck::fresh(Some(key))
            }
        }
    }

    /// Hold a key while its deployment executes
    pub fn reserve(&mut self, key: &str, symbol: &str) {
        self.in_flight.insert(key.to_string(), symbol.to_string());
    }

    /// Promote a reserved key to a permanent entry
    pub fn confirm(&mut self, key: &str, label: String) {
        self.in_flight.remove(key);
        self.entries.insert(key.to_string(), label);
    }

    /// Drop a reservation after a failed execution
    pub fn release(&mut self, key: &str) {
        self.in_flight.remove(key);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key) || self.in_flight.contains_key(key)
    }
}
