//! Best-effort persistence of uploaded rows to a hosted database
//!
//! Rows are mapped to the storage schema (`ba`, `monthly`, `act_code`,
//! `amount`) and inserted in sequential batches of [`BATCH_SIZE`]. The first
//! failing batch stops the write; earlier batches stay committed.
//!
//! # Architecture
//!
//! - `TransactionStore` trait: one batch insert against some backend
//! - `StoreClient` enum: concrete wrapper (hosted REST store or in-memory)
//! - `PersistenceClient`: batching, disabled-mode short circuit, error mapping

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use crate::models::{Row, StorageRecord};

/// Records per insert request
pub const BATCH_SIZE: usize = 1000;

/// A backend that accepts batch inserts
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Insert one batch; the error message is the store's own
    async fn insert_batch(&self, records: &[StorageRecord]) -> Result<()>;

    /// Where the store writes (for logging)
    fn endpoint(&self) -> &str;
}

/// PostgREST-style hosted database (Supabase)
#[derive(Clone)]
pub struct SupabaseStore {
    http_client: Client,
    base_url: String,
    api_key: Option<String>,
    table: String,
    endpoint: String,
}

impl SupabaseStore {
    pub fn new(base_url: &str, api_key: Option<&str>, table: &str) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        let endpoint = format!("{}/rest/v1/{}", base_url, table);
        Self {
            http_client: Client::new(),
            base_url,
            api_key: api_key.map(|k| k.to_string()),
            table: table.to_string(),
            endpoint,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Error body returned by the REST API
#[derive(Debug, Deserialize)]
struct StoreErrorBody {
    message: Option<String>,
}

#[async_trait]
impl TransactionStore for SupabaseStore {
    async fn insert_batch(&self, records: &[StorageRecord]) -> Result<()> {
        let mut request = self
            .http_client
            .post(&self.endpoint)
            .header("Prefer", "return=minimal")
            .json(records);
        if let Some(ref key) = self.api_key {
            request = request.header("apikey", key).bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Persistence(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<StoreErrorBody>(&body)
            .ok()
            .and_then(|b| b.message)
            .unwrap_or_else(|| {
                if body.is_empty() {
                    format!("status {}", status)
                } else {
                    body
                }
            });
        Err(Error::Persistence(message))
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// In-memory store for tests and dry runs
///
/// Records every attempted batch. With `fail_on_batch(k)`, the k-th attempt
/// (0-based) and every later one fail.
#[derive(Clone, Default)]
pub struct MemoryStore {
    attempts: Arc<Mutex<Vec<usize>>>,
    committed: Arc<Mutex<Vec<StorageRecord>>>,
    fail_from: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose batch `index` (and later) fails
    pub fn fail_on_batch(index: usize) -> Self {
        Self {
            fail_from: Some(index),
            ..Self::default()
        }
    }

    /// A store that rejects every batch
    pub fn failing() -> Self {
        Self::fail_on_batch(0)
    }

    /// Sizes of every attempted batch, in order
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.attempts.lock().map(|a| a.clone()).unwrap_or_default()
    }

    /// Records from successful batches
    pub fn committed(&self) -> Vec<StorageRecord> {
        self.committed.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl TransactionStore for MemoryStore {
    async fn insert_batch(&self, records: &[StorageRecord]) -> Result<()> {
        let index = {
            let mut attempts = self
                .attempts
                .lock()
                .map_err(|_| Error::Persistence("memory store lock poisoned".into()))?;
            attempts.push(records.len());
            attempts.len() - 1
        };

        if self.fail_from.is_some_and(|k| index >= k) {
            return Err(Error::Persistence(format!(
                "simulated failure on batch {}",
                index
            )));
        }

        self.committed
            .lock()
            .map_err(|_| Error::Persistence("memory store lock poisoned".into()))?
            .extend_from_slice(records);
        Ok(())
    }

    fn endpoint(&self) -> &str {
        "memory://transactions"
    }
}

/// Concrete store enum
///
/// Provides Clone and compile-time dispatch without Box<dyn> overhead.
#[derive(Clone)]
pub enum StoreClient {
    Supabase(SupabaseStore),
    Memory(MemoryStore),
}

#[async_trait]
impl TransactionStore for StoreClient {
    async fn insert_batch(&self, records: &[StorageRecord]) -> Result<()> {
        match self {
            StoreClient::Supabase(s) => s.insert_batch(records).await,
            StoreClient::Memory(s) => s.insert_batch(records).await,
        }
    }

    fn endpoint(&self) -> &str {
        match self {
            StoreClient::Supabase(s) => s.endpoint(),
            StoreClient::Memory(s) => s.endpoint(),
        }
    }
}

/// Outcome of a save call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistReport {
    /// No database configured
    Skipped,
    Saved { records: usize, batches: usize },
}

/// Maps rows to storage records and writes them batch by batch
#[derive(Clone)]
pub struct PersistenceClient {
    store: Option<StoreClient>,
    batch_size: usize,
}

impl PersistenceClient {
    pub fn new(store: Option<StoreClient>) -> Self {
        Self {
            store,
            batch_size: BATCH_SIZE,
        }
    }

    /// Persistence turned off
    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub fn memory(store: MemoryStore) -> Self {
        Self::new(Some(StoreClient::Memory(store)))
    }

    /// Build from configuration; no URL means disabled
    pub fn from_config(config: &DatabaseConfig) -> Self {
        let store = config.url.as_deref().map(|url| {
            StoreClient::Supabase(SupabaseStore::new(
                url,
                config.api_key.as_deref(),
                &config.table,
            ))
        });
        Self::new(store)
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.store.as_ref().map(|s| s.endpoint())
    }

    /// Persist every row
    ///
    /// Returns `Skipped` when no store is configured. Batches are written
    /// strictly one after another; on the first failure the remaining
    /// batches are not attempted.
    pub async fn save_transactions(&self, rows: &[Row]) -> Result<PersistReport> {
        let Some(ref store) = self.store else {
            warn!("Skipping DB save: no database configured");
            return Ok(PersistReport::Skipped);
        };

        let records: Vec<StorageRecord> = rows.iter().map(StorageRecord::from).collect();
        let mut batches = 0;

        for (i, batch) in records.chunks(self.batch_size).enumerate() {
            debug!(batch = i, size = batch.len(), "Inserting batch");
            store.insert_batch(batch).await.map_err(|e| match e {
                Error::Persistence(_) => e,
                other => Error::Persistence(other.to_string()),
            })?;
            batches += 1;
        }

        info!(
            records = records.len(),
            batches,
            endpoint = store.endpoint(),
            "Saved transactions"
        );
        Ok(PersistReport::Saved {
            records: records.len(),
            batches,
        })
    }
}

/// Number of insert calls needed for `n` records
pub fn batch_count(n: usize) -> usize {
    n.div_ceil(BATCH_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(n: usize) -> Vec<Row> {
        (0..n)
            .map(|i| Row::new("01", "202401", "X1", i as f64))
            .collect()
    }

    #[tokio::test]
    async fn test_disabled_is_noop() {
        let client = PersistenceClient::disabled();
        assert!(!client.is_enabled());
        let report = client.save_transactions(&rows(5)).await.unwrap();
        assert_eq!(report, PersistReport::Skipped);
    }

    #[tokio::test]
    async fn test_batch_splitting() {
        for (n, expected) in [
            (1, vec![1]),
            (999, vec![999]),
            (1000, vec![1000]),
            (1001, vec![1000, 1]),
            (2500, vec![1000, 1000, 500]),
            (3000, vec![1000, 1000, 1000]),
        ] {
            let store = MemoryStore::new();
            let client = PersistenceClient::memory(store.clone());
            let report = client.save_transactions(&rows(n)).await.unwrap();
            assert_eq!(store.batch_sizes(), expected, "n = {}", n);
            assert_eq!(
                report,
                PersistReport::Saved {
                    records: n,
                    batches: batch_count(n)
                }
            );
        }
    }

    #[tokio::test]
    async fn test_failure_stops_later_batches() {
        let store = MemoryStore::fail_on_batch(1);
        let client = PersistenceClient::memory(store.clone());
        let err = client.save_transactions(&rows(2500)).await.unwrap_err();

        assert!(matches!(err, Error::Persistence(_)));
        assert_eq!(err.to_string(), "Database Error: simulated failure on batch 1");
        // Batch 0 committed, batch 1 attempted, batch 2 never tried
        assert_eq!(store.batch_sizes(), vec![1000, 1000]);
        assert_eq!(store.committed().len(), 1000);
    }

    #[tokio::test]
    async fn test_records_use_storage_names() {
        let store = MemoryStore::new();
        let client = PersistenceClient::memory(store.clone());
        client
            .save_transactions(&[Row::new("02", "202402", "Y9", 12.5)])
            .await
            .unwrap();
        let committed = store.committed();
        assert_eq!(committed[0].act_code, "Y9");
        assert_eq!(committed[0].ba, "02");
    }

    #[test]
    fn test_from_config() {
        let mut config = DatabaseConfig::default();
        assert!(!PersistenceClient::from_config(&config).is_enabled());

        config.url = Some("https://db.example.co/".into());
        let client = PersistenceClient::from_config(&config);
        assert_eq!(
            client.endpoint(),
            Some("https://db.example.co/rest/v1/transactions")
        );
    }

    #[test]
    fn test_batch_count() {
        assert_eq!(batch_count(0), 0);
        assert_eq!(batch_count(1000), 1);
        assert_eq!(batch_count(1001), 2);
    }
}
