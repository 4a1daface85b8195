//! Persistence module for login events
//!
//! This module provides durable storage of per-account login events and the
//! ordered temporal-neighbor lookups the travel evaluation needs. Two
//! interchangeable backends satisfy the same `EventStore` contract.

pub mod call_context;
pub mod range_store;
pub mod sqlite_store;

pub use call_context::CallContext;
pub use range_store::RangeEventStore;
pub use sqlite_store::SqliteEventStore;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{StorageBackend, StorageConfig};
use crate::models::LoginEvent;

/// Errors that can occur during persistence operations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),

    #[error("Store operation cancelled")]
    Cancelled,

    #[error("Store operation timed out")]
    Timeout,

    #[error("Store lock poisoned")]
    Poisoned,

    #[error("Store worker failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Invalid storage configuration: {0}")]
    Misconfigured(String),
}

impl StoreError {
    /// True for the cancelled/timed-out class, which callers report
    /// differently from genuine storage failures
    pub fn is_cancellation(&self) -> bool {
        matches!(self, StoreError::Cancelled | StoreError::Timeout)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref failure, _)
                if failure.code == rusqlite::ErrorCode::OperationInterrupted =>
            {
                StoreError::Cancelled
            }
            other => StoreError::Database(other),
        }
    }
}

/// Durable record of per-account login events.
///
/// At most one event is stored per `(account, ip)`. Writes follow an
/// upsert-latest-wins policy: an existing row only changes when the incoming
/// timestamp is strictly newer. Neighbor lookups use strict inequality on the
/// timestamp and never cross accounts. When two rows of one account share the
/// winning timestamp, the row with the lexically smallest IP is returned.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Insert the event or advance the stored row for its `(account, ip)`.
    ///
    /// Returns the identifier of the stored row, new or existing.
    async fn put(&self, ctx: &CallContext, event: &LoginEvent) -> Result<i64, StoreError>;

    /// Closest event of `account` strictly before `timestamp`
    async fn preceding_access(
        &self,
        ctx: &CallContext,
        account: &str,
        timestamp: i64,
    ) -> Result<Option<LoginEvent>, StoreError>;

    /// Closest event of `account` strictly after `timestamp`
    async fn subsequent_access(
        &self,
        ctx: &CallContext,
        account: &str,
        timestamp: i64,
    ) -> Result<Option<LoginEvent>, StoreError>;

    /// Release the backend. Called once during shutdown.
    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str;
}

/// Open the backend selected by the storage configuration
pub fn open_store(config: &StorageConfig) -> Result<Arc<dyn EventStore>, StoreError> {
    let store: Arc<dyn EventStore> = match config.backend {
        StorageBackend::Sqlite => {
            let path = config.sqlite_path.as_ref().ok_or_else(|| {
                StoreError::Misconfigured("sqlite backend requires sqlite_path".to_string())
            })?;
            Arc::new(SqliteEventStore::new(path)?)
        }
        StorageBackend::Memory => Arc::new(RangeEventStore::open(config.snapshot_path.clone())?),
    };
    log::info!("Opened {} event store", store.backend_name());
    Ok(store)
}

/// Behavior every `EventStore` backend must share
#[cfg(test)]
pub(crate) mod contract {
    use super::*;
    use crate::models::Geo;

    pub fn event(account: &str, ip: &str, timestamp: i64) -> LoginEvent {
        LoginEvent::new(account, ip, timestamp, Geo::new(27.95, -82.46, 50), false)
    }

    pub async fn upsert_keeps_latest(store: &dyn EventStore) {
        let ctx = CallContext::background();

        let id = store.put(&ctx, &event("alice", "10.0.0.1", 100)).await.unwrap();
        let mut newer = event("alice", "10.0.0.1", 300);
        newer.geo = Geo::new(40.71, -74.00, 10);
        newer.anonymous = true;
        assert_eq!(store.put(&ctx, &newer).await.unwrap(), id);

        // Older and equal timestamps leave the stored row alone
        let mut stale = event("alice", "10.0.0.1", 200);
        stale.geo = Geo::new(0.0, 0.0, 1);
        assert_eq!(store.put(&ctx, &stale).await.unwrap(), id);
        assert_eq!(store.put(&ctx, &event("alice", "10.0.0.1", 300)).await.unwrap(), id);

        let stored = store.preceding_access(&ctx, "alice", 1000).await.unwrap().unwrap();
        assert_eq!(stored.id, Some(id));
        assert_eq!(stored.timestamp, 300);
        assert_eq!(stored.geo, Geo::new(40.71, -74.00, 10));
        assert!(stored.anonymous);
        assert!(store.preceding_access(&ctx, "alice", 300).await.unwrap().is_none());
    }

    pub async fn ids_are_distinct_per_pair(store: &dyn EventStore) {
        let ctx = CallContext::background();

        let first = store.put(&ctx, &event("alice", "10.0.0.1", 100)).await.unwrap();
        let second = store.put(&ctx, &event("alice", "10.0.0.2", 100)).await.unwrap();
        let third = store.put(&ctx, &event("bob", "10.0.0.1", 100)).await.unwrap();
        assert_ne!(first, second);
        assert_ne!(second, third);
        assert_ne!(first, third);
    }

    pub async fn neighbors_are_closest(store: &dyn EventStore) {
        let ctx = CallContext::background();
        for (ip, ts) in [("1.1.1.1", 10), ("2.2.2.2", 20), ("3.3.3.3", 30)] {
            store.put(&ctx, &event("alice", ip, ts)).await.unwrap();
        }

        let preceding = store.preceding_access(&ctx, "alice", 25).await.unwrap().unwrap();
        assert_eq!(preceding.timestamp, 20);
        assert_eq!(preceding.ip, "2.2.2.2");

        let subsequent = store.subsequent_access(&ctx, "alice", 25).await.unwrap().unwrap();
        assert_eq!(subsequent.timestamp, 30);
        assert_eq!(subsequent.ip, "3.3.3.3");

        assert!(store.preceding_access(&ctx, "alice", 5).await.unwrap().is_none());
        assert!(store.subsequent_access(&ctx, "alice", 30).await.unwrap().is_none());

        // Strict inequality: an event at the reference timestamp is never its own neighbor
        let preceding = store.preceding_access(&ctx, "alice", 20).await.unwrap().unwrap();
        assert_eq!(preceding.timestamp, 10);
        let subsequent = store.subsequent_access(&ctx, "alice", 20).await.unwrap().unwrap();
        assert_eq!(subsequent.timestamp, 30);
    }

    pub async fn neighbors_stay_within_account(store: &dyn EventStore) {
        let ctx = CallContext::background();
        store.put(&ctx, &event("alice", "1.1.1.1", 10)).await.unwrap();
        store.put(&ctx, &event("bob", "2.2.2.2", 15)).await.unwrap();
        store.put(&ctx, &event("alice", "3.3.3.3", 30)).await.unwrap();

        let preceding = store.preceding_access(&ctx, "alice", 20).await.unwrap().unwrap();
        assert_eq!(preceding.account, "alice");
        assert_eq!(preceding.timestamp, 10);

        assert!(store.preceding_access(&ctx, "carol", 100).await.unwrap().is_none());
        assert!(store.subsequent_access(&ctx, "bob", 15).await.unwrap().is_none());
    }

    pub async fn ties_break_on_smallest_ip(store: &dyn EventStore) {
        let ctx = CallContext::background();
        for ip in ["9.9.9.9", "10.0.0.1", "1.2.3.4"] {
            store.put(&ctx, &event("alice", ip, 50)).await.unwrap();
        }

        let preceding = store.preceding_access(&ctx, "alice", 60).await.unwrap().unwrap();
        assert_eq!(preceding.ip, "1.2.3.4");
        let subsequent = store.subsequent_access(&ctx, "alice", 40).await.unwrap().unwrap();
        assert_eq!(subsequent.ip, "1.2.3.4");
    }

    pub async fn cancelled_context_aborts(store: &dyn EventStore) {
        let cancelled = CallContext::background();
        cancelled.cancel();
        let result = store.put(&cancelled, &event("alice", "1.1.1.1", 10)).await;
        assert!(matches!(result, Err(StoreError::Cancelled)));

        let expired = CallContext::background().with_deadline(tokio::time::Instant::now());
        let result = store.preceding_access(&expired, "alice", 10).await;
        assert!(matches!(result, Err(StoreError::Timeout)));
        let result = store.subsequent_access(&expired, "alice", 10).await;
        assert!(matches!(result, Err(StoreError::Timeout)));

        // The aborted write never happened
        let ctx = CallContext::background();
        assert!(store.subsequent_access(&ctx, "alice", 0).await.unwrap().is_none());
    }

    pub async fn concurrent_accounts(store: Arc<dyn EventStore>) {
        let mut handles = Vec::new();
        for n in 0..8i64 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let ctx = CallContext::background();
                let account = format!("user{}", n);
                for ts in 1..=5 {
                    let ip = format!("10.0.{}.{}", n, ts);
                    store.put(&ctx, &event(&account, &ip, ts * 10)).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let ctx = CallContext::background();
        for n in 0..8i64 {
            let account = format!("user{}", n);
            let latest = store.preceding_access(&ctx, &account, 1000).await.unwrap().unwrap();
            assert_eq!(latest.timestamp, 50);
            assert_eq!(latest.account, account);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_class() {
        assert!(StoreError::Cancelled.is_cancellation());
        assert!(StoreError::Timeout.is_cancellation());
        assert!(!StoreError::Poisoned.is_cancellation());
    }

    #[test]
    fn test_open_store_requires_sqlite_path() {
        let config = StorageConfig {
            backend: StorageBackend::Sqlite,
            sqlite_path: None,
            snapshot_path: None,
        };
        assert!(matches!(open_store(&config), Err(StoreError::Misconfigured(_))));
    }

    #[test]
    fn test_open_store_selects_backend() {
        let dir = tempfile::tempdir().unwrap();
        let sqlite = StorageConfig {
            backend: StorageBackend::Sqlite,
            sqlite_path: Some(dir.path().join("events.db")),
            snapshot_path: None,
        };
        assert_eq!(open_store(&sqlite).unwrap().backend_name(), "sqlite");

        let memory = StorageConfig {
            backend: StorageBackend::Memory,
            sqlite_path: None,
            snapshot_path: Some(dir.path().join("snapshot.json")),
        };
        assert_eq!(open_store(&memory).unwrap().backend_name(), "memory");
    }
}
