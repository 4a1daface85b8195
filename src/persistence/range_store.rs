//! Sorted-range implementation of the EventStore trait
//!
//! Events are partitioned by account; each partition keeps a sort key of
//! `(timestamp, ip)` so neighbor lookups are range scans limited to a single
//! result. The whole table can be snapshotted to a JSON file on close and
//! restored on open.

use super::{CallContext, EventStore, StoreError};
use crate::models::LoginEvent;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

/// Events of a single account
#[derive(Debug, Default)]
struct Partition {
    /// Stored event keyed by ip
    items: HashMap<String, LoginEvent>,
    /// Sort key over `items`
    order: BTreeSet<(i64, String)>,
}

impl Partition {
    fn insert(&mut self, event: LoginEvent) {
        self.order.insert((event.timestamp, event.ip.clone()));
        self.items.insert(event.ip.clone(), event);
    }

    /// First event stored at exactly `timestamp`, by ip order
    fn first_at(&self, timestamp: i64) -> Option<&LoginEvent> {
        let (ts, ip) = self.order.range((timestamp, String::new())..).next()?;
        if *ts != timestamp {
            return None;
        }
        self.items.get(ip)
    }

    fn preceding(&self, timestamp: i64) -> Option<&LoginEvent> {
        let (ts, _) = self.order.range(..(timestamp, String::new())).next_back()?;
        self.first_at(*ts)
    }

    fn subsequent(&self, timestamp: i64) -> Option<&LoginEvent> {
        let from = timestamp.checked_add(1)?;
        let (ts, _) = self.order.range((from, String::new())..).next()?;
        self.first_at(*ts)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    next_id: i64,
    events: Vec<LoginEvent>,
}

/// Sorted-range event storage
pub struct RangeEventStore {
    partitions: RwLock<HashMap<String, Partition>>,
    next_id: AtomicI64,
    snapshot_path: Option<PathBuf>,
}

impl RangeEventStore {
    /// Create an empty store that is not persisted
    pub fn new() -> Self {
        RangeEventStore {
            partitions: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
            snapshot_path: None,
        }
    }

    /// Open a store backed by `snapshot_path`, restoring its contents if the
    /// file already exists
    pub fn open(snapshot_path: Option<PathBuf>) -> Result<Self, StoreError> {
        let mut store = RangeEventStore::new();
        let path = match snapshot_path {
            Some(path) => path,
            None => return Ok(store),
        };

        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            let snapshot: Snapshot = serde_json::from_str(&contents)?;
            let restored = snapshot.events.len();
            store.restore(snapshot);
            log::info!("Restored {} event(s) from {}", restored, path.display());
        }
        store.snapshot_path = Some(path);
        Ok(store)
    }

    fn restore(&mut self, snapshot: Snapshot) {
        let mut max_id = 0;
        let partitions = self.partitions.get_mut().unwrap_or_else(|e| e.into_inner());
        for event in snapshot.events {
            max_id = max_id.max(event.id.unwrap_or_default());
            partitions.entry(event.account.clone()).or_default().insert(event);
        }
        self.next_id = AtomicI64::new(snapshot.next_id.max(max_id + 1));
    }

    fn snapshot(&self) -> Result<Snapshot, StoreError> {
        let partitions = self.partitions.read().map_err(|_| StoreError::Poisoned)?;
        let mut events: Vec<LoginEvent> = partitions
            .values()
            .flat_map(|partition| partition.items.values().cloned())
            .collect();
        events.sort_by_key(|event| event.id);
        Ok(Snapshot {
            next_id: self.next_id.load(Ordering::SeqCst),
            events,
        })
    }

    fn lookup<F>(
        &self,
        ctx: &CallContext,
        account: &str,
        select: F,
    ) -> Result<Option<LoginEvent>, StoreError>
    where
        F: Fn(&Partition) -> Option<&LoginEvent>,
    {
        ctx.check()?;
        let partitions = self.partitions.read().map_err(|_| StoreError::Poisoned)?;
        Ok(partitions.get(account).and_then(select).cloned())
    }
}

impl Default for RangeEventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStore for RangeEventStore {
    async fn put(&self, ctx: &CallContext, event: &LoginEvent) -> Result<i64, StoreError> {
        ctx.check()?;
        let mut partitions = self.partitions.write().map_err(|_| StoreError::Poisoned)?;
        let partition = partitions.entry(event.account.clone()).or_default();

        let (id, stored_ts) = match partition.items.get(&event.ip) {
            Some(stored) => (stored.id.unwrap_or_default(), Some(stored.timestamp)),
            None => (self.next_id.fetch_add(1, Ordering::SeqCst), None),
        };

        match stored_ts {
            Some(ts) if event.timestamp <= ts => return Ok(id),
            Some(ts) => {
                partition.order.remove(&(ts, event.ip.clone()));
            }
            None => {}
        }

        let mut stored = event.clone();
        stored.id = Some(id);
        partition.insert(stored);
        Ok(id)
    }

    async fn preceding_access(
        &self,
        ctx: &CallContext,
        account: &str,
        timestamp: i64,
    ) -> Result<Option<LoginEvent>, StoreError> {
        self.lookup(ctx, account, |partition| partition.preceding(timestamp))
    }

    async fn subsequent_access(
        &self,
        ctx: &CallContext,
        account: &str,
        timestamp: i64,
    ) -> Result<Option<LoginEvent>, StoreError> {
        self.lookup(ctx, account, |partition| partition.subsequent(timestamp))
    }

    async fn close(&self) -> Result<(), StoreError> {
        let path = match &self.snapshot_path {
            Some(path) => path,
            None => return Ok(()),
        };

        let snapshot = self.snapshot()?;
        let contents = serde_json::to_string(&snapshot)?;
        let staging = path.with_extension("tmp");
        tokio::fs::write(&staging, contents).await?;
        tokio::fs::rename(&staging, path).await?;
        log::info!(
            "Wrote {} event(s) to {}",
            snapshot.events.len(),
            path.display()
        );
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
