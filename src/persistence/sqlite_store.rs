//! SQLite implementation of the EventStore trait

use super::{CallContext, EventStore, StoreError};
use crate::models::{Geo, LoginEvent};
use async_trait::async_trait;
use rusqlite::{params, Connection, InterruptHandle, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};

const UPSERT: &str = "INSERT INTO events
     (account, ip, timestamp, latitude, longitude, radius_km, anonymous)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
     ON CONFLICT (account, ip) DO UPDATE SET
         timestamp = excluded.timestamp,
         latitude = excluded.latitude,
         longitude = excluded.longitude,
         radius_km = excluded.radius_km,
         anonymous = excluded.anonymous
     WHERE excluded.timestamp > events.timestamp";

const SELECT_ID: &str = "SELECT id FROM events WHERE account = ?1 AND ip = ?2";

const PRECEDING: &str = "SELECT id, account, ip, timestamp, latitude, longitude, radius_km, anonymous
     FROM events
     WHERE account = ?1 AND timestamp < ?2
     ORDER BY timestamp DESC, ip ASC
     LIMIT 1";

const SUBSEQUENT: &str = "SELECT id, account, ip, timestamp, latitude, longitude, radius_km, anonymous
     FROM events
     WHERE account = ?1 AND timestamp > ?2
     ORDER BY timestamp ASC, ip ASC
     LIMIT 1";

/// Progress of one call through the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallState {
    Queued,
    Running,
    Finished,
    Abandoned,
}

/// SQLite-based event storage
///
/// The `(account, ip)` uniqueness constraint lives in the schema and the
/// latest-wins policy is a conditional `ON CONFLICT` update. Statements run
/// on the blocking pool; an abandoned call interrupts its running statement.
pub struct SqliteEventStore {
    conn: Arc<Mutex<Connection>>,
    interrupt: Arc<InterruptHandle>,
}

impl SqliteEventStore {
    /// Create a new SQLite event store at the specified path
    ///
    /// Creates the database file and initializes the schema if it doesn't exist.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open(db_path)?)
    }

    /// Create an in-memory SQLite database (useful for testing)
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(include_str!("schema.sql"))?;
        let interrupt = Arc::new(conn.get_interrupt_handle());
        Ok(SqliteEventStore {
            conn: Arc::new(Mutex::new(conn)),
            interrupt,
        })
    }

    /// Run `op` against the connection on the blocking pool, bounded by `ctx`.
    ///
    /// When `ctx` ends first, a call still waiting for the connection is
    /// dropped before it touches the database and a running call is
    /// interrupted. A call that finished anyway reports its own result, so a
    /// committed write is never reported as aborted.
    async fn run<T, F>(&self, ctx: &CallContext, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        ctx.check()?;

        let state = Arc::new(Mutex::new(CallState::Queued));
        let mut task = {
            let conn = Arc::clone(&self.conn);
            let state = Arc::clone(&state);
            tokio::task::spawn_blocking(move || {
                let mut conn = conn.lock().map_err(|_| StoreError::Poisoned)?;
                {
                    let mut state = state.lock().map_err(|_| StoreError::Poisoned)?;
                    if *state == CallState::Abandoned {
                        return Err(StoreError::Cancelled);
                    }
                    *state = CallState::Running;
                }
                let result = op(&mut conn);
                // Leave `Running` while the connection guard is still held so a
                // late interrupt cannot reach the next call's statement
                if let Ok(mut state) = state.lock() {
                    *state = CallState::Finished;
                }
                drop(conn);
                result
            })
        };

        let abort = match ctx.run(&mut task).await {
            Ok(joined) => return joined?,
            Err(err) => err,
        };

        {
            let mut state = state.lock().map_err(|_| StoreError::Poisoned)?;
            match *state {
                CallState::Queued => {
                    *state = CallState::Abandoned;
                    log::debug!("Dropped queued sqlite call: {}", abort);
                    return Err(abort);
                }
                CallState::Running => {
                    self.interrupt.interrupt();
                    log::debug!("Interrupted sqlite call: {}", abort);
                }
                CallState::Finished | CallState::Abandoned => {}
            }
        }

        match task.await? {
            Err(StoreError::Cancelled) => Err(abort),
            finished => finished,
        }
    }

    async fn access(
        &self,
        ctx: &CallContext,
        query: &'static str,
        account: &str,
        timestamp: i64,
    ) -> Result<Option<LoginEvent>, StoreError> {
        let account = account.to_string();
        self.run(ctx, move |conn| {
            let mut stmt = conn.prepare_cached(query)?;
            let result = stmt.query_row(params![account, timestamp], row_to_event);

            match result {
                Ok(event) => Ok(Some(event)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }
}

fn row_to_event(row: &Row<'_>) -> rusqlite::Result<LoginEvent> {
    Ok(LoginEvent {
        id: Some(row.get(0)?),
        account: row.get(1)?,
        ip: row.get(2)?,
        timestamp: row.get(3)?,
        geo: Geo {
            latitude: row.get(4)?,
            longitude: row.get(5)?,
            radius_km: row.get(6)?,
        },
        anonymous: row.get(7)?,
    })
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn put(&self, ctx: &CallContext, event: &LoginEvent) -> Result<i64, StoreError> {
        let event = event.clone();
        self.run(ctx, move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                UPSERT,
                params![
                    event.account,
                    event.ip,
                    event.timestamp,
                    event.geo.latitude,
                    event.geo.longitude,
                    event.geo.radius_km,
                    event.anonymous
                ],
            )?;
            let id: i64 = tx.query_row(SELECT_ID, params![event.account, event.ip], |row| {
                row.get(0)
            })?;
            tx.commit()?;
            Ok(id)
        })
        .await
    }

    async fn preceding_access(
        &self,
        ctx: &CallContext,
        account: &str,
        timestamp: i64,
    ) -> Result<Option<LoginEvent>, StoreError> {
        self.access(ctx, PRECEDING, account, timestamp).await
    }

    async fn subsequent_access(
        &self,
        ctx: &CallContext,
        account: &str,
        timestamp: i64,
    ) -> Result<Option<LoginEvent>, StoreError> {
        self.access(ctx, SUBSEQUENT, account, timestamp).await
    }

    async fn close(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        conn.flush_prepared_statement_cache();
        log::info!("Closed sqlite event store");
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}
