use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::Stream;
use log::{debug, warn};
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::MESSAGE_TYPE;

const CHANGE_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("invalid record: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Initial,
    Added,
    Updated,
    Removed,
    Other(String),
}

impl Action {
    pub fn as_str(&self) -> &str {
        match self {
            Action::Initial => "initial",
            Action::Added => "added",
            Action::Updated => "updated",
            Action::Removed => "removed",
            Action::Other(other) => other,
        }
    }
}

impl From<&str> for Action {
    fn from(action: &str) -> Self {
        match action {
            "initial" => Action::Initial,
            "added" => Action::Added,
            "updated" => Action::Updated,
            "removed" => Action::Removed,
            other => Action::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub id: String,
    pub value: Option<Value>,
    pub action: Action,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    #[default]
    Asc,
    Desc,
}

impl Order {
    fn sql(self) -> &'static str {
        match self {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub kind: String,
    pub field: SortField,
    pub order: Order,
    pub realtime: bool,
}

impl Query {
    pub fn messages() -> Self {
        Query {
            kind: MESSAGE_TYPE.to_string(),
            field: SortField::Timestamp,
            order: Order::Asc,
            realtime: true,
        }
    }
}

#[derive(Debug, Clone)]
struct StoredChange {
    kind: Option<String>,
    event: ChangeEvent,
}

impl StoredChange {
    fn matches(&self, kind: &str) -> bool {
        self.kind.as_deref().map_or(true, |k| k == kind)
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn put(&self, value: Value) -> Result<String, StoreError>;

    /// Opens a subscription: matching records replay as `initial`, then
    /// later changes follow if the query asks for realtime updates.
    async fn map(&self, query: Query) -> Result<LiveQuery, StoreError>;
}

struct Inner {
    conn: Mutex<Connection>,
    changes: broadcast::Sender<StoredChange>,
}

#[derive(Clone)]
pub struct EmbeddedStore {
    inner: Arc<Inner>,
}

impl EmbeddedStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS records (
                id TEXT PRIMARY KEY,
                type TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                value TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS records_type_timestamp ON records (type, timestamp)",
            [],
        )?;
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Ok(EmbeddedStore {
            inner: Arc::new(Inner {
                conn: Mutex::new(conn),
                changes,
            }),
        })
    }

    pub async fn put_with_id(&self, id: &str, value: Value) -> Result<Action, StoreError> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let timestamp = value.get("timestamp").and_then(Value::as_i64).unwrap_or(0);
        let body = serde_json::to_string(&value)?;

        let conn = self.inner.conn.lock().await;
        let existed = conn
            .query_row("SELECT 1 FROM records WHERE id = ?1", [id], |_| Ok(()))
            .optional()?
            .is_some();
        conn.execute(
            "INSERT INTO records (id, type, timestamp, value) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                type = excluded.type,
                timestamp = excluded.timestamp,
                value = excluded.value",
            (id, &kind, timestamp, &body),
        )?;
        let action = if existed { Action::Updated } else { Action::Added };
        debug!("record {} {}", id, action.as_str());
        // Published under the lock so `map` never sees a change twice or not at all.
        self.publish(Some(kind), id, Some(value), action.clone());
        Ok(action)
    }

    /// Deletes a record. Returns false when nothing was stored under `id`.
    pub async fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let conn = self.inner.conn.lock().await;
        let deleted = conn.execute("DELETE FROM records WHERE id = ?1", [id])?;
        if deleted > 0 {
            self.publish(None, id, None, Action::Removed);
        }
        Ok(deleted > 0)
    }

    pub async fn clear(&self) -> Result<usize, StoreError> {
        let conn = self.inner.conn.lock().await;
        let ids = {
            let mut stmt = conn.prepare("SELECT id FROM records ORDER BY rowid")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        conn.execute("DELETE FROM records", [])?;
        for id in &ids {
            self.publish(None, id, None, Action::Removed);
        }
        Ok(ids.len())
    }

    pub async fn get(&self, id: &str) -> Result<Option<Value>, StoreError> {
        let conn = self.inner.conn.lock().await;
        let body = conn
            .query_row("SELECT value FROM records WHERE id = ?1", [id], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(match body {
            Some(body) => Some(serde_json::from_str(&body)?),
            None => None,
        })
    }

    pub async fn count(&self, kind: &str) -> Result<usize, StoreError> {
        let conn = self.inner.conn.lock().await;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM records WHERE type = ?1",
            [kind],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn publish(&self, kind: Option<String>, id: &str, value: Option<Value>, action: Action) {
        // No subscribers is not an error.
        let _ = self.inner.changes.send(StoredChange {
            kind,
            event: ChangeEvent {
                id: id.to_string(),
                value,
                action,
            },
        });
    }
}

#[async_trait]
impl RecordStore for EmbeddedStore {
    async fn put(&self, value: Value) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        self.put_with_id(&id, value).await?;
        Ok(id)
    }

    async fn map(&self, query: Query) -> Result<LiveQuery, StoreError> {
        let conn = self.inner.conn.lock().await;
        let live = query.realtime.then(|| self.inner.changes.subscribe());

        let sql = match query.field {
            SortField::Timestamp => format!(
                "SELECT id, value FROM records WHERE type = ?1 ORDER BY timestamp {0}, rowid {0}",
                query.order.sql()
            ),
        };
        let rows = {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([&query.kind], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        let mut replay = VecDeque::with_capacity(rows.len());
        for (id, body) in rows {
            match serde_json::from_str::<Value>(&body) {
                Ok(value) => replay.push_back(ChangeEvent {
                    id,
                    value: Some(value),
                    action: Action::Initial,
                }),
                Err(e) => warn!("Skipping unreadable record {}: {}", id, e),
            }
        }

        Ok(LiveQuery {
            kind: query.kind,
            replay,
            live,
        })
    }
}

/// An ordered subscription returned by [`RecordStore::map`]. Dropping it
/// cancels the subscription.
pub struct LiveQuery {
    kind: String,
    replay: VecDeque<ChangeEvent>,
    live: Option<broadcast::Receiver<StoredChange>>,
}

impl LiveQuery {
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        if let Some(event) = self.replay.pop_front() {
            return Some(event);
        }
        loop {
            let received = match self.live.as_mut() {
                Some(live) => live.recv().await,
                None => return None,
            };
            match received {
                Ok(change) if change.matches(&self.kind) => return Some(change.event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Live query fell behind, {} changes skipped", skipped);
                }
                Err(RecvError::Closed) => {
                    self.live = None;
                    return None;
                }
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = ChangeEvent> + Send {
        futures_util::stream::unfold(self, |mut query| async move {
            query.next().await.map(|event| (event, query))
        })
    }
}
