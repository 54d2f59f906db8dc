//! SQLite-based store implementation

use chrono::{DateTime, Local};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::{
    AuditEvent, AuditEventType, KvTxn, Namespace, Store, StoreChange, StoreError, StoreResult,
};

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
    changes: broadcast::Sender<StoreChange>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::with_connection(Connection::open(path)?)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let store = Self {
            conn: Mutex::new(conn),
            changes,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("connection lock poisoned".into()))
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Namespaced key-value pairs
            CREATE TABLE IF NOT EXISTS kv (
                namespace TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (namespace, key)
            );

            -- Audit log (append-only)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_json TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }

    fn notify(&self, changes: Vec<StoreChange>) {
        for change in changes {
            // No receivers is fine; nobody is watching yet.
            let _ = self.changes.send(change);
        }
    }
}

fn read(conn: &Connection, namespace: Namespace, key: &str) -> StoreResult<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT value FROM kv WHERE namespace = ? AND key = ?",
            params![namespace.as_str(), key],
            |row| row.get(0),
        )
        .optional()?)
}

fn write(conn: &Connection, namespace: Namespace, key: &str, value: &str) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO kv (namespace, key, value) VALUES (?, ?, ?)
         ON CONFLICT(namespace, key) DO UPDATE SET value = excluded.value",
        params![namespace.as_str(), key, value],
    )?;
    Ok(())
}

fn delete(conn: &Connection, namespace: Namespace, key: &str) -> StoreResult<()> {
    conn.execute(
        "DELETE FROM kv WHERE namespace = ? AND key = ?",
        params![namespace.as_str(), key],
    )?;
    Ok(())
}

/// Transaction handle collecting the keys it touched
struct SqliteTxn<'a> {
    tx: &'a Transaction<'a>,
    touched: Vec<StoreChange>,
}

impl SqliteTxn<'_> {
    fn touch(&mut self, namespace: Namespace, key: &str) {
        let change = StoreChange {
            namespace,
            key: key.to_string(),
        };
        if !self.touched.contains(&change) {
            self.touched.push(change);
        }
    }
}

impl KvTxn for SqliteTxn<'_> {
    fn get(&self, namespace: Namespace, key: &str) -> StoreResult<Option<String>> {
        read(self.tx, namespace, key)
    }

    fn set(&mut self, namespace: Namespace, key: &str, value: &str) -> StoreResult<()> {
        write(self.tx, namespace, key, value)?;
        self.touch(namespace, key);
        Ok(())
    }

    fn remove(&mut self, namespace: Namespace, key: &str) -> StoreResult<()> {
        delete(self.tx, namespace, key)?;
        self.touch(namespace, key);
        Ok(())
    }
}

impl Store for SqliteStore {
    fn get(&self, namespace: Namespace, key: &str) -> StoreResult<Option<String>> {
        let conn = self.conn()?;
        read(&conn, namespace, key)
    }

    fn set(&self, namespace: Namespace, key: &str, value: &str) -> StoreResult<()> {
        {
            let conn = self.conn()?;
            write(&conn, namespace, key, value)?;
        }
        self.notify(vec![StoreChange {
            namespace,
            key: key.to_string(),
        }]);
        Ok(())
    }

    fn remove(&self, namespace: Namespace, key: &str) -> StoreResult<()> {
        {
            let conn = self.conn()?;
            delete(&conn, namespace, key)?;
        }
        self.notify(vec![StoreChange {
            namespace,
            key: key.to_string(),
        }]);
        Ok(())
    }

    fn keys(&self, namespace: Namespace) -> StoreResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT key FROM kv WHERE namespace = ? ORDER BY key")?;
        let rows = stmt.query_map([namespace.as_str()], |row| row.get(0))?;
        let mut keys = Vec::new();
        for key in rows {
            keys.push(key?);
        }
        Ok(keys)
    }

    fn transaction(
        &self,
        f: &mut dyn FnMut(&mut dyn KvTxn) -> StoreResult<()>,
    ) -> StoreResult<()> {
        let touched = {
            let mut conn = self.conn()?;
            let tx = conn.transaction()?;
            let mut txn = SqliteTxn {
                tx: &tx,
                touched: Vec::new(),
            };
            // Dropping `tx` without commit rolls back.
            f(&mut txn)?;
            let touched = txn.touched;
            tx.commit()?;
            touched
        };

        self.notify(touched);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    fn append_audit(&self, event: AuditEvent) -> StoreResult<i64> {
        let conn = self.conn()?;
        let event_json = serde_json::to_string(&event.event)?;

        conn.execute(
            "INSERT INTO audit_log (timestamp, event_json) VALUES (?, ?)",
            params![event.timestamp.to_rfc3339(), event_json],
        )?;

        let id = conn.last_insert_rowid();
        debug!(event_id = id, "Audit event appended");

        Ok(id)
    }

    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, event_json FROM audit_log ORDER BY id DESC LIMIT ?",
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            let id: i64 = row.get(0)?;
            let timestamp_str: String = row.get(1)?;
            let event_json: String = row.get(2)?;
            Ok((id, timestamp_str, event_json))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, timestamp_str, event_json) = row?;
            let timestamp = match DateTime::parse_from_rfc3339(&timestamp_str) {
                Ok(dt) => dt.with_timezone(&Local),
                Err(e) => {
                    warn!(event_id = id, error = %e, "Unreadable audit timestamp");
                    sysblock_util::now()
                }
            };
            let event: AuditEventType = serde_json::from_str(&event_json)?;

            events.push(AuditEvent {
                id,
                timestamp,
                event,
            });
        }

        Ok(events)
    }

    fn is_healthy(&self) -> bool {
        match self.conn() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store connection lock poisoned");
                false
            }
        }
    }
}
