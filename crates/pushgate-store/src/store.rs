use crate::record::{SeenStatus, StoredRecord};
use crate::session::StoreSession;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;

/// Key under which the base-URL recovery timestamp is persisted.
pub(crate) const META_BASE_URL_CHECKED_AT: &str = "base_url_checked_at";

/// Store of inbound message records over a single SQLite connection.
///
/// All access goes through [`MessageStore::with_session`]; the mutex confines
/// the connection to one session at a time and each session is one SQLite
/// transaction, so a batch either commits whole or not at all.
pub struct MessageStore {
    conn: Mutex<Connection>,
}

impl MessageStore {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create store directory: {}", parent.display())
            })?;
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("failed to open message store at {}", db_path.display()))?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA busy_timeout=3000;
             PRAGMA foreign_keys=ON;",
        )?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.ensure_schema().with_context(|| {
            format!("failed to initialize store schema at {}", db_path.display())
        })?;
        Ok(store)
    }

    fn ensure_schema(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("store lock poisoned: {}", e))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS messages (
                message_id TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                created_at TEXT NOT NULL,
                is_silent INTEGER NOT NULL,
                delivery_method TEXT NOT NULL,
                seen_status INTEGER NOT NULL DEFAULT 0,
                report_sent INTEGER NOT NULL DEFAULT 0,
                message_type TEXT NOT NULL,
                campaign_id TEXT,
                campaign_state TEXT
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_messages_report_sent
             ON messages(report_sent)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS store_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;

        Ok(())
    }

    /// Run `f` inside one scoped transaction. The transaction commits iff
    /// `f` returns `Ok`; any error rolls every write in the session back.
    pub fn with_session<T>(&self, f: impl FnOnce(&StoreSession<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("store lock poisoned: {}", e))?;
        let tx = conn.transaction().context("failed to open transaction")?;
        let out = f(&StoreSession::new(&tx))?;
        tx.commit().context("failed to commit transaction")?;
        Ok(out)
    }

    /// Records whose delivery has not yet been acknowledged by the server.
    pub fn find_unreported(&self) -> Result<Vec<StoredRecord>> {
        self.with_session(|s| s.unreported())
    }

    pub fn find_by_ids(&self, message_ids: &[String]) -> Result<Vec<StoredRecord>> {
        self.with_session(|s| s.records_by_ids(message_ids))
    }

    /// Flip `NotSeen` records to `SeenNotSent`; returns the ids that changed.
    pub fn mark_seen(&self, message_ids: &[String]) -> Result<Vec<String>> {
        self.with_session(|s| s.set_seen_status(message_ids, SeenStatus::SeenNotSent))
    }

    pub fn base_url_checked_at(&self) -> Result<Option<DateTime<Utc>>> {
        self.with_session(|s| s.meta_get(META_BASE_URL_CHECKED_AT))?
            .map(|v| {
                DateTime::parse_from_rfc3339(&v)
                    .map(|d| d.with_timezone(&Utc))
                    .with_context(|| format!("bad stored timestamp: {}", v))
            })
            .transpose()
    }

    pub fn set_base_url_checked_at(&self, at: DateTime<Utc>) -> Result<()> {
        self.with_session(|s| s.meta_set(META_BASE_URL_CHECKED_AT, &at.to_rfc3339()))
    }
}
