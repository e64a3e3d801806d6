//! Durable local record cache.
//!
//! The [`LocalStore`] is the always-available replica: a SQLite database of
//! JSON record payloads keyed by `(kind, id)`, plus an FTS5 index over the
//! record text. Two write paths exist on purpose. [`LocalStore::put`] is the
//! durable upsert that also refreshes the search index; [`LocalStore::put_sync`]
//! is the synchronous hot-path upsert used for per-keystroke autosave, which
//! guarantees the record row is on disk before returning but skips the
//! secondary index bookkeeping.

mod migrations;

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection, ErrorCode};
use uuid::Uuid;

use looseleaf_core::{Record, RecordKind};

use crate::error::{Error, Result};

/// SQLite-backed store of every record kind, soft-deleted rows included.
#[derive(Clone)]
pub struct LocalStore {
    conn: Arc<Mutex<Connection>>,
}

impl LocalStore {
    /// Open a store at the given path, creating it if it doesn't exist.
    ///
    /// Runs migrations automatically.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::from_connection(Connection::open(path)?)
    }

    /// Open an in-memory store (useful for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        // WAL may be unavailable for in-memory databases
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();
        migrations::run(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Storage("connection lock poisoned".to_string()))
    }

    /// Every record of the kind, including soft-deleted ones.
    ///
    /// Order is unspecified; callers sort and filter as needed. A payload
    /// that no longer parses is treated as absent, not as an error, and is
    /// overwritten by the next successful write.
    pub fn get_all<T: Record>(&self) -> Result<Vec<T>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id, payload FROM records WHERE kind = ?1")?;
        let rows = stmt.query_map(params![T::KIND.as_str()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, payload) = row?;
            match serde_json::from_str::<T>(&payload) {
                Ok(record) => records.push(record),
                Err(error) => {
                    tracing::warn!(kind = %T::KIND, %id, %error, "Skipping corrupt record payload");
                }
            }
        }
        Ok(records)
    }

    /// Point lookup by id; `Ok(None)` when absent or unreadable.
    pub fn get<T: Record>(&self, id: Uuid) -> Result<Option<T>> {
        let conn = self.lock()?;
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM records WHERE kind = ?1 AND id = ?2",
                params![T::KIND.as_str(), id.to_string()],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|error| match error {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        let Some(payload) = payload else {
            return Ok(None);
        };
        match serde_json::from_str::<T>(&payload) {
            Ok(record) => Ok(Some(record)),
            Err(error) => {
                tracing::warn!(kind = %T::KIND, %id, %error, "Treating corrupt record payload as absent");
                Ok(None)
            }
        }
    }

    /// Durable upsert by id, including the search-index refresh.
    pub async fn put<T: Record>(&self, record: &T) -> Result<()> {
        let payload = serde_json::to_string(record)?;
        let id = record.record_id().to_string();
        let updated_at = record.updated_at();
        let content = record.index_text();
        let conn = Arc::clone(&self.conn);

        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| Error::Storage("connection lock poisoned".to_string()))?;
            upsert_record(&conn, T::KIND, &id, &payload, updated_at)?;
            refresh_index(&conn, T::KIND, &id, &content)
        })
        .await
        .map_err(|error| Error::Storage(error.to_string()))?
    }

    /// Synchronous best-effort upsert for the hot edit path.
    ///
    /// The record row is durable before this returns; the search index is
    /// left to the next [`LocalStore::put`].
    pub fn put_sync<T: Record>(&self, record: &T) -> Result<()> {
        let payload = serde_json::to_string(record)?;
        let conn = self.lock()?;
        upsert_record(
            &conn,
            T::KIND,
            &record.record_id().to_string(),
            &payload,
            record.updated_at(),
        )
    }

    /// Hard delete by id; deleting an absent id is not an error.
    pub async fn delete<T: Record>(&self, id: Uuid) -> Result<()> {
        let id = id.to_string();
        let conn = Arc::clone(&self.conn);

        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| Error::Storage("connection lock poisoned".to_string()))?;
            conn.execute(
                "DELETE FROM records WHERE kind = ?1 AND id = ?2",
                params![T::KIND.as_str(), id],
            )?;
            conn.execute(
                "DELETE FROM records_fts WHERE kind = ?1 AND id = ?2",
                params![T::KIND.as_str(), id],
            )?;
            Ok(())
        })
        .await
        .map_err(|error| Error::Storage(error.to_string()))?
    }

    /// Wipe every kind. Only used for account switch / logout.
    pub fn clear_all(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM records", [])?;
        conn.execute("DELETE FROM records_fts", [])?;
        Ok(())
    }

    /// Full-text match over a kind, best hits first.
    pub fn search(&self, kind: RecordKind, query: &str, limit: usize) -> Result<Vec<Uuid>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id FROM records_fts
             WHERE records_fts MATCH ?1 AND kind = ?2
             ORDER BY rank
             LIMIT ?3",
        )?;

        #[allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT
        let rows = stmt.query_map(params![query, kind.as_str(), limit as i64], |row| {
            row.get::<_, String>(0)
        })?;

        let mut ids = Vec::new();
        for row in rows {
            let raw = row?;
            if let Ok(id) = Uuid::parse_str(&raw) {
                ids.push(id);
            }
        }
        Ok(ids)
    }
}

/// Upsert one record row, swallowing quota failures.
///
/// A user mid-keystroke must never see an exception from the storage layer,
/// so `SQLITE_FULL` is logged and reported as success; the row simply keeps
/// its previous value until space frees up.
fn upsert_record(
    conn: &Connection,
    kind: RecordKind,
    id: &str,
    payload: &str,
    updated_at: i64,
) -> Result<()> {
    let result = conn.execute(
        "INSERT INTO records (kind, id, payload, updated_at) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (kind, id) DO UPDATE SET payload = ?3, updated_at = ?4",
        params![kind.as_str(), id, payload, updated_at],
    );

    match result {
        Ok(_) => Ok(()),
        Err(error) if is_quota_error(&error) => {
            tracing::error!(%kind, %id, %error, "Storage quota exhausted; dropping write");
            Ok(())
        }
        Err(error) => Err(error.into()),
    }
}

fn refresh_index(conn: &Connection, kind: RecordKind, id: &str, content: &str) -> Result<()> {
    let result = conn
        .execute(
            "DELETE FROM records_fts WHERE kind = ?1 AND id = ?2",
            params![kind.as_str(), id],
        )
        .and_then(|_| {
            conn.execute(
                "INSERT INTO records_fts (kind, id, content) VALUES (?1, ?2, ?3)",
                params![kind.as_str(), id, content],
            )
        });

    match result {
        Ok(_) => Ok(()),
        Err(error) if is_quota_error(&error) => {
            tracing::error!(%kind, %id, %error, "Storage quota exhausted; search index not refreshed");
            Ok(())
        }
        Err(error) => Err(error.into()),
    }
}

fn is_quota_error(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(inner, _) if inner.code == ErrorCode::DiskFull
    )
}
