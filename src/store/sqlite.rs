//! Persistent backend on SQLite.
//!
//! Timestamps are stored as unix milliseconds. The single-use take is one
//! `DELETE … RETURNING` inside an immediate transaction, so two connections
//! racing for the same hash cannot both see the row.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use super::{Backend, Cleanup, HandoffStore, Payload, RetrievalMode, TakeResult, Taken};
use crate::code::CodeHash;
use crate::error::{HandoffError, Result};

/// How long a statement waits on another connection's lock before the
/// operation fails with `StorageUnavailable`.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SqliteStore {
    mode: RetrievalMode,
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").field("mode", &self.mode).finish()
    }
}

impl SqliteStore {
    /// Open (or create) the database at `path` and run migrations.
    pub fn open(path: impl AsRef<Path>, mode: RetrievalMode) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn, mode)
    }

    /// A private in-memory database, mostly for tests.
    pub fn open_in_memory(mode: RetrievalMode) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, mode)
    }

    fn with_connection(conn: Connection, mode: RetrievalMode) -> Result<Self> {
        conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
        run_migrations(&conn)?;
        Ok(Self {
            mode,
            conn: Mutex::new(conn),
        })
    }

    pub fn mode(&self) -> RetrievalMode {
        self.mode
    }

    /// `(retrieved_count, last_retrieved_at)` for a stored hash.
    pub fn retrieval_stats(&self, code_hash: &CodeHash) -> Result<Option<(u32, Option<DateTime<Utc>>)>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT retrieved_count, last_retrieved_at FROM handoffs WHERE code_hash = ?1",
                params![code_hash.as_str()],
                |row| Ok((row.get::<_, u32>(0)?, row.get::<_, Option<i64>>(1)?)),
            )
            .optional()?;

        Ok(row.map(|(count, last)| (count, last.and_then(from_millis))))
    }

    /// Number of rows, live or not yet purged.
    pub fn len(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT count(*) FROM handoffs", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn take_single_use(&self, code_hash: &CodeHash, now: i64) -> Result<Taken> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let row = tx
            .query_row(
                "DELETE FROM handoffs WHERE code_hash = ?1 RETURNING payload, expires_at",
                params![code_hash.as_str()],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;
        tx.commit()?;

        match row {
            None => Ok(Taken::Missing),
            Some((_, expires_at)) if now > expires_at => Ok(Taken::Expired),
            Some((payload, _)) => Ok(Taken::Found(decode_payload(&payload)?)),
        }
    }

    fn take_multi_use(&self, code_hash: &CodeHash, now: i64) -> Result<Taken> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let row = tx
            .query_row(
                "SELECT payload, expires_at FROM handoffs WHERE code_hash = ?1",
                params![code_hash.as_str()],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;

        let outcome = match row {
            None => Taken::Missing,
            Some((_, expires_at)) if now > expires_at => {
                tx.execute(
                    "DELETE FROM handoffs WHERE code_hash = ?1",
                    params![code_hash.as_str()],
                )?;
                Taken::Expired
            }
            Some((payload, _)) => {
                tx.execute(
                    "UPDATE handoffs
                     SET retrieved_count = retrieved_count + 1, last_retrieved_at = ?2
                     WHERE code_hash = ?1",
                    params![code_hash.as_str(), now],
                )?;
                Taken::Found(decode_payload(&payload)?)
            }
        };

        tx.commit()?;
        Ok(outcome)
    }
}

impl HandoffStore for SqliteStore {
    fn backend(&self) -> Backend {
        Backend::Persistent
    }

    fn put(&self, code_hash: &CodeHash, payload: Payload, expires_at: DateTime<Utc>) -> Result<Backend> {
        let payload = serde_json::to_string(&payload)
            .map_err(|e| HandoffError::StorageUnavailable(e.to_string()))?;
        let conn = self.conn.lock();

        conn.execute(
            "INSERT INTO handoffs (code_hash, payload, expires_at, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (code_hash) DO UPDATE SET
                 payload = excluded.payload,
                 expires_at = excluded.expires_at,
                 created_at = excluded.created_at,
                 retrieved_count = 0,
                 last_retrieved_at = NULL",
            params![
                code_hash.as_str(),
                payload,
                expires_at.timestamp_millis(),
                Utc::now().timestamp_millis()
            ],
        )?;

        Ok(Backend::Persistent)
    }

    fn take(&self, code_hash: &CodeHash) -> Result<TakeResult> {
        let now = Utc::now().timestamp_millis();
        let outcome = match self.mode {
            RetrievalMode::SingleUse => self.take_single_use(code_hash, now)?,
            RetrievalMode::MultiUse => self.take_multi_use(code_hash, now)?,
        };

        Ok(TakeResult {
            backend: Backend::Persistent,
            outcome,
        })
    }

    fn cleanup_expired(&self) -> Result<Cleanup> {
        let conn = self.conn.lock();
        let purged = conn.execute(
            "DELETE FROM handoffs WHERE expires_at < ?1",
            params![Utc::now().timestamp_millis()],
        )?;

        Ok(Cleanup {
            backend: Backend::Persistent,
            purged,
        })
    }
}

fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS handoffs (
            code_hash           TEXT PRIMARY KEY,
            payload             TEXT NOT NULL,
            expires_at          INTEGER NOT NULL,
            created_at          INTEGER NOT NULL,
            retrieved_count     INTEGER NOT NULL DEFAULT 0,
            last_retrieved_at   INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_handoffs_expires_at
            ON handoffs(expires_at);
        ",
    )?;

    tracing::debug!("handoff schema ready");
    Ok(())
}

fn decode_payload(raw: &str) -> Result<Payload> {
    serde_json::from_str(raw).map_err(|e| HandoffError::StorageUnavailable(e.to_string()))
}

fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::CodeHasher;
    use chrono::Duration as ChronoDuration;
    use serde_json::json;

    fn hash(code: &str) -> CodeHash {
        CodeHasher::new("pepper").hash_code(code)
    }

    #[test]
    fn test_schema_migration_is_idempotent() {
        let store = SqliteStore::open_in_memory(RetrievalMode::SingleUse).unwrap();
        assert!(run_migrations(&store.conn.lock()).is_ok());
    }

    #[test]
    fn test_no_column_holds_a_raw_code() {
        let store = SqliteStore::open_in_memory(RetrievalMode::SingleUse).unwrap();
        let columns: Vec<String> = {
            let conn = store.conn.lock();
            let mut stmt = conn.prepare("SELECT name FROM pragma_table_info('handoffs')").unwrap();
            let rows = stmt.query_map([], |row| row.get(0)).unwrap();
            rows.collect::<std::result::Result<_, _>>().unwrap()
        };
        assert_eq!(
            columns,
            vec![
                "code_hash",
                "payload",
                "expires_at",
                "created_at",
                "retrieved_count",
                "last_retrieved_at"
            ]
        );
    }

    #[test]
    fn test_single_use_roundtrip() {
        let store = SqliteStore::open_in_memory(RetrievalMode::SingleUse).unwrap();
        let h = hash("AbC123xYz890");
        let payload = json!({ "ciphertext": "abc", "v": 1 });

        store.put(&h, payload.clone(), Utc::now() + ChronoDuration::minutes(5)).unwrap();

        let first = store.take(&h).unwrap();
        assert_eq!(first.backend, Backend::Persistent);
        assert_eq!(first.outcome, Taken::Found(payload));

        assert_eq!(store.take(&h).unwrap().outcome, Taken::Missing);
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_expired_row_is_deleted_on_take() {
        let store = SqliteStore::open_in_memory(RetrievalMode::SingleUse).unwrap();
        let h = hash("ZzZzZzZzZzZz");
        store.put(&h, json!({ "v": 1 }), Utc::now() - ChronoDuration::minutes(1)).unwrap();

        assert!(store.take(&h).unwrap().expired());
        assert_eq!(store.take(&h).unwrap().outcome, Taken::Missing);
    }

    #[test]
    fn test_multi_use_updates_counters() {
        let store = SqliteStore::open_in_memory(RetrievalMode::MultiUse).unwrap();
        let h = hash("MultiUse0001");
        store.put(&h, json!("p"), Utc::now() + ChronoDuration::minutes(5)).unwrap();

        for _ in 0..3 {
            assert!(store.take(&h).unwrap().found());
        }

        let (count, last) = store.retrieval_stats(&h).unwrap().unwrap();
        assert_eq!(count, 3);
        assert!(last.is_some());
    }

    #[test]
    fn test_multi_use_expired_is_deleted() {
        let store = SqliteStore::open_in_memory(RetrievalMode::MultiUse).unwrap();
        let h = hash("MultiUse0002");
        store.put(&h, json!("p"), Utc::now() - ChronoDuration::seconds(1)).unwrap();

        assert!(store.take(&h).unwrap().expired());
        assert!(store.retrieval_stats(&h).unwrap().is_none());
    }

    #[test]
    fn test_upsert_resets_counters() {
        let store = SqliteStore::open_in_memory(RetrievalMode::MultiUse).unwrap();
        let h = hash("Replace00001");
        store.put(&h, json!("old"), Utc::now() + ChronoDuration::minutes(5)).unwrap();
        store.take(&h).unwrap();
        store.put(&h, json!("new"), Utc::now() + ChronoDuration::minutes(5)).unwrap();

        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(store.retrieval_stats(&h).unwrap(), Some((0, None)));
        assert_eq!(store.take(&h).unwrap().into_payload(), Some(json!("new")));
    }

    #[test]
    fn test_cleanup_expired() {
        let store = SqliteStore::open_in_memory(RetrievalMode::SingleUse).unwrap();
        store.put(&hash("a"), json!(1), Utc::now() - ChronoDuration::minutes(1)).unwrap();
        store.put(&hash("b"), json!(2), Utc::now() + ChronoDuration::minutes(1)).unwrap();

        assert_eq!(store.cleanup_expired().unwrap().purged, 1);
        assert_eq!(store.cleanup_expired().unwrap().purged, 0);
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("handoff.db");
        let h = hash("Persist00001");

        {
            let store = SqliteStore::open(&path, RetrievalMode::SingleUse).unwrap();
            store.put(&h, json!("kept"), Utc::now() + ChronoDuration::minutes(5)).unwrap();
        }

        let store = SqliteStore::open(&path, RetrievalMode::SingleUse).unwrap();
        assert_eq!(store.take(&h).unwrap().into_payload(), Some(json!("kept")));
    }
}
