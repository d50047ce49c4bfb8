use crate::now_ms;
use anyhow::Context;
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};

pub const KIND_COMPLETED: &str = "task.completed";

/// SQLite-backed key/value blobs plus an append-only event log. Every call
/// opens its own connection, so a `Store` is cheap to clone and share.
#[derive(Debug, Clone)]
pub struct Store {
    db_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Blob {
    pub key: String,
    pub value_json: String,
    pub updated_at_ms: i64,
    pub rev: i64,
}

impl Store {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn open(&self) -> anyhow::Result<Connection> {
        let path = self.db_path.clone();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create db dir: {}", dir.display()))?;
        }

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("open sqlite db: {}", path.display()))?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        migrate(&conn)?;
        Ok(conn)
    }

    /// Writes `value_json` under `key`. Last write wins; the revision counts
    /// writes to the key.
    pub fn put_blob(&self, key: &str, value_json: &str) -> anyhow::Result<Blob> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        let ts = now_ms();
        tx.execute(
            "INSERT INTO kv (key, value_json, updated_at_ms, rev) VALUES (?1, ?2, ?3, 1)
             ON CONFLICT(key) DO UPDATE SET
               value_json = excluded.value_json,
               updated_at_ms = excluded.updated_at_ms,
               rev = kv.rev + 1",
            (key, value_json, ts),
        )?;
        let rev: i64 = tx.query_row("SELECT rev FROM kv WHERE key = ?1", [key], |row| row.get(0))?;
        append_event_tx(&tx, "kv.put", Some(key), serde_json::json!({ "key": key, "rev": rev }))?;
        tx.commit()?;
        Ok(Blob {
            key: key.to_string(),
            value_json: value_json.to_string(),
            updated_at_ms: ts,
            rev,
        })
    }

    pub fn get_blob(&self, key: &str) -> anyhow::Result<Option<Blob>> {
        let conn = self.open()?;
        let blob = conn
            .query_row(
                "SELECT key, value_json, updated_at_ms, rev FROM kv WHERE key = ?1",
                [key],
                |row| {
                    Ok(Blob {
                        key: row.get(0)?,
                        value_json: row.get(1)?,
                        updated_at_ms: row.get(2)?,
                        rev: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(blob)
    }

    pub fn record_completion(&self, character_id: &str, task: &str) -> anyhow::Result<i64> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        let seq = append_event_tx(
            &tx,
            KIND_COMPLETED,
            Some(character_id),
            serde_json::json!({ "id": character_id, "task": task }),
        )?;
        tx.commit()?;
        Ok(seq)
    }

    /// Completions logged at or after `since_ms`.
    pub fn completions_since(&self, since_ms: i64) -> anyhow::Result<u64> {
        let conn = self.open()?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM event_log WHERE kind = ?1 AND ts_ms >= ?2",
            (KIND_COMPLETED, since_ms),
            |row| row.get(0),
        )?;
        Ok(n.max(0) as u64)
    }
}

fn migrate(conn: &Connection) -> anyhow::Result<()> {
    let v: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if v < 1 {
        conn.execute_batch(
            r#"
CREATE TABLE IF NOT EXISTS kv (
  key TEXT PRIMARY KEY,
  value_json TEXT NOT NULL,
  updated_at_ms INTEGER NOT NULL,
  rev INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS event_log (
  seq INTEGER PRIMARY KEY AUTOINCREMENT,
  ts_ms INTEGER NOT NULL,
  kind TEXT NOT NULL,
  subject TEXT,
  payload_json TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_event_log_ts ON event_log(ts_ms);
CREATE INDEX IF NOT EXISTS idx_event_log_kind ON event_log(kind);
"#,
        )
        .context("migrate v1")?;
        conn.pragma_update(None, "user_version", 1_i64)?;
    }
    Ok(())
}

fn append_event_tx(
    tx: &rusqlite::Transaction<'_>,
    kind: &str,
    subject: Option<&str>,
    payload: serde_json::Value,
) -> anyhow::Result<i64> {
    let ts = now_ms();
    let payload_json = payload.to_string();
    tx.execute(
        "INSERT INTO event_log (ts_ms, kind, subject, payload_json) VALUES (?1, ?2, ?3, ?4)",
        (ts, kind, subject, payload_json),
    )?;
    Ok(tx.last_insert_rowid())
}


#[cfg(test)]
mod tests {
    use super::testing::temp_store;
    use super::*;

    #[test]
    fn missing_key_is_none() {
        let s = temp_store("missing");
        assert!(s.get_blob("nope").unwrap().is_none());
        assert_eq!(s.completions_since(0).unwrap(), 0);
    }

    #[test]
    fn last_write_wins_and_rev_counts_writes() {
        let s = temp_store("lww");
        let first = s.put_blob("office.snapshot", r#"{"a":1}"#).unwrap();
        assert_eq!(first.rev, 1);
        let second = s.put_blob("office.snapshot", r#"{"a":2}"#).unwrap();
        assert_eq!(second.rev, 2);
        let got = s.get_blob("office.snapshot").unwrap().unwrap();
        assert_eq!(got.value_json, r#"{"a":2}"#);
        assert_eq!(got.rev, 2);
    }

    #[test]
    fn completions_are_counted_from_a_cutoff() {
        let s = temp_store("completions");
        let before = now_ms();
        s.record_completion("qa", "执行测试用例").unwrap();
        s.record_completion("fe", "实现UI组件").unwrap();
        s.put_blob("k", "{}").unwrap();
        assert_eq!(s.completions_since(before).unwrap(), 2);
        assert_eq!(s.completions_since(i64::MAX).unwrap(), 0);
    }

    #[test]
    fn reopening_keeps_data() {
        let s = temp_store("reopen");
        s.put_blob("k", "1").unwrap();
        let again = Store::new(s.db_path().to_path_buf());
        assert_eq!(again.get_blob("k").unwrap().unwrap().value_json, "1");
    }
}
