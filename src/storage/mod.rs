use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use time::OffsetDateTime;

use crate::config::StorageOptions;

mod persistence;
mod schema;

pub use persistence::{Persistence, WriteThrough, FOREST_KEY, NOTES_KEY};

/// Synchronous string key-value storage, the local equivalent of browser storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

#[derive(Clone)]
pub struct SqliteStore {
    db_path: Arc<PathBuf>,
    options: Arc<StorageOptions>,
}

impl SqliteStore {
    pub fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&*self.db_path)
            .with_context(|| format!("opening database {}", self.db_path.display()))?;
        prepare_connection(&conn, &self.options)?;
        Ok(conn)
    }

    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.connect()?;
        f(&conn)
    }

    pub fn database_path(&self) -> &Path {
        &self.db_path
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_connection(|conn| {
            conn.query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()
            .with_context(|| format!("reading key {key}"))
        })
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                                updated_at = excluded.updated_at",
                params![key, value, now],
            )
            .with_context(|| format!("writing key {key}"))?;
            Ok(())
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute("DELETE FROM kv WHERE key = ?1", params![key])
                .with_context(|| format!("removing key {key}"))?;
            Ok(())
        })
    }
}

/// Process-local store. Used by tests and when no disk store can be opened.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

pub fn init(storage: &StorageOptions) -> Result<SqliteStore> {
    let db_path = &storage.database_path;
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating data directory {}", parent.display()))?;
    }
    let conn = Connection::open(db_path)
        .with_context(|| format!("opening database {}", db_path.display()))?;
    prepare_connection(&conn, storage)?;
    schema::apply(&conn)?;
    Ok(SqliteStore {
        db_path: Arc::new(db_path.clone()),
        options: Arc::new(storage.clone()),
    })
}

fn prepare_connection(conn: &Connection, storage: &StorageOptions) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")
        .context("setting journal_mode=WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .context("setting synchronous=NORMAL")?;
    conn.pragma_update(
        None,
        "wal_autocheckpoint",
        storage.wal_autocheckpoint.to_string(),
    )
    .context("setting wal_autocheckpoint")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn init_store() -> anyhow::Result<(TempDir, SqliteStore)> {
        let temp = TempDir::new()?;
        let options = StorageOptions {
            database_path: temp.path().join("data/strata.db"),
            ..StorageOptions::default()
        };
        let store = init(&options)?;
        Ok((temp, store))
    }

    #[test]
    fn sqlite_store_round_trips_and_overwrites() -> anyhow::Result<()> {
        let (_temp, store) = init_store()?;
        assert_eq!(store.get("k")?, None);
        store.set("k", "one")?;
        store.set("k", "two")?;
        assert_eq!(store.get("k")?.as_deref(), Some("two"));
        store.remove("k")?;
        assert_eq!(store.get("k")?, None);
        Ok(())
    }

    #[test]
    fn sqlite_store_survives_reopen() -> anyhow::Result<()> {
        let (_temp, store) = init_store()?;
        store.set("strata.notes.v2", "[]")?;
        let options = StorageOptions {
            database_path: store.database_path().to_path_buf(),
            ..StorageOptions::default()
        };
        let reopened = init(&options)?;
        assert_eq!(reopened.get("strata.notes.v2")?.as_deref(), Some("[]"));
        Ok(())
    }

    #[test]
    fn memory_store_is_isolated_per_instance() -> anyhow::Result<()> {
        let first = MemoryStore::new();
        let second = MemoryStore::new();
        first.set("k", "v")?;
        assert_eq!(second.get("k")?, None);
        Ok(())
    }
}
