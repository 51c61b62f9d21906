//! SQLite storage backend

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Result as SqliteResult};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::application::errors::StorageError;
use crate::domain::traits::StorageBackend;

/// Tenant data in a single `guild_data` table.
///
/// Calls run on the blocking pool; the connection mutex serialises writers,
/// so every set is an atomic upsert followed by a re-read of the stored row.
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection, StorageError> {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let conn = Connection::open(&path)?;
            init_tables(&conn)?;
            Ok(conn)
        })
        .await
        .map_err(|e| StorageError::Unavailable(e.to_string()))??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Private database for tests and throwaway runs
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        init_tables(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StorageError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock();
            f(&guard)
        })
        .await
        .map_err(|e| StorageError::Unavailable(e.to_string()))?
    }
}

fn init_tables(conn: &Connection) -> SqliteResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS guild_data (
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            keyword TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (entity_type, entity_id, keyword)
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_guild_data_entity ON guild_data(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

fn read_value(conn: &Connection, entity_type: &str, entity_id: &str, keyword: &str) -> Result<Option<Value>, StorageError> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM guild_data WHERE entity_type = ?1 AND entity_id = ?2 AND keyword = ?3",
            [entity_type, entity_id, keyword],
            |row| row.get(0),
        )
        .optional()?;

    match raw {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn get(&self, entity_type: &str, entity_id: &str, keyword: &str) -> Result<Option<Value>, StorageError> {
        let (entity_type, entity_id, keyword) = (entity_type.to_string(), entity_id.to_string(), keyword.to_string());
        self.with_conn(move |conn| read_value(conn, &entity_type, &entity_id, &keyword))
            .await
    }

    async fn set(&self, entity_type: &str, entity_id: &str, keyword: &str, value: Value) -> Result<Value, StorageError> {
        let (entity_type, entity_id, keyword) = (entity_type.to_string(), entity_id.to_string(), keyword.to_string());
        let raw = serde_json::to_string(&value)?;

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO guild_data (entity_type, entity_id, keyword, value, updated_at)
                 VALUES (?1, ?2, ?3, ?4, datetime('now'))
                 ON CONFLICT(entity_type, entity_id, keyword)
                 DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                rusqlite::params![&entity_type, &entity_id, &keyword, &raw],
            )?;
            read_value(conn, &entity_type, &entity_id, &keyword)?.ok_or_else(|| {
                StorageError::Unavailable(format!("row {}/{}/{} vanished after write", entity_type, entity_id, keyword))
            })
        })
        .await
    }
}
