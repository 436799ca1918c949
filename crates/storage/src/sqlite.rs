#![forbid(unsafe_code)]

use crate::{MarkerKey, MarkerStore, StoreError, check_value};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const DB_FILE: &str = "rewardhub.db";
const SCHEMA_VERSION: i64 = 1;

#[derive(Debug)]
pub struct SqliteMarkers {
    conn: Mutex<Connection>,
    storage_dir: PathBuf,
}

impl SqliteMarkers {
    pub fn open(storage_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&storage_dir)?;

        let conn = Connection::open(storage_dir.join(DB_FILE))?;
        conn.busy_timeout(Duration::from_secs(5))?;
        migrate(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            storage_dir,
        })
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn migrate(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode=WAL;
        PRAGMA synchronous=NORMAL;

        CREATE TABLE IF NOT EXISTS meta (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS markers (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL,
          updated_at_ms INTEGER NOT NULL
        );
        "#,
    )?;

    let stored: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key='schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    match stored {
        None => {
            conn.execute(
                "INSERT INTO meta(key, value) VALUES ('schema_version', ?1)",
                params![SCHEMA_VERSION.to_string()],
            )?;
        }
        Some(version) if version.parse::<i64>().ok() == Some(SCHEMA_VERSION) => {}
        Some(_) => {
            return Err(StoreError::InvalidInput(
                "RESET_REQUIRED: unsupported marker schema version",
            ));
        }
    }
    Ok(())
}

impl MarkerStore for SqliteMarkers {
    fn get(&self, key: MarkerKey) -> Result<Option<String>, StoreError> {
        let conn = self.conn();
        let value = conn
            .query_row(
                "SELECT value FROM markers WHERE key=?1",
                params![key.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: MarkerKey, value: &str) -> Result<(), StoreError> {
        check_value(value)?;
        let conn = self.conn();
        conn.execute(
            r#"
            INSERT INTO markers(key, value, updated_at_ms) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value=excluded.value, updated_at_ms=excluded.updated_at_ms
            "#,
            params![key.as_str(), value, now_ms()],
        )?;
        Ok(())
    }

    fn clear(&self, key: MarkerKey) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute("DELETE FROM markers WHERE key=?1", params![key.as_str()])?;
        Ok(())
    }
}

fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration,
        Err(_) => return 0,
    };

    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}
