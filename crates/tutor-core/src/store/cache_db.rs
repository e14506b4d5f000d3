//! Durable cache tier: a key/value table in SQLite.
//!
//! Values are stored as JSON text with a crc32 checksum. Rows that are
//! expired, fail the checksum, or do not parse as JSON are deleted on read
//! and reported as absent.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};

use crate::errors::{TutorError, TutorResult};
use crate::store::schema;

/// One row of `cache_entries`.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredEntry {
    pub value: String,
    pub size_bytes: usize,
    /// Absolute expiry in unix seconds.
    pub expires_at: f64,
}

pub struct SqliteTier {
    path: PathBuf,
    conn: Connection,
}

impl std::fmt::Debug for SqliteTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteTier").field("path", &self.path).finish()
    }
}

fn checksum(value: &str) -> i64 {
    i64::from(crc32fast::hash(value.as_bytes()))
}

impl SqliteTier {
    /// Open (creating parent directories) and migrate the cache database.
    pub fn open(path: &Path) -> TutorResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| TutorError::persistence(parent, e))?;
        }
        let conn = Connection::open(path)?;
        Self::with_connection(path.to_path_buf(), conn)
    }

    pub fn open_in_memory() -> TutorResult<Self> {
        Self::with_connection(PathBuf::from(":memory:"), Connection::open_in_memory()?)
    }

    fn with_connection(path: PathBuf, conn: Connection) -> TutorResult<Self> {
        conn.execute_batch(schema::CONNECTION_PRAGMAS)?;
        schema::init_schema(&conn)?;
        Ok(Self { path, conn })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Live entry for `key`, or `None`. Expired and corrupt rows are purged.
    pub fn get(&self, key: &str, now: f64) -> TutorResult<Option<StoredEntry>> {
        let row = self
            .conn
            .query_row(
                "SELECT value, size_bytes, expires_at, checksum FROM cache_entries WHERE key = ?1;",
                params![key],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, f64>(2)?,
                        row.get::<_, Option<i64>>(3)?,
                    ))
                },
            )
            .optional()?;
        let Some((value, size_bytes, expires_at, stored_checksum)) = row else {
            return Ok(None);
        };

        if expires_at <= now {
            self.remove(key)?;
            return Ok(None);
        }
        let checksum_ok = stored_checksum.map_or(true, |c| c == checksum(&value));
        if !checksum_ok || serde_json::from_str::<serde_json::Value>(&value).is_err() {
            tracing::warn!(key, "dropping corrupt cache entry");
            self.remove(key)?;
            return Ok(None);
        }
        Ok(Some(StoredEntry {
            value,
            size_bytes: usize::try_from(size_bytes).unwrap_or(0),
            expires_at,
        }))
    }

    pub fn put(&self, key: &str, entry: &StoredEntry, now: f64) -> TutorResult<()> {
        self.conn.execute(
            "INSERT INTO cache_entries(key, value, size_bytes, expires_at, created_at, checksum) \
             VALUES(?1, ?2, ?3, ?4, ?5, ?6) \
             ON CONFLICT(key) DO UPDATE SET \
                value = excluded.value, \
                size_bytes = excluded.size_bytes, \
                expires_at = excluded.expires_at, \
                created_at = excluded.created_at, \
                checksum = excluded.checksum;",
            params![
                key,
                entry.value,
                entry.size_bytes as i64,
                entry.expires_at,
                now,
                checksum(&entry.value)
            ],
        )?;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> TutorResult<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM cache_entries WHERE key = ?1;", params![key])?;
        Ok(removed > 0)
    }

    pub fn clear(&self) -> TutorResult<()> {
        self.conn.execute("DELETE FROM cache_entries;", [])?;
        Ok(())
    }

    /// Delete every expired row; returns how many were removed.
    pub fn purge_expired(&self, now: f64) -> TutorResult<usize> {
        let removed = self
            .conn
            .execute("DELETE FROM cache_entries WHERE expires_at <= ?1;", params![now])?;
        Ok(removed)
    }

    pub fn len(&self) -> TutorResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM cache_entries;", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    pub fn is_empty(&self) -> TutorResult<bool> {
        Ok(self.len()? == 0)
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }
}
