//! SQLite schema DDL and migrations for the durable cache tier.

use rusqlite::Connection;

use crate::errors::TutorResult;

/// Current schema version. Migrations run from whatever the database
/// reports up to this value.
pub const SCHEMA_VERSION: i32 = 2;

/// Base DDL, safe to replay on an initialised database.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS cache_meta (
        key TEXT PRIMARY KEY,
        value TEXT
    );",
    "CREATE TABLE IF NOT EXISTS cache_entries (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        size_bytes INTEGER NOT NULL,
        expires_at REAL NOT NULL,
        created_at REAL NOT NULL
    );",
    "CREATE INDEX IF NOT EXISTS idx_cache_entries_expires ON cache_entries(expires_at);",
];

/// Pragmas applied to every new connection.
pub const CONNECTION_PRAGMAS: &str = "PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA busy_timeout = 5000;";

/// Create the base schema and run pending migrations.
pub fn init_schema(conn: &Connection) -> TutorResult<()> {
    for stmt in SCHEMA_STATEMENTS {
        conn.execute_batch(stmt)?;
    }
    migrate_schema(conn)
}

/// Run every pending migration step inside its own savepoint.
pub fn migrate_schema(conn: &Connection) -> TutorResult<()> {
    let mut current_version = get_schema_version(conn);

    while current_version < SCHEMA_VERSION {
        let next_version = current_version + 1;
        conn.execute_batch("SAVEPOINT tutor_migrate_step;")?;

        let step_result = (|| -> TutorResult<()> {
            match next_version {
                1 => migrate_to_v1(conn)?,
                2 => migrate_to_v2(conn)?,
                _ => {}
            }
            set_schema_version(conn, next_version)?;
            conn.execute_batch("RELEASE SAVEPOINT tutor_migrate_step;")?;
            Ok(())
        })();

        match step_result {
            Ok(()) => current_version = next_version,
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK TO SAVEPOINT tutor_migrate_step;");
                let _ = conn.execute_batch("RELEASE SAVEPOINT tutor_migrate_step;");
                tracing::warn!(from = current_version, to = next_version, error = %e, "cache schema migration failed");
                return Err(e);
            }
        }
    }
    Ok(())
}

pub fn get_schema_version(conn: &Connection) -> i32 {
    let result: Result<String, _> = conn.query_row(
        "SELECT value FROM cache_meta WHERE key = 'schema_version';",
        [],
        |row| row.get(0),
    );
    match result {
        Ok(v) => v.parse::<i32>().unwrap_or(0),
        Err(_) => 0,
    }
}

fn set_schema_version(conn: &Connection, version: i32) -> TutorResult<()> {
    conn.execute(
        "INSERT INTO cache_meta(key, value) \
         VALUES('schema_version', ?1) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value;",
        rusqlite::params![version.to_string()],
    )?;
    Ok(())
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> TutorResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
    for name in names {
        if name? == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// v1: base tables (created by the DDL above).
fn migrate_to_v1(_conn: &Connection) -> TutorResult<()> {
    Ok(())
}

/// v2: crc32 checksum of the stored value, for corruption detection.
fn migrate_to_v2(conn: &Connection) -> TutorResult<()> {
    if !column_exists(conn, "cache_entries", "checksum")? {
        conn.execute_batch("ALTER TABLE cache_entries ADD COLUMN checksum INTEGER;")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrate_fresh_database() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);
        assert!(column_exists(&conn, "cache_entries", "checksum").unwrap());
    }

    #[test]
    fn migrate_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);
    }

    #[test]
    fn migrate_from_v1_adds_checksum() {
        let conn = Connection::open_in_memory().unwrap();
        for stmt in SCHEMA_STATEMENTS {
            conn.execute_batch(stmt).unwrap();
        }
        set_schema_version(&conn, 1).unwrap();
        assert!(!column_exists(&conn, "cache_entries", "checksum").unwrap());
        migrate_schema(&conn).unwrap();
        assert!(column_exists(&conn, "cache_entries", "checksum").unwrap());
    }
}
