use std::path::Path;

use rusqlite::{params, Connection};
use thiserror::Error;

use crate::db::{RepairIterationRecord, RepairRunRecord};

/// Minimum schema version we know how to handle.
///
/// `0` means "no schema yet" (fresh DB).
const MIN_SUPPORTED_SCHEMA_VERSION: i32 = 0;

/// Latest schema version this crate knows about.
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Error type for project database operations.
#[derive(Debug, Error)]
pub enum DbError {
    /// Underlying SQLite error.
    #[error("SQLite error: {0}")]
    Sql(#[from] rusqlite::Error),

    /// The database was created with a newer schema version than we support.
    #[error(
        "Unsupported schema version {found}; supported range is {min_supported}..={max_supported}"
    )]
    UnsupportedSchemaVersion { found: i32, min_supported: i32, max_supported: i32 },
}

/// Convenience result type for DB operations.
pub type DbResult<T> = Result<T, DbError>;

/// SQLite-backed project database holding repair history.
#[derive(Debug)]
pub struct ProjectDb {
    conn: Connection,
}

impl ProjectDb {
    /// Open (or create) a project database at the given path and ensure the schema exists.
    pub fn open(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        apply_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Expose a reference to the underlying connection for advanced callers.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn schema_version(&self) -> DbResult<i32> {
        current_schema_version(&self.conn)
    }

    /// Insert a repair run record and return its row id.
    pub fn insert_repair_run(&self, record: &RepairRunRecord) -> DbResult<i64> {
        self.conn.execute(
            r#"
            INSERT INTO repair_runs (binary, binary_hash, table_path, outcome, detail, iterations, splits, started_at, finished_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                record.binary,
                record.binary_hash,
                record.table_path,
                record.outcome,
                record.detail,
                record.iterations,
                record.splits,
                record.started_at,
                record.finished_at
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// List repair runs, oldest first.
    pub fn list_repair_runs(&self) -> DbResult<Vec<RepairRunRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, binary, binary_hash, table_path, outcome, detail, iterations, splits, started_at, finished_at
            FROM repair_runs
            ORDER BY id
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(RepairRunRecord {
                id: row.get(0)?,
                binary: row.get(1)?,
                binary_hash: row.get(2)?,
                table_path: row.get(3)?,
                outcome: row.get(4)?,
                detail: row.get(5)?,
                iterations: row.get(6)?,
                splits: row.get(7)?,
                started_at: row.get(8)?,
                finished_at: row.get(9)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn insert_iteration(&self, record: &RepairIterationRecord) -> DbResult<i64> {
        self.conn.execute(
            r#"
            INSERT INTO repair_iterations (run_id, iteration, result, address, work_completed, split_applied)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                record.run_id,
                record.iteration,
                record.result,
                record.address,
                record.work_completed,
                record.split_applied
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Iterations of one run, in order.
    pub fn list_iterations(&self, run_id: i64) -> DbResult<Vec<RepairIterationRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT run_id, iteration, result, address, work_completed, split_applied
            FROM repair_iterations
            WHERE run_id = ?1
            ORDER BY iteration
            "#,
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok(RepairIterationRecord {
                run_id: row.get(0)?,
                iteration: row.get(1)?,
                result: row.get(2)?,
                address: row.get(3)?,
                work_completed: row.get(4)?,
                split_applied: row.get(5)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

/// Apply schema migrations to bring the database to the latest version.
///
/// We use `PRAGMA user_version` as the schema version indicator.
///
/// Version map:
/// - 0: no schema
/// - 1: repair_runs
/// - 2: repair_iterations
fn apply_migrations(conn: &Connection) -> DbResult<()> {
    let mut current_version = current_schema_version(conn)?;

    // Reject DBs created with a newer schema than we support.
    if current_version > CURRENT_SCHEMA_VERSION {
        return Err(DbError::UnsupportedSchemaVersion {
            found: current_version,
            min_supported: MIN_SUPPORTED_SCHEMA_VERSION,
            max_supported: CURRENT_SCHEMA_VERSION,
        });
    }

    if current_version == 0 {
        conn.execute_batch(
            r#"
            BEGIN;
            CREATE TABLE IF NOT EXISTS repair_runs (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                binary      TEXT,
                binary_hash TEXT,
                table_path  TEXT NOT NULL,
                outcome     TEXT NOT NULL,
                detail      TEXT,
                iterations  INTEGER NOT NULL,
                splits      INTEGER NOT NULL,
                started_at  TEXT NOT NULL,
                finished_at TEXT NOT NULL
            );

            PRAGMA user_version = 1;
            COMMIT;
            "#,
        )?;
        current_version = 1;
    }

    if current_version < 2 {
        conn.execute_batch(
            r#"
            BEGIN;
            CREATE TABLE IF NOT EXISTS repair_iterations (
                run_id         INTEGER NOT NULL REFERENCES repair_runs(id),
                iteration      INTEGER NOT NULL,
                result         TEXT NOT NULL,
                address        INTEGER,
                work_completed INTEGER,
                split_applied  INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY(run_id, iteration)
            );

            PRAGMA user_version = 2;
            COMMIT;
            "#,
        )?;
    }

    Ok(())
}

/// Read the SQLite schema version from `PRAGMA user_version`.
fn current_schema_version(conn: &Connection) -> DbResult<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    Ok(version)
}
