//! Versioned schema migrations embedded from `sql/`.

use rusqlite::{params, Connection};

use super::error::DatabaseError;
use super::now_ts;

struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

/// All migrations in order. Each is applied at most once.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_folders_table",
        sql: include_str!("sql/001_create_folders.sql"),
    },
    Migration {
        version: 2,
        description: "create_files_table",
        sql: include_str!("sql/002_create_files.sql"),
    },
    Migration {
        version: 3,
        description: "create_file_analyses_table",
        sql: include_str!("sql/003_create_file_analyses.sql"),
    },
    Migration {
        version: 4,
        description: "create_queue_tasks_table",
        sql: include_str!("sql/004_create_queue_tasks.sql"),
    },
    Migration {
        version: 5,
        description: "create_email_sent_batches_table",
        sql: include_str!("sql/005_create_email_sent_batches.sql"),
    },
    Migration {
        version: 6,
        description: "add_file_rename_target",
        sql: include_str!("sql/006_add_file_rename_target.sql"),
    },
];

/// Brings the schema up to the latest version.
///
/// Each pending migration runs in its own transaction together with its
/// `_migrations` row; a failing one is rolled back and stops the run.
pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL
        );",
    )?;

    let applied: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > applied) {
        log::info!("Applying migration v{} ({})", migration.version, migration.description);
        apply(conn, migration).map_err(|e| DatabaseError::Migration {
            version: migration.version,
            reason: e.to_string(),
        })?;
    }

    Ok(())
}

fn apply(conn: &Connection, migration: &Migration) -> rusqlite::Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(migration.sql)?;
    tx.execute(
        "INSERT INTO _migrations (version, description, applied_at) VALUES (?1, ?2, ?3)",
        params![migration.version, migration.description, now_ts()],
    )?;
    tx.commit()
}

/// Checks whether a table exists in the schema.
pub fn table_exists(conn: &Connection, table: &str) -> Result<bool, DatabaseError> {
    let count: u32 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |r| r.get(0),
    )?;
    Ok(count > 0)
}
