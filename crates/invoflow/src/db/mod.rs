//! SQLite persistence for folders, files, analysis records and queue tasks.
//!
//! One connection per process, shared behind a mutex. Repositories are
//! modules of free functions taking `&Database`; each call holds the lock for
//! a single short statement or transaction.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;

pub mod analysis_repo;
pub mod error;
pub mod file_repo;
pub mod folder_repo;
pub mod migrations;
pub mod queue_repo;

pub use error::DatabaseError;

/// Shared handle to the invoflow database. Clones share one connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens the database file, creating parent directories, and migrates
    /// it to the latest schema.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DatabaseError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let conn = Connection::open(path)?;
        // WAL lets the CLI `status` command read while workers write
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")?;
        let db = Self::init(conn)?;
        log::info!("Database ready at {}", path.display());
        Ok(db)
    }

    /// Fresh migrated database that lives as long as the handle.
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, DatabaseError> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        migrations::run_all(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `f` with the connection locked.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        f(&conn)
    }
}

/// `~/.invoflow/data/invoflow.db`, used when the config names no path.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".invoflow").join("data").join("invoflow.db"))
}

/// Formats a timestamp the way every table stores it.
///
/// Fixed millisecond precision and a `Z` suffix keep lexical order equal to
/// chronological order, which the queue's `available_at` comparisons rely on.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn now_ts() -> String {
    format_ts(Utc::now())
}
