use std::path::PathBuf;

use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Cannot prepare database location '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Migration failed at version {version}: {reason}")]
    Migration { version: u32, reason: String },

    /// A stored value no longer maps onto its domain type.
    #[error("Corrupt value in column '{column}': {value}")]
    Corrupt { column: &'static str, value: String },

    #[error("JSON column error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,
}

impl DatabaseError {
    /// Contention and I/O failures may clear up on their own; bad data and
    /// schema problems will not.
    pub fn is_transient(&self) -> bool {
        match self {
            DatabaseError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked | ErrorCode::SystemIoFailure
            ),
            DatabaseError::Sqlite(_) => false,
            DatabaseError::Io { .. } | DatabaseError::LockPoisoned => true,
            DatabaseError::Migration { .. } | DatabaseError::Corrupt { .. } | DatabaseError::Json(_) => false,
        }
    }
}
