//! Folder repository: the `folders` table and the sent-batches set.

use rusqlite::{params, OptionalExtension, Row};

use super::{now_ts, Database, DatabaseError};
use crate::model::{Folder, RenameFormat};

fn folder_from_row(row: &Row<'_>) -> Result<Folder, rusqlite::Error> {
    let format: Option<String> = row.get("format")?;
    Ok(Folder {
        id: row.get("id")?,
        owner_id: row.get("owner_id")?,
        name: row.get("name")?,
        format: format
            .as_deref()
            .map(RenameFormat::parse)
            .unwrap_or_default(),
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

/// Inserts a new folder row.
pub fn insert(db: &Database, folder: &Folder) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO folders (id, owner_id, name, format, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                folder.id,
                folder.owner_id,
                folder.name,
                folder.format.as_str(),
                folder.created_at,
                folder.updated_at,
            ],
        )?;
        Ok(())
    })
}

/// Creates a folder with a fresh id and the current timestamp.
pub fn create(
    db: &Database,
    owner_id: &str,
    name: &str,
    format: RenameFormat,
) -> Result<Folder, DatabaseError> {
    let now = now_ts();
    let folder = Folder {
        id: uuid::Uuid::new_v4().to_string(),
        owner_id: owner_id.to_string(),
        name: name.to_string(),
        format,
        created_at: now.clone(),
        updated_at: now,
    };
    insert(db, &folder)?;
    Ok(folder)
}

/// Finds a folder by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<Folder>, DatabaseError> {
    db.with_conn(|conn| {
        let folder = conn
            .query_row(
                "SELECT * FROM folders WHERE id = ?1",
                params![id],
                folder_from_row,
            )
            .optional()?;
        Ok(folder)
    })
}

/// Atomically adds `batch_id` to the folder's notified set.
///
/// Returns `true` only for the single caller that actually added it.
pub fn mark_batch_notified(
    db: &Database,
    folder_id: &str,
    batch_id: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO email_sent_batches (folder_id, batch_id, sent_at)
             VALUES (?1, ?2, ?3)",
            params![folder_id, batch_id, now_ts()],
        )?;
        Ok(inserted == 1)
    })
}

/// Returns the batch ids already notified for a folder, oldest first.
pub fn notified_batches(db: &Database, folder_id: &str) -> Result<Vec<String>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT batch_id FROM email_sent_batches WHERE folder_id = ?1
             ORDER BY sent_at ASC, batch_id ASC",
        )?;
        let rows = stmt
            .query_map(params![folder_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
