//! File repository for the `files` table.
//!
//! Every write is a targeted update of the columns it owns, so concurrent
//! workers touching different files (or different columns) never clobber
//! each other.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, OptionalExtension, Row};

use super::{now_ts, Database, DatabaseError};
use crate::model::{FileRecord, FileStatus};
use crate::queue::BatchSummary;

impl FromSql for FileStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        FileStatus::parse(s)
            .ok_or_else(|| FromSqlError::Other(format!("unknown file status '{}'", s).into()))
    }
}

impl ToSql for FileStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

fn file_from_row(row: &Row<'_>) -> Result<FileRecord, rusqlite::Error> {
    let size: i64 = row.get("size")?;
    Ok(FileRecord {
        id: row.get("id")?,
        folder_id: row.get("folder_id")?,
        name: row.get("name")?,
        new_name: row.get("new_name")?,
        mime_type: row.get("mime_type")?,
        size: size.max(0) as u64,
        key: row.get("key")?,
        url: row.get("url")?,
        status: row.get("status")?,
        batch_id: row.get("batch_id")?,
        invoice_id: row.get("invoice_id")?,
        invoice_date: row.get("invoice_date")?,
        reason: row.get("reason")?,
        error: row.get("error")?,
        is_deleted: row.get("is_deleted")?,
        deleted_at: row.get("deleted_at")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

/// Where a renamed object ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenamedObject {
    pub key: String,
    pub url: Option<String>,
    pub new_name: String,
}

/// Inserts a new file row.
pub fn insert(db: &Database, file: &FileRecord) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO files (id, folder_id, name, new_name, mime_type, size, key, url, status,
             batch_id, invoice_id, invoice_date, reason, error, is_deleted, deleted_at,
             created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
            params![
                file.id,
                file.folder_id,
                file.name,
                file.new_name,
                file.mime_type,
                file.size as i64,
                file.key,
                file.url,
                file.status,
                file.batch_id,
                file.invoice_id,
                file.invoice_date,
                file.reason,
                file.error,
                file.is_deleted,
                file.deleted_at,
                file.created_at,
                file.updated_at,
            ],
        )?;
        Ok(())
    })
}

/// Finds a file by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<FileRecord>, DatabaseError> {
    db.with_conn(|conn| {
        let file = conn
            .query_row(
                "SELECT * FROM files WHERE id = ?1",
                params![id],
                file_from_row,
            )
            .optional()?;
        Ok(file)
    })
}

/// All non-deleted files still waiting to be queued, oldest first.
pub fn list_pending(db: &Database) -> Result<Vec<FileRecord>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM files WHERE status = 'PENDING' AND is_deleted = 0
             ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt
            .query_map([], file_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// All non-deleted files of one upload batch.
pub fn list_batch(
    db: &Database,
    folder_id: &str,
    batch_id: &str,
) -> Result<Vec<FileRecord>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM files WHERE folder_id = ?1 AND batch_id = ?2 AND is_deleted = 0
             ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt
            .query_map(params![folder_id, batch_id], file_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// All non-deleted files of a folder, newest first.
pub fn list_folder(db: &Database, folder_id: &str) -> Result<Vec<FileRecord>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM files WHERE folder_id = ?1 AND is_deleted = 0
             ORDER BY created_at DESC, id ASC",
        )?;
        let rows = stmt
            .query_map(params![folder_id], file_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Counts the files of a batch by lifecycle state.
///
/// Both PENDING and PROCESSING count as `processing`; soft-deleted files are
/// not part of the batch any more.
pub fn batch_summary(
    db: &Database,
    folder_id: &str,
    batch_id: &str,
) -> Result<BatchSummary, DatabaseError> {
    db.with_conn(|conn| {
        let summary = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN status = 'COMPLETED' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN status = 'FAILED' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN status IN ('PENDING', 'PROCESSING') THEN 1 ELSE 0 END), 0)
             FROM files WHERE folder_id = ?1 AND batch_id = ?2 AND is_deleted = 0",
            params![folder_id, batch_id],
            |r| {
                Ok(BatchSummary {
                    total: r.get(0)?,
                    completed: r.get(1)?,
                    failed: r.get(2)?,
                    processing: r.get(3)?,
                })
            },
        )?;
        Ok(summary)
    })
}

/// Moves a file from PENDING to PROCESSING. Returns `false` if the file was
/// not PENDING.
pub fn mark_processing(db: &Database, id: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE files SET status = 'PROCESSING', updated_at = ?2
             WHERE id = ?1 AND status = 'PENDING'",
            params![id, now_ts()],
        )?;
        Ok(changed == 1)
    })
}

/// Fails a non-terminal file with a raw error message.
pub fn mark_failed_with_error(db: &Database, id: &str, error: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE files SET status = 'FAILED', error = ?2, updated_at = ?3
             WHERE id = ?1 AND status NOT IN ('COMPLETED', 'FAILED')",
            params![id, error, now_ts()],
        )?;
        Ok(changed == 1)
    })
}

/// Fails a non-terminal file with a fixed validation reason. `error` is left
/// untouched.
pub fn mark_failed_with_reason(
    db: &Database,
    id: &str,
    reason: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE files SET status = 'FAILED', reason = ?2, updated_at = ?3
             WHERE id = ?1 AND status NOT IN ('COMPLETED', 'FAILED')",
            params![id, reason, now_ts()],
        )?;
        Ok(changed == 1)
    })
}

/// Completes a non-terminal file in one update: status, accepted invoice
/// fields and, when the object was renamed, its new location.
pub fn complete(
    db: &Database,
    id: &str,
    invoice_id: &str,
    invoice_date: &str,
    renamed: Option<&RenamedObject>,
) -> Result<bool, DatabaseError> {
    let now = now_ts();
    db.with_conn(|conn| {
        let changed = match renamed {
            Some(r) => conn.execute(
                "UPDATE files SET status = 'COMPLETED', invoice_id = ?2, invoice_date = ?3,
                 key = ?4, url = ?5, new_name = ?6, rename_target = NULL, updated_at = ?7
                 WHERE id = ?1 AND status NOT IN ('COMPLETED', 'FAILED')",
                params![id, invoice_id, invoice_date, r.key, r.url, r.new_name, now],
            )?,
            None => conn.execute(
                "UPDATE files SET status = 'COMPLETED', invoice_id = ?2, invoice_date = ?3,
                 updated_at = ?4
                 WHERE id = ?1 AND status NOT IN ('COMPLETED', 'FAILED')",
                params![id, invoice_id, invoice_date, now],
            )?,
        };
        Ok(changed == 1)
    })
}

/// Records where the rename stage is about to move the object. Written
/// before the move so a replayed task finishes the same move.
pub fn set_rename_target(db: &Database, id: &str, target: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE files SET rename_target = ?2, updated_at = ?3
             WHERE id = ?1 AND status NOT IN ('COMPLETED', 'FAILED')",
            params![id, target, now_ts()],
        )?;
        Ok(changed == 1)
    })
}

/// The destination of an unfinished rename, if any.
pub fn rename_target(db: &Database, id: &str) -> Result<Option<String>, DatabaseError> {
    db.with_conn(|conn| {
        let target = conn
            .query_row("SELECT rename_target FROM files WHERE id = ?1", [id], |r| {
                r.get::<_, Option<String>>(0)
            })
            .optional()?;
        Ok(target.flatten())
    })
}

/// Whether any file row points at `key`, as its key or as a pending
/// rename destination.
pub fn key_in_use(db: &Database, key: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let used: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM files WHERE key = ?1 OR rename_target = ?1)",
            [key],
            |r| r.get(0),
        )?;
        Ok(used)
    })
}

/// Points a file at its object's new key, whatever its status. Only applies
/// while the row still holds `from_key`.
pub fn relocate(
    db: &Database,
    id: &str,
    from_key: &str,
    to: &RenamedObject,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE files SET key = ?3, url = ?4, rename_target = NULL, updated_at = ?5
             WHERE id = ?1 AND key = ?2",
            params![id, from_key, to.key, to.url, now_ts()],
        )?;
        Ok(changed == 1)
    })
}

/// Soft-deletes a file. Workers skip deleted files.
pub fn soft_delete(db: &Database, id: &str) -> Result<bool, DatabaseError> {
    let now = now_ts();
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE files SET is_deleted = 1, deleted_at = ?2, updated_at = ?2
             WHERE id = ?1 AND is_deleted = 0",
            params![id, now],
        )?;
        Ok(changed == 1)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::folder_repo;
    use crate::model::RenameFormat;

    fn setup() -> (Database, String) {
        let db = Database::open_in_memory().unwrap();
        let folder = folder_repo::create(&db, "user-1", "Q1", RenameFormat::InvoiceDate).unwrap();
        (db, folder.id)
    }

    fn file(folder_id: &str, id: &str, batch_id: &str) -> FileRecord {
        let now = now_ts();
        FileRecord {
            id: id.to_string(),
            folder_id: folder_id.to_string(),
            name: format!("{}.pdf", id),
            new_name: None,
            mime_type: Some("application/pdf".to_string()),
            size: 1024,
            key: format!("uploads/{}/{}.pdf", folder_id, id),
            url: None,
            status: FileStatus::Pending,
            batch_id: batch_id.to_string(),
            invoice_id: String::new(),
            invoice_date: String::new(),
            reason: None,
            error: None,
            is_deleted: false,
            deleted_at: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    #[test]
    fn test_insert_and_find() {
        let (db, folder_id) = setup();
        let f = file(&folder_id, "a", "b1");
        insert(&db, &f).unwrap();

        let found = find_by_id(&db, "a").unwrap().unwrap();
        assert_eq!(found, f);
        assert!(find_by_id(&db, "nope").unwrap().is_none());
    }

    #[test]
    fn test_list_pending_skips_deleted_and_processing() {
        let (db, folder_id) = setup();
        insert(&db, &file(&folder_id, "a", "b1")).unwrap();
        insert(&db, &file(&folder_id, "b", "b1")).unwrap();
        insert(&db, &file(&folder_id, "c", "b1")).unwrap();
        assert!(mark_processing(&db, "b").unwrap());
        assert!(soft_delete(&db, "c").unwrap());

        let pending = list_pending(&db).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "a");
    }

    #[test]
    fn test_mark_processing_only_from_pending() {
        let (db, folder_id) = setup();
        insert(&db, &file(&folder_id, "a", "b1")).unwrap();
        assert!(mark_processing(&db, "a").unwrap());
        assert!(!mark_processing(&db, "a").unwrap());
    }

    #[test]
    fn test_failed_with_reason_leaves_error_null() {
        let (db, folder_id) = setup();
        insert(&db, &file(&folder_id, "a", "b1")).unwrap();
        mark_processing(&db, "a").unwrap();
        assert!(mark_failed_with_reason(&db, "a", "missing fields").unwrap());

        let f = find_by_id(&db, "a").unwrap().unwrap();
        assert_eq!(f.status, FileStatus::Failed);
        assert_eq!(f.reason.as_deref(), Some("missing fields"));
        assert!(f.error.is_none());
    }

    #[test]
    fn test_terminal_files_are_not_overwritten() {
        let (db, folder_id) = setup();
        insert(&db, &file(&folder_id, "a", "b1")).unwrap();
        assert!(complete(&db, "a", "INV-1", "2024-01-05", None).unwrap());
        assert!(!mark_failed_with_error(&db, "a", "late failure").unwrap());

        let f = find_by_id(&db, "a").unwrap().unwrap();
        assert_eq!(f.status, FileStatus::Completed);
        assert!(f.error.is_none());
    }

    #[test]
    fn test_complete_with_rename() {
        let (db, folder_id) = setup();
        insert(&db, &file(&folder_id, "a", "b1")).unwrap();
        let renamed = RenamedObject {
            key: format!("uploads/{}/INV-1-2024-01-05.pdf", folder_id),
            url: Some("https://files.example.com/x".to_string()),
            new_name: "INV-1-2024-01-05".to_string(),
        };
        assert!(complete(&db, "a", "INV-1", "2024-01-05", Some(&renamed)).unwrap());

        let f = find_by_id(&db, "a").unwrap().unwrap();
        assert_eq!(f.status, FileStatus::Completed);
        assert_eq!(f.key, renamed.key);
        assert_eq!(f.new_name.as_deref(), Some("INV-1-2024-01-05"));
        assert_eq!(f.invoice_id, "INV-1");
        assert_eq!(f.invoice_date, "2024-01-05");
    }

    #[test]
    fn test_batch_summary_counts_pending_as_processing() {
        let (db, folder_id) = setup();
        for id in ["a", "b", "c", "d"] {
            insert(&db, &file(&folder_id, id, "b1")).unwrap();
        }
        insert(&db, &file(&folder_id, "other", "b2")).unwrap();
        mark_processing(&db, "b").unwrap();
        complete(&db, "c", "INV-1", "2024-01-05", None).unwrap();
        mark_failed_with_error(&db, "d", "boom").unwrap();

        let summary = batch_summary(&db, &folder_id, "b1").unwrap();
        assert_eq!(
            summary,
            BatchSummary {
                total: 4,
                completed: 1,
                failed: 1,
                processing: 2,
            }
        );
    }

    #[test]
    fn test_batch_summary_of_unknown_batch_is_empty() {
        let (db, folder_id) = setup();
        let summary = batch_summary(&db, &folder_id, "nope").unwrap();
        assert_eq!(summary.total, 0);
        assert_eq!(summary.processing, 0);
    }

    #[test]
    fn test_corrupt_status_is_an_error() {
        let (db, folder_id) = setup();
        insert(&db, &file(&folder_id, "a", "b1")).unwrap();
        db.with_conn(|conn| {
            conn.execute("UPDATE files SET status = 'UPLOADING' WHERE id = 'a'", [])?;
            Ok(())
        })
        .unwrap();
        assert!(find_by_id(&db, "a").is_err());
    }

    #[test]
    fn test_rename_target_lives_until_completion() {
        let (db, folder_id) = setup();
        insert(&db, &file(&folder_id, "a", "b1")).unwrap();
        assert_eq!(rename_target(&db, "a").unwrap(), None);

        let target = format!("uploads/{}/INV-1.pdf", folder_id);
        assert!(set_rename_target(&db, "a", &target).unwrap());
        assert_eq!(rename_target(&db, "a").unwrap().as_deref(), Some(target.as_str()));

        let renamed = RenamedObject {
            key: target,
            url: None,
            new_name: "INV-1".to_string(),
        };
        complete(&db, "a", "INV-1", "2024-01-05", Some(&renamed)).unwrap();
        assert_eq!(rename_target(&db, "a").unwrap(), None);
        assert!(!set_rename_target(&db, "a", "uploads/x/late.pdf").unwrap());
        assert_eq!(rename_target(&db, "missing").unwrap(), None);
    }

    #[test]
    fn test_key_in_use() {
        let (db, folder_id) = setup();
        let a = file(&folder_id, "a", "b1");
        insert(&db, &a).unwrap();
        set_rename_target(&db, "a", "uploads/x/INV-1.pdf").unwrap();

        assert!(key_in_use(&db, &a.key).unwrap());
        assert!(key_in_use(&db, "uploads/x/INV-1.pdf").unwrap());
        assert!(!key_in_use(&db, "uploads/x/INV-2.pdf").unwrap());
    }

    #[test]
    fn test_relocate_moves_terminal_file_once() {
        let (db, folder_id) = setup();
        let original = file(&folder_id, "a", "b1");
        insert(&db, &original).unwrap();
        mark_failed_with_error(&db, "a", "boom").unwrap();

        let moved = RenamedObject {
            key: format!("uploads/{}/INV-1.pdf", folder_id),
            url: None,
            new_name: "INV-1".to_string(),
        };
        assert!(relocate(&db, "a", &original.key, &moved).unwrap());
        assert!(!relocate(&db, "a", &original.key, &moved).unwrap());

        let f = find_by_id(&db, "a").unwrap().unwrap();
        assert_eq!(f.status, FileStatus::Failed);
        assert_eq!(f.key, moved.key);
    }
}
