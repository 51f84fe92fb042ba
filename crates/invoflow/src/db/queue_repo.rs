//! Queue task repository for the `queue_tasks` table.
//!
//! Timestamps are compared as strings, which is sound because every
//! timestamp is written by [`super::format_ts`].

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DatabaseError};
use crate::queue::{QueueTask, TaskKind, TaskPayload, TaskStatus};

impl FromSql for TaskKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        TaskKind::parse(s)
            .ok_or_else(|| FromSqlError::Other(format!("unknown task kind '{}'", s).into()))
    }
}

impl ToSql for TaskKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for TaskStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        TaskStatus::parse(s)
            .ok_or_else(|| FromSqlError::Other(format!("unknown task status '{}'", s).into()))
    }
}

impl ToSql for TaskStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

fn task_from_row(row: &Row<'_>) -> Result<QueueTask, rusqlite::Error> {
    Ok(QueueTask {
        id: row.get("id")?,
        kind: row.get("kind")?,
        payload: TaskPayload {
            file_key: row.get("file_key")?,
            folder_id: row.get("folder_id")?,
            file_id: row.get("file_id")?,
            batch_id: row.get("batch_id")?,
        },
        status: row.get("status")?,
        attempts: row.get("attempts")?,
        available_at: row.get("available_at")?,
        leased_until: row.get("leased_until")?,
        last_error: row.get("last_error")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

/// Inserts a task that becomes claimable at `available_at`.
pub fn insert(
    db: &Database,
    kind: TaskKind,
    payload: &TaskPayload,
    available_at: &str,
) -> Result<QueueTask, DatabaseError> {
    let id = uuid::Uuid::new_v4().to_string();
    db.with_conn(|conn| {
        let task = conn.query_row(
            "INSERT INTO queue_tasks (id, kind, file_key, folder_id, file_id, batch_id, status,
             attempts, available_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'queued', 0, ?7, ?7, ?7)
             RETURNING *",
            params![
                id,
                kind,
                payload.file_key,
                payload.folder_id,
                payload.file_id,
                payload.batch_id,
                available_at,
            ],
            task_from_row,
        )?;
        Ok(task)
    })
}

/// Leases the oldest claimable task of `kind`.
///
/// A task is claimable when it is queued and due, or leased with an expired
/// lease. The select and the update are one statement, so two workers can
/// never hold the same lease.
pub fn claim(
    db: &Database,
    kind: TaskKind,
    now: &str,
    leased_until: &str,
) -> Result<Option<QueueTask>, DatabaseError> {
    db.with_conn(|conn| {
        let task = conn
            .query_row(
                "UPDATE queue_tasks
                 SET status = 'leased', attempts = attempts + 1, leased_until = ?3,
                     updated_at = ?2
                 WHERE id = (
                     SELECT id FROM queue_tasks
                     WHERE kind = ?1
                       AND ((status = 'queued' AND available_at <= ?2)
                         OR (status = 'leased' AND leased_until <= ?2))
                     ORDER BY available_at ASC, created_at ASC
                     LIMIT 1
                 )
                 RETURNING *",
                params![kind, now, leased_until],
                task_from_row,
            )
            .optional()?;
        Ok(task)
    })
}

/// Marks a leased task done.
pub fn ack(db: &Database, id: &str, now: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE queue_tasks SET status = 'done', leased_until = NULL, updated_at = ?2
             WHERE id = ?1 AND status = 'leased'",
            params![id, now],
        )?;
        Ok(changed == 1)
    })
}

/// Puts a leased task back in the queue, due at `available_at`.
pub fn requeue(
    db: &Database,
    id: &str,
    available_at: &str,
    error: &str,
    now: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE queue_tasks
             SET status = 'queued', available_at = ?2, leased_until = NULL, last_error = ?3,
                 updated_at = ?4
             WHERE id = ?1 AND status = 'leased'",
            params![id, available_at, error, now],
        )?;
        Ok(changed == 1)
    })
}

/// Parks a task that will not be retried.
pub fn dead_letter(db: &Database, id: &str, error: &str, now: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE queue_tasks
             SET status = 'dead', leased_until = NULL, last_error = ?2, updated_at = ?3
             WHERE id = ?1 AND status = 'leased'",
            params![id, error, now],
        )?;
        Ok(changed == 1)
    })
}

pub fn find_by_id(db: &Database, id: &str) -> Result<Option<QueueTask>, DatabaseError> {
    db.with_conn(|conn| {
        let task = conn
            .query_row(
                "SELECT * FROM queue_tasks WHERE id = ?1",
                params![id],
                task_from_row,
            )
            .optional()?;
        Ok(task)
    })
}

/// Every task ever created for a file, oldest first.
pub fn list_for_file(db: &Database, file_id: &str) -> Result<Vec<QueueTask>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM queue_tasks WHERE file_id = ?1 ORDER BY created_at ASC, rowid ASC",
        )?;
        let rows = stmt
            .query_map(params![file_id], task_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Number of tasks per status, for status reporting.
pub fn count_by_status(db: &Database) -> Result<Vec<(TaskStatus, u64)>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT status, COUNT(*) FROM queue_tasks GROUP BY status ORDER BY status ASC",
        )?;
        let rows = stmt
            .query_map([], |r| Ok((r.get::<_, TaskStatus>(0)?, r.get::<_, i64>(1)? as u64)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
