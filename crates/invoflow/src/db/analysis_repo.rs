//! Analysis history for files, stored in the insert-only `file_analyses`
//! table. Records are appended, never updated or deleted.

use rusqlite::{params, OptionalExtension, Row};

use super::{now_ts, Database, DatabaseError};
use crate::model::{AnalysisRecord, InvoiceMetadata};

struct AnalysisRow {
    file_id: String,
    seq: u32,
    job_id: Option<String>,
    analyzed_at: String,
    field_sets: String,
}

impl AnalysisRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            file_id: row.get("file_id")?,
            seq: row.get("seq")?,
            job_id: row.get("job_id")?,
            analyzed_at: row.get("analyzed_at")?,
            field_sets: row.get("field_sets")?,
        })
    }

    fn into_record(self) -> Result<AnalysisRecord, DatabaseError> {
        let field_sets: Vec<InvoiceMetadata> = serde_json::from_str(&self.field_sets)?;
        Ok(AnalysisRecord {
            file_id: self.file_id,
            seq: self.seq,
            job_id: self.job_id,
            analyzed_at: self.analyzed_at,
            field_sets,
        })
    }
}

/// Appends a new analysis record for a file and returns it.
///
/// `seq` is one past the highest existing sequence number for the file.
pub fn append(
    db: &Database,
    file_id: &str,
    job_id: Option<&str>,
    field_sets: &[InvoiceMetadata],
) -> Result<AnalysisRecord, DatabaseError> {
    let encoded = serde_json::to_string(field_sets)?;
    let analyzed_at = now_ts();
    db.with_conn(|conn| {
        let seq: u32 = conn.query_row(
            "INSERT INTO file_analyses (file_id, seq, job_id, analyzed_at, field_sets)
             SELECT ?1, COALESCE(MAX(seq), 0) + 1, ?2, ?3, ?4
             FROM file_analyses WHERE file_id = ?1
             RETURNING seq",
            params![file_id, job_id, analyzed_at, encoded],
            |r| r.get(0),
        )?;
        Ok(AnalysisRecord {
            file_id: file_id.to_string(),
            seq,
            job_id: job_id.map(str::to_string),
            analyzed_at,
            field_sets: field_sets.to_vec(),
        })
    })
}

/// All records of a file in append order.
pub fn list_for_file(db: &Database, file_id: &str) -> Result<Vec<AnalysisRecord>, DatabaseError> {
    let rows = db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM file_analyses WHERE file_id = ?1 ORDER BY seq ASC")?;
        let rows = stmt
            .query_map(params![file_id], AnalysisRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })?;
    rows.into_iter().map(AnalysisRow::into_record).collect()
}

/// The most recent record of a file, if any.
pub fn latest_for_file(
    db: &Database,
    file_id: &str,
) -> Result<Option<AnalysisRecord>, DatabaseError> {
    let row = db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM file_analyses WHERE file_id = ?1 ORDER BY seq DESC LIMIT 1",
                params![file_id],
                AnalysisRow::from_row,
            )
            .optional()?;
        Ok(row)
    })?;
    row.map(AnalysisRow::into_record).transpose()
}
