//! Domain records shared by the store, the pipeline and the mirror.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of an uploaded file.
///
/// `PENDING -> PROCESSING -> {COMPLETED | FAILED}`. Only the last two are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FileStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Pending => "PENDING",
            FileStatus::Processing => "PROCESSING",
            FileStatus::Completed => "COMPLETED",
            FileStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(FileStatus::Pending),
            "PROCESSING" => Some(FileStatus::Processing),
            "COMPLETED" => Some(FileStatus::Completed),
            "FAILED" => Some(FileStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, FileStatus::Completed | FileStatus::Failed)
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Naming rule applied by the rename stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RenameFormat {
    #[serde(rename = "Invoice-Date")]
    InvoiceDate,
    #[serde(rename = "Date-Invoice")]
    DateInvoice,
    /// Unset or unrecognised; files keep their original name.
    #[default]
    #[serde(other)]
    None,
}

impl RenameFormat {
    pub fn as_str(&self) -> Option<&'static str> {
        match self {
            RenameFormat::InvoiceDate => Some("Invoice-Date"),
            RenameFormat::DateInvoice => Some("Date-Invoice"),
            RenameFormat::None => None,
        }
    }

    /// Any string other than the two known formats maps to `None`.
    pub fn parse(s: &str) -> Self {
        match s {
            "Invoice-Date" => RenameFormat::InvoiceDate,
            "Date-Invoice" => RenameFormat::DateInvoice,
            _ => RenameFormat::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub format: RenameFormat,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: String,
    pub folder_id: String,
    pub name: String,
    pub new_name: Option<String>,
    pub mime_type: Option<String>,
    pub size: u64,
    pub key: String,
    pub url: Option<String>,
    pub status: FileStatus,
    pub batch_id: String,
    pub invoice_id: String,
    pub invoice_date: String,
    /// Fixed validation message, e.g. for missing invoice fields.
    pub reason: Option<String>,
    /// Raw failure message from a collaborator.
    pub error: Option<String>,
    pub is_deleted: bool,
    pub deleted_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Normalized fields of one expense document. Missing fields are `""`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InvoiceMetadata {
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub name: String,
    pub customer_number: String,
    pub invoice_receipt_date: String,
    pub invoice_receipt_id: String,
    pub receiver_address: String,
    pub receiver_name: String,
}

/// One analysis attempt for a file. Records are only ever appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRecord {
    pub file_id: String,
    pub seq: u32,
    pub job_id: Option<String>,
    pub analyzed_at: String,
    pub field_sets: Vec<InvoiceMetadata>,
}

impl AnalysisRecord {
    /// The first expense group, which is the one used for renaming.
    pub fn primary(&self) -> Option<&InvoiceMetadata> {
        self.field_sets.first()
    }
}
