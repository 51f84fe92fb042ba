//! Canonical file names derived from extracted invoice fields.

use crate::model::{InvoiceMetadata, RenameFormat};

/// Failure reason stored when the rename gate rejects a file.
pub const MISSING_FIELDS_REASON: &str =
    "Missing invoiceReceiptId or invoiceReceiptDate during renaming";

/// Trimmed invoice id and date, or `None` when either is empty.
pub fn invoice_fields(metadata: Option<&InvoiceMetadata>) -> Option<(String, String)> {
    let metadata = metadata?;
    let id = metadata.invoice_receipt_id.trim();
    let date = metadata.invoice_receipt_date.trim();
    if id.is_empty() || date.is_empty() {
        return None;
    }
    Some((id.to_string(), date.to_string()))
}

/// The new display name for the folder's format, or `None` when the folder
/// does not rename files.
pub fn compute_new_name(format: RenameFormat, invoice_id: &str, invoice_date: &str) -> Option<String> {
    match format {
        RenameFormat::InvoiceDate => Some(format!("{}-{}", invoice_id, invoice_date)),
        RenameFormat::DateInvoice => Some(format!("{}-{}", invoice_date, invoice_id)),
        RenameFormat::None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(id: &str, date: &str) -> InvoiceMetadata {
        InvoiceMetadata {
            invoice_receipt_id: id.to_string(),
            invoice_receipt_date: date.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_both_formats() {
        assert_eq!(
            compute_new_name(RenameFormat::InvoiceDate, "INV-1", "2024-01-05").as_deref(),
            Some("INV-1-2024-01-05")
        );
        assert_eq!(
            compute_new_name(RenameFormat::DateInvoice, "INV-1", "2024-01-05").as_deref(),
            Some("2024-01-05-INV-1")
        );
    }

    #[test]
    fn test_no_format_keeps_name() {
        assert_eq!(compute_new_name(RenameFormat::None, "INV-1", "2024-01-05"), None);
        assert_eq!(
            compute_new_name(RenameFormat::parse("Vendor-Date"), "INV-1", "2024-01-05"),
            None
        );
    }

    #[test]
    fn test_fields_are_trimmed() {
        assert_eq!(
            invoice_fields(Some(&meta("  INV-1 ", "\t2024-01-05\n"))),
            Some(("INV-1".to_string(), "2024-01-05".to_string()))
        );
    }

    #[test]
    fn test_blank_or_missing_fields_fail_the_gate() {
        assert_eq!(invoice_fields(Some(&meta("INV-1", "   "))), None);
        assert_eq!(invoice_fields(Some(&meta("", "2024-01-05"))), None);
        assert_eq!(invoice_fields(None), None);
    }
}
