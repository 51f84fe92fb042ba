//! Maps summary fields onto [`InvoiceMetadata`].

use super::{AnalysisPage, ExpenseDocument};
use crate::model::InvoiceMetadata;

fn slot<'a>(meta: &'a mut InvoiceMetadata, field_type: &str) -> Option<&'a mut String> {
    let slot = match field_type {
        "ADDRESS" | "VENDOR_ADDRESS" => &mut meta.address,
        "CITY" => &mut meta.city,
        "STATE" => &mut meta.state,
        "ZIP_CODE" => &mut meta.zip,
        "NAME" | "VENDOR_NAME" => &mut meta.name,
        "CUSTOMER_NUMBER" => &mut meta.customer_number,
        "INVOICE_RECEIPT_DATE" => &mut meta.invoice_receipt_date,
        "INVOICE_RECEIPT_ID" => &mut meta.invoice_receipt_id,
        "RECEIVER_ADDRESS" => &mut meta.receiver_address,
        "RECEIVER_NAME" => &mut meta.receiver_name,
        _ => return None,
    };
    Some(slot)
}

/// Normalizes one expense group. The first field of each type wins; absent
/// fields stay empty.
pub fn normalize_document(document: &ExpenseDocument) -> InvoiceMetadata {
    let mut meta = InvoiceMetadata::default();
    for field in &document.summary_fields {
        let (Some(field_type), Some(value)) = (&field.field_type, &field.value) else {
            continue;
        };
        if let Some(target) = slot(&mut meta, field_type) {
            if target.is_empty() {
                *target = value.clone();
            }
        }
    }
    meta
}

/// One [`InvoiceMetadata`] per expense group, in page order.
pub fn normalize_pages(pages: &[AnalysisPage]) -> Vec<InvoiceMetadata> {
    pages
        .iter()
        .flat_map(|page| page.expense_documents.iter())
        .map(normalize_document)
        .collect()
}
