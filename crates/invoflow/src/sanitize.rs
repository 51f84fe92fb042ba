//! Helpers for sanitizing data before it enters object keys or tracing span
//! attributes.
//!
//! Traces are safe to share for debugging: span fields only ever carry the
//! last segment of an object key, never the owner-scoped prefix.

/// Returns only the last segment of an object key.
///
/// Safe for span fields. Reveals the file name without exposing the prefix.
pub fn redact_key(key: &str) -> String {
    match key.rsplit('/').next() {
        Some(last) if !last.is_empty() => last.to_string(),
        _ => "<unknown>".to_string(),
    }
}

/// Reduces a file name to `[A-Za-z0-9._-]`.
///
/// Every run of other characters collapses into a single `_`. Leading and
/// trailing underscores are dropped. An empty result becomes `"file"`.
pub fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_underscore = false;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
            if pending_underscore && !out.is_empty() {
                out.push('_');
            }
            pending_underscore = false;
            out.push(c);
        } else {
            pending_underscore = true;
        }
    }

    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() || trimmed.chars().all(|c| c == '.') {
        "file".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Splits a file name into stem and extension (extension without the dot).
pub fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(pos) if pos > 0 && pos + 1 < name.len() => (&name[..pos], Some(&name[pos + 1..])),
        _ => (name, None),
    }
}
