//! Key-addressed object storage.
//!
//! The pipeline only ever passes keys around; bytes stay in the store.
//! Stores have no native move, so renames are a copy followed by a delete.

pub mod fs;
pub mod memory;
pub mod presign;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::sanitize::{sanitize_filename, split_extension};

pub use fs::FsObjectStore;
pub use memory::MemoryObjectStore;
pub use presign::{PresignedUrl, UrlSigner};

/// Upper bound on `_N` suffixes tried when a rename destination is taken.
pub const MAX_RENAME_SUFFIX: u32 = 1000;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadOptions {
    pub acl: Option<String>,
    pub content_type: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub cache_control: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub key: String,
    pub etag: String,
    pub version_id: Option<String>,
    /// Public URL of the object when the store is served over HTTP.
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub key: String,
    pub size: u64,
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
    pub etag: String,
    pub last_modified: DateTime<Utc>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(
        &self,
        key: &str,
        bytes: Vec<u8>,
        options: &UploadOptions,
    ) -> Result<UploadResult, StorageError>;

    async fn download(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    async fn exists(&self, key: &str) -> Result<bool, StorageError>;

    async fn get_metadata(&self, key: &str) -> Result<ObjectMetadata, StorageError>;

    /// Keys starting with `prefix`, in lexical order, at most `max_keys`.
    async fn list(&self, prefix: &str, max_keys: usize)
        -> Result<Vec<ObjectSummary>, StorageError>;

    async fn copy(&self, source: &str, destination: &str) -> Result<(), StorageError>;

    async fn presign_upload(
        &self,
        key: &str,
        expires_in: Duration,
    ) -> Result<PresignedUrl, StorageError>;

    async fn presign_download(
        &self,
        key: &str,
        expires_in: Duration,
    ) -> Result<PresignedUrl, StorageError>;

    /// Unsigned URL of the object, if the store is publicly served.
    fn public_url(&self, key: &str) -> Option<String>;
}

/// Builds `{prefix}/{unix_millis}-{8 hex}-{sanitized name}`.
pub fn generate_unique_key(original_name: &str, prefix: &str) -> String {
    let random = uuid::Uuid::new_v4().simple().to_string();
    let name = sanitize_filename(original_name);
    let prefix = prefix.trim_end_matches('/');
    format!(
        "{}/{}-{}-{}",
        prefix,
        Utc::now().timestamp_millis(),
        &random[..8],
        name
    )
}

/// Rejects keys that could escape a store root or are otherwise unusable.
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    let invalid = |reason: &str| StorageError::InvalidKey {
        key: key.to_string(),
        reason: reason.to_string(),
    };

    if key.is_empty() {
        return Err(invalid("key is empty"));
    }
    if key.starts_with('/') {
        return Err(invalid("key must be relative"));
    }
    if key.contains('\\') || key.contains('\0') {
        return Err(invalid("key contains a forbidden character"));
    }
    if key
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(invalid("key contains an empty or relative segment"));
    }
    Ok(())
}

/// Renames an object to `{dir}/{sanitized new_stem}{.ext}` and returns the
/// new key.
///
/// The old key's directory and extension are kept. Taken destinations get
/// `_2`, `_3`, ... appended to the stem.
pub async fn rename_object(
    store: &dyn ObjectStore,
    key: &str,
    new_stem: &str,
) -> Result<String, StorageError> {
    match rename_destination(store, key, new_stem).await? {
        Some(destination) => {
            move_object(store, key, &destination).await?;
            Ok(destination)
        }
        None => Ok(key.to_string()),
    }
}

/// The `counter`-th key a rename of `key` to `new_stem` may use: the
/// sanitized stem for 1, `{stem}_{counter}` after that.
pub fn rename_candidate(key: &str, new_stem: &str, counter: u32) -> String {
    let (dir, file_name) = match key.rfind('/') {
        Some(pos) => (Some(&key[..pos]), &key[pos + 1..]),
        None => (None, key),
    };
    let (_, extension) = split_extension(file_name);
    let mut name = sanitize_filename(new_stem);
    if counter > 1 {
        name = format!("{}_{}", name, counter);
    }
    if let Some(ext) = extension {
        name = format!("{}.{}", name, ext);
    }
    match dir {
        Some(dir) => format!("{}/{}", dir, name),
        None => name,
    }
}

/// Picks the first free key for renaming `key` to `new_stem`, or `None`
/// when `key` already carries that name.
pub async fn rename_destination(
    store: &dyn ObjectStore,
    key: &str,
    new_stem: &str,
) -> Result<Option<String>, StorageError> {
    validate_key(key)?;

    for counter in 1..=MAX_RENAME_SUFFIX {
        let candidate = rename_candidate(key, new_stem, counter);
        if candidate == key {
            return Ok(None);
        }
        if !store.exists(&candidate).await? {
            return Ok(Some(candidate));
        }
    }
    Err(StorageError::KeyExhausted(rename_candidate(key, new_stem, 1)))
}

/// Moves `from` to `to` as a copy followed by a delete.
///
/// Repeating a move is safe: a missing `from` next to an existing `to`
/// means an earlier attempt already copied it. A failed delete after a
/// successful copy is logged and otherwise ignored.
pub async fn move_object(store: &dyn ObjectStore, from: &str, to: &str) -> Result<(), StorageError> {
    validate_key(from)?;
    validate_key(to)?;

    if let Err(e) = store.copy(from, to).await {
        let already_moved = matches!(e, StorageError::NotFound(_)) && store.exists(to).await?;
        if !already_moved {
            return Err(e);
        }
        tracing::debug!(to = %crate::sanitize::redact_key(to), "Source already moved");
        return Ok(());
    }

    if let Err(e) = store.delete(from).await {
        tracing::warn!(
            from = %crate::sanitize::redact_key(from),
            to = %crate::sanitize::redact_key(to),
            error = %e,
            "Copied object but failed to delete the original"
        );
    }
    Ok(())
}
