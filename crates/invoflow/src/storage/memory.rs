//! In-memory object store for tests and dry runs.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::fs::etag_of;
use super::{
    validate_key, ObjectMetadata, ObjectStore, ObjectSummary, PresignedUrl, UploadOptions,
    UploadResult, UrlSigner,
};
use crate::error::StorageError;

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    options: UploadOptions,
    etag: String,
    last_modified: DateTime<Utc>,
}

/// Keeps objects in a sorted map. Upload, copy and delete failures can be
/// injected.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    signer: Option<UrlSigner>,
    uploads_before_failure: Mutex<Option<u32>>,
    failing_copies: AtomicU32,
    fail_deletes: AtomicBool,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_signer(mut self, signer: UrlSigner) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Stores bytes directly, bypassing validation.
    pub fn put(&self, key: &str, bytes: Vec<u8>) {
        let object = StoredObject {
            etag: etag_of(&bytes),
            bytes,
            options: UploadOptions::default(),
            last_modified: Utc::now(),
        };
        if let Ok(mut objects) = self.objects.lock() {
            objects.insert(key.to_string(), object);
        }
    }

    /// All keys currently stored, in lexical order.
    pub fn keys(&self) -> Vec<String> {
        self.objects
            .lock()
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Lets `count` more uploads succeed, then fails every later one with a
    /// transient error.
    pub fn fail_uploads_after(&self, count: u32) {
        if let Ok(mut remaining) = self.uploads_before_failure.lock() {
            *remaining = Some(count);
        }
    }

    /// Makes the next `count` copies fail with a transient error.
    pub fn fail_next_copies(&self, count: u32) {
        self.failing_copies.store(count, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    fn objects(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, StoredObject>>, StorageError> {
        self.objects
            .lock()
            .map_err(|_| StorageError::Configuration("Object map lock poisoned".to_string()))
    }

    fn signer(&self) -> Result<&UrlSigner, StorageError> {
        self.signer.as_ref().ok_or_else(|| {
            StorageError::Configuration("Presigning requires a URL signer".to_string())
        })
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload(
        &self,
        key: &str,
        bytes: Vec<u8>,
        options: &UploadOptions,
    ) -> Result<UploadResult, StorageError> {
        validate_key(key)?;
        if let Ok(mut remaining) = self.uploads_before_failure.lock() {
            match *remaining {
                Some(0) => {
                    return Err(StorageError::Transient {
                        operation: "upload",
                        key: key.to_string(),
                        message: "injected upload failure".to_string(),
                    })
                }
                Some(ref mut n) => *n -= 1,
                None => {}
            }
        }
        let etag = etag_of(&bytes);
        self.objects()?.insert(
            key.to_string(),
            StoredObject {
                bytes,
                options: options.clone(),
                etag: etag.clone(),
                last_modified: Utc::now(),
            },
        );
        Ok(UploadResult {
            key: key.to_string(),
            etag,
            version_id: None,
            location: self.public_url(key),
        })
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.objects()?
            .get(key)
            .map(|o| o.bytes.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StorageError::Transient {
                operation: "delete",
                key: key.to_string(),
                message: "injected delete failure".to_string(),
            });
        }
        self.objects()?.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.objects()?.contains_key(key))
    }

    async fn get_metadata(&self, key: &str) -> Result<ObjectMetadata, StorageError> {
        let objects = self.objects()?;
        let object = objects
            .get(key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        Ok(ObjectMetadata {
            key: key.to_string(),
            size: object.bytes.len() as u64,
            content_type: object.options.content_type.clone(),
            cache_control: object.options.cache_control.clone(),
            etag: object.etag.clone(),
            last_modified: object.last_modified,
            metadata: object.options.metadata.clone(),
        })
    }

    async fn list(
        &self,
        prefix: &str,
        max_keys: usize,
    ) -> Result<Vec<ObjectSummary>, StorageError> {
        Ok(self
            .objects()?
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .take(max_keys)
            .map(|(k, o)| ObjectSummary {
                key: k.clone(),
                size: o.bytes.len() as u64,
                last_modified: o.last_modified,
            })
            .collect())
    }

    async fn copy(&self, source: &str, destination: &str) -> Result<(), StorageError> {
        validate_key(destination)?;
        let injected = self
            .failing_copies
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StorageError::Transient {
                operation: "copy",
                key: source.to_string(),
                message: "injected copy failure".to_string(),
            });
        }

        let mut objects = self.objects()?;
        let object = objects
            .get(source)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(source.to_string()))?;
        objects.insert(
            destination.to_string(),
            StoredObject {
                last_modified: Utc::now(),
                ..object
            },
        );
        Ok(())
    }

    async fn presign_upload(
        &self,
        key: &str,
        expires_in: Duration,
    ) -> Result<PresignedUrl, StorageError> {
        self.signer()?.presign("PUT", key, expires_in)
    }

    async fn presign_download(
        &self,
        key: &str,
        expires_in: Duration,
    ) -> Result<PresignedUrl, StorageError> {
        self.signer()?.presign("GET", key, expires_in)
    }

    fn public_url(&self, key: &str) -> Option<String> {
        self.signer.as_ref().map(|s| s.public_url(key))
    }
}
