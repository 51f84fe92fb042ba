//! Object store backed by a local directory.
//!
//! Each key maps to a file under the root. Upload options and the etag are
//! kept in a `{file}.meta.json` sidecar next to the object.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use super::{
    validate_key, ObjectMetadata, ObjectStore, ObjectSummary, PresignedUrl, UploadOptions,
    UploadResult, UrlSigner,
};
use crate::error::StorageError;

const SIDECAR_SUFFIX: &str = ".meta.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Sidecar {
    etag: String,
    content_type: Option<String>,
    cache_control: Option<String>,
    acl: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

pub(crate) fn etag_of(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
    signer: Option<UrlSigner>,
}

impl FsObjectStore {
    /// Creates the store, creating `root` if needed.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, StorageError> {
        let root = root.as_ref();
        if root.as_os_str().is_empty() {
            return Err(StorageError::Configuration(
                "Object store root must not be empty".to_string(),
            ));
        }
        std::fs::create_dir_all(root).map_err(|e| {
            StorageError::Configuration(format!(
                "Cannot create object store root '{}': {}",
                root.display(),
                e
            ))
        })?;
        Ok(Self {
            root: root.to_path_buf(),
            signer: None,
        })
    }

    /// Serves objects under the signer's base URL and enables presigning.
    pub fn with_signer(mut self, signer: UrlSigner) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        if key.ends_with(SIDECAR_SUFFIX) {
            return Err(StorageError::InvalidKey {
                key: key.to_string(),
                reason: format!("keys ending in '{}' are reserved", SIDECAR_SUFFIX),
            });
        }
        Ok(self.root.join(key))
    }

    fn sidecar_path(path: &Path) -> PathBuf {
        let mut os = path.as_os_str().to_owned();
        os.push(SIDECAR_SUFFIX);
        PathBuf::from(os)
    }

    async fn read_sidecar(path: &Path) -> Option<Sidecar> {
        let bytes = tokio::fs::read(Self::sidecar_path(path)).await.ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    async fn write_sidecar(path: &Path, key: &str, sidecar: &Sidecar) -> Result<(), StorageError> {
        let json = serde_json::to_vec(sidecar).map_err(|e| StorageError::Transient {
            operation: "write_metadata",
            key: key.to_string(),
            message: e.to_string(),
        })?;
        tokio::fs::write(Self::sidecar_path(path), json)
            .await
            .map_err(|e| StorageError::io("write_metadata", key, e))
    }

    fn signer(&self) -> Result<&UrlSigner, StorageError> {
        self.signer.as_ref().ok_or_else(|| {
            StorageError::Configuration(
                "Presigning requires storage.public_base_url and storage.signing_secret"
                    .to_string(),
            )
        })
    }
}

async fn ensure_parent(path: &Path, key: &str) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StorageError::io("create_dir", key, e))?;
    }
    Ok(())
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn upload(
        &self,
        key: &str,
        bytes: Vec<u8>,
        options: &UploadOptions,
    ) -> Result<UploadResult, StorageError> {
        let path = self.path_for(key)?;
        ensure_parent(&path, key).await?;

        let etag = etag_of(&bytes);
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| StorageError::io("upload", key, e))?;
        let sidecar = Sidecar {
            etag: etag.clone(),
            content_type: options.content_type.clone(),
            cache_control: options.cache_control.clone(),
            acl: options.acl.clone(),
            metadata: options.metadata.clone(),
        };
        Self::write_sidecar(&path, key, &sidecar).await?;

        tracing::debug!(key = %crate::sanitize::redact_key(key), size = bytes.len(), "Stored object");

        Ok(UploadResult {
            key: key.to_string(),
            etag,
            version_id: None,
            location: self.public_url(key),
        })
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(key)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| StorageError::io("download", key, e))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(StorageError::io("delete", key, e)),
        }
        if let Err(e) = tokio::fs::remove_file(Self::sidecar_path(&path)).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(error = %e, "Failed to remove metadata sidecar");
            }
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::io("exists", key, e)),
        }
    }

    async fn get_metadata(&self, key: &str) -> Result<ObjectMetadata, StorageError> {
        let path = self.path_for(key)?;
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| StorageError::io("get_metadata", key, e))?;
        if !meta.is_file() {
            return Err(StorageError::NotFound(key.to_string()));
        }

        let sidecar = match Self::read_sidecar(&path).await {
            Some(sidecar) => sidecar,
            None => Sidecar {
                etag: etag_of(&self.download(key).await?),
                ..Default::default()
            },
        };
        let last_modified = meta
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        Ok(ObjectMetadata {
            key: key.to_string(),
            size: meta.len(),
            content_type: sidecar.content_type,
            cache_control: sidecar.cache_control,
            etag: sidecar.etag,
            last_modified,
            metadata: sidecar.metadata,
        })
    }

    async fn list(
        &self,
        prefix: &str,
        max_keys: usize,
    ) -> Result<Vec<ObjectSummary>, StorageError> {
        let root = self.root.clone();
        let prefix = prefix.to_string();
        let walk_prefix = prefix.clone();

        let mut summaries = tokio::task::spawn_blocking(move || {
            let mut out = Vec::new();
            for entry in WalkDir::new(&root).into_iter().filter_map(|e| e.ok()) {
                if !entry.file_type().is_file() {
                    continue;
                }
                let Ok(relative) = entry.path().strip_prefix(&root) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if key.ends_with(SIDECAR_SUFFIX) || !key.starts_with(&walk_prefix) {
                    continue;
                }
                let Ok(meta) = entry.metadata() else {
                    continue;
                };
                out.push(ObjectSummary {
                    key,
                    size: meta.len(),
                    last_modified: meta
                        .modified()
                        .map(DateTime::<Utc>::from)
                        .unwrap_or_else(|_| Utc::now()),
                });
            }
            out
        })
        .await
        .map_err(|e| StorageError::Transient {
            operation: "list",
            key: prefix.clone(),
            message: e.to_string(),
        })?;

        summaries.sort_by(|a, b| a.key.cmp(&b.key));
        summaries.truncate(max_keys);
        Ok(summaries)
    }

    async fn copy(&self, source: &str, destination: &str) -> Result<(), StorageError> {
        let from = self.path_for(source)?;
        let to = self.path_for(destination)?;
        ensure_parent(&to, destination).await?;

        tokio::fs::copy(&from, &to)
            .await
            .map_err(|e| StorageError::io("copy", source, e))?;
        if let Some(sidecar) = Self::read_sidecar(&from).await {
            Self::write_sidecar(&to, destination, &sidecar).await?;
        }
        Ok(())
    }

    async fn presign_upload(
        &self,
        key: &str,
        expires_in: Duration,
    ) -> Result<PresignedUrl, StorageError> {
        validate_key(key)?;
        self.signer()?.presign("PUT", key, expires_in)
    }

    async fn presign_download(
        &self,
        key: &str,
        expires_in: Duration,
    ) -> Result<PresignedUrl, StorageError> {
        validate_key(key)?;
        self.signer()?.presign("GET", key, expires_in)
    }

    fn public_url(&self, key: &str) -> Option<String> {
        self.signer.as_ref().map(|s| s.public_url(key))
    }
}
