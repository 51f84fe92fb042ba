//! HMAC-signed, expiring object URLs.

use std::time::Duration;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

use crate::error::StorageError;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresignedUrl {
    pub url: String,
    pub method: &'static str,
    pub expires_at: DateTime<Utc>,
}

/// Signs `(method, key, expires)` with a shared secret.
///
/// URLs look like `{base}/{key}?expires={unix}&signature={hex}`.
#[derive(Clone)]
pub struct UrlSigner {
    base_url: String,
    secret: SecretString,
}

impl std::fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSigner")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl UrlSigner {
    pub fn new(base_url: &str, secret: SecretString) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            secret,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }

    pub fn presign(
        &self,
        method: &'static str,
        key: &str,
        expires_in: Duration,
    ) -> Result<PresignedUrl, StorageError> {
        let expires_in = chrono::Duration::from_std(expires_in)
            .map_err(|e| StorageError::Configuration(format!("Invalid expiry: {}", e)))?;
        let expires_at = Utc::now()
            .checked_add_signed(expires_in)
            .ok_or_else(|| StorageError::Configuration("Expiry out of range".to_string()))?;
        let signature = self.sign(method, key, expires_at.timestamp())?;

        Ok(PresignedUrl {
            url: format!(
                "{}?expires={}&signature={}",
                self.public_url(key),
                expires_at.timestamp(),
                signature
            ),
            method,
            expires_at,
        })
    }

    /// Hex HMAC-SHA256 of `"{method}\n{key}\n{expires}"`.
    pub fn sign(&self, method: &str, key: &str, expires: i64) -> Result<String, StorageError> {
        let mac = self.mac(method, key, expires)?;
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Checks a signature in constant time and rejects expired URLs.
    pub fn verify(
        &self,
        method: &str,
        key: &str,
        expires: i64,
        signature: &str,
        now: DateTime<Utc>,
    ) -> bool {
        if now.timestamp() > expires {
            return false;
        }
        let Ok(expected) = hex::decode(signature) else {
            return false;
        };
        self.mac(method, key, expires)
            .map(|mac| mac.verify_slice(&expected).is_ok())
            .unwrap_or(false)
    }

    fn mac(&self, method: &str, key: &str, expires: i64) -> Result<HmacSha256, StorageError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|e| StorageError::Configuration(format!("Invalid signing key: {}", e)))?;
        mac.update(format!("{}\n{}\n{}", method, key, expires).as_bytes());
        Ok(mac)
    }
}
