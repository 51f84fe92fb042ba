//! Config-level secrets: the URL signing secret and the analysis token.
//!
//! A secret is written as `{"value": ...}`, `{"file": ...}` or
//! `{"env_var": ...}`. When several are present the first non-empty one in
//! that order wins.

use std::path::PathBuf;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("Secret has no source (set one of value, file or env_var)")]
    Unconfigured,

    #[error("Cannot read secret file '{}': {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Environment variable '{0}' is not set")]
    MissingEnv(String),

    #[error("Environment variable '{0}' is not valid UTF-8")]
    InvalidEnv(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecretSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_var: Option<String>,
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|v| !v.is_empty())
}

impl SecretSource {
    pub fn from_env_var(name: &str) -> Self {
        Self {
            env_var: Some(name.to_string()),
            ..Default::default()
        }
    }

    pub fn is_configured(&self) -> bool {
        non_empty(&self.value).is_some()
            || non_empty(&self.file).is_some()
            || non_empty(&self.env_var).is_some()
    }

    pub fn resolve(&self) -> Result<SecretString, SecretError> {
        if let Some(value) = non_empty(&self.value) {
            return Ok(SecretString::from(value));
        }
        if let Some(file) = non_empty(&self.file) {
            return read_file(home_relative(file));
        }
        if let Some(name) = non_empty(&self.env_var) {
            return read_env(name);
        }
        Err(SecretError::Unconfigured)
    }

    /// An unconfigured source resolves to `None`; a configured one that
    /// cannot be read is still an error.
    pub fn resolve_optional(&self) -> Result<Option<SecretString>, SecretError> {
        if self.is_configured() {
            self.resolve().map(Some)
        } else {
            Ok(None)
        }
    }
}

fn read_file(path: PathBuf) -> Result<SecretString, SecretError> {
    match std::fs::read_to_string(&path) {
        Ok(content) => Ok(SecretString::from(content.trim())),
        Err(source) => Err(SecretError::File { path, source }),
    }
}

fn read_env(name: &str) -> Result<SecretString, SecretError> {
    use std::env::VarError;

    match std::env::var(name) {
        // dotenv files often leave a trailing newline
        Ok(value) => Ok(SecretString::from(value.trim())),
        Err(VarError::NotPresent) => Err(SecretError::MissingEnv(name.to_string())),
        Err(VarError::NotUnicode(_)) => Err(SecretError::InvalidEnv(name.to_string())),
    }
}

/// `~/x` is taken relative to the home directory.
fn home_relative(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn source(value: Option<&str>, file: Option<&str>, env_var: Option<&str>) -> SecretSource {
        SecretSource {
            value: value.map(String::from),
            file: file.map(String::from),
            env_var: env_var.map(String::from),
        }
    }

    #[test]
    #[serial]
    fn test_inline_value_wins() {
        std::env::set_var("INVOFLOW_TEST_SECRET_1", "from-env");
        let secret = source(Some("inline"), None, Some("INVOFLOW_TEST_SECRET_1"))
            .resolve()
            .unwrap();
        assert_eq!(secret.expose_secret(), "inline");
        std::env::remove_var("INVOFLOW_TEST_SECRET_1");
    }

    #[test]
    #[serial]
    fn test_file_beats_env() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "from-file").unwrap();
        std::env::set_var("INVOFLOW_TEST_SECRET_2", "from-env");

        let path = file.path().to_string_lossy().to_string();
        let secret = source(None, Some(&path), Some("INVOFLOW_TEST_SECRET_2"))
            .resolve()
            .unwrap();
        assert_eq!(secret.expose_secret(), "from-file");
        std::env::remove_var("INVOFLOW_TEST_SECRET_2");
    }

    #[test]
    #[serial]
    fn test_env_value_is_trimmed() {
        std::env::set_var("INVOFLOW_TEST_SECRET_3", "from-env\n");
        let secret = SecretSource::from_env_var("INVOFLOW_TEST_SECRET_3")
            .resolve()
            .unwrap();
        assert_eq!(secret.expose_secret(), "from-env");
        std::env::remove_var("INVOFLOW_TEST_SECRET_3");
    }

    #[test]
    fn test_unconfigured() {
        assert!(matches!(
            SecretSource::default().resolve(),
            Err(SecretError::Unconfigured)
        ));
        assert!(SecretSource::default().resolve_optional().unwrap().is_none());
        assert!(!source(Some(""), Some(""), None).is_configured());
    }

    #[test]
    fn test_unreadable_sources_are_errors() {
        let missing_file = source(None, Some("/nonexistent/path/to/secret"), None);
        assert!(matches!(missing_file.resolve(), Err(SecretError::File { .. })));

        let missing_env = SecretSource::from_env_var("INVOFLOW_DEFINITELY_NOT_SET_12345");
        assert!(matches!(
            missing_env.resolve_optional(),
            Err(SecretError::MissingEnv(_))
        ));
    }

    #[test]
    fn test_home_relative_paths() {
        assert_eq!(home_relative("/etc/secret"), PathBuf::from("/etc/secret"));
        assert_eq!(home_relative("relative/secret"), PathBuf::from("relative/secret"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(home_relative("~/s"), home.join("s"));
        }
    }
}
