use std::collections::HashSet;
use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../schema/config-v1.json");
const SUPPORTED_VERSION: &str = "1.0";

/// Reads, schema-checks and validates the config file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let raw: serde_json::Value = serde_json::from_str(content)?;
    check_schema(&raw)?;
    let config: Config = serde_json::from_value(raw)?;
    check_semantics(&config)?;
    Ok(config)
}

fn check_schema(raw: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value = serde_json::from_str(SCHEMA_JSON)?;
    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("embedded config schema does not compile: {}", e),
    })?;

    let errors: Vec<String> = validator.iter_errors(raw).map(|e| e.to_string()).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::SchemaValidation {
            errors: errors.join("; "),
        })
    }
}

fn ensure(ok: bool, message: impl FnOnce() -> String) -> Result<(), ConfigError> {
    if ok {
        Ok(())
    } else {
        Err(ConfigError::Validation { message: message() })
    }
}

/// Rules the JSON schema cannot express.
fn check_semantics(config: &Config) -> Result<(), ConfigError> {
    let storage = &config.storage;
    let retry = &config.queue.retry;

    ensure(config.version == SUPPORTED_VERSION, || {
        format!("Unsupported config version: {}", config.version)
    })?;
    ensure(config.worker_count >= 1, || {
        "worker_count must be at least 1".into()
    })?;
    ensure(!storage.root.trim().is_empty(), || {
        "storage.root must not be empty".into()
    })?;
    ensure(
        !storage.key_prefix.starts_with('/') && !storage.key_prefix.contains(".."),
        || format!("storage.key_prefix must be a relative key prefix: {}", storage.key_prefix),
    )?;
    ensure(
        storage.public_base_url.is_none() || storage.signing_secret.is_configured(),
        || "storage.signing_secret is required when public_base_url is set".into(),
    )?;
    ensure(config.queue.lease_secs > config.analysis.worst_case_secs(), || {
        format!(
            "queue.lease_secs ({}) must exceed the analysis poll budget ({}s)",
            config.queue.lease_secs,
            config.analysis.worst_case_secs()
        )
    })?;
    ensure(retry.max_attempts >= 1, || {
        "queue.retry.max_attempts must be at least 1".into()
    })?;
    ensure(retry.base_delay_ms <= retry.max_delay_ms, || {
        "queue.retry.base_delay_ms must not exceed max_delay_ms".into()
    })?;

    let mut seen = HashSet::new();
    match config.users.iter().find(|u| !seen.insert(u.id.as_str())) {
        Some(dup) => Err(ConfigError::DuplicateUser(dup.id.clone())),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_document_deserializes() {
        let config = load_config_from_str(
            r#"{
                "version": "1.0",
                "database_path": "/tmp/invoflow.db",
                "worker_count": 4,
                "storage": {
                    "root": "/data/objects",
                    "bucket": "invoices",
                    "public_base_url": "https://files.example.com",
                    "signing_secret": { "value": "s3cret" }
                },
                "analysis": {
                    "endpoint": "https://analysis.example.com/v1",
                    "poll_interval_secs": 2
                },
                "users": [
                    { "id": "u1", "email": "ada@example.com", "first_name": "Ada" }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(config.worker_count, 4);
        assert_eq!(config.storage.bucket, "invoices");
        assert_eq!(config.analysis.poll_interval_secs, 2);
        assert_eq!(config.users[0].first_name, "Ada");
    }

    #[test]
    fn test_missing_analysis_section_fails_schema() {
        let result = load_config_from_str(r#"{ "version": "1.0", "storage": { "root": "/data" } }"#);
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_parent_dir_in_key_prefix_rejected() {
        let result = load_config_from_str(
            r#"{
                "version": "1.0",
                "storage": { "root": "/data", "key_prefix": "uploads/../etc" },
                "analysis": { "endpoint": "http://localhost" }
            }"#,
        );
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_lease_shorter_than_poll_budget_rejected() {
        let result = load_config_from_str(
            r#"{
                "version": "1.0",
                "storage": { "root": "/data" },
                "analysis": { "endpoint": "http://localhost", "poll_interval_secs": 5,
                              "max_poll_attempts": 120, "request_timeout_secs": 30 },
                "queue": { "lease_secs": 600 }
            }"#,
        );
        match result {
            Err(ConfigError::Validation { message }) => {
                assert!(message.contains("must exceed the analysis poll budget (630s)"), "{}", message)
            }
            other => panic!("expected validation error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_invalid_json() {
        let result = load_config_from_str("{ not json");
        assert!(matches!(result, Err(ConfigError::ParseJson(_))));
    }
}
