//! Configuration for datastore backends and tools.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::{StoreError, StoreResult};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Configuration shared by the storage backends and the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Root directory for the local directory backend.
    pub root_dir: PathBuf,

    /// Key prefix inside an object store bucket.
    pub object_prefix: String,

    /// Content type used when none can be derived from a stored file.
    pub default_content_type: String,

    /// Contexts built from this config skip keyspace validation on reads.
    pub query_only: bool,

    /// Default log level for binaries.
    pub log_level: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("./data"),
            object_prefix: "datasets".to_string(),
            default_content_type: "application/octet-stream".to_string(),
            query_only: false,
            log_level: "info".to_string(),
        }
    }
}

impl StoreConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("DATASTORE_ROOT_DIR") {
            config.root_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("DATASTORE_OBJECT_PREFIX") {
            config.object_prefix = val;
        }

        if let Ok(val) = std::env::var("DATASTORE_DEFAULT_CONTENT_TYPE") {
            config.default_content_type = val;
        }

        if let Ok(val) = std::env::var("DATASTORE_QUERY_ONLY") {
            config.query_only = val.to_lowercase() == "true" || val == "1";
        }

        if let Ok(val) = std::env::var("DATASTORE_LOG_LEVEL") {
            config.log_level = val.to_lowercase();
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> StoreResult<()> {
        if self.root_dir.as_os_str().is_empty() {
            return Err(StoreError::Config("root_dir must not be empty".to_string()));
        }

        if self.object_prefix.trim_matches('/').is_empty() {
            return Err(StoreError::Config(
                "object_prefix must not be empty".to_string(),
            ));
        }

        if self.default_content_type.is_empty() {
            return Err(StoreError::Config(
                "default_content_type must not be empty".to_string(),
            ));
        }

        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(StoreError::Config(format!(
                "unknown log_level '{}'",
                self.log_level
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.root_dir, PathBuf::from("./data"));
        assert_eq!(config.object_prefix, "datasets");
        assert_eq!(config.default_content_type, "application/octet-stream");
        assert!(!config.query_only);
        assert_eq!(config.log_level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = StoreConfig::default();
        config.object_prefix = "/".to_string();
        assert!(config.validate().is_err());

        config = StoreConfig::default();
        config.default_content_type = String::new();
        assert!(config.validate().is_err());

        config = StoreConfig::default();
        config.log_level = "verbose".to_string();
        assert!(config.validate().is_err());

        config = StoreConfig::default();
        config.root_dir = PathBuf::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serde() {
        let config = StoreConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: StoreConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }
}
