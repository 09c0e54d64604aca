// src/core/config.rs

use crate::core::common::PolystoreError;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Represents the configuration for a Polystore engine.
///
/// Supports loading from a TOML file (e.g., `Polystore.toml`) and provides
/// sensible default values for every field.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Directory holding the persistent store and any vector index dumps.
    /// Default: "polystore_data"
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// HNSW graph degree (M) used when a vector namespace does not specify one.
    /// Default: 16
    #[serde(default = "default_vector_m")]
    pub vector_m: usize,

    /// HNSW construction beam width (ef_construction) default.
    /// Default: 200
    #[serde(default = "default_vector_ef_construction")]
    pub vector_ef_construction: usize,

    /// HNSW query beam width (ef_search) default.
    /// Default: 64
    #[serde(default = "default_vector_ef_search")]
    pub vector_ef_search: usize,

    /// How long completed transactions are retained for statistics, in
    /// seconds, before `cleanup_old_transactions` evicts them.
    /// Default: 3600
    #[serde(default = "default_transaction_retention_secs")]
    pub transaction_retention_secs: u64,

    /// Default transaction isolation level: "read_committed" or "snapshot".
    /// Default: "snapshot"
    #[serde(default = "default_isolation_level")]
    pub default_isolation_level: String,
}

// Default value functions for serde
fn default_data_dir() -> String {
    "polystore_data".to_string()
}
fn default_vector_m() -> usize {
    16
}
fn default_vector_ef_construction() -> usize {
    200
}
fn default_vector_ef_search() -> usize {
    64
}
fn default_transaction_retention_secs() -> u64 {
    3600
}
fn default_isolation_level() -> String {
    "snapshot".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: default_data_dir(),
            vector_m: default_vector_m(),
            vector_ef_construction: default_vector_ef_construction(),
            vector_ef_search: default_vector_ef_search(),
            transaction_retention_secs: default_transaction_retention_secs(),
            default_isolation_level: default_isolation_level(),
        }
    }
}

impl Config {
    /// Loads configuration from a TOML file.
    ///
    /// If the specified file does not exist, default configuration values are
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns `PolystoreError::Config` if the file cannot be read or parsing
    /// fails.
    pub fn load_from_file(path: &Path) -> Result<Self, PolystoreError> {
        match fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents)
                .map_err(|e| PolystoreError::Config(format!("failed to parse {}: {e}", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(PolystoreError::Config(format!(
                "failed to read {}: {e}",
                path.display()
            ))),
        }
    }

    /// The data directory as a `PathBuf`.
    #[must_use]
    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.data_dir, "polystore_data");
        assert_eq!(config.vector_m, 16);
        assert_eq!(config.vector_ef_construction, 200);
        assert_eq!(config.vector_ef_search, 64);
        assert_eq!(config.transaction_retention_secs, 3600);
        assert_eq!(config.default_isolation_level, "snapshot");
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = Config::load_from_file(Path::new("does_not_exist.toml")).unwrap();
        assert_eq!(config.data_dir, Config::default().data_dir);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("polystore.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "data_dir = \"/tmp/engine\"\nvector_m = 32").unwrap();

        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.data_dir, "/tmp/engine");
        assert_eq!(config.vector_m, 32);
        assert_eq!(config.vector_ef_search, 64);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "data_dir = [not toml").unwrap();

        let result = Config::load_from_file(&path);
        assert!(matches!(result, Err(PolystoreError::Config(_))));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unknown.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "no_such_option = true").unwrap();

        assert!(Config::load_from_file(&path).is_err());
    }
}
