//! Configuration loading and resolution
//!
//! Import settings resolve with priority: environment variable pointing at a
//! config file, then the platform config directory, then compiled defaults.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file location
pub const CONFIG_PATH_ENV: &str = "VITREA_CONFIG";

/// Import pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Event bus channel capacity
    pub event_capacity: usize,
    /// Maximum number of files imported concurrently
    pub max_concurrent_files: usize,
    /// Upload chunk size in bytes
    pub upload_chunk_size: usize,
    /// Archive the original files on the server after import
    pub archive_originals: bool,
    /// Request server-side thumbnail generation after pixel write
    pub generate_thumbnails: bool,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            event_capacity: 1000,
            max_concurrent_files: 4,
            upload_chunk_size: 1024 * 1024,
            archive_originals: false,
            generate_thumbnails: true,
        }
    }
}

impl ImportConfig {
    /// Validate configured values, mapping violations to `Error::Config`
    pub fn validate(&self) -> Result<()> {
        if self.event_capacity == 0 {
            return Err(Error::Config("event_capacity must be > 0".to_string()));
        }
        if self.max_concurrent_files == 0 {
            return Err(Error::Config(
                "max_concurrent_files must be > 0".to_string(),
            ));
        }
        if self.upload_chunk_size == 0 {
            return Err(Error::Config("upload_chunk_size must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Resolve the import configuration.
///
/// Priority order:
/// 1. File named by the `VITREA_CONFIG` environment variable
/// 2. `<config_dir>/vitrea/config.toml`
/// 3. Compiled defaults
pub fn resolve_config() -> Result<ImportConfig> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        let config = load_config_file(&path)?;
        info!(path = %path.display(), "Configuration loaded from environment override");
        return Ok(config);
    }

    if let Some(path) = default_config_path() {
        if path.exists() {
            match load_config_file(&path) {
                Ok(config) => {
                    info!(path = %path.display(), "Configuration loaded");
                    return Ok(config);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Config file unreadable, using defaults");
                }
            }
        }
    }

    Ok(ImportConfig::default())
}

/// Load and validate a TOML config file
pub fn load_config_file(path: &Path) -> Result<ImportConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read config failed: {}", e)))?;
    let config: ImportConfig =
        toml::from_str(&content).map_err(|e| Error::Config(format!("Parse config failed: {}", e)))?;
    config.validate()?;
    Ok(config)
}

/// Write a config file, creating parent directories as needed
pub fn write_config_file(config: &ImportConfig, path: &Path) -> Result<()> {
    let content =
        toml::to_string_pretty(config).map_err(|e| Error::Config(format!("Serialize config failed: {}", e)))?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

/// Default platform config path: `<config_dir>/vitrea/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("vitrea").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(ImportConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_concurrency_rejected() {
        let config = ImportConfig {
            max_concurrent_files: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn config_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = ImportConfig {
            max_concurrent_files: 8,
            archive_originals: true,
            ..Default::default()
        };
        write_config_file(&config, &path).unwrap();
        let loaded = load_config_file(&path).unwrap();
        assert_eq!(loaded.max_concurrent_files, 8);
        assert!(loaded.archive_originals);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "max_concurrent_files = 2\n").unwrap();
        let loaded = load_config_file(&path).unwrap();
        assert_eq!(loaded.max_concurrent_files, 2);
        assert_eq!(loaded.event_capacity, 1000);
    }
}
