//! sectord configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::MesaId;

/// Main sectord configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Request socket configuration
    pub server: ServerConfig,

    /// Snapshot storage configuration
    pub storage: StorageConfig,

    /// Mesas registered at startup (in addition to any in the snapshot)
    pub tables: Vec<MesaId>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .sectord.yml
        let local_config = PathBuf::from(".sectord.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/sectord/sectord.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("sectord").join("sectord.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is initialized
    ///
    /// Errors are swallowed; the full load reports them once logging is up.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let candidates = match config_path {
            Some(path) => vec![path.clone()],
            None => {
                let mut paths = vec![PathBuf::from(".sectord.yml")];
                if let Some(config_dir) = dirs::config_dir() {
                    paths.push(config_dir.join("sectord").join("sectord.yml"));
                }
                paths
            }
        };
        candidates
            .iter()
            .find(|p| p.exists())
            .and_then(|p| Self::load_from_file(p).ok())
            .and_then(|c| c.log_level)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Base directory for runtime files (socket)
fn runtime_dir() -> PathBuf {
    dirs::runtime_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("sectord")
}

/// Base directory for persistent data (snapshot, logs)
pub fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sectord")
}

/// Request socket configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Unix socket the daemon listens on
    #[serde(rename = "socket-path")]
    pub socket_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: runtime_dir().join("sectord.sock"),
        }
    }
}

/// Snapshot storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Snapshot file
    #[serde(rename = "snapshot-path")]
    pub snapshot_path: PathBuf,

    /// Seconds between automatic saves (0 disables autosave)
    #[serde(rename = "autosave-secs")]
    pub autosave_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            snapshot_path: data_dir().join("sectors.json"),
            autosave_secs: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.server.socket_path.ends_with("sectord/sectord.sock"));
        assert!(config.storage.snapshot_path.ends_with("sectord/sectors.json"));
        assert_eq!(config.storage.autosave_secs, 30);
        assert!(config.tables.is_empty());
        assert!(config.log_level.is_none());
    }

    #[test]
    fn test_load_explicit_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("sectord.yml");
        std::fs::write(
            &path,
            "server:\n  socket-path: /tmp/test.sock\nstorage:\n  autosave-secs: 5\ntables: [1, 2, 3]\nlog-level: DEBUG\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.server.socket_path, PathBuf::from("/tmp/test.sock"));
        assert_eq!(config.storage.autosave_secs, 5);
        // Unset fields keep their defaults
        assert!(config.storage.snapshot_path.ends_with("sectors.json"));
        assert_eq!(config.tables, vec![1, 2, 3]);
        assert_eq!(config.log_level.as_deref(), Some("DEBUG"));

        assert_eq!(Config::load_log_level(Some(&path)).as_deref(), Some("DEBUG"));
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("missing.yml");
        assert!(Config::load(Some(&path)).is_err());
        assert!(Config::load_log_level(Some(&path)).is_none());
    }
}
