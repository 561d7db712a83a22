use crate::domain::{config::SerTermConfig, error::{SerTermError, SerTermResult}};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Configuration file manager
pub struct ConfigManager {
    config_path: Option<PathBuf>,
    explicit: bool,
}

impl ConfigManager {
    /// Use the per-user configuration file, if the home directory is known
    pub fn new() -> Self {
        Self {
            config_path: Self::get_global_config_path(),
            explicit: false,
        }
    }

    /// Use the given file; it must exist
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: Some(path.into()),
            explicit: true,
        }
    }

    /// Load configuration, falling back to defaults when the per-user file
    /// is absent.
    pub fn load_config(&self) -> SerTermResult<SerTermConfig> {
        match &self.config_path {
            Some(path) if self.explicit || path.exists() => self.load_config_from_path(path),
            _ => {
                debug!("no configuration file, using defaults");
                Ok(SerTermConfig::default())
            }
        }
    }

    /// Get global configuration path
    fn get_global_config_path() -> Option<PathBuf> {
        let home = dirs::home_dir()?;
        Some(home.join(".config").join("serterm").join("config.toml"))
    }

    /// Load configuration from specific path
    pub fn load_config_from_path(&self, path: &Path) -> SerTermResult<SerTermConfig> {
        let content = fs::read_to_string(path).map_err(|e| SerTermError::Config {
            message: format!("Failed to read config file {}: {}", path.display(), e),
        })?;

        toml::from_str(&content).map_err(|e| SerTermError::Config {
            message: format!("Failed to parse config file {}: {}", path.display(), e),
        })
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
