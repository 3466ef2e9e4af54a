//! # Configuration Management Module
//!
//! Persistent application settings stored in platform-appropriate locations.
//! Handles loading, saving, and providing defaults for configuration options.
//!
//! ## Settings
//! - `device_url`: Voltage box endpoint polled for readings
//! - `poll_interval_ms` / `request_timeout_ms`: Poller timing
//! - `cycle_count`: Number of bikes, and therefore trackers
//! - `data_dir`: Where the session log and roster live
//! - `log_layout`: `flat` (one CSV) or `daily` (one CSV per day)
//! - `admin_password`: Gate for roster and device settings
//! - `[energy]`: Which energy formula to use
//!
//! ## Storage Location
//! - macOS: ~/Library/Application Support/pedal-power/config.toml
//! - Linux: ~/.config/pedal-power/config.toml
//! - Windows: %APPDATA%\pedal-power\config.toml

use crate::energy::EnergyFormula;
use crate::error::ConfigError;
use crate::store::LogLayout;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_DIR: &str = "pedal-power";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub device_url: String,
    pub poll_interval_ms: u64,
    pub request_timeout_ms: u64,
    pub cycle_count: usize,
    pub data_dir: Option<PathBuf>,
    pub log_layout: LogLayout,
    pub admin_password: String,
    pub energy: EnergyFormula,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_url: "http://192.168.4.1/".to_string(),
            poll_interval_ms: 1000,
            request_timeout_ms: 2000,
            cycle_count: 8,
            data_dir: None,
            log_layout: LogLayout::Flat,
            admin_password: "admin123".to_string(),
            energy: EnergyFormula::default(),
        }
    }
}

impl Config {
    /// Get the path to the config file
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.toml")
    }

    /// Load config from `path`, or create default if it doesn't exist
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(contents) => {
                let config = toml::from_str(&contents).map_err(ConfigError::ParseFailed)?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.save_to(path)?;
                Ok(config)
            }
            Err(e) => Err(ConfigError::ReadFailed(e)),
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(ConfigError::WriteFailed)?;
        }

        let toml_string = toml::to_string_pretty(self).map_err(ConfigError::SerializeFailed)?;
        fs::write(path, toml_string).map_err(ConfigError::WriteFailed)?;

        Ok(())
    }

    /// Configured data directory, or the platform data dir
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR)
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.device_url, "http://192.168.4.1/");
        assert_eq!(config.cycle_count, 8);
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.request_timeout(), Duration::from_secs(2));
        assert_eq!(config.log_layout, LogLayout::Flat);
        assert_eq!(config.energy, EnergyFormula::ScaledSum { divisor: 1000.0 });
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let toml_str = r#"
            device_url = "http://10.0.0.7/"
            log_layout = "daily"

            [energy]
            formula = "mean_power"
            assumed_current_amps = 2.5
        "#;

        let config: Config = toml::from_str(toml_str).expect("Failed to deserialize");
        assert_eq!(config.device_url, "http://10.0.0.7/");
        assert_eq!(config.log_layout, LogLayout::Daily);
        assert_eq!(config.energy, EnergyFormula::MeanPower { assumed_current_amps: 2.5 });
        assert_eq!(config.cycle_count, 8);
        assert_eq!(config.admin_password, "admin123");
    }

    #[test]
    fn test_load_creates_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).expect("Failed to load config");
        assert_eq!(config, Config::default());
        assert!(path.exists());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = Config {
            cycle_count: 4,
            data_dir: Some(dir.path().join("data")),
            energy: EnergyFormula::MeanPower { assumed_current_amps: 0.8 },
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded, config);
        assert_eq!(reloaded.data_dir(), dir.path().join("data"));
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "cycle_count = \"many\"").unwrap();

        assert!(matches!(Config::load_from(&path), Err(ConfigError::ParseFailed(_))));
    }
}
