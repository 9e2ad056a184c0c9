//! Application configuration
//!
//! Stored as a single TOML file under `~/.config/nunchuck/`. A default file is
//! written on first start; sections or keys missing from an existing file
//! fall back to their defaults so older files keep loading.

use color_eyre::eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};

use crate::controller::NunchuckSettings;
use crate::transport::TransportKind;

const CONFIG_DIR: &str = ".config/nunchuck";
const CONFIG_FILE: &str = "config.toml";

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub device: DeviceConfig,
    pub polling: PollingConfig,
    pub logging: LoggingConfig,
}

/// Where to find the nunchuck
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct DeviceConfig {
    /// I2C bus number, `/dev/i2c-<bus>`
    pub bus: u8,
    pub address: u8,
    pub transport: TransportKind,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            bus: 1,
            address: 0x52,
            transport: TransportKind::Auto,
        }
    }
}

/// Poll loop timing
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct PollingConfig {
    pub tick_ms: u64,
    pub settle_delay_us: u64,
    pub response_delay_us: u64,
    pub recovery_delay_ms: u64,
    pub init_delay_ms: u64,
    pub report_initial_edges: bool,
}

impl Default for PollingConfig {
    fn default() -> Self {
        let settings = NunchuckSettings::default();
        Self {
            tick_ms: settings.tick_ms,
            settle_delay_us: settings.settle_delay_us,
            response_delay_us: settings.response_delay_us,
            recovery_delay_ms: settings.recovery_delay_ms,
            init_delay_ms: settings.init_delay_ms,
            report_initial_edges: settings.report_initial_edges,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// One of trace, debug, info, warn, error
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    pub fn default_path() -> PathBuf {
        let mut path = get_home_dir();
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        path
    }

    /// Load the default config file, writing one first if there is none.
    pub async fn load_or_create() -> Result<Self> {
        let path = Self::default_path();
        if !tokio::fs::try_exists(&path)
            .await
            .map_err(|e| eyre!("Failed to check if config file exists: {}", e))?
        {
            info!("No config at {}, writing defaults", path.display());
            let config = Self::default();
            config.save_to(&path).await?;
            return Ok(config);
        }
        Self::load_from(&path).await
    }

    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| eyre!("Failed to create config directory: {}", e))?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| eyre!("Failed to serialize config: {}", e))?;
        tokio::fs::write(path, content)
            .await
            .map_err(|e| eyre!("Failed to write config file: {}", e))?;
        Ok(())
    }

    pub fn nunchuck_settings(&self) -> NunchuckSettings {
        NunchuckSettings {
            address: self.device.address,
            tick_ms: self.polling.tick_ms,
            settle_delay_us: self.polling.settle_delay_us,
            response_delay_us: self.polling.response_delay_us,
            recovery_delay_ms: self.polling.recovery_delay_ms,
            init_delay_ms: self.polling.init_delay_ms,
            report_initial_edges: self.polling.report_initial_edges,
        }
    }

    pub fn log_level(&self) -> Level {
        self.logging.level.parse().unwrap_or_else(|_| {
            warn!("Unknown log level {:?}, using info", self.logging.level);
            Level::INFO
        })
    }
}

fn get_home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| {
        warn!("Could not determine home directory, using current directory");
        PathBuf::from(".")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(name: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("nunchuck-config-{}-{}", std::process::id(), name));
        path.push(CONFIG_FILE);
        path
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [polling]
            tick_ms = 50

            [device]
            transport = "simulated"
            "#,
        )
        .unwrap();

        assert_eq!(config.polling.tick_ms, 50);
        assert_eq!(config.polling.recovery_delay_ms, 100);
        assert_eq!(config.device.transport, TransportKind::Simulated);
        assert_eq!(config.device.address, 0x52);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn settings_follow_config() {
        let mut config = AppConfig::default();
        config.device.address = 0x53;
        config.polling.tick_ms = 20;
        config.polling.report_initial_edges = true;

        let settings = config.nunchuck_settings();
        assert_eq!(settings.address, 0x53);
        assert_eq!(settings.tick_ms, 20);
        assert!(settings.report_initial_edges);
        assert_eq!(settings.settle_delay_us, 4_000);
    }

    #[test]
    fn unknown_log_level_defaults_to_info() {
        let mut config = AppConfig::default();
        config.logging.level = "debug".to_string();
        assert_eq!(config.log_level(), Level::DEBUG);
        config.logging.level = "chatty".to_string();
        assert_eq!(config.log_level(), Level::INFO);
    }

    #[tokio::test]
    async fn saved_config_loads_back() {
        let path = scratch_path("saved");
        let mut config = AppConfig::default();
        config.polling.tick_ms = 250;
        config.device.bus = 0;

        config.save_to(&path).await.unwrap();
        let loaded = AppConfig::load_from(&path).await.unwrap();
        assert_eq!(loaded, config);

        if let Some(dir) = path.parent() {
            let _ = tokio::fs::remove_dir_all(dir).await;
        }
    }

    #[tokio::test]
    async fn broken_file_is_an_error() {
        let path = scratch_path("broken");
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(&path, "[polling]\ntick_ms = \"fast\"\n")
            .await
            .unwrap();

        assert!(AppConfig::load_from(&path).await.is_err());

        let _ = tokio::fs::remove_dir_all(path.parent().unwrap()).await;
    }
}
