//! Engine configuration

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Main engine configuration, persisted as JSON next to the app data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Config schema version
    pub version: u32,

    /// Remote store endpoint
    pub remote_url: String,

    /// Publishable API key for the remote store
    pub anon_key: String,

    /// Logging level
    pub log_level: String,

    /// Capacity of the decoded-update channel between feed and reconciler
    pub update_channel_capacity: usize,

    /// Capacity of the engine event bus
    pub event_bus_capacity: usize,

    /// Invite lifetime in hours; `None` means codes never expire
    pub invite_ttl_hours: Option<u32>,
}

impl EngineConfig {
    const FILE_NAME: &'static str = "cartsync.json";

    fn target_version() -> u32 {
        1
    }

    /// Load configuration from a data directory, creating the default
    /// when none exists
    pub fn load_or_create(data_dir: &Path) -> Result<Self> {
        let config_path = data_dir.join(Self::FILE_NAME);

        if config_path.exists() {
            info!("Loading config from {:?}", config_path);
            let json = fs::read_to_string(&config_path)?;
            let mut config: EngineConfig = serde_json::from_str(&json)?;
            if config.version < Self::target_version() {
                info!(
                    "Migrating config from v{} to v{}",
                    config.version,
                    Self::target_version()
                );
                config.migrate()?;
                config.save_to(data_dir)?;
            }
            Ok(config)
        } else {
            warn!("No config found, creating default at {:?}", config_path);
            let config = Self::default();
            config.save_to(data_dir)?;
            Ok(config)
        }
    }

    /// Save configuration to a data directory
    pub fn save_to(&self, data_dir: &Path) -> Result<()> {
        fs::create_dir_all(data_dir)?;
        let config_path = data_dir.join(Self::FILE_NAME);
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&config_path, json)?;
        info!("Saved config to {:?}", config_path);
        Ok(())
    }

    fn migrate(&mut self) -> Result<()> {
        match self.version {
            0 => {
                self.version = 1;
                Ok(())
            }
            1 => Ok(()),
            v => Err(anyhow!("Unknown config version: {}", v)),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: Self::target_version(),
            remote_url: String::new(),
            anon_key: String::new(),
            log_level: "info".to_string(),
            update_channel_capacity: 256,
            event_bus_capacity: 1024,
            invite_ttl_hours: Some(7 * 24),
        }
    }
}

/// Default data directory for the engine's config
pub fn default_data_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|dir| dir.join("cartsync"))
        .ok_or_else(|| anyhow!("could not determine platform data directory"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();

        let mut config = EngineConfig::default();
        config.invite_ttl_hours = None;
        config.save_to(dir.path()).unwrap();

        let loaded = EngineConfig::load_or_create(dir.path()).unwrap();
        assert_eq!(loaded.invite_ttl_hours, None);
        assert_eq!(loaded.version, EngineConfig::target_version());
    }

    #[test]
    fn creates_default_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load_or_create(dir.path()).unwrap();
        assert_eq!(config.update_channel_capacity, 256);
        assert!(dir.path().join("cartsync.json").exists());
    }
}
