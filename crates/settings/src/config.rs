//! Configuration types

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use relaybridge_core::{DEFAULT_CHUNK_SIZE, MAX_PAYLOAD_SIZE};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{default_settings_path, Result, SettingsError};

/// Main settings structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Relay session settings
    #[serde(default)]
    pub relay: RelaySettings,

    /// Tunnel bridge settings
    #[serde(default)]
    pub bridge: BridgeSettings,

    /// Development hub settings
    #[serde(default)]
    pub hub: HubSettings,

    /// Custom settings file path (not serialized)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

impl Settings {
    /// Load settings from the default path, or create defaults
    pub fn load_or_default() -> Result<Self> {
        Self::load_from(&default_settings_path())
    }

    /// Load settings from a specific path, or create defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut settings = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(SettingsError::ReadError)?;
            let settings: Settings =
                serde_json::from_str(&content).map_err(SettingsError::ParseError)?;
            info!("Loaded settings from {:?}", path);
            settings
        } else {
            Self::default()
        };
        settings.config_path = Some(path.to_path_buf());
        settings.validate()?;
        Ok(settings)
    }

    /// Save settings to the configured path
    pub fn save(&self) -> Result<()> {
        let path = self.config_path.clone().unwrap_or_else(default_settings_path);
        self.save_to(&path)
    }

    /// Save settings to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(SettingsError::CreateDirError)?;
            }
        }

        let content = serde_json::to_string_pretty(self).map_err(SettingsError::ParseError)?;
        std::fs::write(path, content).map_err(SettingsError::WriteError)?;
        info!("Saved settings to {:?}", path);
        Ok(())
    }

    /// Reject values the bridge cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.relay.server.trim().is_empty() {
            return Err(SettingsError::Invalid {
                field: "relay.server",
                reason: "must not be empty".to_string(),
            });
        }
        if self.bridge.chunk_size == 0 || self.bridge.chunk_size > MAX_PAYLOAD_SIZE {
            return Err(SettingsError::Invalid {
                field: "bridge.chunk_size",
                reason: format!("must be between 1 and {}", MAX_PAYLOAD_SIZE),
            });
        }
        Ok(())
    }
}

/// Relay session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelaySettings {
    /// Relay server address (`host:port`)
    #[serde(default = "default_server")]
    pub server: String,
}

fn default_server() -> String {
    "127.0.0.1:8340".to_string()
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            server: default_server(),
        }
    }
}

/// Tunnel bridge settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeSettings {
    /// Bytes read from the local socket per readiness event
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Host for the exposed service and the local listening port
    #[serde(default = "default_local_host")]
    pub local_host: String,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_local_host() -> String {
    "127.0.0.1".to_string()
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            local_host: default_local_host(),
        }
    }
}

/// Development hub settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubSettings {
    /// Address the hub accepts relay clients on
    #[serde(default = "default_hub_listen")]
    pub listen_addr: SocketAddr,
}

fn default_hub_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8340))
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            listen_addr: default_hub_listen(),
        }
    }
}
