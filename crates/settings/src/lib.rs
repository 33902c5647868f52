//! RelayBridge Settings
//!
//! Configuration shared by the RelayBridge binary and its roles.
//!
//! ## Features
//!
//! - Relay server address used to open the relay session
//! - Bridge tuning (local read chunk size, local host)
//! - Development hub listen address
//! - JSON file storage, every field optional
//!
//! ## Usage
//!
//! ```no_run
//! use relaybridge_settings::Settings;
//!
//! let mut settings = Settings::load_or_default()?;
//! settings.relay.server = "relay.example.net:8340".to_string();
//! settings.save()?;
//! # Ok::<(), relaybridge_settings::SettingsError>(())
//! ```

mod config;

pub use config::{BridgeSettings, HubSettings, RelaySettings, Settings};

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings: {0}")]
    ReadError(std::io::Error),

    #[error("Failed to write settings: {0}")]
    WriteError(std::io::Error),

    #[error("Failed to parse settings: {0}")]
    ParseError(serde_json::Error),

    #[error("Failed to create config directory: {0}")]
    CreateDirError(std::io::Error),

    #[error("Invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, SettingsError>;

/// Per-user configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("relaybridge")
}

/// Get the default settings file path
pub fn default_settings_path() -> PathBuf {
    default_config_dir().join("settings.json")
}
