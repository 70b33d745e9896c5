//! Configuration management for CPD.
//!
//! This module handles loading and saving CPD configuration, and resolves
//! the per-user directories the tool works in.
//!
//! ## Configuration File Locations
//!
//! | Platform | Path |
//! |----------|------|
//! | Linux | `~/.config/cpd/config.toml` |
//! | macOS | `~/Library/Application Support/cpd/config.toml` |
//! | Windows | `%APPDATA%\cpd\config.toml` |
//!
//! Files copied to other local users (`cpd copy`) land in
//! `<config dir>/shared/<username>/`, which is also where `cpd receive`
//! saves transfers unless an output directory is given.

use std::path::PathBuf;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Main configuration struct for CPD.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,
    /// Transfer settings
    pub transfer: TransferSettings,
}

/// General configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Display name announced to peers
    pub device_name: String,
    /// Default output directory for received files
    pub default_output: Option<PathBuf>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            device_name: hostname::get().map_or_else(
                |_| "CPD Device".to_string(),
                |h| h.to_string_lossy().to_string(),
            ),
            default_output: None,
        }
    }
}

/// Transfer configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferSettings {
    /// Chunk size in bytes
    pub chunk_size: usize,
    /// Keep-alive ping interval in seconds
    pub keep_alive_secs: u64,
    /// Receiver connect timeout in seconds
    pub connect_timeout_secs: u64,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            chunk_size: crate::DEFAULT_CHUNK_SIZE,
            keep_alive_secs: crate::KEEP_ALIVE_INTERVAL.as_secs(),
            connect_timeout_secs: crate::CONNECT_TIMEOUT.as_secs(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    /// A missing file is not an error; defaults are returned.
    pub fn load() -> Result<Self> {
        let path = Self::config_file()?;
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        toml::from_str(&content).map_err(|e| Error::ConfigError(e.to_string()))
    }

    /// Save configuration to the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_file()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| Error::ConfigError(e.to_string()))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Path to the configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if no home directory can be determined.
    pub fn config_file() -> Result<PathBuf> {
        Ok(config_dir()?.join("config.toml"))
    }
}

/// Platform configuration directory for CPD.
///
/// # Errors
///
/// Returns an error if no home directory can be determined.
pub fn config_dir() -> Result<PathBuf> {
    ProjectDirs::from("", "", "cpd")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or_else(|| Error::ConfigError("no home directory".to_string()))
}

/// Shared-files directory for a local user, created on first use.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn shared_dir(username: &str) -> Result<PathBuf> {
    let dir = config_dir()?.join("shared").join(username);
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Name of the invoking local user.
#[must_use]
pub fn current_username() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}
