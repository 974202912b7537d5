// src/config.rs

//! Installer configuration
//!
//! Every field has a default matching the shipped installer, so an empty
//! TOML file (or no file at all) describes a standard external-storage
//! migration.

use crate::filesystem::path::sanitize_filename;
use crate::migration::HandoffMode;
use crate::storage::{ContentIndex, StorePermissions};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Installer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct InstallerConfig {
    /// How the next boot is handed off
    pub mode: HandoffMode,

    /// Content slot holding the zip archive
    pub archive_content: ContentIndex,

    /// Content slot holding the replacement executable (replace mode)
    pub executable_content: ContentIndex,

    /// File name of the primary executable inside the archive
    pub primary_executable: String,

    /// State object, relative to the title root (external mode)
    pub state_object: String,

    /// Content object overwritten with the new executable (replace mode)
    pub target_executable_content: ContentIndex,

    /// Content object deleted once the new executable is in place (replace mode)
    pub retired_executable_content: ContentIndex,

    /// Seconds counted down before returning to the launcher
    pub countdown_secs: u32,

    /// Maximum bytes per store write
    pub write_chunk_size: usize,

    /// Permissions for every object the installer creates
    pub permissions: StorePermissions,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            mode: HandoffMode::External,
            archive_content: 3,
            executable_content: 4,
            primary_executable: "boot.dol".to_string(),
            state_object: "data/state.txt".to_string(),
            target_executable_content: 1,
            retired_executable_content: 2,
            countdown_secs: 5,
            write_chunk_size: 32 * 1024,
            permissions: StorePermissions::default(),
        }
    }
}

impl InstallerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and validate a TOML config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Parse and validate TOML text
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.write_chunk_size == 0 {
            return Err(ConfigError::Invalid("write-chunk-size must be non-zero".into()));
        }
        sanitize_filename(&self.primary_executable)
            .map_err(|e| ConfigError::Invalid(format!("primary-executable: {}", e)))?;
        if self.state_object.trim_matches('/').is_empty() {
            return Err(ConfigError::Invalid("state-object must not be empty".into()));
        }
        if self.mode == HandoffMode::ReplaceExecutable
            && self.target_executable_content == self.retired_executable_content
        {
            return Err(ConfigError::Invalid(
                "target and retired executable content must differ".into(),
            ));
        }
        Ok(())
    }

    pub fn with_mode(mut self, mode: HandoffMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_primary_executable(mut self, name: impl Into<String>) -> Self {
        self.primary_executable = name.into();
        self
    }

    pub fn with_countdown(mut self, secs: u32) -> Self {
        self.countdown_secs = secs;
        self
    }

    pub fn with_write_chunk_size(mut self, size: usize) -> Self {
        self.write_chunk_size = size;
        self
    }
}
