//! `AppConfig` struct and TOML read/write.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Language used when none is configured.
const DEFAULT_LANGUAGE: &str = "en";

/// Top-level application configuration.
#[derive(Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct AppConfig {
    /// Sync settings.
    #[serde(default)]
    pub sync: SyncConfig,
    /// Export settings.
    #[serde(default)]
    pub output: OutputConfig,
    /// API settings.
    #[serde(default)]
    pub api: ApiConfig,
}

/// Sync configuration.
#[derive(Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct SyncConfig {
    /// Channel numbers or call signs to sync. Empty syncs every station.
    #[serde(default)]
    pub channels: Vec<String>,
    /// Description language priority (e.g. `["en", "es"]`).
    #[serde(default)]
    pub languages: Vec<String>,
}

/// XMLTV output configuration.
#[derive(Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct OutputConfig {
    /// XMLTV destination file.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// API configuration.
#[derive(Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ApiConfig {
    /// Base URL override.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl SyncConfig {
    /// Configured languages, or `["en"]` when none are set.
    #[must_use]
    pub fn languages_or_default(&self) -> Vec<String> {
        if self.languages.is_empty() {
            vec![String::from(DEFAULT_LANGUAGE)]
        } else {
            self.languages.clone()
        }
    }
}

impl AppConfig {
    /// Loads config from a TOML file. Returns default if file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Saves config to a TOML file, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directory creation or file write fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("failed to serialize config to TOML")?;
        std::fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))
    }
}
