//! `wordref.toml` configuration.
//!
//! Every key is optional and unknown keys are ignored. A missing file means
//! defaults; a file that exists but does not parse is an error.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::style::Style;
use crate::sync::SyncSettings;

pub const CONFIG_FILE: &str = "wordref.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    ParseError(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub style: Style,
    #[serde(default = "Config::default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "Config::default_tidy_on_insert")]
    pub tidy_on_insert: bool,
    #[serde(default = "Config::default_bibliography_heading")]
    pub bibliography_heading: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            style: Style::default(),
            debounce_ms: Self::default_debounce_ms(),
            tidy_on_insert: Self::default_tidy_on_insert(),
            bibliography_heading: Self::default_bibliography_heading(),
        }
    }
}

impl Config {
    fn default_debounce_ms() -> u64 {
        150
    }

    fn default_tidy_on_insert() -> bool {
        true
    }

    fn default_bibliography_heading() -> String {
        "References".to_string()
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            bibliography_heading: self.bibliography_heading.clone(),
            tidy_on_insert: self.tidy_on_insert,
            debounce: Duration::from_millis(self.debounce_ms),
        }
    }
}

/// `wordref.toml` in `dir`.
pub fn discover(dir: &Path) -> PathBuf {
    dir.join(CONFIG_FILE)
}

/// Loads `path`, or `wordref.toml` in the working directory when `None`.
pub fn load_from(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| discover(Path::new(".")));
    if !path.exists() {
        debug!(path = %path.display(), "no config file, using defaults");
        return Ok(Config::default());
    }
    let content = fs::read_to_string(&path)?;
    let config = Config::parse(&content)?;
    debug!(path = %path.display(), style = %config.style, "loaded config");
    Ok(config)
}
