use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::extract::PREVIEW_URL_PATTERN;
use crate::{ExtractError, Result};

/// Environment variable pointing at a config file when `--config` is absent.
pub const CONFIG_ENV_VAR: &str = "FRAMEFETCH_CONFIG";

/// Name attribute of the sub-frame that carries the document link.
pub const DEFAULT_FRAME_NAME: &str = "mainFrame";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub frame_name: String,
    pub timeouts: Timeouts,
    pub browser: BrowserSettings,
    pub max_concurrent_sessions: usize,
    /// Extra markup reads after a frame-load timeout produced no match.
    pub stale_frame_rereads: u32,
    #[serde(with = "humantime_serde")]
    pub stale_frame_reread_interval: Duration,
    /// Overrides the document-preview regex.
    pub url_pattern: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Timeouts {
    #[serde(with = "humantime_serde")]
    pub navigation: Duration,
    #[serde(with = "humantime_serde")]
    pub settle: Duration,
    #[serde(with = "humantime_serde")]
    pub frame_load: Duration,
    #[serde(with = "humantime_serde")]
    pub download: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            navigation: Duration::from_secs(30),
            settle: Duration::from_millis(5000),
            frame_load: Duration::from_millis(10000),
            download: Duration::from_millis(30000),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BrowserSettings {
    pub node_command: String,
    pub headless: bool,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            node_command: "node".to_string(),
            headless: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            frame_name: DEFAULT_FRAME_NAME.to_string(),
            timeouts: Timeouts::default(),
            browser: BrowserSettings::default(),
            max_concurrent_sessions: 1,
            stale_frame_rereads: 0,
            stale_frame_reread_interval: Duration::from_secs(1),
            url_pattern: None,
        }
    }
}

impl Config {
    /// Load config from a TOML file, the `FRAMEFETCH_CONFIG` file, or defaults.
    /// Priority: explicit path > env var > defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let resolved = path.map(Path::to_path_buf).or_else(Self::env_config_path);
        match resolved {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn env_config_path() -> Option<PathBuf> {
        std::env::var_os(CONFIG_ENV_VAR)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ExtractError::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&raw)
            .map_err(|e| ExtractError::Config(format!("Invalid config ({}): {}", path.display(), e)))
    }

    pub fn from_toml_str(raw: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.frame_name.trim().is_empty() {
            return Err(ExtractError::Config("frame_name must not be empty".into()));
        }
        if self.timeouts.download.is_zero() {
            return Err(ExtractError::Config(
                "timeouts.download must be greater than zero".into(),
            ));
        }
        if self.timeouts.navigation.is_zero() {
            return Err(ExtractError::Config(
                "timeouts.navigation must be greater than zero".into(),
            ));
        }
        if self.max_concurrent_sessions == 0 {
            return Err(ExtractError::Config(
                "max_concurrent_sessions must be at least 1".into(),
            ));
        }
        if let Some(pattern) = &self.url_pattern {
            regex::Regex::new(pattern).map_err(|e| {
                ExtractError::Config(format!("url_pattern is not a valid regex: {e}"))
            })?;
        }
        Ok(())
    }

    /// Regex used to find the document URL in frame markup.
    pub fn url_pattern(&self) -> &str {
        self.url_pattern.as_deref().unwrap_or(PREVIEW_URL_PATTERN)
    }
}
