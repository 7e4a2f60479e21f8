//! Application configuration loaded from a JSON file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use opendj_playback::PlaybackConfig;
use serde::{Deserialize, Serialize};

/// Environment variable pointing at the config file.
pub const CONFIG_ENV: &str = "OPENDJ_CONFIG";
/// Environment variable overriding the endpoint from the config file.
pub const ENDPOINT_ENV: &str = "OPENDJ_ENDPOINT";

const CONFIG_FILE: &str = "config.json";

/// An entry queued at startup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeedEntry {
    pub url: String,
    pub owner: String,
    #[serde(default)]
    pub dedication: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    /// RTMP endpoint including the stream key.
    pub endpoint: Option<String>,
    /// Browser to read cookies from when resolving media.
    pub cookies_browser: Option<String>,
    pub playback: PlaybackConfig,
    pub seed: Vec<SeedEntry>,
}

impl AppConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Invalid config")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_json(&json)
    }

    /// Load from `$OPENDJ_CONFIG`, else the user config dir.
    ///
    /// A missing default file yields the default config; a missing file
    /// named explicitly is an error.
    pub fn discover() -> Result<Self> {
        let mut config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(Path::new(&path))?,
            None => match default_path() {
                Some(path) if path.exists() => Self::load(&path)?,
                _ => Self::default(),
            },
        };

        if let Ok(endpoint) = std::env::var(ENDPOINT_ENV) {
            config.endpoint = Some(endpoint);
        }
        Ok(config)
    }

    /// The endpoint to publish to; required before playback can start.
    pub fn endpoint(&self) -> Result<&str> {
        self.endpoint
            .as_deref()
            .filter(|endpoint| !endpoint.is_empty())
            .with_context(|| format!("No endpoint configured, set {ENDPOINT_ENV} or \"endpoint\""))
    }
}

fn default_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "opendj").map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}
