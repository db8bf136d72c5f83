use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::provider::openweather::DEFAULT_BASE_URL;

const API_KEY_FILE: &str = "key.txt";
const FAVORITES_FILE: &str = "favorites.txt";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Settings for a weather fetch round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Upper bound on simultaneous requests; `None` means one task per city, all at once.
    pub max_concurrency: Option<usize>,

    /// Per-city timeout, covering the whole request/response exchange.
    pub request_timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl FetchConfig {
    /// Per-request timeout, never shorter than one second.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// api_key_file = "/home/me/.config/cityweather/key.txt"
/// refresh_demoted = true
///
/// [fetch]
/// max_concurrency = 8
/// request_timeout_secs = 10
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// File whose first line is the OpenWeather API key.
    pub api_key_file: Option<PathBuf>,

    /// Newline-delimited list of favorite city names.
    pub favorites_file: Option<PathBuf>,

    pub base_url: String,

    /// Look up real coordinates for cities moved out of My List.
    pub refresh_demoted: bool,

    pub fetch: FetchConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key_file: None,
            favorites_file: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            refresh_demoted: false,
            fetch: FetchConfig::default(),
        }
    }
}

impl Config {
    /// Load config from disk, or return defaults if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("dev", "cityweather", "cityweather")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))
    }

    pub fn config_file_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.toml"))
    }

    pub fn api_key_path(&self) -> Result<PathBuf> {
        match &self.api_key_file {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::project_dirs()?.config_dir().join(API_KEY_FILE)),
        }
    }

    pub fn favorites_path(&self) -> Result<PathBuf> {
        match &self.favorites_file {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::project_dirs()?.data_dir().join(FAVORITES_FILE)),
        }
    }
}

/// Read the API key: the first non-blank line of `path`.
pub fn read_api_key(path: &Path) -> Result<String> {
    let contents = fs::read_to_string(path).with_context(|| {
        format!(
            "Unable to open API key file: {}\n\
             Hint: run `cityweather configure` and enter your API key.",
            path.display()
        )
    })?;

    contents
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("API key file is empty: {}", path.display()))
}

/// Write `api_key` to `path`, creating parent directories as needed.
pub fn write_api_key(path: &Path, api_key: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    fs::write(path, format!("{}\n", api_key.trim()))
        .with_context(|| format!("Failed to write API key file: {}", path.display()))
}
