//! Configuration loading and management for quickxiv.
//!
//! Loads settings from `quickxiv.toml` with environment variable overrides for sensitive data.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

const CONFIG_FILE: &str = "quickxiv.toml";

/// Environment variable holding the Hugging Face token
pub const API_KEY_ENV: &str = "HF_API_KEY";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("no API key configured; run `quickxiv key` or set HF_API_KEY")]
    MissingApiKey,
    #[error("{0}")]
    InvalidApiKey(&'static str),
}

/// Generation endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Model identifier (e.g., "mistralai/Mistral-7B-Instruct-v0.2")
    pub model: String,
    /// OpenAI-compatible chat completions URL
    pub endpoint: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

/// API keys configuration (loaded from environment)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ApiConfig {
    #[serde(default)]
    pub hf_key: Option<String>,
}

/// Where paper HTML is fetched from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub base_url: String,
}

/// Storage paths configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Base path for data storage
    pub path: PathBuf,
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from the default location (quickxiv.toml in cwd or home).
    ///
    /// A missing file yields the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::find_config_file() {
            Some(path) => Self::read_from(&path)?,
            None => Config::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::read_from(path)?;
        config.apply_env();
        Ok(config)
    }

    fn read_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Override API keys from environment variables
    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                self.api.hf_key = Some(key);
            }
        }
    }

    /// Find the config file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let local_config = PathBuf::from(CONFIG_FILE);
        if local_config.exists() {
            return Some(local_config);
        }

        dirs::home_dir()
            .map(|home| home.join(".config").join("quickxiv").join(CONFIG_FILE))
            .filter(|path| path.exists())
    }

    /// The API key from config or environment, falling back to a stored one.
    pub fn api_key<'a>(&'a self, stored: Option<&'a str>) -> Result<&'a str, ConfigError> {
        let key = self
            .api
            .hf_key
            .as_deref()
            .or(stored)
            .ok_or(ConfigError::MissingApiKey)?;
        validate_api_key(key)?;
        Ok(key.trim())
    }
}

/// Hugging Face tokens are non-empty and start with `hf_`.
pub fn validate_api_key(key: &str) -> Result<(), ConfigError> {
    let key = key.trim();
    if key.is_empty() {
        return Err(ConfigError::InvalidApiKey("Please enter your API key."));
    }
    if !key.starts_with("hf_") {
        return Err(ConfigError::InvalidApiKey(
            "API key should start with \"hf_\".",
        ));
    }
    Ok(())
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "mistralai/Mistral-7B-Instruct-v0.2".to_string(),
            endpoint: "https://router.huggingface.co/v1/chat/completions".to_string(),
            max_tokens: 1500,
            temperature: 0.5,
            top_p: 0.7,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://ar5iv.labs.arxiv.org/html".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let path = dirs::data_dir()
            .map(|dir| dir.join("quickxiv"))
            .unwrap_or_else(|| PathBuf::from("./data"));
        Self { path }
    }
}
