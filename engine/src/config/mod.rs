//! Configuration management
//!
//! This module handles loading, validation, and management of the Valet
//! configuration. Configuration is stored in TOML format at
//! ~/.valet/config.toml; a default file is written on first run.
//!
//! API keys are never stored in the config file. They are read from the
//! environment (`OPENAI_API_KEY`, `TAVILY_API_KEY`) by the startup path.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable holding the model provider API key
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Environment variable holding the Tavily search API key
pub const TAVILY_API_KEY_ENV: &str = "TAVILY_API_KEY";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core engine settings
    #[serde(default)]
    pub core: CoreConfig,

    /// Model provider settings
    #[serde(default)]
    pub model: ModelConfig,

    /// Weather tool endpoints
    #[serde(default)]
    pub weather: WeatherConfig,

    /// Search tool settings
    #[serde(default)]
    pub search: SearchConfig,

    /// Orchestration limits
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            core: CoreConfig::default(),
            model: ModelConfig::default(),
            weather: WeatherConfig::default(),
            search: SearchConfig::default(),
            orchestrator: OrchestratorConfig::default(),
        }
    }
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

/// Model provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Base URL for the OpenAI-compatible API
    #[serde(default = "default_model_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_model_name")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    // Note: API key comes from the environment, not from config
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: default_model_base_url(),
            model: default_model_name(),
            temperature: default_temperature(),
        }
    }
}

/// Weather tool configuration (Open-Meteo is free, no API key needed)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    /// Open-Meteo forecast endpoint
    #[serde(default = "default_forecast_url")]
    pub forecast_url: String,

    /// Nominatim geocoding endpoint
    #[serde(default = "default_geocode_url")]
    pub geocode_url: String,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            forecast_url: default_forecast_url(),
            geocode_url: default_geocode_url(),
        }
    }
}

/// Search tool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Tavily API base URL
    #[serde(default = "default_search_base_url")]
    pub base_url: String,

    /// Maximum results for a basic search
    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: default_search_base_url(),
            max_results: default_max_results(),
        }
    }
}

/// Orchestration limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Maximum agent invocations per incoming query
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,

    /// Recent messages folded into a resumed session's first prompt
    #[serde(default = "default_context_messages")]
    pub context_messages: u32,

    /// Selection policy: "keyword" (deterministic) or "model"
    #[serde(default = "default_routing")]
    pub routing: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            context_messages: default_context_messages(),
            routing: default_routing(),
        }
    }
}

impl Config {
    /// Load the configuration from the default location, writing a default
    /// file first if none exists.
    pub fn load_or_create() -> Result<Self> {
        let path = Self::default_path()?;

        if !path.exists() {
            let config = Config::default();
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).context("Failed to create config directory")?;
            }
            let rendered =
                toml::to_string_pretty(&config).context("Failed to render default config")?;
            fs::write(&path, rendered).context("Failed to write default config")?;
            tracing::info!("Wrote default configuration to {}", path.display());
            return Ok(config);
        }

        Self::load_from_path(&path)
    }

    /// Load the configuration from an explicit path.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;
        let config: Config = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config at {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Default config file location: ~/.valet/config.toml
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Cannot determine home directory")?;
        Ok(home.join(".valet").join("config.toml"))
    }

    /// Path of the conversation database inside the (expanded) data dir.
    pub fn db_path(&self) -> Result<PathBuf> {
        let home = dirs::home_dir().context("Cannot determine home directory")?;
        let data_dir = expand_tilde(&self.core.data_dir, &home);
        Ok(data_dir.join("conversations.db"))
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.orchestrator.max_steps == 0 {
            bail!("orchestrator.max_steps must be at least 1");
        }
        if !(0.0..=2.0).contains(&self.model.temperature) {
            bail!("model.temperature must be between 0.0 and 2.0");
        }
        if !matches!(self.orchestrator.routing.as_str(), "keyword" | "model") {
            bail!("orchestrator.routing must be \"keyword\" or \"model\"");
        }
        Ok(())
    }
}

/// Expand a leading `~/` against the given home directory.
fn expand_tilde(path: &Path, home: &Path) -> PathBuf {
    let text = path.to_string_lossy();
    match text.strip_prefix("~/") {
        Some(rest) => home.join(rest),
        None => path.to_path_buf(),
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.valet/data")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_model_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model_name() -> String {
    "gpt-4o".to_string()
}

fn default_temperature() -> f64 {
    1.0
}

fn default_forecast_url() -> String {
    "https://api.open-meteo.com/v1/forecast".to_string()
}

fn default_geocode_url() -> String {
    "https://nominatim.openstreetmap.org/search".to_string()
}

fn default_search_base_url() -> String {
    "https://api.tavily.com".to_string()
}

fn default_max_results() -> u32 {
    5
}

fn default_max_steps() -> u32 {
    15
}

fn default_context_messages() -> u32 {
    10
}

fn default_routing() -> String {
    "keyword".to_string()
}
