use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{
    DEFAULT_MAX_CONCURRENCY, DEFAULT_MAX_TOKENS, DEFAULT_MODEL, DEFAULT_MODEL_BASE_URL,
    DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_MAX_SECS, DEFAULT_RETRY_MIN_SECS,
    DEFAULT_RETRY_MULTIPLIER_SECS, DEFAULT_USER_AGENT,
};
use crate::error::{ExtractorError, Result};
use crate::pipeline::retry::RetryPolicy;
use crate::types::{validate_specs, VenueExtractionSpec};

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const BASE_URL_ENV: &str = "VENUE_EXTRACTOR_MODEL_BASE_URL";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_venues_path")]
    pub venues_path: PathBuf,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    pub name: String,
    pub base_url: String,
    pub max_tokens: u32,
    /// Size of the permit pool shared by every extraction of a run.
    pub max_concurrency: usize,
    pub temperature: Option<f32>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_MODEL_BASE_URL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            temperature: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub multiplier_secs: f64,
    pub min_secs: f64,
    pub max_secs: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_ATTEMPTS,
            multiplier_secs: DEFAULT_RETRY_MULTIPLIER_SECS,
            min_secs: DEFAULT_RETRY_MIN_SECS,
            max_secs: DEFAULT_RETRY_MAX_SECS,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> Result<RetryPolicy> {
        let secs = |name: &str, v: f64| {
            if v.is_finite() && v >= 0.0 {
                Ok(Duration::from_secs_f64(v))
            } else {
                Err(ExtractorError::config(format!("retry.{} must be a non-negative number", name)))
            }
        };
        if self.max_attempts == 0 {
            return Err(ExtractorError::config("retry.max_attempts must be at least 1"));
        }
        let min = secs("min_secs", self.min_secs)?;
        let max = secs("max_secs", self.max_secs)?;
        if min > max {
            return Err(ExtractorError::config("retry.min_secs must not exceed retry.max_secs"));
        }
        Ok(RetryPolicy {
            max_attempts: self.max_attempts,
            multiplier: secs("multiplier_secs", self.multiplier_secs)?,
            min_delay: min,
            max_delay: max,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub cache_path: PathBuf,
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            cache_path: PathBuf::from("data/cache.db"),
            database_path: PathBuf::from("data/events.db"),
        }
    }
}

fn default_venues_path() -> PathBuf {
    PathBuf::from("venues.toml")
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct VenuesFile {
    #[serde(default)]
    venues: Vec<VenueExtractionSpec>,
}

impl Config {
    /// Reads the run configuration. A missing file yields the defaults.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(toml::from_str("")?);
        }
        let content = fs::read_to_string(path).map_err(|e| {
            ExtractorError::config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        let mut config: Config = toml::from_str(&content)?;
        // Relative venue paths are taken from the config file's directory.
        if config.venues_path.is_relative() {
            if let Some(dir) = path.parent() {
                config.venues_path = dir.join(&config.venues_path);
            }
        }
        Ok(config)
    }

    /// Applies environment overrides after `dotenv` has run.
    pub fn apply_env(&mut self) {
        if let Ok(base_url) = std::env::var(BASE_URL_ENV) {
            if !base_url.trim().is_empty() {
                self.model.base_url = base_url;
            }
        }
    }

    pub fn load_venues(&self) -> Result<Vec<VenueExtractionSpec>> {
        load_venues(&self.venues_path)
    }
}

/// Loads and validates every venue definition in `path`.
pub fn load_venues<P: AsRef<Path>>(path: P) -> Result<Vec<VenueExtractionSpec>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        ExtractorError::config(format!("Failed to read venues file '{}': {}", path.display(), e))
    })?;
    let venues = parse_venues(&content)?;
    Ok(venues)
}

pub fn parse_venues(content: &str) -> Result<Vec<VenueExtractionSpec>> {
    let file: VenuesFile = toml::from_str(content)?;
    validate_specs(&file.venues)?;
    Ok(file.venues)
}
