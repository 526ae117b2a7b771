use crate::types::{AnalysisError, AnalysisResult};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Map image endpoint settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapImageConfig {
    pub api_key: String,
    pub base_url: String,
    /// Per-request timeout; a timed out request is not retried
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for MapImageConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://image.maps.ls.hereapi.com/mia/1.6".to_string(),
            timeout_secs: 15,
            user_agent: format!("disaster-lens/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Outbound rate gate settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_requests_per_second: f64,
    /// Longest a caller may block at the gate; `None` waits indefinitely
    pub max_wait_secs: Option<f64>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests_per_second: 2.0,
            max_wait_secs: Some(30.0),
        }
    }
}

impl RateLimitConfig {
    pub fn max_wait(&self) -> Option<Duration> {
        self.max_wait_secs
            .filter(|s| s.is_finite() && *s >= 0.0)
            .map(Duration::from_secs_f64)
    }
}

/// Reference image defaults for comparisons
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceDefaults {
    pub zoom: u8,
    pub area_zoom: u8,
    /// Edge length of the square area-comparison reference
    pub area_size: u32,
}

impl Default for ReferenceDefaults {
    fn default() -> Self {
        Self {
            zoom: 15,
            area_zoom: 14,
            area_size: 1024,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub map_image: MapImageConfig,
    pub rate_limit: RateLimitConfig,
    pub reference: ReferenceDefaults,
}

impl Config {
    /// `<config dir>/disaster-lens/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("disaster-lens").join("config.json"))
    }

    /// Read a JSON config file
    pub fn load_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Write the config as pretty JSON, creating parent directories
    pub fn save_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }

    /// Defaults, then the default config file if present, then environment
    pub fn load() -> AnalysisResult<Self> {
        let mut config = match Self::default_path() {
            Some(path) if path.exists() => {
                log::info!("Loading configuration from {}", path.display());
                Self::load_file(&path).map_err(|e| AnalysisError::Config(format!("{:#}", e)))?
            }
            _ => Self::default(),
        };
        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Defaults overridden by environment variables only
    pub fn from_env() -> AnalysisResult<Self> {
        let mut config = Self::default();
        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup
    ///
    /// Recognised names: `HERE_API_KEY`, `DISASTER_LENS_MAP_BASE_URL`,
    /// `DISASTER_LENS_TIMEOUT_SECS`, `DISASTER_LENS_MAX_RPS`,
    /// `DISASTER_LENS_MAX_WAIT_SECS`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> AnalysisResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("HERE_API_KEY") {
            self.map_image.api_key = key.trim().to_string();
        }
        if let Some(url) = lookup("DISASTER_LENS_MAP_BASE_URL") {
            self.map_image.base_url = url;
        }
        if let Some(value) = lookup("DISASTER_LENS_TIMEOUT_SECS") {
            self.map_image.timeout_secs = parse_var("DISASTER_LENS_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = lookup("DISASTER_LENS_MAX_RPS") {
            self.rate_limit.max_requests_per_second = parse_var("DISASTER_LENS_MAX_RPS", &value)?;
        }
        if let Some(value) = lookup("DISASTER_LENS_MAX_WAIT_SECS") {
            self.rate_limit.max_wait_secs = Some(parse_var("DISASTER_LENS_MAX_WAIT_SECS", &value)?);
        }
        self.validate()
    }

    pub fn validate(&self) -> AnalysisResult<()> {
        let rps = self.rate_limit.max_requests_per_second;
        if !rps.is_finite() || rps <= 0.0 {
            return Err(AnalysisError::Config(format!(
                "max_requests_per_second must be positive, got {}",
                rps
            )));
        }
        if self.map_image.timeout_secs == 0 {
            return Err(AnalysisError::Config("timeout_secs must be positive".to_string()));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> AnalysisResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| AnalysisError::Config(format!("Invalid value for {}: {:?}", name, value)))
}
