//! Configuration management for `SmogMap`
//!
//! Handles loading configuration from files, environment variables,
//! and provides validation for all configuration settings.

use crate::SmogMapError;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure for `SmogMap`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SmogMapConfig {
    /// Air quality API configuration
    #[serde(default)]
    pub api: ApiConfig,
    /// Station list cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// Index fetch pacing
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Viewport event shaping
    #[serde(default)]
    pub viewport: ViewportConfig,
    /// Station detail loading
    #[serde(default)]
    pub details: DetailsConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Air quality API configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the GIOŚ REST API
    #[serde(default = "default_api_base_url")]
    pub base_url: String,
    /// Request timeout in seconds
    #[serde(default = "default_api_timeout")]
    pub timeout_seconds: u32,
    /// Transport-level retries for transient failures
    #[serde(default)]
    pub max_retries: u32,
    /// Page size used for the single station directory request
    #[serde(default = "default_station_page_size")]
    pub station_page_size: u32,
    /// User agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Cache configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache directory location
    #[serde(default = "default_cache_location")]
    pub location: String,
    /// Key of the single station list slot
    #[serde(default = "default_cache_key")]
    pub key: String,
    /// Time-to-live of the station list snapshot in minutes
    #[serde(default = "default_cache_ttl")]
    pub ttl_minutes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Index fetches dispatched per wave
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// Pause between two waves in milliseconds
    #[serde(default = "default_batch_delay")]
    pub batch_delay_ms: u64,
    /// Number of stations (directory order) seeded regardless of viewport
    #[serde(default = "default_bootstrap_count")]
    pub bootstrap_count: u32,
    /// Bootstrap ids consumed per tick
    #[serde(default = "default_bootstrap_tick_size")]
    pub bootstrap_tick_size: u32,
    /// Bootstrap tick period in milliseconds
    #[serde(default = "default_bootstrap_tick")]
    pub bootstrap_tick_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewportConfig {
    /// Minimum spacing of viewport notifications in milliseconds
    #[serde(default = "default_throttle")]
    pub throttle_ms: u64,
    /// Quiet period before a bounding box is accepted, in milliseconds
    #[serde(default = "default_debounce")]
    pub debounce_ms: u64,
    /// Edge tolerance in degrees under which two boxes are the same
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailsConfig {
    /// Measurements older than this many hours are dropped
    #[serde(default = "default_window_hours")]
    pub window_hours: u32,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (pretty or compact)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_api_base_url() -> String {
    "https://api.gios.gov.pl/pjp-api/v1/rest".to_string()
}

fn default_api_timeout() -> u32 {
    30
}

fn default_station_page_size() -> u32 {
    500
}

fn default_user_agent() -> String {
    format!("SmogMap/{}", env!("CARGO_PKG_VERSION"))
}

fn default_cache_location() -> String {
    dirs::cache_dir()
        .map(|dir| dir.join("smogmap"))
        .unwrap_or_else(|| PathBuf::from(".smogmap-cache"))
        .to_string_lossy()
        .into_owned()
}

fn default_cache_key() -> String {
    "gios_stations_page0_v1".to_string()
}

fn default_cache_ttl() -> u32 {
    60
}

fn default_batch_size() -> u32 {
    20
}

fn default_batch_delay() -> u64 {
    250
}

fn default_bootstrap_count() -> u32 {
    10
}

fn default_bootstrap_tick_size() -> u32 {
    25
}

fn default_bootstrap_tick() -> u64 {
    300
}

fn default_throttle() -> u64 {
    200
}

fn default_debounce() -> u64 {
    500
}

fn default_epsilon() -> f64 {
    1e-5
}

fn default_window_hours() -> u32 {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base_url(),
            timeout_seconds: default_api_timeout(),
            max_retries: 0,
            station_page_size: default_station_page_size(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            location: default_cache_location(),
            key: default_cache_key(),
            ttl_minutes: default_cache_ttl(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay(),
            bootstrap_count: default_bootstrap_count(),
            bootstrap_tick_size: default_bootstrap_tick_size(),
            bootstrap_tick_ms: default_bootstrap_tick(),
        }
    }
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            throttle_ms: default_throttle(),
            debounce_ms: default_debounce(),
            epsilon: default_epsilon(),
        }
    }
}

impl Default for DetailsConfig {
    fn default() -> Self {
        Self {
            window_hours: default_window_hours(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl CacheConfig {
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(u64::from(self.ttl_minutes) * 60)
    }
}

impl SmogMapConfig {
    /// Load configuration from file and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path(None)
    }

    /// Load configuration from specified path
    pub fn load_from_path(config_path: Option<PathBuf>) -> Result<Self> {
        let mut builder = Config::builder();

        let config_file = config_path.unwrap_or_else(|| {
            Self::get_config_path().unwrap_or_else(|| PathBuf::from("smogmap.toml"))
        });

        if config_file.exists() {
            builder = builder.add_source(
                File::from(config_file.clone())
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // SMOGMAP_SCHEDULER__BATCH_SIZE=10 style overrides
        builder = builder.add_source(
            Environment::with_prefix("SMOGMAP")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .with_context(|| "Failed to build configuration")?;

        let mut config: SmogMapConfig = settings
            .try_deserialize()
            .with_context(|| "Failed to deserialize configuration")?;

        config.apply_defaults();
        config.validate()?;

        Ok(config)
    }

    /// Get the default configuration file path
    #[must_use]
    pub fn get_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("smogmap").join("config.toml"))
    }

    /// Apply default values to missing configuration fields
    pub fn apply_defaults(&mut self) {
        if self.api.base_url.is_empty() {
            self.api.base_url = default_api_base_url();
        }
        if self.api.timeout_seconds == 0 {
            self.api.timeout_seconds = default_api_timeout();
        }
        if self.api.station_page_size == 0 {
            self.api.station_page_size = default_station_page_size();
        }
        if self.api.user_agent.is_empty() {
            self.api.user_agent = default_user_agent();
        }
        if self.cache.location.is_empty() {
            self.cache.location = default_cache_location();
        }
        if self.cache.key.is_empty() {
            self.cache.key = default_cache_key();
        }
        if self.cache.ttl_minutes == 0 {
            self.cache.ttl_minutes = default_cache_ttl();
        }
        if self.details.window_hours == 0 {
            self.details.window_hours = default_window_hours();
        }
        if self.logging.level.is_empty() {
            self.logging.level = default_log_level();
        }
        if self.logging.format.is_empty() {
            self.logging.format = default_log_format();
        }
    }

    /// Validate all configuration settings
    pub fn validate(&self) -> Result<()> {
        self.validate_numeric_ranges()?;
        self.validate_string_values()?;
        Ok(())
    }

    fn validate_numeric_ranges(&self) -> Result<()> {
        if self.api.timeout_seconds > 300 {
            return Err(SmogMapError::config("API timeout cannot exceed 300 seconds").into());
        }

        if self.api.max_retries > 10 {
            return Err(SmogMapError::config("API max retries cannot exceed 10").into());
        }

        if self.scheduler.batch_size == 0 {
            return Err(SmogMapError::config("Scheduler batch size must be at least 1").into());
        }

        if self.scheduler.bootstrap_tick_size == 0 {
            return Err(
                SmogMapError::config("Bootstrap tick size must be at least 1").into(),
            );
        }

        if self.scheduler.bootstrap_tick_ms == 0 {
            return Err(SmogMapError::config("Bootstrap tick period cannot be 0 ms").into());
        }

        if !(self.viewport.epsilon.is_finite() && self.viewport.epsilon >= 0.0) {
            return Err(
                SmogMapError::config("Viewport epsilon must be a non-negative number").into(),
            );
        }

        if self.details.window_hours > 72 {
            return Err(
                SmogMapError::config("Measurement window cannot exceed 72 hours").into(),
            );
        }

        Ok(())
    }

    fn validate_string_values(&self) -> Result<()> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.logging.level.as_str()) {
            return Err(SmogMapError::config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            ))
            .into());
        }

        let valid_log_formats = ["pretty", "compact"];
        if !valid_log_formats.contains(&self.logging.format.as_str()) {
            return Err(SmogMapError::config(format!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_log_formats.join(", ")
            ))
            .into());
        }

        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://")
        {
            return Err(
                SmogMapError::config("API base URL must be a valid HTTP or HTTPS URL").into(),
            );
        }

        Ok(())
    }
}
