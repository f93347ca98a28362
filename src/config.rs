//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub rate_limiter: RateLimiterConfig,

    /// Record type name to package names, highest priority first
    #[serde(default)]
    pub priorities: BTreeMap<String, Vec<String>>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Record store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

fn default_database_path() -> String {
    dirs::data_local_dir()
        .map(|p| {
            p.join("healthstore")
                .join("health.db")
                .to_string_lossy()
                .to_string()
        })
        .unwrap_or_else(|| "./healthstore_data/health.db".to_string())
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

impl StorageConfig {
    /// Database path with a leading `~/` expanded to the home directory
    pub fn resolved_path(&self) -> PathBuf {
        match (self.database_path.strip_prefix("~/"), dirs::home_dir()) {
            (Some(rest), Some(home)) => home.join(rest),
            _ => PathBuf::from(&self.database_path),
        }
    }
}

/// Quota maxima and payload ceilings
///
/// Read and write quotas share the same maxima.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RateLimiterConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default = "default_foreground_15m")]
    pub foreground_max_per_15m: f64,

    #[serde(default = "default_foreground_24h")]
    pub foreground_max_per_24h: f64,

    #[serde(default = "default_background_15m")]
    pub background_max_per_15m: f64,

    #[serde(default = "default_background_24h")]
    pub background_max_per_24h: f64,

    #[serde(default = "default_chunk_size_limit")]
    pub chunk_size_limit_in_bytes: u64,

    #[serde(default = "default_record_size_limit")]
    pub record_size_limit_in_bytes: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_foreground_15m() -> f64 {
    1000.0
}

fn default_foreground_24h() -> f64 {
    2000.0
}

fn default_background_15m() -> f64 {
    300.0
}

fn default_background_24h() -> f64 {
    600.0
}

fn default_chunk_size_limit() -> u64 {
    5_000_000
}

fn default_record_size_limit() -> u64 {
    1_000_000
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            foreground_max_per_15m: default_foreground_15m(),
            foreground_max_per_24h: default_foreground_24h(),
            background_max_per_15m: default_background_15m(),
            background_max_per_24h: default_background_24h(),
            chunk_size_limit_in_bytes: default_chunk_size_limit(),
            record_size_limit_in_bytes: default_record_size_limit(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|e| match e {
            ConfigError::Parse { error, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                error,
            },
            other => other,
        })
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            error: e.to_string(),
        })
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("healthstore").join("config.toml")),
            Some(PathBuf::from("./healthstore.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("HEALTHSTORE_DATABASE_PATH") {
            self.storage.database_path = path;
        }

        if let Ok(enabled) = std::env::var("HEALTHSTORE_RATE_LIMIT_ENABLED") {
            if let Ok(v) = enabled.parse() {
                self.rate_limiter.enabled = v;
            }
        }
        if let Ok(limit) = std::env::var("HEALTHSTORE_CHUNK_SIZE_LIMIT") {
            if let Ok(v) = limit.parse() {
                self.rate_limiter.chunk_size_limit_in_bytes = v;
            }
        }
        if let Ok(limit) = std::env::var("HEALTHSTORE_RECORD_SIZE_LIMIT") {
            if let Ok(v) = limit.parse() {
                self.rate_limiter.record_size_limit_in_bytes = v;
            }
        }

        if let Ok(level) = std::env::var("HEALTHSTORE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("HEALTHSTORE_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Healthstore Configuration
#
# Environment variables override these settings:
# - HEALTHSTORE_DATABASE_PATH
# - HEALTHSTORE_RATE_LIMIT_ENABLED
# - HEALTHSTORE_CHUNK_SIZE_LIMIT
# - HEALTHSTORE_RECORD_SIZE_LIMIT
# - HEALTHSTORE_LOG_LEVEL
# - HEALTHSTORE_LOG_FORMAT

[storage]
# SQLite database file
database_path = "~/.local/share/healthstore/health.db"

[rate_limiter]
# Disable to skip quota accounting (payload ceilings still apply)
enabled = true

# Calls allowed per window; read and write quotas are tracked separately
foreground_max_per_15m = 1000.0
foreground_max_per_24h = 2000.0
background_max_per_15m = 300.0
background_max_per_24h = 600.0

# Payload ceilings (bytes)
chunk_size_limit_in_bytes = 5000000
record_size_limit_in_bytes = 1000000

[priorities]
# Record type to data origins, highest priority first.
# Origins writing a type for the first time are appended at the end.
# steps = ["com.example.watch", "com.example.phone"]

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
