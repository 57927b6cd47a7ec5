use crate::types::{DispatchMode, MAX_TOP_K};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Failed to read config: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration for hostroute
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HostRouteConfig {
    /// Discovery service settings
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Candidate connection and health probe settings
    #[serde(default)]
    pub pool: PoolConfig,

    /// Dispatch settings
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Merge policy
    #[serde(default)]
    pub aggregation: AggregationConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Base URL of the discovery service (e.g. "http://localhost:8000")
    #[serde(default = "default_registry_url")]
    pub base_url: String,

    /// Bearer token sent as `Authorization: Bearer <token>`
    #[serde(default, skip_serializing)]
    pub api_key: Option<SecretString>,

    #[serde(default = "default_registry_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: default_registry_url(),
            api_key: None,
            timeout_secs: default_registry_timeout_secs(),
        }
    }
}

impl RegistryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Liveness path appended to each candidate URL
    #[serde(default = "default_probe_path")]
    pub probe_path: String,

    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    /// Skip TLS certificate verification for candidate calls
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            probe_path: default_probe_path(),
            probe_timeout_secs: default_probe_timeout_secs(),
            accept_invalid_certs: false,
        }
    }
}

impl PoolConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_messages_path")]
    pub messages_path: String,

    /// Per-candidate call timeout
    #[serde(default = "default_dispatch_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub default_mode: DispatchMode,

    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            messages_path: default_messages_path(),
            timeout_secs: default_dispatch_timeout_secs(),
            default_mode: DispatchMode::default(),
            default_top_k: default_top_k(),
        }
    }
}

impl DispatchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Keep candidate names out of the merged answer
    #[serde(default = "default_true")]
    pub redact_candidate_names: bool,

    /// Separator placed between merged sections
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            redact_candidate_names: true,
            delimiter: default_delimiter(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// "pretty" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_registry_url() -> String {
    "http://localhost:8000".to_string()
}
fn default_registry_timeout_secs() -> u64 {
    8
}
fn default_probe_path() -> String {
    "/card".to_string()
}
fn default_probe_timeout_secs() -> u64 {
    3
}
fn default_messages_path() -> String {
    "/messages".to_string()
}
fn default_dispatch_timeout_secs() -> u64 {
    30
}
fn default_top_k() -> usize {
    3
}
fn default_true() -> bool {
    true
}
fn default_delimiter() -> String {
    "\n\n".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}

/// Configuration manager with layered sources
pub struct ConfigManager {
    config: HostRouteConfig,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with the following precedence:
    /// 1. Environment variables (.env file)
    /// 2. Config file (.hostroute.toml)
    /// 3. Defaults
    pub fn load() -> Result<Self, ConfigError> {
        info!("Loading hostroute configuration");

        Self::load_dotenv();

        let (config, config_path) = Self::load_config_file()?;
        let config = Self::apply_env_overrides(config);
        Self::validate_config(&config)?;

        match config_path {
            Some(ref path) => info!(path = %path.display(), "Config file loaded"),
            None => info!("No config file found, using defaults"),
        }
        info!(
            registry = %config.registry.base_url,
            mode = %config.dispatch.default_mode,
            top_k = config.dispatch.default_top_k,
            "Configuration loaded"
        );

        Ok(Self {
            config,
            config_path,
        })
    }

    /// Load from an explicit file, still honouring environment overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        Self::load_dotenv();

        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let config = Self::apply_env_overrides(Self::read_toml_file(path)?);
        Self::validate_config(&config)?;
        Ok(Self {
            config,
            config_path: Some(path.to_path_buf()),
        })
    }

    /// Wrap an in-memory configuration after validating it.
    pub fn from_config(config: HostRouteConfig) -> Result<Self, ConfigError> {
        Self::validate_config(&config)?;
        Ok(Self {
            config,
            config_path: None,
        })
    }

    fn load_dotenv() {
        if Path::new(".env").exists() {
            if let Err(e) = dotenv::from_filename(".env") {
                warn!("Failed to load .env file: {}", e);
            } else {
                info!("Loaded .env file from current directory");
            }
            return;
        }

        if let Some(home) = dirs::home_dir() {
            let home_env = home.join(".hostroute.env");
            if home_env.exists() {
                if let Err(e) = dotenv::from_path(&home_env) {
                    warn!("Failed to load .hostroute.env: {}", e);
                } else {
                    info!("Loaded .hostroute.env from home directory");
                }
            }
        }
    }

    /// Search order:
    /// 1. ./.hostroute.toml
    /// 2. ~/.hostroute/config.toml
    fn load_config_file() -> Result<(HostRouteConfig, Option<PathBuf>), ConfigError> {
        let local_config = Path::new(".hostroute.toml");
        if local_config.exists() {
            let config = Self::read_toml_file(local_config)?;
            return Ok((config, Some(local_config.to_path_buf())));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".hostroute").join("config.toml");
            if user_config.exists() {
                let config = Self::read_toml_file(&user_config)?;
                return Ok((config, Some(user_config)));
            }
        }

        Ok((HostRouteConfig::default(), None))
    }

    fn read_toml_file(path: &Path) -> Result<HostRouteConfig, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    fn apply_env_overrides(config: HostRouteConfig) -> HostRouteConfig {
        Self::apply_overrides(config, |key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`; unparsable numeric values are ignored.
    pub fn apply_overrides<F>(mut config: HostRouteConfig, lookup: F) -> HostRouteConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        // Registry
        if let Some(url) = lookup("REGISTRY_BASE_URL") {
            config.registry.base_url = url;
        }
        if let Some(key) = lookup("API_KEY").filter(|k| !k.is_empty()) {
            config.registry.api_key = Some(SecretString::from(key));
        }
        if let Some(secs) = lookup("HOSTROUTE_REGISTRY_TIMEOUT_SECS").and_then(|v| v.parse().ok())
        {
            config.registry.timeout_secs = secs;
        }

        // Pool
        if let Some(secs) = lookup("HOSTROUTE_PROBE_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            config.pool.probe_timeout_secs = secs;
        }

        // Dispatch
        if let Some(secs) = lookup("HOSTROUTE_DISPATCH_TIMEOUT_SECS").and_then(|v| v.parse().ok())
        {
            config.dispatch.timeout_secs = secs;
        }
        if let Some(k) = lookup("HOSTROUTE_TOP_K").and_then(|v| v.parse().ok()) {
            config.dispatch.default_top_k = k;
        }
        if let Some(mode) = lookup("HOSTROUTE_MODE") {
            match mode.parse() {
                Ok(mode) => config.dispatch.default_mode = mode,
                Err(e) => warn!("Ignoring HOSTROUTE_MODE: {}", e),
            }
        }

        // Aggregation
        if let Some(redact) = lookup("HOSTROUTE_REDACT_NAMES") {
            config.aggregation.redact_candidate_names =
                redact.to_lowercase() == "true" || redact == "1";
        }

        // Logging
        if let Some(level) = lookup("RUST_LOG") {
            config.logging.level = level;
        }

        config
    }

    pub fn validate_config(config: &HostRouteConfig) -> Result<(), ConfigError> {
        match url::Url::parse(&config.registry.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => {
                return Err(ConfigError::ValidationError(format!(
                    "Registry base URL must be http or https, got scheme '{}'",
                    url.scheme()
                )))
            }
            Err(e) => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid registry base URL {}: {}",
                    config.registry.base_url, e
                )))
            }
        }

        for (name, secs) in [
            ("registry.timeout_secs", config.registry.timeout_secs),
            ("pool.probe_timeout_secs", config.pool.probe_timeout_secs),
            ("dispatch.timeout_secs", config.dispatch.timeout_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
        }

        if !(1..=MAX_TOP_K).contains(&config.dispatch.default_top_k) {
            return Err(ConfigError::ValidationError(format!(
                "dispatch.default_top_k must be between 1 and {}, got {}",
                MAX_TOP_K, config.dispatch.default_top_k
            )));
        }

        // Any EnvFilter directive: a level, `off`, a bare target or `target=level` lists.
        let level = config.logging.level.trim();
        if level.is_empty() || level.contains(char::is_whitespace) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log level {:?}: expected a level such as info or a directive list",
                config.logging.level
            )));
        }

        match config.logging.format.as_str() {
            "pretty" | "json" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log format: {}. Must be one of: pretty, json",
                    other
                )))
            }
        }

        Ok(())
    }

    pub fn config(&self) -> &HostRouteConfig {
        &self.config
    }

    pub fn into_config(self) -> HostRouteConfig {
        self.config
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Write the default configuration as TOML. Secrets are never written.
    pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        let config = HostRouteConfig::default();
        let toml_str =
            toml::to_string_pretty(&config).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::ReadError(e.to_string()))?;
        }

        std::fs::write(path, toml_str).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        Ok(())
    }
}
