use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Deserializer, Serialize};
use serde_aux::prelude::deserialize_vec_from_string_or_vec;

use crate::nonce::{
    guard::{DEFAULT_ACTION_PARAM, DEFAULT_NONCE_PARAM},
    ActionFilter, GuardSettings,
};

/// Prefix of environment variables overriding configuration values.
pub const ENV_PREFIX: &str = "NG_";

/// Upper bound, in seconds, for `nonce.expire_time` and
/// `nonce.cleanup_interval` (ten years).
pub const MAX_DURATION_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Application configuration loaded from multiple sources.
///
/// Configuration is loaded in priority order (lowest to highest):
/// 1. Struct defaults
/// 2. config.yaml file (if exists)
/// 3. Environment variables with NG_ prefix (always wins)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub nonce: NonceConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// HTTP server port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// HTTP server bind address.
    #[serde(default = "default_host")]
    pub host: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level filter (debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NonceConfig {
    /// Start with the guard switched off (default: false).
    #[serde(default)]
    pub disabled: bool,

    /// Exact nonce length in bytes (default: 16).
    #[serde(default = "default_nonce_length")]
    pub length: usize,

    /// Seconds a nonce stays live after first use (default: 1000).
    #[serde(default = "default_expire_time")]
    pub expire_time: u64,

    /// Maximum number of live nonces remembered (default: 100000).
    #[serde(default = "default_max_cache_count")]
    pub max_cache_count: usize,

    /// Seconds between background purges of expired nonces (default: 60).
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: u64,

    /// Request parameter carrying the nonce (default: "api_nonce").
    #[serde(default = "default_nonce_param")]
    pub param: String,

    /// Request parameter carrying the action name (default: "api_action").
    #[serde(default = "default_action_param")]
    pub action_param: String,

    #[serde(default)]
    pub actions: ActionsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ActionsConfig {
    /// Actions requiring a nonce. `"*"` matches every action.
    /// Accepts either an array or comma-separated string.
    /// Example: `["*"]` or `"order.create,order.pay"`
    #[serde(
        default = "default_whitelist",
        deserialize_with = "deserialize_patterns"
    )]
    pub whitelist: Vec<String>,

    /// Actions exempt from nonce checks; wins over the whitelist.
    #[serde(default, deserialize_with = "deserialize_patterns")]
    pub blacklist: Vec<String>,
}

/// Deserialize patterns from comma-separated string or array, trimming and
/// filtering empty values.
fn deserialize_patterns<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let patterns: Vec<String> = deserialize_vec_from_string_or_vec(deserializer)?;
    Ok(patterns
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

// These functions cannot be const because serde uses function pointers for defaults
#[allow(clippy::missing_const_for_fn)]
fn default_port() -> u16 {
    8080
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

#[allow(clippy::missing_const_for_fn)]
fn default_nonce_length() -> usize {
    16
}

#[allow(clippy::missing_const_for_fn)]
fn default_expire_time() -> u64 {
    1000
}

#[allow(clippy::missing_const_for_fn)]
fn default_max_cache_count() -> usize {
    100_000
}

#[allow(clippy::missing_const_for_fn)]
fn default_cleanup_interval() -> u64 {
    60
}

fn default_nonce_param() -> String {
    DEFAULT_NONCE_PARAM.to_string()
}

fn default_action_param() -> String {
    DEFAULT_ACTION_PARAM.to_string()
}

fn default_whitelist() -> Vec<String> {
    vec!["*".to_string()]
}

impl Default for ActionsConfig {
    fn default() -> Self {
        Self {
            whitelist: default_whitelist(),
            blacklist: Vec::new(),
        }
    }
}

impl Default for NonceConfig {
    fn default() -> Self {
        Self {
            disabled: false,
            length: default_nonce_length(),
            expire_time: default_expire_time(),
            max_cache_count: default_max_cache_count(),
            cleanup_interval: default_cleanup_interval(),
            param: default_nonce_param(),
            action_param: default_action_param(),
            actions: ActionsConfig::default(),
        }
    }
}

impl NonceConfig {
    /// Resolve into the settings the replay guard runs with.
    #[must_use]
    pub fn guard_settings(&self) -> GuardSettings {
        GuardSettings {
            enabled: !self.disabled,
            token_length: self.length,
            ttl: Duration::from_secs(self.expire_time),
            max_live_tokens: self.max_cache_count,
            filter: ActionFilter::from_patterns(&self.actions.whitelist, &self.actions.blacklist),
            nonce_param: self.param.clone(),
            action_param: self.action_param.clone(),
            sweep_interval: Some(Duration::from_secs(self.cleanup_interval)),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                port: default_port(),
                host: default_host(),
            },
            logging: LoggingConfig {
                level: default_log_level(),
            },
            nonce: NonceConfig::default(),
        }
    }
}

/// Configuration loading and validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Figment(#[from] Box<figment::Error>),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Sources are merged in priority order:
    /// 1. Struct defaults (lowest)
    /// 2. config.yaml file (if exists)
    /// 3. Environment variables with NG_ prefix (highest)
    ///
    /// # Errors
    /// Returns an error if configuration cannot be loaded or is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config.yaml")
    }

    /// Load configuration with a custom YAML file path.
    ///
    /// # Errors
    /// Returns an error if configuration cannot be loaded or is invalid.
    pub fn load_from(yaml_path: &str) -> Result<Self, ConfigError> {
        let config: Self = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Yaml::file(yaml_path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Port must be non-zero
        if self.server.port == 0 {
            return Err(ConfigError::Validation("server.port cannot be 0".into()));
        }

        let nonce = &self.nonce;
        if nonce.length == 0 {
            return Err(ConfigError::Validation("nonce.length cannot be 0".into()));
        }
        if nonce.expire_time == 0 {
            return Err(ConfigError::Validation(
                "nonce.expire_time cannot be 0".into(),
            ));
        }
        if nonce.expire_time > MAX_DURATION_SECS {
            return Err(ConfigError::Validation(format!(
                "nonce.expire_time cannot exceed {MAX_DURATION_SECS} seconds"
            )));
        }
        if nonce.max_cache_count == 0 {
            return Err(ConfigError::Validation(
                "nonce.max_cache_count cannot be 0".into(),
            ));
        }
        if nonce.cleanup_interval == 0 {
            return Err(ConfigError::Validation(
                "nonce.cleanup_interval cannot be 0".into(),
            ));
        }
        if nonce.cleanup_interval > MAX_DURATION_SECS {
            return Err(ConfigError::Validation(format!(
                "nonce.cleanup_interval cannot exceed {MAX_DURATION_SECS} seconds"
            )));
        }
        if nonce.param.is_empty() || nonce.action_param.is_empty() {
            return Err(ConfigError::Validation(
                "nonce.param and nonce.action_param cannot be empty".into(),
            ));
        }
        if nonce.param == nonce.action_param {
            return Err(ConfigError::Validation(format!(
                "nonce.param and nonce.action_param must differ, both are '{}'",
                nonce.param
            )));
        }

        // Patterns are literal names or "*"; whitespace is never part of a name
        for pattern in nonce
            .actions
            .whitelist
            .iter()
            .chain(&nonce.actions.blacklist)
        {
            if pattern.is_empty() || pattern.chars().any(char::is_whitespace) {
                return Err(ConfigError::Validation(format!(
                    "nonce.actions contains invalid pattern '{pattern}'"
                )));
            }
        }

        Ok(())
    }
}
