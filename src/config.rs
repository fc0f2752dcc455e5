//! Layered configuration: programmatic defaults → YAML file(s) →
//! environment variables, following the same `figment` merge chain the
//! teacher's `ConfigLoader` uses.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] figment::Error),
    #[error("sandbox_root must not be empty")]
    EmptySandboxRoot,
    #[error("poll_interval_seconds must be positive")]
    NonPositivePollInterval,
    #[error("provider_priority must not be empty")]
    EmptyProviderPriority,
    #[error("default_retry_max must be at least 1")]
    InvalidRetryMax,
    #[error("context limit for provider '{0}' must be positive")]
    InvalidContextLimit(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateStoreConfig {
    #[serde(default = "default_redis_host")]
    pub host: String,
    #[serde(default = "default_redis_port")]
    pub port: u16,
    #[serde(default = "default_db_index")]
    pub db: i64,
    #[serde(default = "default_state_key")]
    pub state_key: String,
    #[serde(default = "default_queue_key")]
    pub queue_key: String,
}

impl Default for StateStoreConfig {
    fn default() -> Self {
        Self {
            host: default_redis_host(),
            port: default_redis_port(),
            db: default_db_index(),
            state_key: default_state_key(),
            queue_key: default_queue_key(),
        }
    }
}

fn default_redis_host() -> String {
    "127.0.0.1".to_string()
}
const fn default_redis_port() -> u16 {
    6379
}
const fn default_db_index() -> i64 {
    0
}
fn default_state_key() -> String {
    "supervisor:state".to_string()
}
fn default_queue_key() -> String {
    "queue:tasks".to_string()
}

/// The supervisor's runtime configuration, loaded once at process start
/// and passed by value/reference to collaborators — never read from a
/// global.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub state_store: StateStoreConfig,

    #[serde(default = "default_sandbox_root")]
    pub sandbox_root: PathBuf,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,

    #[serde(default = "default_retry_max")]
    pub default_retry_max: u32,

    #[serde(default = "default_helper_agent_model")]
    pub default_helper_agent_model: String,

    #[serde(default = "default_provider_priority")]
    pub provider_priority: Vec<String>,

    #[serde(default = "default_context_limits")]
    pub provider_context_limits: HashMap<String, u64>,

    #[serde(default = "default_repeated_failure_threshold")]
    pub repeated_failure_threshold: u32,

    #[serde(default)]
    pub is_enabled_goal_completion_check: bool,

    #[serde(default = "default_dispatch_timeout")]
    pub dispatch_timeout_seconds: u64,

    /// Path to an operator-supplied YAML rule catalog for deterministic
    /// validation. `None` falls back to the built-in generic catalog.
    #[serde(default)]
    pub rule_catalog_path: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

fn default_log_level() -> String {
    "info".to_string()
}
const fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

fn default_sandbox_root() -> PathBuf {
    PathBuf::from("./sandbox")
}
const fn default_poll_interval() -> u64 {
    5
}
const fn default_retry_max() -> u32 {
    3
}
fn default_helper_agent_model() -> String {
    "default".to_string()
}
fn default_provider_priority() -> Vec<String> {
    vec!["claude".to_string()]
}
fn default_context_limits() -> HashMap<String, u64> {
    let mut map = HashMap::new();
    map.insert("large".to_string(), 350_000);
    map.insert("medium".to_string(), 250_000);
    map.insert("small".to_string(), 8_000);
    map
}
const fn default_repeated_failure_threshold() -> u32 {
    2
}
const fn default_dispatch_timeout() -> u64 {
    30 * 60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_store: StateStoreConfig::default(),
            sandbox_root: default_sandbox_root(),
            poll_interval_seconds: default_poll_interval(),
            default_retry_max: default_retry_max(),
            default_helper_agent_model: default_helper_agent_model(),
            provider_priority: default_provider_priority(),
            provider_context_limits: default_context_limits(),
            repeated_failure_threshold: default_repeated_failure_threshold(),
            is_enabled_goal_completion_check: false,
            dispatch_timeout_seconds: default_dispatch_timeout(),
            rule_catalog_path: None,
            logging: LoggingConfig::default(),
        }
    }
}

/// Loads configuration via the layered Figment chain: defaults →
/// `<dir>/config.yaml` → `<dir>/local.yaml` → `SUPERVISOR_`-prefixed
/// environment variables split on `__`.
pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load(config_dir: &Path) -> Result<Config, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));

        let primary = config_dir.join("config.yaml");
        if primary.exists() {
            figment = figment.merge(Yaml::file(&primary));
        }
        let local = config_dir.join("local.yaml");
        if local.exists() {
            figment = figment.merge(Yaml::file(&local));
        }
        figment = figment.merge(Env::prefixed("SUPERVISOR_").split("__"));

        let config: Config = figment.extract()?;
        Self::validate(&config)?;
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> Result<Config, ConfigError> {
        let figment = Figment::from(Serialized::defaults(Config::default())).merge(Yaml::file(path));
        let config: Config = figment.extract()?;
        Self::validate(&config)?;
        Ok(config)
    }

    fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.sandbox_root.as_os_str().is_empty() {
            return Err(ConfigError::EmptySandboxRoot);
        }
        if config.poll_interval_seconds == 0 {
            return Err(ConfigError::NonPositivePollInterval);
        }
        if config.provider_priority.is_empty() {
            return Err(ConfigError::EmptyProviderPriority);
        }
        if config.default_retry_max == 0 {
            return Err(ConfigError::InvalidRetryMax);
        }
        for (name, limit) in &config.provider_context_limits {
            if *limit == 0 {
                return Err(ConfigError::InvalidContextLimit(name.clone()));
            }
        }
        Ok(())
    }
}
