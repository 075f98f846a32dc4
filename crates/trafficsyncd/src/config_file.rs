//! Configuration file support for trafficsyncd
//!
//! Loads and validates trafficsyncd configuration from TOML files.
//! Default location: /etc/trafficsyncd/trafficsyncd.toml

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use traffic_accounting::RedisStoreConfig;
use tracing::warn;

/// Default config file path
pub const DEFAULT_CONFIG_PATH: &str = "/etc/trafficsyncd/trafficsyncd.toml";

/// Port the node counter agent listens on
pub const DEFAULT_AGENT_PORT: u16 = 50051;

/// Accounting store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Redis host
    #[serde(default = "default_redis_host")]
    pub redis_host: String,

    /// Redis port
    #[serde(default = "default_redis_port")]
    pub redis_port: u16,

    /// Redis database number holding accounts and feeds
    #[serde(default = "default_db_number")]
    pub db_number: i64,

    /// Per-operation timeout in seconds
    #[serde(default = "default_store_timeout")]
    pub store_timeout_secs: u64,
}

/// Node agent configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Agent port on each node
    #[serde(default = "default_agent_port")]
    pub agent_port: u16,

    /// Connect plus dump timeout in seconds
    #[serde(default = "default_remote_timeout")]
    pub remote_timeout_secs: u64,
}

/// Work queue configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Resources reconciled in parallel
    #[serde(default = "default_max_concurrent_reconciles")]
    pub max_concurrent_reconciles: usize,

    /// First retry delay after a failed reconcile, in milliseconds
    #[serde(default = "default_base_backoff")]
    pub base_backoff_ms: u64,

    /// Retry delay cap in seconds
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive (`info`, `trafficsyncd=debug`, ...)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

/// Complete trafficsyncd configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrafficSyncConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

// Default functions
fn default_redis_host() -> String {
    "127.0.0.1".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_db_number() -> i64 {
    0
}

fn default_store_timeout() -> u64 {
    5
}

fn default_agent_port() -> u16 {
    DEFAULT_AGENT_PORT
}

fn default_remote_timeout() -> u64 {
    5
}

fn default_max_concurrent_reconciles() -> usize {
    5
}

fn default_base_backoff() -> u64 {
    500
}

fn default_max_backoff() -> u64 {
    300
}

fn default_log_level() -> String {
    "info".to_string()
}

// Default implementations
impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            redis_host: default_redis_host(),
            redis_port: default_redis_port(),
            db_number: default_db_number(),
            store_timeout_secs: default_store_timeout(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            agent_port: default_agent_port(),
            remote_timeout_secs: default_remote_timeout(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_reconciles: default_max_concurrent_reconciles(),
            base_backoff_ms: default_base_backoff(),
            max_backoff_secs: default_max_backoff(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl SchedulerConfig {
    /// Get base backoff as Duration
    pub fn base_backoff(&self) -> Duration {
        Duration::from_millis(self.base_backoff_ms)
    }

    /// Get max backoff as Duration
    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }
}

impl TrafficSyncConfig {
    /// Parse configuration from a TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_str(&content)
    }

    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(content) => Self::from_str(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(SyncError::Io(e)),
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| SyncError::Configuration(format!("Failed to serialize config: {}", e)))?;
        fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Connection settings for the Redis mark store
    pub fn store_config(&self) -> RedisStoreConfig {
        RedisStoreConfig::new(
            self.database.redis_host.clone(),
            self.database.redis_port,
            self.database.db_number,
        )
    }

    /// Get store operation timeout as Duration
    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.database.store_timeout_secs)
    }

    /// Get remote call timeout as Duration
    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.agent.remote_timeout_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.database.redis_port == 0 {
            return Err(SyncError::Configuration(
                "redis_port must be > 0".to_string(),
            ));
        }

        if self.database.db_number < 0 {
            return Err(SyncError::Configuration(
                "db_number must be >= 0".to_string(),
            ));
        }

        if self.database.store_timeout_secs == 0 {
            return Err(SyncError::Configuration(
                "store_timeout_secs must be > 0".to_string(),
            ));
        }

        if self.agent.agent_port == 0 {
            return Err(SyncError::Configuration(
                "agent_port must be > 0".to_string(),
            ));
        }

        if self.agent.remote_timeout_secs == 0 {
            return Err(SyncError::Configuration(
                "remote_timeout_secs must be > 0".to_string(),
            ));
        }

        if self.scheduler.max_concurrent_reconciles == 0 {
            return Err(SyncError::Configuration(
                "max_concurrent_reconciles must be > 0".to_string(),
            ));
        }

        if self.scheduler.base_backoff() > self.scheduler.max_backoff() {
            return Err(SyncError::Configuration(
                "base_backoff_ms must not exceed max_backoff_secs".to_string(),
            ));
        }

        Ok(())
    }
}
