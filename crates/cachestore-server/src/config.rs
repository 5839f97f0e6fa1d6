//! Service configuration
//!
//! Read from an optional file (`CACHESTORE_CONFIG`, default
//! `config/config.toml`) and overlaid by `CACHESTORE_*` environment
//! variables, e.g. `CACHESTORE_REDIS__HOST=cache.internal`.

use anyhow::{bail, Context, Result};
use ::config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_PATH_ENV: &str = "CACHESTORE_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/config.toml";
const ENV_PREFIX: &str = "CACHESTORE";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub sql: SqlConfig,
    pub redis: RedisConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    /// How long in-flight requests may drain after a shutdown signal
    pub graceful_term_millis: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            graceful_term_millis: 5000,
        }
    }
}

impl ServerConfig {
    pub fn graceful_term(&self) -> Duration {
        Duration::from_millis(self.graceful_term_millis)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub enable: bool,
    /// `EnvFilter` directive, overridden by `RUST_LOG`
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enable: true,
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlBackend {
    Mysql,
    Sqlite,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SqlConfig {
    pub backend: SqlBackend,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    /// SQLite file, or `:memory:`
    pub path: String,
    pub max_connections: u32,
    pub connect_timeout_ms: u64,
    pub op_timeout_ms: u64,
}

impl Default for SqlConfig {
    fn default() -> Self {
        Self {
            backend: SqlBackend::Mysql,
            host: "127.0.0.1".to_string(),
            port: 3306,
            username: "root".to_string(),
            password: String::new(),
            database: "cachestore".to_string(),
            path: "data/cachestore.db".to_string(),
            max_connections: 10,
            connect_timeout_ms: 3000,
            op_timeout_ms: 5000,
        }
    }
}

impl SqlConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Redis,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub backend: CacheBackend,
    pub host: String,
    pub port: u16,
    /// Replica that serves reads; writes stay on `host`
    pub reader_host: Option<String>,
    /// Defaults to `port`
    pub reader_port: Option<u16>,
    pub password: Option<String>,
    /// Cap on concurrent in-flight cache commands
    pub pool_max_active: usize,
    pub conn_timeout_ms: u64,
    pub op_timeout_ms: u64,
    pub ttl_secs: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Redis,
            host: "127.0.0.1".to_string(),
            port: 6379,
            reader_host: None,
            reader_port: None,
            password: None,
            pool_max_active: 64,
            conn_timeout_ms: 500,
            op_timeout_ms: 1000,
            ttl_secs: 3600,
        }
    }
}

impl RedisConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn conn_timeout(&self) -> Duration {
        Duration::from_millis(self.conn_timeout_ms)
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }
}

/// Config file location, from `CACHESTORE_CONFIG` or the default.
pub fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

impl AppConfig {
    /// Load from the file named by `CACHESTORE_CONFIG` plus the environment.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?;

        Self::from_settings(settings)
    }

    /// Parse a TOML document, ignoring the environment.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .context("Failed to parse configuration")?;

        Self::from_settings(settings)
    }

    fn from_settings(settings: Config) -> Result<Self> {
        let config: AppConfig = settings
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.server
            .bind_address
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid bind address: {}", self.server.bind_address))?;

        if self.redis.ttl_secs == 0 {
            bail!("redis.ttl_secs must be greater than zero");
        }
        if self.redis.pool_max_active == 0 {
            bail!("redis.pool_max_active must be greater than zero");
        }
        if self.redis.conn_timeout_ms == 0 || self.redis.op_timeout_ms == 0 {
            bail!("redis timeouts must be greater than zero");
        }
        // The first cache call also opens the connection, inside the op timeout
        if self.redis.op_timeout_ms < self.redis.conn_timeout_ms {
            bail!(
                "redis.op_timeout_ms ({}) must be at least redis.conn_timeout_ms ({})",
                self.redis.op_timeout_ms,
                self.redis.conn_timeout_ms
            );
        }
        if self.sql.max_connections == 0 {
            bail!("sql.max_connections must be greater than zero");
        }
        if self.sql.connect_timeout_ms == 0 || self.sql.op_timeout_ms == 0 {
            bail!("sql timeouts must be greater than zero");
        }
        if self.sql.backend == SqlBackend::Sqlite && self.sql.path.is_empty() {
            bail!("sql.path is required for the sqlite backend");
        }

        Ok(())
    }
}
