//! Database settings
//!
//! Everything the composition root needs to pick and build an adapter:
//! the backend flag, the SQL connection string with its pool limits, and
//! the REST backend's base URL and keys. Loaded from the environment or a
//! TOML file; every field has a documented default or is reported missing.

use crate::error::{ConfigError, ConfigResult};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const ENV_USE_REST_BACKEND: &str = "DB_USE_REST_BACKEND";
const ENV_DATABASE_URL: &str = "DATABASE_URL";
const ENV_POOL_MAX: &str = "DB_POOL_MAX";
const ENV_POOL_IDLE_TIMEOUT_MS: &str = "DB_POOL_IDLE_TIMEOUT_MS";
const ENV_POOL_CONNECT_TIMEOUT_MS: &str = "DB_POOL_CONNECT_TIMEOUT_MS";
const ENV_REST_URL: &str = "REST_BACKEND_URL";
const ENV_REST_ANON_KEY: &str = "REST_BACKEND_ANON_KEY";
const ENV_REST_SERVICE_KEY: &str = "REST_BACKEND_SERVICE_KEY";

/// Top-level database configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Feature flag: route everything through the REST backend
    pub use_rest_backend: bool,
    /// PostgreSQL connection string (URL or key=value form)
    pub database_url: Option<String>,
    pub pool: PoolSettings,
    pub rest: RestSettings,
}

/// Connection pool limits for the SQL backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    pub max_connections: usize,
    pub idle_timeout_ms: u64,
    pub connect_timeout_ms: u64,
}

/// Credentials for the REST-fronted backend
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RestSettings {
    pub base_url: Option<String>,
    pub anon_key: Option<String>,
    /// Elevated key. When present it replaces the anonymous key and
    /// bypasses the backend's row-level policies.
    pub service_key: Option<String>,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 20,
            idle_timeout_ms: 30_000,
            connect_timeout_ms: 2_000,
        }
    }
}

impl PoolSettings {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "pool max_connections must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl DatabaseConfig {
    /// Read the configuration from process environment variables.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let use_rest_backend = match get(ENV_USE_REST_BACKEND) {
            Some(v) => parse_flag(ENV_USE_REST_BACKEND, &v)?,
            None => false,
        };

        let mut pool = PoolSettings::default();
        if let Some(v) = get(ENV_POOL_MAX) {
            pool.max_connections = parse_number(ENV_POOL_MAX, &v)?;
        }
        if let Some(v) = get(ENV_POOL_IDLE_TIMEOUT_MS) {
            pool.idle_timeout_ms = parse_number(ENV_POOL_IDLE_TIMEOUT_MS, &v)?;
        }
        if let Some(v) = get(ENV_POOL_CONNECT_TIMEOUT_MS) {
            pool.connect_timeout_ms = parse_number(ENV_POOL_CONNECT_TIMEOUT_MS, &v)?;
        }
        pool.validate()?;

        Ok(Self {
            use_rest_backend,
            database_url: get(ENV_DATABASE_URL),
            pool,
            rest: RestSettings {
                base_url: get(ENV_REST_URL),
                anon_key: get(ENV_REST_ANON_KEY),
                service_key: get(ENV_REST_SERVICE_KEY),
            },
        })
    }

    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: DatabaseConfig = toml::from_str(content)?;
        config.pool.validate()?;
        Ok(config)
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> ConfigResult<DatabaseConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::NotFound(format!("{}: {}", path.display(), e)))?;
    DatabaseConfig::from_toml_str(&content)
}

fn parse_flag(key: &str, value: &str) -> ConfigResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Invalid(format!(
            "{} must be a boolean, got '{}'",
            key, other
        ))),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> ConfigResult<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| ConfigError::Invalid(format!("{} must be a number, got '{}'", key, value)))
}
