//! Adapter factory
//!
//! Picks a backend from the feature flag and fails fast when the settings
//! it needs are absent.

use crate::config::DatabaseConfig;
use crate::db::postgres::SqlBackendAdapter;
use crate::db::provider::DatabaseAdapter;
use crate::db::rest::RestBackendAdapter;
use crate::error::{ConfigError, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

/// A freshly built adapter plus its background error channel, if any
pub struct AdapterHandle {
    pub adapter: Arc<dyn DatabaseAdapter>,
    /// Lost-connection notices from the SQL backend's pool
    pub connection_errors: Option<mpsc::Receiver<String>>,
}

/// Build the adapter selected by `config.use_rest_backend`.
///
/// # Errors
/// `ConfigError::Missing` when the chosen backend's URL or key is absent,
/// `ConfigError::Invalid` for a malformed connection string.
pub fn create_database_adapter(config: &DatabaseConfig) -> Result<AdapterHandle> {
    if config.use_rest_backend {
        let adapter = RestBackendAdapter::new(&config.rest)?;
        info!(elevated = adapter.uses_elevated_key(), "using REST backend");
        return Ok(AdapterHandle {
            adapter: Arc::new(adapter),
            connection_errors: None,
        });
    }

    let database_url = config
        .database_url
        .as_deref()
        .ok_or(ConfigError::Missing("DATABASE_URL"))?;
    let (adapter, errors_rx) = SqlBackendAdapter::connect(database_url, config.pool)?;
    info!(max_connections = config.pool.max_connections, "using SQL backend");
    Ok(AdapterHandle {
        adapter: Arc::new(adapter),
        connection_errors: Some(errors_rx),
    })
}
