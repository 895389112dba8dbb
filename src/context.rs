//! Composition root
//!
//! One [`DatabaseContext`] is built at startup and passed by reference.
//! All three repositories share its single adapter instance until
//! [`DatabaseContext::close`] tears it down.

use crate::config::DatabaseConfig;
use crate::db::{AdapterHandle, BackendKind, DatabaseAdapter, create_database_adapter};
use crate::error::{DbResult, Result};
use crate::repo::{BaseRepository, PaymentRepository, ReportRepository, UserRepository};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::info;

pub struct DatabaseContext {
    adapter: Arc<dyn DatabaseAdapter>,
    users: UserRepository,
    reports: ReportRepository,
    payments: PaymentRepository,
    connection_errors: Option<mpsc::Receiver<String>>,
    closed: AtomicBool,
}

impl DatabaseContext {
    /// Build every repository against `adapter`.
    pub fn new(adapter: Arc<dyn DatabaseAdapter>) -> Self {
        let base = BaseRepository::new(Arc::clone(&adapter));
        Self {
            users: UserRepository::new(base.clone()),
            reports: ReportRepository::new(base.clone()),
            payments: PaymentRepository::new(base),
            adapter,
            connection_errors: None,
            closed: AtomicBool::new(false),
        }
    }

    /// Select and build the adapter from `config`, then the repositories.
    ///
    /// # Errors
    /// Fails fast when the selected backend's settings are missing.
    pub fn from_config(config: &DatabaseConfig) -> Result<Self> {
        let AdapterHandle {
            adapter,
            connection_errors,
        } = create_database_adapter(config)?;
        let mut context = Self::new(adapter);
        context.connection_errors = connection_errors;
        Ok(context)
    }

    pub fn users(&self) -> &UserRepository {
        &self.users
    }

    pub fn reports(&self) -> &ReportRepository {
        &self.reports
    }

    pub fn payments(&self) -> &PaymentRepository {
        &self.payments
    }

    pub fn backend(&self) -> BackendKind {
        self.adapter.backend()
    }

    /// Hand out the lost-connection channel. `None` on the REST backend or
    /// once it has been taken.
    pub fn take_connection_errors(&mut self) -> Option<mpsc::Receiver<String>> {
        self.connection_errors.take()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Release the adapter's resources. Later calls are no-ops.
    pub async fn close(&self) -> DbResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        info!(backend = %self.backend(), "closing database context");
        self.adapter.close().await
    }
}
