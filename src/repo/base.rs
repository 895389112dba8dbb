//! Shared repository plumbing

use crate::db::{BackendKind, DatabaseAdapter, QueryResult, SqlParam, Transaction};
use crate::error::{DbError, DbResult};
use std::sync::Arc;

/// Holds the adapter every repository queries through
#[derive(Clone)]
pub struct BaseRepository {
    adapter: Arc<dyn DatabaseAdapter>,
}

impl BaseRepository {
    pub fn new(adapter: Arc<dyn DatabaseAdapter>) -> Self {
        Self { adapter }
    }

    pub fn backend(&self) -> BackendKind {
        self.adapter.backend()
    }

    pub async fn query(&self, sql: &str, params: &[SqlParam]) -> DbResult<QueryResult> {
        self.adapter.query(sql, params).await
    }

    /// Fail before any I/O when the backend cannot run transactions.
    pub fn require_transactions(&self) -> DbResult<()> {
        if self.backend().supports_transactions() {
            Ok(())
        } else {
            Err(DbError::Unsupported(format!(
                "this operation needs a transaction, which the {} does not support",
                self.backend()
            )))
        }
    }

    pub async fn begin_transaction(&self) -> DbResult<Box<dyn Transaction>> {
        self.require_transactions()?;
        self.adapter.begin_transaction().await
    }
}
