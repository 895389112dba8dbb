//! Database adapter traits
//!
//! Defines the interface that both storage backends implement.
//! This abstraction allows for:
//! - Choosing the backend at startup without touching repository code
//! - Branching on capability (`backend()`) instead of on concrete types
//! - Easy testing with scripted mock implementations

use crate::db::types::{BackendKind, QueryResult, SqlParam};
use crate::error::DbResult;
use async_trait::async_trait;

/// Main database adapter trait
///
/// All backends implement this trait so repositories can be written once.
#[async_trait]
pub trait DatabaseAdapter: Send + Sync {
    /// Execute one statement with positional parameters
    ///
    /// # Arguments
    /// * `sql` - Statement text using `$1`, `$2`, ... placeholders
    /// * `params` - Bound parameters, never interpolated into `sql`
    ///
    /// # Errors
    /// Returns `DbError::QueryFailed` or `DbError::ConnectionFailed` on
    /// backend failure. Nothing is retried.
    async fn query(&self, sql: &str, params: &[SqlParam]) -> DbResult<QueryResult>;

    /// Open a transaction on an exclusively held connection
    ///
    /// # Errors
    /// Returns `DbError::Unsupported` on backends without client-side
    /// multi-statement atomicity.
    async fn begin_transaction(&self) -> DbResult<Box<dyn Transaction>>;

    /// Release every resource held by the adapter
    ///
    /// Idempotent: calling it more than once is a no-op.
    async fn close(&self) -> DbResult<()>;

    /// Which backend this adapter talks to
    fn backend(&self) -> BackendKind;
}

/// Lifecycle of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    RolledBack,
    /// COMMIT or ROLLBACK itself failed; the connection was discarded
    Aborted,
}

impl TransactionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionState::Active)
    }
}

/// A one-shot transaction bound to a single connection
///
/// Statements issued through the same transaction run in order on the same
/// connection. After `commit` or `rollback` every call fails with
/// `DbError::TransactionCompleted`.
#[async_trait]
pub trait Transaction: Send {
    async fn query(&mut self, sql: &str, params: &[SqlParam]) -> DbResult<QueryResult>;

    /// Commit and release the connection, even if COMMIT fails
    async fn commit(&mut self) -> DbResult<()>;

    /// Roll back and release the connection, even if ROLLBACK fails
    async fn rollback(&mut self) -> DbResult<()>;

    fn state(&self) -> TransactionState;
}
