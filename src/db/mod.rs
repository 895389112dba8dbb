//! Database abstraction layer
//!
//! This module provides a trait-based abstraction over the two storage
//! backends, allowing repositories to be written once and tested with mocks.

pub mod factory;
pub mod postgres;
pub mod provider;
pub mod rest;
pub mod types;

// Re-export main types
pub use factory::{AdapterHandle, create_database_adapter};
pub use postgres::{PoolStatus, SqlBackendAdapter, SqlConnection};
pub use provider::{DatabaseAdapter, Transaction, TransactionState};
pub use rest::RestBackendAdapter;
pub use types::{BackendKind, CellValue, QueryResult, Row, SqlParam};
