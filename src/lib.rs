//! dualbase - persistence layer over a SQL server or a REST-fronted backend
//!
//! One adapter interface, two backends. Repositories are written once
//! against [`db::DatabaseAdapter`] and run unchanged on either:
//!
//! - **SQL backend**: pooled PostgreSQL connections with real transactions
//! - **REST backend**: every statement goes through one remote procedure;
//!   no client-side transactions
//!
//! # Architecture
//!
//! - [`config`]: Backend selection flag, connection string, pool settings
//! - [`db`]: Adapter traits, both backends, the connection pool, the factory
//! - [`model`]: Users, reports and payments
//! - [`repo`]: Soft-delete policy and the three repositories
//! - [`context`]: Composition root holding one shared adapter
//! - [`error`]: Error types and result aliases
//!
//! # Example
//!
//! ```no_run
//! use dualbase::config::DatabaseConfig;
//! use dualbase::context::DatabaseContext;
//! use dualbase::repo::SoftDeleteRepository;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DatabaseConfig::from_env()?;
//! let context = DatabaseContext::from_config(&config)?;
//!
//! for report in context.reports().list_by_user("u1").await? {
//!     println!("{} ({})", report.subject, report.status);
//! }
//!
//! // Affected rows: 0 when missing, foreign or already deleted
//! let report_id = uuid::Uuid::new_v4();
//! let deleted = context.reports().soft_delete(report_id, "u1").await?;
//! println!("deleted {}", deleted);
//!
//! context.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod logging;
pub mod model;
pub mod repo;

pub use context::DatabaseContext;
pub use error::{ConfigError, DbError, Error, Result};
