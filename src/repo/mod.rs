//! Repositories over the database adapter
//!
//! Repositories only ever talk to [`crate::db::DatabaseAdapter`]; they never
//! know which backend is behind it beyond `BaseRepository::backend()`.

pub mod base;
pub mod payment_repo;
pub mod report_repo;
pub mod soft_delete;
pub mod user_repo;

pub use base::BaseRepository;
pub use payment_repo::PaymentRepository;
pub use report_repo::ReportRepository;
pub use soft_delete::{SoftDeleteRepository, Visibility, where_active, where_deleted};
pub use user_repo::UserRepository;
