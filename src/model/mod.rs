//! Entities returned by the repositories

pub mod payment;
pub mod report;
pub mod user;

pub use payment::{NewPayment, Payment, PaymentStatus};
pub use report::{Citation, NewReport, Report, ReportStatus};
pub use user::User;

use chrono::{DateTime, Utc};

/// An entity deleted by stamping a timestamp rather than removing the row
pub trait SoftDeletable {
    fn deleted_at(&self) -> Option<DateTime<Utc>>;

    fn is_deleted(&self) -> bool {
        self.deleted_at().is_some()
    }
}
