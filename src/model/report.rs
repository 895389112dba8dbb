//! Report entity

use crate::error::DbError;
use crate::model::SoftDeletable;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Generation status of a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Generating,
    Completed,
    Failed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Generating => "generating",
            ReportStatus::Completed => "completed",
            ReportStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReportStatus::Generating)
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportStatus {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generating" => Ok(ReportStatus::Generating),
            "completed" => Ok(ReportStatus::Completed),
            "failed" => Ok(ReportStatus::Failed),
            other => Err(DbError::decode(
                "status",
                format!("unknown report status '{}'", other),
            )),
        }
    }
}

/// A source cited by a report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

/// A generated report, soft-deletable and owned by one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub report_id: Uuid,
    pub user_id: String,
    pub subject: String,
    pub country: String,
    /// Opaque structured payload produced by the generator
    pub content: serde_json::Value,
    pub citations: Vec<Citation>,
    pub status: ReportStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// `None` while the report is active
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Report {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

impl SoftDeletable for Report {
    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }
}

/// Fields supplied when creating a report; it always starts `generating`
#[derive(Debug, Clone, PartialEq)]
pub struct NewReport {
    pub user_id: String,
    pub subject: String,
    pub country: String,
    pub content: serde_json::Value,
    pub citations: Vec<Citation>,
    pub expires_at: DateTime<Utc>,
}
