//! Report repository
//!
//! Every per-user read and write is scoped by `user_id` and composes with
//! exactly one visibility filter. The expiry sweep and the system-wide
//! counts are the only unscoped operations; they are meant for schedulers
//! and reporting jobs, not for end-user request paths.

use crate::db::{Row, SqlParam};
use crate::error::{DbError, DbResult};
use crate::model::{Citation, NewReport, Report, ReportStatus};
use crate::repo::base::BaseRepository;
use crate::repo::soft_delete::{SoftDeleteRepository, Visibility, where_active};
use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

const REPORT_COLUMNS: &str = "report_id, user_id, subject, country, content, citations, \
     status, created_at, expires_at, updated_at, deleted_at";

/// Repository for generated reports
#[derive(Clone)]
pub struct ReportRepository {
    base: BaseRepository,
}

#[async_trait]
impl SoftDeleteRepository for ReportRepository {
    type Entity = Report;

    const TABLE: &'static str = "reports";
    const ID_COLUMN: &'static str = "report_id";
    const COLUMNS: &'static str = REPORT_COLUMNS;

    fn base(&self) -> &BaseRepository {
        &self.base
    }

    fn map_row(row: &Row) -> DbResult<Report> {
        Ok(Report {
            report_id: row.uuid("report_id")?,
            user_id: row.text("user_id")?,
            subject: row.text("subject")?,
            country: row.text("country")?,
            content: row.json("content")?,
            citations: row
                .json::<Option<Vec<Citation>>>("citations")?
                .unwrap_or_default(),
            status: row.text("status")?.parse()?,
            created_at: row.timestamp("created_at")?,
            expires_at: row.timestamp("expires_at")?,
            updated_at: row.timestamp("updated_at")?,
            deleted_at: row.opt_timestamp("deleted_at")?,
        })
    }
}

impl ReportRepository {
    pub fn new(base: BaseRepository) -> Self {
        Self { base }
    }

    async fn fetch(&self, sql: &str, params: &[SqlParam]) -> DbResult<Vec<Report>> {
        let result = self.base.query(sql, params).await?;
        Ok(result.try_map(|row| Self::map_row(&row))?.rows)
    }

    async fn fetch_one(&self, sql: &str, params: &[SqlParam]) -> DbResult<Option<Report>> {
        let result = self.base.query(sql, params).await?;
        result.first().map(Self::map_row).transpose()
    }

    async fn count(
        &self,
        visibility: Visibility,
        predicate: &str,
        params: &[SqlParam],
    ) -> DbResult<i64> {
        let sql = format!(
            "SELECT COUNT(*) AS count FROM reports WHERE {} AND {}",
            visibility.clause(),
            predicate
        );
        let result = self.base.query(&sql, params).await?;
        match result.first() {
            Some(row) => row.i64("count"),
            None => Ok(0),
        }
    }

    /// Insert a new report in `generating` status.
    pub async fn create(&self, report: &NewReport) -> DbResult<Report> {
        let content = serialize_json("content", &report.content)?;
        let citations = serialize_json("citations", &report.citations)?;
        let sql = format!(
            "INSERT INTO reports \
             (report_id, user_id, subject, country, content, citations, status, \
              expires_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW(), NOW()) \
             RETURNING {}",
            REPORT_COLUMNS
        );
        let params = [
            SqlParam::from(Uuid::new_v4()),
            SqlParam::from(report.user_id.as_str()),
            SqlParam::from(report.subject.as_str()),
            SqlParam::from(report.country.as_str()),
            SqlParam::Text(content),
            SqlParam::Text(citations),
            SqlParam::from(ReportStatus::Generating.as_str()),
            SqlParam::from(report.expires_at),
        ];
        self.fetch_one(&sql, &params)
            .await?
            .ok_or_else(|| DbError::QueryFailed("insert returned no row".into()))
    }

    /// Active report owned by `user_id`
    pub async fn find_by_id(&self, report_id: Uuid, user_id: &str) -> DbResult<Option<Report>> {
        let sql = Self::select_sql(Visibility::Active, "report_id = $1 AND user_id = $2");
        self.fetch_one(&sql, &[SqlParam::from(report_id), SqlParam::from(user_id)])
            .await
    }

    /// Active reports owned by `user_id`, newest first
    pub async fn list_by_user(&self, user_id: &str) -> DbResult<Vec<Report>> {
        let sql = Self::select_sql(Visibility::Active, "user_id = $1 ORDER BY created_at DESC");
        self.fetch(&sql, &[SqlParam::from(user_id)]).await
    }

    /// Soft-deleted reports owned by `user_id`, most recently deleted first
    pub async fn list_deleted_by_user(&self, user_id: &str) -> DbResult<Vec<Report>> {
        let sql = Self::select_sql(Visibility::Deleted, "user_id = $1 ORDER BY deleted_at DESC");
        self.fetch(&sql, &[SqlParam::from(user_id)]).await
    }

    pub async fn count_by_user(&self, user_id: &str) -> DbResult<i64> {
        self.count(Visibility::Active, "user_id = $1", &[SqlParam::from(user_id)])
            .await
    }

    /// Move a `generating` report to its final status.
    ///
    /// Returns rows affected: 0 when the report is missing, foreign,
    /// deleted or already finished.
    ///
    /// # Errors
    /// `DbError::InvalidInput` for a non-terminal target, before any I/O.
    pub async fn update_status(
        &self,
        report_id: Uuid,
        user_id: &str,
        status: ReportStatus,
    ) -> DbResult<u64> {
        if !status.is_terminal() {
            return Err(DbError::InvalidInput(format!(
                "report status can only move to a final value, not '{}'",
                status.as_str()
            )));
        }
        let sql = format!(
            "UPDATE reports SET status = $1, updated_at = NOW() \
             WHERE report_id = $2 AND user_id = $3 AND status = $4 AND {} \
             RETURNING report_id",
            where_active()
        );
        let params = [
            SqlParam::from(status.as_str()),
            SqlParam::from(report_id),
            SqlParam::from(user_id),
            SqlParam::from(ReportStatus::Generating.as_str()),
        ];
        Ok(self.base.query(&sql, &params).await?.row_count)
    }

    /// Rewrite content and citations of an active report.
    pub async fn update_content(
        &self,
        report_id: Uuid,
        user_id: &str,
        content: &serde_json::Value,
        citations: &[Citation],
    ) -> DbResult<u64> {
        let sql = format!(
            "UPDATE reports SET content = $1, citations = $2, updated_at = NOW() \
             WHERE report_id = $3 AND user_id = $4 AND {} \
             RETURNING report_id",
            where_active()
        );
        let params = [
            SqlParam::Text(serialize_json("content", content)?),
            SqlParam::Text(serialize_json("citations", citations)?),
            SqlParam::from(report_id),
            SqlParam::from(user_id),
        ];
        Ok(self.base.query(&sql, &params).await?.row_count)
    }

    /// Soft-delete every active report past its expiry, across all users.
    ///
    /// Returns the number of reports flipped by this call.
    pub async fn soft_delete_expired(&self) -> DbResult<u64> {
        let sql = format!(
            "UPDATE reports SET deleted_at = NOW() \
             WHERE expires_at < NOW() AND {} \
             RETURNING report_id",
            where_active()
        );
        let swept = self.base.query(&sql, &[]).await?.row_count;
        info!(swept, "expired reports soft-deleted");
        Ok(swept)
    }

    /// Active reports expiring within the next `days` days, soonest first
    pub async fn list_expiring_soon(&self, days: u32) -> DbResult<Vec<Report>> {
        let sql = Self::select_sql(
            Visibility::Active,
            "expires_at > NOW() AND expires_at <= NOW() + make_interval(days => $1) \
             ORDER BY expires_at ASC",
        );
        self.fetch(&sql, &[SqlParam::from(days)]).await
    }

    /// Active reports across all users
    pub async fn count_all(&self) -> DbResult<i64> {
        self.count(Visibility::Active, "TRUE", &[]).await
    }

    /// Soft-deleted reports across all users
    pub async fn count_deleted(&self) -> DbResult<i64> {
        self.count(Visibility::Deleted, "TRUE", &[]).await
    }
}

fn serialize_json<T: serde::Serialize + ?Sized>(column: &str, value: &T) -> DbResult<String> {
    serde_json::to_string(value)
        .map_err(|e| DbError::InvalidInput(format!("cannot serialize {}: {}", column, e)))
}
