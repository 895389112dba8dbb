//! Payment repository
//!
//! Payments are never soft-deleted. Status only ever moves out of
//! `pending`; a second status update is a no-op that reports 0 rows.

use crate::db::{Row, SqlParam, Transaction};
use crate::error::{DbError, DbResult};
use crate::model::{NewPayment, Payment, PaymentStatus};
use crate::repo::base::BaseRepository;
use tracing::{info, warn};
use uuid::Uuid;

const PAYMENT_COLUMNS: &str =
    "payment_id, user_id, report_id, amount, currency, status, stripe_payment_intent_id, created_at";

const UPDATE_STATUS_SQL: &str = "UPDATE payments SET status = $1 \
     WHERE payment_id = $2 AND status = $3 RETURNING payment_id";

const LINK_REPORT_SQL: &str =
    "UPDATE payments SET report_id = $1 WHERE payment_id = $2 RETURNING payment_id";

/// Repository for payments
#[derive(Clone)]
pub struct PaymentRepository {
    base: BaseRepository,
}

impl PaymentRepository {
    pub fn new(base: BaseRepository) -> Self {
        Self { base }
    }

    fn map_row(row: &Row) -> DbResult<Payment> {
        Ok(Payment {
            payment_id: row.uuid("payment_id")?,
            user_id: row.text("user_id")?,
            report_id: row.opt_uuid("report_id")?,
            amount: row.i64("amount")?,
            currency: row.text("currency")?,
            status: row.text("status")?.parse()?,
            stripe_payment_intent_id: row.text("stripe_payment_intent_id")?,
            created_at: row.timestamp("created_at")?,
        })
    }

    async fn fetch_one(&self, sql: &str, params: &[SqlParam]) -> DbResult<Option<Payment>> {
        let result = self.base.query(sql, params).await?;
        result.first().map(Self::map_row).transpose()
    }

    /// Record a new `pending` payment.
    ///
    /// Rejects a negative amount or an empty intent id before any I/O.
    pub async fn create(&self, payment: &NewPayment) -> DbResult<Payment> {
        payment.validate()?;
        let sql = format!(
            "INSERT INTO payments \
             (payment_id, user_id, report_id, amount, currency, status, \
              stripe_payment_intent_id, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, NOW()) \
             RETURNING {}",
            PAYMENT_COLUMNS
        );
        let params = [
            SqlParam::from(Uuid::new_v4()),
            SqlParam::from(payment.user_id.as_str()),
            SqlParam::from(payment.report_id),
            SqlParam::from(payment.amount),
            SqlParam::from(payment.currency.to_ascii_uppercase()),
            SqlParam::from(PaymentStatus::Pending.as_str()),
            SqlParam::from(payment.stripe_payment_intent_id.as_str()),
        ];
        self.fetch_one(&sql, &params)
            .await?
            .ok_or_else(|| DbError::QueryFailed("insert returned no row".into()))
    }

    /// Payment owned by `user_id`
    pub async fn find_by_id(&self, payment_id: Uuid, user_id: &str) -> DbResult<Option<Payment>> {
        let sql = format!(
            "SELECT {} FROM payments WHERE payment_id = $1 AND user_id = $2",
            PAYMENT_COLUMNS
        );
        self.fetch_one(&sql, &[SqlParam::from(payment_id), SqlParam::from(user_id)])
            .await
    }

    /// Lookup by provider intent id, as delivered by provider webhooks
    pub async fn find_by_payment_intent(&self, intent_id: &str) -> DbResult<Option<Payment>> {
        let sql = format!(
            "SELECT {} FROM payments WHERE stripe_payment_intent_id = $1",
            PAYMENT_COLUMNS
        );
        self.fetch_one(&sql, &[SqlParam::from(intent_id)]).await
    }

    /// Payments owned by `user_id`, newest first
    pub async fn list_by_user(&self, user_id: &str) -> DbResult<Vec<Payment>> {
        let sql = format!(
            "SELECT {} FROM payments WHERE user_id = $1 ORDER BY created_at DESC",
            PAYMENT_COLUMNS
        );
        let result = self.base.query(&sql, &[SqlParam::from(user_id)]).await?;
        Ok(result.try_map(|row| Self::map_row(&row))?.rows)
    }

    /// Move a `pending` payment to `status`; returns rows affected.
    pub async fn update_status(&self, payment_id: Uuid, status: PaymentStatus) -> DbResult<u64> {
        if !status.is_terminal() {
            return Err(DbError::InvalidInput(format!(
                "payment status can only move to a final value, not '{}'",
                status
            )));
        }
        let params = status_params(payment_id, status);
        let updated = self.base.query(UPDATE_STATUS_SQL, &params).await?.row_count;
        if updated > 0 {
            info!(%payment_id, %status, "payment status updated");
        }
        Ok(updated)
    }

    /// Point a payment at the report it paid for. Idempotent.
    pub async fn link_to_report(&self, payment_id: Uuid, report_id: Uuid) -> DbResult<u64> {
        let result = self
            .base
            .query(
                LINK_REPORT_SQL,
                &[SqlParam::from(report_id), SqlParam::from(payment_id)],
            )
            .await?;
        Ok(result.row_count)
    }

    pub async fn has_successful_payment(&self, user_id: &str) -> DbResult<bool> {
        let sql = "SELECT EXISTS (\
                   SELECT 1 FROM payments WHERE user_id = $1 AND status = $2\
                   ) AS has_payment";
        let result = self
            .base
            .query(
                sql,
                &[
                    SqlParam::from(user_id),
                    SqlParam::from(PaymentStatus::Succeeded.as_str()),
                ],
            )
            .await?;
        match result.first() {
            Some(row) => row.bool("has_payment"),
            None => Ok(false),
        }
    }

    /// Sum of succeeded payment amounts, in minor units. 0 when there are none.
    pub async fn get_total_revenue(&self) -> DbResult<i64> {
        let sql = "SELECT COALESCE(SUM(amount), 0)::bigint AS total \
                   FROM payments WHERE status = $1";
        let result = self
            .base
            .query(sql, &[SqlParam::from(PaymentStatus::Succeeded.as_str())])
            .await?;
        match result.first() {
            Some(row) => row.i64("total"),
            None => Ok(0),
        }
    }

    /// Mark a pending payment succeeded and link it to its report, atomically.
    ///
    /// Needs a transactional backend; on the REST backend this fails with
    /// `Unsupported` before touching the network. Returns 0 without writing
    /// anything when the payment is not pending.
    pub async fn complete_and_link(&self, payment_id: Uuid, report_id: Uuid) -> DbResult<u64> {
        let mut tx = self.base.begin_transaction().await?;
        let outcome = complete_and_link_in(tx.as_mut(), payment_id, report_id).await;
        match outcome {
            Ok(0) => {
                tx.rollback().await?;
                Ok(0)
            }
            Ok(updated) => {
                tx.commit().await?;
                info!(%payment_id, %report_id, "payment completed and linked");
                Ok(updated)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(%payment_id, error = %rollback_err, "rollback after failed completion failed");
                }
                Err(e)
            }
        }
    }
}

fn status_params(payment_id: Uuid, status: PaymentStatus) -> [SqlParam; 3] {
    [
        SqlParam::from(status.as_str()),
        SqlParam::from(payment_id),
        SqlParam::from(PaymentStatus::Pending.as_str()),
    ]
}

async fn complete_and_link_in(
    tx: &mut dyn Transaction,
    payment_id: Uuid,
    report_id: Uuid,
) -> DbResult<u64> {
    let params = status_params(payment_id, PaymentStatus::Succeeded);
    let updated = tx.query(UPDATE_STATUS_SQL, &params).await?.row_count;
    if updated == 0 {
        return Ok(0);
    }
    tx.query(
        LINK_REPORT_SQL,
        &[SqlParam::from(report_id), SqlParam::from(payment_id)],
    )
    .await?;
    Ok(updated)
}
