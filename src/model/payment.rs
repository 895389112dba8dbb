//! Payment entity

use crate::error::DbError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Payment provider status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
    Canceled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Succeeded => "succeeded",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Canceled => "canceled",
        }
    }

    /// Every status except `pending` is final
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "succeeded" => Ok(PaymentStatus::Succeeded),
            "failed" => Ok(PaymentStatus::Failed),
            "canceled" => Ok(PaymentStatus::Canceled),
            other => Err(DbError::decode(
                "status",
                format!("unknown payment status '{}'", other),
            )),
        }
    }
}

/// A payment; never soft-deleted and never removed by this layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub payment_id: Uuid,
    pub user_id: String,
    /// Set once the paid-for report exists
    pub report_id: Option<Uuid>,
    /// Minor currency units
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub stripe_payment_intent_id: String,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied when creating a payment; it always starts `pending`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayment {
    pub user_id: String,
    pub report_id: Option<Uuid>,
    pub amount: i64,
    pub currency: String,
    pub stripe_payment_intent_id: String,
}

impl NewPayment {
    pub(crate) fn validate(&self) -> Result<(), DbError> {
        if self.amount < 0 {
            return Err(DbError::InvalidInput(format!(
                "payment amount must not be negative, got {}",
                self.amount
            )));
        }
        if self.stripe_payment_intent_id.trim().is_empty() {
            return Err(DbError::InvalidInput(
                "payment intent id must not be empty".into(),
            ));
        }
        Ok(())
    }
}
