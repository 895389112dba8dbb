//! User entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An application user, created from the identity provider's record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    /// Id assigned by the external identity provider
    pub external_id: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}
