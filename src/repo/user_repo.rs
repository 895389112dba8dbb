//! User repository

use crate::db::{Row, SqlParam};
use crate::error::{DbError, DbResult};
use crate::model::User;
use crate::repo::base::BaseRepository;
use uuid::Uuid;

const USER_COLUMNS: &str = "user_id, external_id, email, created_at";

/// Repository for application users
#[derive(Clone)]
pub struct UserRepository {
    base: BaseRepository,
}

impl UserRepository {
    pub fn new(base: BaseRepository) -> Self {
        Self { base }
    }

    fn map_row(row: &Row) -> DbResult<User> {
        Ok(User {
            user_id: row.text("user_id")?,
            external_id: row.text("external_id")?,
            email: row.text("email")?,
            created_at: row.timestamp("created_at")?,
        })
    }

    async fn find_where(&self, column: &str, value: &str) -> DbResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE {} = $1", USER_COLUMNS, column);
        let result = self.base.query(&sql, &[SqlParam::from(value)]).await?;
        result.first().map(Self::map_row).transpose()
    }

    pub async fn find_by_id(&self, user_id: &str) -> DbResult<Option<User>> {
        self.find_where("user_id", user_id).await
    }

    /// Lookup by identity-provider id
    pub async fn find_by_external_id(&self, external_id: &str) -> DbResult<Option<User>> {
        self.find_where("external_id", external_id).await
    }

    pub async fn find_by_email(&self, email: &str) -> DbResult<Option<User>> {
        self.find_where("email", email).await
    }

    /// Insert the user, or refresh the email of the one with this external id.
    ///
    /// The stored `user_id` of an existing user never changes.
    pub async fn upsert(&self, external_id: &str, email: &str) -> DbResult<User> {
        if external_id.trim().is_empty() {
            return Err(DbError::InvalidInput("external id must not be empty".into()));
        }
        let sql = format!(
            "INSERT INTO users (user_id, external_id, email, created_at) \
             VALUES ($1, $2, $3, NOW()) \
             ON CONFLICT (external_id) DO UPDATE SET email = EXCLUDED.email \
             RETURNING {}",
            USER_COLUMNS
        );
        let params = [
            SqlParam::from(Uuid::new_v4().to_string()),
            SqlParam::from(external_id),
            SqlParam::from(email),
        ];
        let result = self.base.query(&sql, &params).await?;
        result
            .first()
            .map(Self::map_row)
            .transpose()?
            .ok_or_else(|| DbError::QueryFailed("upsert returned no row".into()))
    }
}
