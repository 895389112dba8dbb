//! Soft-delete policy shared by every deletable entity
//!
//! # Invariants
//! - A row is active iff its `deleted_at` is NULL.
//! - Every list/count/find over a soft-deletable table composes with exactly
//!   one [`Visibility`]. [`SoftDeleteRepository::select_sql`] takes one as a
//!   required argument, so a scoped read cannot leave it out.
//! - The only read that ignores visibility is
//!   [`SoftDeleteRepository::find_by_id_including_deleted`], used by audit
//!   and restore flows.
//! - Mutations match on id *and* owner. Zero affected rows means "absent,
//!   not yours, or already in that state"; the three are indistinguishable.

use crate::db::{Row, SqlParam};
use crate::error::DbResult;
use crate::model::SoftDeletable;
use crate::repo::base::BaseRepository;
use async_trait::async_trait;
use uuid::Uuid;

/// Which side of the soft-delete line a query looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Active,
    Deleted,
}

impl Visibility {
    /// The filter fragment for this visibility
    pub fn clause(self) -> &'static str {
        match self {
            Visibility::Active => "deleted_at IS NULL",
            Visibility::Deleted => "deleted_at IS NOT NULL",
        }
    }
}

/// `deleted_at IS NULL`
pub fn where_active() -> &'static str {
    Visibility::Active.clause()
}

/// `deleted_at IS NOT NULL`
pub fn where_deleted() -> &'static str {
    Visibility::Deleted.clause()
}

/// Soft-delete operations, parameterized per entity by table and id column
#[async_trait]
pub trait SoftDeleteRepository: Send + Sync {
    type Entity: SoftDeletable + Send;

    const TABLE: &'static str;
    const ID_COLUMN: &'static str;
    /// Select list used for every entity read
    const COLUMNS: &'static str;
    const OWNER_COLUMN: &'static str = "user_id";

    fn base(&self) -> &BaseRepository;

    /// Map one returned row to the entity
    fn map_row(row: &Row) -> DbResult<Self::Entity>;

    /// `SELECT <columns> FROM <table> WHERE <visibility> AND <predicate>`
    fn select_sql(visibility: Visibility, predicate: &str) -> String {
        format!(
            "SELECT {} FROM {} WHERE {} AND {}",
            Self::COLUMNS,
            Self::TABLE,
            visibility.clause(),
            predicate
        )
    }

    fn is_deleted(&self, entity: &Self::Entity) -> bool {
        entity.is_deleted()
    }

    /// Stamp `deleted_at` on an active row owned by `user_id`.
    ///
    /// Returns the number of rows flipped (0 or 1); never errors for a row
    /// that is missing, foreign or already deleted.
    async fn soft_delete(&self, id: Uuid, user_id: &str) -> DbResult<u64> {
        let sql = flip_sql::<Self>("NOW()", Visibility::Active);
        owned_update(self.base(), &sql, id, user_id).await
    }

    /// Clear `deleted_at` on a deleted row owned by `user_id`.
    ///
    /// Other columns, `expires_at` included, are left untouched.
    async fn restore(&self, id: Uuid, user_id: &str) -> DbResult<u64> {
        let sql = flip_sql::<Self>("NULL", Visibility::Deleted);
        owned_update(self.base(), &sql, id, user_id).await
    }

    /// Owner-scoped lookup that also sees soft-deleted rows
    async fn find_by_id_including_deleted(
        &self,
        id: Uuid,
        user_id: &str,
    ) -> DbResult<Option<Self::Entity>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = $1 AND {} = $2",
            Self::COLUMNS,
            Self::TABLE,
            Self::ID_COLUMN,
            Self::OWNER_COLUMN,
        );
        let result = self
            .base()
            .query(&sql, &[SqlParam::from(id), SqlParam::from(user_id)])
            .await?;
        result.first().map(Self::map_row).transpose()
    }
}

/// `UPDATE` that sets `deleted_at` on an owned row currently in `from`
fn flip_sql<R: SoftDeleteRepository + ?Sized>(deleted_at: &str, from: Visibility) -> String {
    format!(
        "UPDATE {table} SET deleted_at = {deleted_at} \
         WHERE {id} = $1 AND {owner} = $2 AND {from} \
         RETURNING {id}",
        table = R::TABLE,
        id = R::ID_COLUMN,
        owner = R::OWNER_COLUMN,
        from = from.clause(),
    )
}

async fn owned_update(base: &BaseRepository, sql: &str, id: Uuid, user_id: &str) -> DbResult<u64> {
    let result = base
        .query(sql, &[SqlParam::from(id), SqlParam::from(user_id)])
        .await?;
    Ok(result.row_count)
}
