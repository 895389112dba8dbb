//! PostgreSQL backend
//!
//! Concrete adapter using tokio-postgres behind a `deadpool-postgres` pool.
//! Plain queries borrow a connection for one statement; a transaction
//! holds one connection exclusively from BEGIN until COMMIT/ROLLBACK.

use crate::config::PoolSettings;
use crate::db::provider::{DatabaseAdapter, Transaction, TransactionState};
use crate::db::types::{BackendKind, CellValue, QueryResult, Row, SqlParam};
use crate::error::{ConfigError, ConfigResult, DbError, DbResult};
use async_trait::async_trait;
use deadpool_postgres::{ClientWrapper, Manager, ManagerConfig, Object, Pool, RecyclingMethod, Runtime};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_postgres::config::SslMode;
use tokio_postgres::types::{ToSql, Type};
use tracing::{debug, error, info, warn};

/// Lost-connection notices held until someone reads them; later ones are dropped
pub const LOST_CONNECTION_BACKLOG: usize = 16;

/// A single connection able to run statements
#[async_trait]
pub trait SqlConnection: Send + Sync {
    /// Run one parameterized statement
    async fn execute(&self, sql: &str, params: &[SqlParam]) -> DbResult<QueryResult>;

    /// Run a parameterless control statement (BEGIN, COMMIT, ...)
    async fn batch(&self, sql: &str) -> DbResult<()>;

    /// Close the connection instead of handing it back for reuse
    fn discard(self)
    where
        Self: Sized,
    {
        drop(self);
    }
}

#[async_trait]
impl SqlConnection for Object {
    async fn execute(&self, sql: &str, params: &[SqlParam]) -> DbResult<QueryResult> {
        let client: &ClientWrapper = self;
        let stmt = client.prepare_cached(sql).await?;
        let bound: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        if stmt.columns().is_empty() {
            let affected = client.execute(&stmt, &bound).await?;
            return Ok(QueryResult::new(Vec::new(), affected));
        }

        let columns: Arc<[String]> = stmt
            .columns()
            .iter()
            .map(|col| col.name().to_string())
            .collect();

        let pg_rows = client.query(&stmt, &bound).await?;
        let rows = pg_rows
            .iter()
            .map(|pg_row| {
                let values = (0..columns.len())
                    .map(|idx| extract_cell_value(pg_row, idx))
                    .collect();
                Row::new(Arc::clone(&columns), values)
            })
            .collect();

        Ok(QueryResult::from_rows(rows))
    }

    async fn batch(&self, sql: &str) -> DbResult<()> {
        let client: &ClientWrapper = self;
        client.batch_execute(sql).await?;
        Ok(())
    }

    fn discard(self) {
        debug!("discarding pooled connection");
        drop(Object::take(self));
    }
}

/// Sender side of the out-of-band lost-connection channel
#[derive(Clone)]
pub(crate) struct LostConnections(mpsc::Sender<String>);

impl LostConnections {
    pub(crate) fn channel() -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(LOST_CONNECTION_BACKLOG);
        (Self(tx), rx)
    }

    /// Pass `result` through, publishing a notice if the connection died.
    fn observe<T>(&self, result: DbResult<T>) -> DbResult<T> {
        if let Err(DbError::ConnectionFailed(message)) = &result {
            error!(error = %message, "database connection lost");
            // Full or unread: the notice is dropped, the caller still gets the error
            let _ = self.0.try_send(format!("Connection lost: {}", message));
        }
        result
    }
}

/// Point-in-time view of the connection pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub max_size: usize,
    /// Open connections waiting to be reused
    pub idle: usize,
    /// Connections that can be checked out right now
    pub available: usize,
}

/// Adapter over a directly-reachable SQL server
pub struct SqlBackendAdapter {
    pool: Pool,
    settings: PoolSettings,
    lost: LostConnections,
}

impl SqlBackendAdapter {
    /// Build a PostgreSQL adapter. Connections open lazily on first use.
    ///
    /// Returns the adapter and a bounded receiver that gets a notice
    /// whenever a pooled connection turns out to be lost (server restart,
    /// idle kill).
    pub fn connect(
        database_url: &str,
        settings: PoolSettings,
    ) -> ConfigResult<(Self, mpsc::Receiver<String>)> {
        let config = database_url
            .parse::<tokio_postgres::Config>()
            .map_err(|e| ConfigError::Invalid(format!("invalid connection string: {}", e)))?;
        let manager_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };
        let manager = match config.get_ssl_mode() {
            SslMode::Disable => Manager::from_config(config, tokio_postgres::NoTls, manager_config),
            _ => {
                let tls = tokio_postgres_rustls::MakeRustlsConnect::new(make_tls_config());
                Manager::from_config(config, tls, manager_config)
            }
        };

        let timeout = Some(settings.connect_timeout());
        let pool = Pool::builder(manager)
            .max_size(settings.max_connections.max(1))
            .wait_timeout(timeout)
            .create_timeout(timeout)
            .recycle_timeout(timeout)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| ConfigError::Invalid(format!("cannot build connection pool: {}", e)))?;
        info!(
            max_connections = settings.max_connections,
            idle_timeout_ms = settings.idle_timeout_ms,
            connect_timeout_ms = settings.connect_timeout_ms,
            "connection pool created"
        );

        let (lost, lost_rx) = LostConnections::channel();
        Ok((Self { pool, settings, lost }, lost_rx))
    }

    pub fn pool_status(&self) -> PoolStatus {
        let status = self.pool.status();
        let in_use = status.size.saturating_sub(status.available);
        PoolStatus {
            max_size: status.max_size,
            idle: status.available,
            available: status.max_size.saturating_sub(in_use),
        }
    }

    async fn checkout(&self) -> DbResult<Object> {
        let idle_timeout = self.settings.idle_timeout();
        let _ = self
            .pool
            .retain(|_, metrics| metrics.last_used() < idle_timeout);
        Ok(self.pool.get().await?)
    }
}

#[async_trait]
impl DatabaseAdapter for SqlBackendAdapter {
    async fn query(&self, sql: &str, params: &[SqlParam]) -> DbResult<QueryResult> {
        debug!(backend = %BackendKind::Sql, params = params.len(), "query");
        let conn = self.checkout().await?;
        self.lost.observe(conn.execute(sql, params).await)
    }

    async fn begin_transaction(&self) -> DbResult<Box<dyn Transaction>> {
        let conn = self.checkout().await?;
        let tx = SqlTransaction::begin(conn, self.lost.clone()).await?;
        Ok(Box::new(tx))
    }

    async fn close(&self) -> DbResult<()> {
        if !self.pool.is_closed() {
            self.pool.close();
            info!("connection pool closed");
        }
        Ok(())
    }

    fn backend(&self) -> BackendKind {
        BackendKind::Sql
    }
}

/// Transaction holding one pooled connection until it completes
pub struct SqlTransaction<C: SqlConnection> {
    conn: Option<C>,
    state: TransactionState,
    lost: LostConnections,
}

impl<C: SqlConnection> SqlTransaction<C> {
    async fn begin(conn: C, lost: LostConnections) -> DbResult<Self> {
        if let Err(e) = conn.batch("BEGIN").await {
            conn.discard();
            return lost.observe(Err(e));
        }
        debug!("transaction started");
        Ok(Self {
            conn: Some(conn),
            state: TransactionState::Active,
            lost,
        })
    }

    async fn finish(&mut self, statement: &str, outcome: TransactionState) -> DbResult<()> {
        let conn = self.conn.take().ok_or(DbError::TransactionCompleted)?;
        match conn.batch(statement).await {
            Ok(()) => {
                self.state = outcome;
                // Returned to the pool on drop, outside any transaction
                drop(conn);
                Ok(())
            }
            Err(e) => {
                self.state = TransactionState::Aborted;
                warn!(statement, error = %e, "transaction end failed; discarding connection");
                conn.discard();
                self.lost.observe(Err(e))
            }
        }
    }
}

#[async_trait]
impl<C: SqlConnection> Transaction for SqlTransaction<C> {
    async fn query(&mut self, sql: &str, params: &[SqlParam]) -> DbResult<QueryResult> {
        let conn = self.conn.as_ref().ok_or(DbError::TransactionCompleted)?;
        self.lost.observe(conn.execute(sql, params).await)
    }

    async fn commit(&mut self) -> DbResult<()> {
        self.finish("COMMIT", TransactionState::Committed).await
    }

    async fn rollback(&mut self) -> DbResult<()> {
        self.finish("ROLLBACK", TransactionState::RolledBack).await
    }

    fn state(&self) -> TransactionState {
        self.state
    }
}

impl<C: SqlConnection> Drop for SqlTransaction<C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            warn!("transaction dropped while active; discarding connection");
            conn.discard();
        }
    }
}

/// Build a rustls ClientConfig that trusts OS certificates (with Mozilla roots as fallback)
fn make_tls_config() -> rustls::ClientConfig {
    let mut root_store = rustls::RootCertStore::empty();

    let native_certs = rustls_native_certs::load_native_certs();
    let mut loaded = 0;
    for cert in native_certs.certs {
        if root_store.add(cert).is_ok() {
            loaded += 1;
        }
    }
    if loaded == 0 {
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }

    rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth()
}

/// Extract a cell value from a tokio_postgres Row based on the column type.
///
/// Falls back to the text representation when the typed read fails.
fn extract_cell_value(row: &tokio_postgres::Row, idx: usize) -> CellValue {
    match *row.columns()[idx].type_() {
        Type::INT2 => typed(row, idx, |v: i16| CellValue::Integer(i64::from(v))),
        Type::INT4 => typed(row, idx, |v: i32| CellValue::Integer(i64::from(v))),
        Type::INT8 => typed(row, idx, CellValue::Integer),
        Type::FLOAT4 => typed(row, idx, |v: f32| CellValue::Float(f64::from(v))),
        Type::FLOAT8 => typed(row, idx, CellValue::Float),
        Type::NUMERIC => typed(row, idx, |v: Decimal| {
            if v.fract().is_zero() {
                v.to_i64()
                    .map(CellValue::Integer)
                    .unwrap_or_else(|| CellValue::Text(v.to_string()))
            } else {
                v.to_f64()
                    .map(CellValue::Float)
                    .unwrap_or_else(|| CellValue::Text(v.to_string()))
            }
        }),
        Type::BOOL => typed(row, idx, CellValue::Boolean),
        Type::JSON | Type::JSONB => typed(row, idx, CellValue::Json),
        Type::UUID => typed(row, idx, CellValue::Uuid),
        Type::TIMESTAMPTZ => typed(row, idx, |v: chrono::DateTime<chrono::Utc>| {
            CellValue::Timestamp(v)
        }),
        Type::TIMESTAMP => typed(row, idx, |v: chrono::NaiveDateTime| {
            CellValue::Timestamp(v.and_utc())
        }),
        // Text types and fallback for unknown types
        _ => try_as_string(row, idx),
    }
}

fn typed<'a, T, F>(row: &'a tokio_postgres::Row, idx: usize, f: F) -> CellValue
where
    T: tokio_postgres::types::FromSql<'a>,
    F: FnOnce(T) -> CellValue,
{
    match row.try_get::<_, Option<T>>(idx) {
        Ok(Some(v)) => f(v),
        Ok(None) => CellValue::Null,
        Err(_) => try_as_string(row, idx),
    }
}

/// Try to extract a value as a string (fallback for type mismatches).
fn try_as_string(row: &tokio_postgres::Row, idx: usize) -> CellValue {
    match row.try_get::<_, Option<String>>(idx) {
        Ok(Some(v)) => CellValue::Text(v),
        Ok(None) => CellValue::Null,
        Err(_) => {
            let type_name = row
                .columns()
                .get(idx)
                .map_or("unknown", |c| c.type_().name());
            CellValue::Text(format!("<unable to decode: {}>", type_name))
        }
    }
}
