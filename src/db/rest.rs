//! REST-fronted backend
//!
//! The managed backend exposes no raw SQL endpoint. Every statement is sent
//! to one pre-registered remote procedure, [`QUERY_PROCEDURE`], which takes
//! the statement text and the positional parameters and returns the result
//! set as JSON. There is no client-observable atomicity across calls, so
//! transactions are refused outright.
//!
//! The server-side procedure is expected to have the signature
//! `execute_sql(query text, params jsonb) returns jsonb`.

use crate::config::RestSettings;
use crate::db::provider::{DatabaseAdapter, Transaction};
use crate::db::types::{BackendKind, CellValue, QueryResult, Row, SqlParam};
use crate::error::{ConfigError, ConfigResult, DbError, DbResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// The single remote procedure every query is dispatched through
pub const QUERY_PROCEDURE: &str = "execute_sql";

/// Session variable the backend's row-level policies read the caller from
const AUTH_CONTEXT_SETTING: &str = "request.jwt.claim.sub";

#[derive(Serialize)]
struct ProcedureCall<'a> {
    query: &'a str,
    params: &'a [SqlParam],
}

/// Adapter over the REST-fronted backend
pub struct RestBackendAdapter {
    client: Client,
    base_url: String,
    api_key: String,
    elevated: bool,
}

impl RestBackendAdapter {
    /// Build the adapter from settings.
    ///
    /// Requires a base URL and an anonymous key. If an elevated service key
    /// is also configured it is used instead, which bypasses row-level
    /// policies meant for end-user sessions.
    pub fn new(settings: &RestSettings) -> ConfigResult<Self> {
        let base_url = settings
            .base_url
            .as_deref()
            .ok_or(ConfigError::Missing("REST_BACKEND_URL"))?;
        let anon_key = settings
            .anon_key
            .as_deref()
            .ok_or(ConfigError::Missing("REST_BACKEND_ANON_KEY"))?;

        let (api_key, elevated) = match settings.service_key.as_deref() {
            Some(service_key) => (service_key, true),
            None => (anon_key, false),
        };
        if elevated {
            warn!("REST backend using elevated service key; row-level policies are bypassed");
        }

        let client = Client::builder()
            .build()
            .map_err(|e| ConfigError::Invalid(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            elevated,
        })
    }

    /// Whether the elevated service key was chosen over the anonymous key
    pub fn uses_elevated_key(&self) -> bool {
        self.elevated
    }

    fn procedure_url(&self, procedure: &str) -> String {
        format!("{}/rest/v1/rpc/{}", self.base_url, procedure)
    }

    /// Scope subsequent queries to `user_id` for server-side row policies.
    ///
    /// Best effort: a failure is logged, not returned, and the call is not
    /// transactional with anything that follows it.
    pub async fn set_auth_context(&self, user_id: &str) {
        let sql = "SELECT set_config($1, $2, false)";
        let params = [
            SqlParam::from(AUTH_CONTEXT_SETTING),
            SqlParam::from(user_id),
        ];
        if let Err(e) = self.query(sql, &params).await {
            warn!(error = %e, "failed to set auth context");
        }
    }
}

#[async_trait]
impl DatabaseAdapter for RestBackendAdapter {
    async fn query(&self, sql: &str, params: &[SqlParam]) -> DbResult<QueryResult> {
        debug!(backend = %BackendKind::Rest, params = params.len(), procedure = QUERY_PROCEDURE, "query");

        let response = self
            .client
            .post(self.procedure_url(QUERY_PROCEDURE))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .json(&ProcedureCall { query: sql, params })
            .send()
            .await
            .map_err(|e| DbError::ConnectionFailed(format!("REST request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DbError::QueryFailed(format!(
                "{} returned {}: {}",
                QUERY_PROCEDURE, status, body
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| DbError::QueryFailed(format!("invalid procedure response: {}", e)))?;

        Ok(rows_from_json(payload))
    }

    async fn begin_transaction(&self) -> DbResult<Box<dyn Transaction>> {
        Err(DbError::Unsupported(
            "transactions are not available on the REST backend; \
             use a single server-side procedure instead"
                .into(),
        ))
    }

    async fn close(&self) -> DbResult<()> {
        Ok(())
    }

    fn backend(&self) -> BackendKind {
        BackendKind::Rest
    }
}

/// Map the procedure's JSON result into rows.
///
/// An array yields one row per element, a bare object one row, `null`
/// nothing. Scalars become a single `value` column.
pub(crate) fn rows_from_json(payload: Value) -> QueryResult {
    let rows = match payload {
        Value::Null => Vec::new(),
        Value::Array(items) => items.into_iter().map(row_from_value).collect(),
        other => vec![row_from_value(other)],
    };
    QueryResult::from_rows(rows)
}

fn row_from_value(value: Value) -> Row {
    match value {
        Value::Object(map) => Row::from_json_object(map),
        scalar => {
            let columns: Arc<[String]> = Arc::from(vec!["value".to_string()]);
            Row::new(columns, vec![CellValue::from(scalar)])
        }
    }
}
