//! Database type definitions
//!
//! Core data structures shared by both backends: query results, rows,
//! cell values and positional parameters.

use crate::error::{DbError, DbResult};
use bytes::BytesMut;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use rust_decimal::Decimal;
use tokio_postgres::types::{IsNull, ToSql, Type, WrongType, to_sql_checked};
use uuid::Uuid;

/// Which backend an adapter talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Directly-reachable SQL server with pooled connections
    Sql,
    /// REST-fronted backend reachable only through remote procedures
    Rest,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Sql => "sql-backend",
            BackendKind::Rest => "rest-backend",
        }
    }

    /// Whether the backend can run client-side multi-statement transactions
    pub fn supports_transactions(&self) -> bool {
        matches!(self, BackendKind::Sql)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Query execution results
///
/// An empty but successful read is `rows = [], row_count = 0`.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult<T = Row> {
    /// Result rows, in the order the backend returned them
    pub rows: Vec<T>,
    /// Rows returned, or rows affected for statements without a result set
    pub row_count: u64,
}

impl<T> QueryResult<T> {
    pub fn new(rows: Vec<T>, row_count: u64) -> Self {
        Self { rows, row_count }
    }

    pub fn empty() -> Self {
        Self {
            rows: Vec::new(),
            row_count: 0,
        }
    }

    /// Result whose row count is the number of rows it carries
    pub fn from_rows(rows: Vec<T>) -> Self {
        let row_count = rows.len() as u64;
        Self { rows, row_count }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first(&self) -> Option<&T> {
        self.rows.first()
    }

    /// Map every row, stopping at the first mapping error.
    pub fn try_map<U, F>(self, f: F) -> DbResult<QueryResult<U>>
    where
        F: FnMut(T) -> DbResult<U>,
    {
        let rows = self.rows.into_iter().map(f).collect::<DbResult<Vec<U>>>()?;
        Ok(QueryResult {
            rows,
            row_count: self.row_count,
        })
    }
}

/// A single row of query results
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    /// Cell values in column order
    values: Vec<CellValue>,
}

/// A single column value in a row
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Boolean(bool),
    Json(serde_json::Value),
    /// Normalized to UTC
    Timestamp(DateTime<Utc>),
    Uuid(Uuid),
}

impl CellValue {
    fn kind(&self) -> &'static str {
        match self {
            CellValue::Null => "null",
            CellValue::Integer(_) => "integer",
            CellValue::Float(_) => "float",
            CellValue::Text(_) => "text",
            CellValue::Boolean(_) => "boolean",
            CellValue::Json(_) => "json",
            CellValue::Timestamp(_) => "timestamp",
            CellValue::Uuid(_) => "uuid",
        }
    }
}

impl From<serde_json::Value> for CellValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => CellValue::Null,
            Value::Bool(b) => CellValue::Boolean(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => CellValue::Integer(i),
                None => n
                    .as_f64()
                    .map(CellValue::Float)
                    .unwrap_or_else(|| CellValue::Text(n.to_string())),
            },
            Value::String(s) => CellValue::Text(s),
            other @ (Value::Array(_) | Value::Object(_)) => CellValue::Json(other),
        }
    }
}

impl Row {
    pub fn new(columns: Arc<[String]>, values: Vec<CellValue>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Build a row from a JSON object, one column per key.
    pub fn from_json_object(object: serde_json::Map<String, serde_json::Value>) -> Self {
        let (columns, values): (Vec<String>, Vec<CellValue>) = object
            .into_iter()
            .map(|(name, value)| (name, CellValue::from(value)))
            .unzip();
        Self {
            columns: columns.into(),
            values,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Raw cell by column name
    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|idx| &self.values[idx])
    }

    fn require(&self, column: &str) -> DbResult<&CellValue> {
        self.get(column)
            .ok_or_else(|| DbError::decode(column, "column missing from result"))
    }

    fn mismatch(column: &str, expected: &str, found: &CellValue) -> DbError {
        DbError::decode(
            column,
            format!("expected {}, found {}", expected, found.kind()),
        )
    }

    pub fn text(&self, column: &str) -> DbResult<String> {
        match self.require(column)? {
            CellValue::Text(s) => Ok(s.clone()),
            CellValue::Uuid(u) => Ok(u.to_string()),
            CellValue::Null => Err(DbError::decode(column, "unexpected NULL")),
            other => Err(Self::mismatch(column, "text", other)),
        }
    }

    pub fn i64(&self, column: &str) -> DbResult<i64> {
        match self.require(column)? {
            CellValue::Integer(i) => Ok(*i),
            // Aggregates over bigint come back as numeric text on some paths
            CellValue::Text(s) => s
                .parse::<i64>()
                .map_err(|_| DbError::decode(column, format!("'{}' is not an integer", s))),
            other => Err(Self::mismatch(column, "integer", other)),
        }
    }

    pub fn bool(&self, column: &str) -> DbResult<bool> {
        match self.require(column)? {
            CellValue::Boolean(b) => Ok(*b),
            other => Err(Self::mismatch(column, "boolean", other)),
        }
    }

    pub fn opt_uuid(&self, column: &str) -> DbResult<Option<Uuid>> {
        match self.require(column)? {
            CellValue::Null => Ok(None),
            CellValue::Uuid(u) => Ok(Some(*u)),
            CellValue::Text(s) => Uuid::parse_str(s)
                .map(Some)
                .map_err(|e| DbError::decode(column, e.to_string())),
            other => Err(Self::mismatch(column, "uuid", other)),
        }
    }

    pub fn uuid(&self, column: &str) -> DbResult<Uuid> {
        self.opt_uuid(column)?
            .ok_or_else(|| DbError::decode(column, "unexpected NULL"))
    }

    pub fn opt_timestamp(&self, column: &str) -> DbResult<Option<DateTime<Utc>>> {
        match self.require(column)? {
            CellValue::Null => Ok(None),
            CellValue::Timestamp(ts) => Ok(Some(*ts)),
            CellValue::Text(s) => parse_timestamp(s)
                .map(Some)
                .ok_or_else(|| DbError::decode(column, format!("'{}' is not a timestamp", s))),
            other => Err(Self::mismatch(column, "timestamp", other)),
        }
    }

    pub fn timestamp(&self, column: &str) -> DbResult<DateTime<Utc>> {
        self.opt_timestamp(column)?
            .ok_or_else(|| DbError::decode(column, "unexpected NULL"))
    }

    /// Decode a JSON column, whether stored as serialized text or as json/jsonb.
    pub fn json<T: DeserializeOwned>(&self, column: &str) -> DbResult<T> {
        let result = match self.require(column)? {
            CellValue::Text(s) => serde_json::from_str(s),
            CellValue::Json(v) => serde_json::from_value(v.clone()),
            CellValue::Null => serde_json::from_value(serde_json::Value::Null),
            other => return Err(Self::mismatch(column, "json", other)),
        };
        result.map_err(|e| DbError::decode(column, e.to_string()))
    }
}

/// Parse the timestamp text forms both backends produce.
///
/// JSON output uses RFC 3339; `::text` casts produce `2024-01-01 10:00:00+00`.
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%#z")
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

/// A positional statement parameter
///
/// Parameters are always bound, never interpolated into statement text.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlParam {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
    Json(serde_json::Value),
}

macro_rules! sql_param_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for SqlParam {
                fn from(v: $ty) -> Self {
                    SqlParam::$variant(v.into())
                }
            }
        )*
    };
}

sql_param_from! {
    bool => Bool,
    i64 => Int,
    u32 => Int,
    &str => Text,
    String => Text,
    Uuid => Uuid,
    DateTime<Utc> => Timestamp,
    serde_json::Value => Json,
}

impl<T: Into<SqlParam>> From<Option<T>> for SqlParam {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlParam::Null, Into::into)
    }
}

type BoxError = Box<dyn std::error::Error + Sync + Send>;

impl SqlParam {
    /// Text form used when the placeholder is a text column
    fn to_text(&self) -> Option<String> {
        match self {
            SqlParam::Null => None,
            SqlParam::Bool(v) => Some(v.to_string()),
            SqlParam::Int(v) => Some(v.to_string()),
            SqlParam::Float(v) => Some(v.to_string()),
            SqlParam::Text(v) => Some(v.clone()),
            SqlParam::Uuid(v) => Some(v.to_string()),
            SqlParam::Timestamp(v) => Some(v.to_rfc3339()),
            SqlParam::Json(v) => Some(v.to_string()),
        }
    }
}

impl ToSql for SqlParam {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match (self, ty) {
            (SqlParam::Null, _) => Ok(IsNull::Yes),
            (SqlParam::Bool(v), &Type::BOOL) => v.to_sql(ty, out),
            (SqlParam::Int(v), &Type::INT2) => i16::try_from(*v)?.to_sql(ty, out),
            (SqlParam::Int(v), &Type::INT4) => i32::try_from(*v)?.to_sql(ty, out),
            (SqlParam::Int(v), &Type::INT8) => v.to_sql(ty, out),
            (SqlParam::Int(v), &Type::FLOAT4) => (*v as f32).to_sql(ty, out),
            (SqlParam::Int(v), &Type::FLOAT8) => (*v as f64).to_sql(ty, out),
            (SqlParam::Int(v), &Type::NUMERIC) => Decimal::from(*v).to_sql(ty, out),
            (SqlParam::Float(v), &Type::FLOAT4) => (*v as f32).to_sql(ty, out),
            (SqlParam::Float(v), &Type::FLOAT8) => v.to_sql(ty, out),
            (SqlParam::Float(v), &Type::NUMERIC) => Decimal::try_from(*v)?.to_sql(ty, out),
            (SqlParam::Text(v), &Type::JSON | &Type::JSONB) => {
                serde_json::from_str::<serde_json::Value>(v)?.to_sql(ty, out)
            }
            (SqlParam::Text(v), &Type::UUID) => Uuid::parse_str(v)?.to_sql(ty, out),
            (SqlParam::Uuid(v), &Type::UUID) => v.to_sql(ty, out),
            (SqlParam::Timestamp(v), &Type::TIMESTAMPTZ) => v.to_sql(ty, out),
            (SqlParam::Timestamp(v), &Type::TIMESTAMP) => v.naive_utc().to_sql(ty, out),
            (SqlParam::Json(v), &Type::JSON | &Type::JSONB) => v.to_sql(ty, out),
            (other, _) if <String as ToSql>::accepts(ty) => match other.to_text() {
                Some(text) => text.to_sql(ty, out),
                None => Ok(IsNull::Yes),
            },
            _ => Err(Box::new(WrongType::new::<SqlParam>(ty.clone()))),
        }
    }

    // NULL binds to any placeholder, so the variant is checked in `to_sql`
    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}
