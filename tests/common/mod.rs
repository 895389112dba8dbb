//! Common test utilities and helpers
//!
//! A scripted in-memory adapter that records every statement and replays
//! queued results, so repository behaviour can be checked without a server.

#![allow(dead_code)]

use async_trait::async_trait;
use dualbase::db::{
    BackendKind, CellValue, DatabaseAdapter, QueryResult, Row, SqlParam, Transaction,
    TransactionState,
};
use dualbase::error::{DbError, DbResult};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// One statement seen by the mock
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub sql: String,
    pub params: Vec<SqlParam>,
    pub in_transaction: bool,
}

#[derive(Default)]
struct Script {
    calls: Mutex<Vec<RecordedCall>>,
    responses: Mutex<VecDeque<DbResult<QueryResult>>>,
    closes: AtomicUsize,
}

impl Script {
    fn record(&self, sql: &str, params: &[SqlParam], in_transaction: bool) -> DbResult<QueryResult> {
        self.calls.lock().unwrap().push(RecordedCall {
            sql: sql.to_string(),
            params: params.to_vec(),
            in_transaction,
        });
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(QueryResult::empty()))
    }
}

/// Adapter double; cheap to clone, clones share one script
#[derive(Clone)]
pub struct MockAdapter {
    kind: BackendKind,
    script: Arc<Script>,
}

impl MockAdapter {
    pub fn sql() -> Self {
        Self::new(BackendKind::Sql)
    }

    pub fn rest() -> Self {
        Self::new(BackendKind::Rest)
    }

    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            script: Arc::new(Script::default()),
        }
    }

    pub fn shared(&self) -> Arc<dyn DatabaseAdapter> {
        Arc::new(self.clone())
    }

    /// Queue the result of the next statement (transaction control included)
    pub fn push(&self, result: DbResult<QueryResult>) {
        self.script.responses.lock().unwrap().push_back(result);
    }

    pub fn push_rows(&self, rows: Vec<Row>) {
        self.push(Ok(QueryResult::from_rows(rows)));
    }

    /// Queue a mutation result affecting `count` rows
    pub fn push_affected(&self, count: u64) {
        let rows = (0..count).map(|i| row(&[("id", CellValue::Integer(i as i64))])).collect();
        self.push_rows(rows);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.script.calls.lock().unwrap().clone()
    }

    pub fn last_call(&self) -> RecordedCall {
        self.calls().pop().expect("no statement was issued")
    }

    pub fn statements(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.sql).collect()
    }

    pub fn close_count(&self) -> usize {
        self.script.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DatabaseAdapter for MockAdapter {
    async fn query(&self, sql: &str, params: &[SqlParam]) -> DbResult<QueryResult> {
        self.script.record(sql, params, false)
    }

    async fn begin_transaction(&self) -> DbResult<Box<dyn Transaction>> {
        if !self.kind.supports_transactions() {
            return Err(DbError::Unsupported("mock REST backend".into()));
        }
        self.script.record("BEGIN", &[], true)?;
        Ok(Box::new(MockTransaction {
            script: Arc::clone(&self.script),
            state: TransactionState::Active,
        }))
    }

    async fn close(&self) -> DbResult<()> {
        self.script.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn backend(&self) -> BackendKind {
        self.kind
    }
}

struct MockTransaction {
    script: Arc<Script>,
    state: TransactionState,
}

impl MockTransaction {
    fn finish(&mut self, statement: &str, next: TransactionState) -> DbResult<()> {
        if self.state.is_terminal() {
            return Err(DbError::TransactionCompleted);
        }
        match self.script.record(statement, &[], true) {
            Ok(_) => {
                self.state = next;
                Ok(())
            }
            Err(e) => {
                self.state = TransactionState::Aborted;
                Err(e)
            }
        }
    }
}

#[async_trait]
impl Transaction for MockTransaction {
    async fn query(&mut self, sql: &str, params: &[SqlParam]) -> DbResult<QueryResult> {
        if self.state.is_terminal() {
            return Err(DbError::TransactionCompleted);
        }
        self.script.record(sql, params, true)
    }

    async fn commit(&mut self) -> DbResult<()> {
        self.finish("COMMIT", TransactionState::Committed)
    }

    async fn rollback(&mut self) -> DbResult<()> {
        self.finish("ROLLBACK", TransactionState::RolledBack)
    }

    fn state(&self) -> TransactionState {
        self.state
    }
}

/// Build a row from `(column, value)` pairs
pub fn row(cells: &[(&str, CellValue)]) -> Row {
    let columns: Vec<String> = cells.iter().map(|(name, _)| name.to_string()).collect();
    let values = cells.iter().map(|(_, value)| value.clone()).collect();
    Row::new(Arc::from(columns), values)
}

pub fn text(value: &str) -> CellValue {
    CellValue::Text(value.to_string())
}

/// A report row shaped the way the REST backend returns it: ids and
/// timestamps as text, content and citations as serialized JSON text
pub fn report_row(report_id: &str, user_id: &str, deleted_at: Option<&str>) -> Row {
    row(&[
        ("report_id", text(report_id)),
        ("user_id", text(user_id)),
        ("subject", text("Pension transfer")),
        ("country", text("GB")),
        ("content", text(r#"{"summary":"ok"}"#)),
        (
            "citations",
            text(r#"[{"title":"Guide","url":"https://gov.example/guide"}]"#),
        ),
        ("status", text("completed")),
        ("created_at", text("2026-01-02T10:00:00Z")),
        ("expires_at", text("2026-02-01T10:00:00Z")),
        ("updated_at", text("2026-01-02T10:05:00Z")),
        (
            "deleted_at",
            deleted_at.map(text).unwrap_or(CellValue::Null),
        ),
    ])
}

pub fn payment_row(payment_id: &str, user_id: &str, status: &str) -> Row {
    row(&[
        ("payment_id", text(payment_id)),
        ("user_id", text(user_id)),
        ("report_id", CellValue::Null),
        ("amount", CellValue::Integer(299)),
        ("currency", text("GBP")),
        ("status", text(status)),
        ("stripe_payment_intent_id", text("pi_123")),
        ("created_at", text("2026-01-02T10:00:00Z")),
    ])
}
