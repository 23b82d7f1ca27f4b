//! Driver boundary.
//!
//! The mapping core never talks to neo4rs directly. It opens a
//! [`GraphTransaction`] through a [`GraphDriver`] and runs [`Statement`]s in it,
//! which lets tests swap in the in-memory mock.

use crate::cypher::{Statement, StatementKind};
use crate::error::{OgmError, Result};
use crate::value::Value;
use crate::wire::WireTuple;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// One result row, decoded into [`Value`]s for the statement's declared columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    values: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.insert(column, value.into());
        self
    }

    pub fn insert(&mut self, column: &str, value: Value) {
        self.values.insert(column.to_string(), value);
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    /// Required column.
    pub fn value(&self, column: &str) -> Result<&Value> {
        self.get(column)
            .ok_or_else(|| OgmError::Internal(format!("missing column '{}'", column)))
    }

    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(Value::as_str)
    }

    pub fn get_int(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(Value::as_int)
    }

    /// String items of a list column (null and non-string items are skipped).
    pub fn get_strings(&self, column: &str) -> Vec<String> {
        match self.get(column) {
            Some(Value::List(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// A connection to one logical database.
#[async_trait]
pub trait GraphDriver: Send + Sync {
    /// Database this driver targets; `None` for the server default.
    fn database(&self) -> Option<&str>;

    /// Open an explicit write transaction.
    async fn begin(&self) -> Result<Box<dyn GraphTransaction>>;

    /// Round-trip a trivial statement.
    async fn ping(&self) -> Result<()> {
        let mut txn = self.begin().await?;
        let statement =
            Statement::new(StatementKind::Admin, "RETURN 1 AS ok").returning(["ok"]);
        let rows = txn.run(&statement).await?;
        txn.commit().await?;
        match rows.first().and_then(|r| r.get_int("ok")) {
            Some(1) => Ok(()),
            _ => Err(OgmError::Internal("unexpected ping response".to_string())),
        }
    }

    /// Human-readable target name for logs.
    fn target_name(&self) -> String {
        self.database().unwrap_or("default").to_string()
    }
}

/// An open transaction.
#[async_trait]
pub trait GraphTransaction: Send {
    /// Execute a statement and decode its declared columns.
    async fn run(&mut self, statement: &Statement) -> Result<Vec<Record>>;

    /// Execute a load statement and decode its single row into a wire tuple.
    async fn fetch_tuple(&mut self, statement: &Statement) -> Result<WireTuple>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Roll back after a failed statement. A rollback failure is logged; the
/// caller still reports the original error.
pub async fn rollback_quietly(txn: Box<dyn GraphTransaction>, context: &str) {
    if let Err(e) = txn.rollback().await {
        tracing::warn!("Rollback after failed {} also failed: {}", context, e);
    }
}
