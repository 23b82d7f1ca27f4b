//! In-memory mock implementation of GraphDriver for testing.
//!
//! Records every statement, assigns graph ids to node upserts, and serves
//! scripted schema listings and wire tuples.
//! Conditionally compiled with `#[cfg(test)]`.

use super::traits::{GraphDriver, GraphTransaction, Record};
use crate::cypher::{Statement, StatementKind};
use crate::error::{OgmError, Result};
use crate::value::Value;
use crate::wire::WireTuple;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared state of a [`MockDriver`] and its transactions.
#[derive(Default)]
pub struct MockState {
    /// Every statement run, in order.
    pub statements: Vec<Statement>,
    pub commits: usize,
    pub rollbacks: usize,
    /// Graph id assigned to each node identity.
    pub ids: HashMap<String, i64>,
    next_id: i64,
    /// Rows served for `SHOW CONSTRAINTS`.
    pub constraints: Vec<Record>,
    /// Rows served for `SHOW INDEXES`.
    pub indexes: Vec<Record>,
    /// Tuples served by `fetch_tuple`, front first.
    pub tuples: VecDeque<WireTuple>,
    /// Statements whose text contains this fragment fail.
    pub fail_on: Option<String>,
    /// Relationship upserts whose text contains this fragment report one row short.
    pub short_write_on: Option<String>,
    /// Rollbacks fail (after being counted).
    pub fail_rollback: bool,
}

impl MockState {
    fn assign_id(&mut self, key: &str) -> i64 {
        if let Some(id) = self.ids.get(key) {
            return *id;
        }
        self.next_id += 1;
        self.ids.insert(key.to_string(), self.next_id);
        self.next_id
    }

    fn answer(&mut self, statement: &Statement) -> Vec<Record> {
        match statement.kind {
            StatementKind::NodeUpsert => {
                let rows = match statement.params.get("rows") {
                    Some(Value::List(rows)) => rows.clone(),
                    _ => Vec::new(),
                };
                rows.iter()
                    .filter_map(|row| match row {
                        Value::Map(row) => Some(row),
                        _ => None,
                    })
                    .filter_map(|row| {
                        let key = row.get("key").and_then(Value::to_key)?;
                        let id = match row.get("id").and_then(Value::as_int) {
                            Some(id) => id,
                            None => self.assign_id(&key),
                        };
                        Some(Record::new().with("key", key).with("id", id))
                    })
                    .collect()
            }
            StatementKind::RelationshipUpsert => {
                let mut written = statement.batch_len() as i64;
                if matches!(&self.short_write_on, Some(f) if statement.text.contains(f.as_str())) {
                    written -= 1;
                }
                vec![Record::new().with("written", written)]
            }
            StatementKind::Delete => vec![Record::new().with("deleted", 1i64)],
            StatementKind::SchemaList if statement.text.starts_with("SHOW CONSTRAINTS") => {
                self.constraints.clone()
            }
            StatementKind::SchemaList => self.indexes.clone(),
            StatementKind::Admin => vec![Record::new().with("ok", 1i64)],
            StatementKind::Load | StatementKind::SchemaChange => Vec::new(),
        }
    }
}

/// In-memory driver for tests.
#[derive(Clone, Default)]
pub struct MockDriver {
    database: Option<String>,
    pub state: Arc<RwLock<MockState>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_database(name: &str) -> Self {
        Self {
            database: Some(name.to_string()),
            state: Arc::default(),
        }
    }

    pub async fn push_tuple(&self, tuple: WireTuple) {
        self.state.write().await.tuples.push_back(tuple);
    }

    pub async fn fail_on(&self, fragment: &str) {
        self.state.write().await.fail_on = Some(fragment.to_string());
    }

    pub async fn short_write_on(&self, fragment: &str) {
        self.state.write().await.short_write_on = Some(fragment.to_string());
    }

    pub async fn fail_rollback(&self) {
        self.state.write().await.fail_rollback = true;
    }

    /// Recorded statements of one kind.
    pub async fn statements_of(&self, kind: StatementKind) -> Vec<Statement> {
        self.state
            .read()
            .await
            .statements
            .iter()
            .filter(|s| s.kind == kind)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl GraphDriver for MockDriver {
    fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    async fn begin(&self) -> Result<Box<dyn GraphTransaction>> {
        Ok(Box::new(MockTransaction {
            state: self.state.clone(),
        }))
    }
}

struct MockTransaction {
    state: Arc<RwLock<MockState>>,
}

impl MockTransaction {
    async fn record(&self, statement: &Statement) -> Result<()> {
        let mut state = self.state.write().await;
        state.statements.push(statement.clone());
        match &state.fail_on {
            Some(fragment) if statement.text.contains(fragment.as_str()) => Err(
                OgmError::Internal(format!("mock failure on '{}'", fragment)),
            ),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl GraphTransaction for MockTransaction {
    async fn run(&mut self, statement: &Statement) -> Result<Vec<Record>> {
        self.record(statement).await?;
        Ok(self.state.write().await.answer(statement))
    }

    async fn fetch_tuple(&mut self, statement: &Statement) -> Result<WireTuple> {
        self.record(statement).await?;
        Ok(self
            .state
            .write()
            .await
            .tuples
            .pop_front()
            .unwrap_or_default())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.state.write().await.commits += 1;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        let mut state = self.state.write().await;
        state.rollbacks += 1;
        if state.fail_rollback {
            return Err(OgmError::Internal("mock rollback failure".to_string()));
        }
        Ok(())
    }
}
