//! neo4rs-backed driver.

use super::traits::{GraphDriver, GraphTransaction, Record};
use crate::cypher::Statement;
use crate::error::{OgmError, Result};
use crate::value::{format_timestamp, Value};
use crate::wire::{WireEdge, WireNode, WireTuple, EDGES_COLUMN, OTHERS_COLUMN, PRIMARIES_COLUMN};
use async_trait::async_trait;
use neo4rs::{BoltList, BoltMap, BoltNull, BoltString, BoltType, ConfigBuilder, Graph, Query, Txn};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Connection parameters for one logical database.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub uri: String,
    pub user: String,
    pub password: String,
    /// `None` targets the server default database.
    pub database: Option<String>,
    pub max_connections: usize,
}

/// Client for one Neo4j database.
pub struct Neo4jClient {
    graph: Arc<Graph>,
    database: Option<String>,
}

impl Neo4jClient {
    /// Connect with the given settings.
    pub async fn new(settings: &ConnectionSettings) -> Result<Self> {
        let mut builder = ConfigBuilder::default()
            .uri(settings.uri.as_str())
            .user(settings.user.as_str())
            .password(settings.password.as_str())
            .max_connections(settings.max_connections);
        if let Some(db) = &settings.database {
            builder = builder.db(db.as_str());
        }
        let config = builder.build()?;
        let graph = Graph::connect(config).await?;
        tracing::info!(
            "Connected to Neo4j at {} (database: {})",
            settings.uri,
            settings.database.as_deref().unwrap_or("default")
        );
        Ok(Self {
            graph: Arc::new(graph),
            database: settings.database.clone(),
        })
    }
}

#[async_trait]
impl GraphDriver for Neo4jClient {
    fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    async fn begin(&self) -> Result<Box<dyn GraphTransaction>> {
        let txn = self.graph.start_txn().await?;
        Ok(Box::new(Neo4jTransaction { txn }))
    }
}

struct Neo4jTransaction {
    txn: Txn,
}

#[async_trait]
impl GraphTransaction for Neo4jTransaction {
    async fn run(&mut self, statement: &Statement) -> Result<Vec<Record>> {
        let q = to_query(statement);
        if statement.columns.is_empty() {
            self.txn.run(q).await?;
            return Ok(Vec::new());
        }
        let mut stream = self.txn.execute(q).await?;
        let mut records = Vec::new();
        while let Some(row) = stream.next(self.txn.handle()).await? {
            let mut record = Record::new();
            for column in &statement.columns {
                let json: serde_json::Value = row.get(column).map_err(|e| shape(column, e))?;
                record.insert(column, Value::from_json(json));
            }
            records.push(record);
        }
        Ok(records)
    }

    async fn fetch_tuple(&mut self, statement: &Statement) -> Result<WireTuple> {
        let mut stream = self.txn.execute(to_query(statement)).await?;
        let Some(row) = stream.next(self.txn.handle()).await? else {
            return Ok(WireTuple::default());
        };
        let edges: Vec<Option<neo4rs::Relation>> =
            row.get(EDGES_COLUMN).map_err(|e| shape(EDGES_COLUMN, e))?;
        let others: Vec<neo4rs::Node> =
            row.get(OTHERS_COLUMN).map_err(|e| shape(OTHERS_COLUMN, e))?;
        let primaries: Vec<neo4rs::Node> =
            row.get(PRIMARIES_COLUMN).map_err(|e| shape(PRIMARIES_COLUMN, e))?;

        let mut tuple = WireTuple::default();
        for edge in edges {
            tuple.edges.push(edge.as_ref().map(relation_to_wire).transpose()?);
        }
        for node in &others {
            tuple.other_nodes.push(node_to_wire(node)?);
        }
        for node in &primaries {
            tuple.primary_nodes.push(node_to_wire(node)?);
        }
        Ok(tuple)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let Neo4jTransaction { txn } = *self;
        txn.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        let Neo4jTransaction { txn } = *self;
        txn.rollback().await?;
        Ok(())
    }
}

fn shape(column: &str, e: impl std::fmt::Display) -> OgmError {
    OgmError::Internal(format!("cannot decode column '{}': {}", column, e))
}

fn to_query(statement: &Statement) -> Query {
    statement
        .params
        .iter()
        .fold(neo4rs::query(&statement.text), |q, (name, value)| {
            q.param(name, to_bolt(value))
        })
}

/// Convert a parameter value into its Bolt form.
fn to_bolt(value: &Value) -> BoltType {
    match value {
        Value::Null => BoltType::Null(BoltNull),
        Value::Bool(b) => BoltType::from(*b),
        Value::Int(i) => BoltType::from(*i),
        Value::Float(f) => BoltType::from(*f),
        Value::String(s) => BoltType::from(s.as_str()),
        Value::DateTime(dt) => BoltType::from(format_timestamp(dt)),
        Value::List(items) => {
            let mut list = BoltList::with_capacity(items.len());
            for item in items {
                list.push(to_bolt(item));
            }
            BoltType::List(list)
        }
        Value::Map(map) => {
            let mut bolt = BoltMap::with_capacity(map.len());
            for (k, v) in map {
                bolt.put(BoltString::from(k.as_str()), to_bolt(v));
            }
            BoltType::Map(bolt)
        }
    }
}

fn node_to_wire(node: &neo4rs::Node) -> Result<WireNode> {
    let mut properties = BTreeMap::new();
    for key in node.keys() {
        let json: serde_json::Value = node.get(key).map_err(|e| {
            OgmError::Internal(format!("node {} property '{}': {}", node.id(), key, e))
        })?;
        properties.insert(key.to_string(), Value::from_json(json));
    }
    Ok(WireNode {
        id: node.id(),
        labels: node.labels().iter().map(|l| l.to_string()).collect(),
        properties,
    })
}

fn relation_to_wire(rel: &neo4rs::Relation) -> Result<WireEdge> {
    let mut properties = BTreeMap::new();
    for key in rel.keys() {
        let json: serde_json::Value = rel.get(key).map_err(|e| {
            OgmError::Internal(format!("relationship {} property '{}': {}", rel.id(), key, e))
        })?;
        properties.insert(key.to_string(), Value::from_json(json));
    }
    Ok(WireEdge {
        id: rel.id(),
        start_id: rel.start_node_id(),
        end_id: rel.end_node_id(),
        edge_type: rel.typ().to_string(),
        properties,
    })
}
