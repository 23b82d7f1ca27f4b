//! Wire tuple: the three-partition result of a load query.
//!
//! `edges[0]` is always the `[null]` sentinel the load query prepends; real
//! relationships start at index 1.

use crate::error::{OgmError, Result};
use crate::value::Value;
use std::collections::BTreeMap;

/// Column holding `[null] + relationships`.
pub const EDGES_COLUMN: &str = "edges";
/// Column holding every node on the matched paths.
pub const OTHERS_COLUMN: &str = "others";
/// Column holding the root result set.
pub const PRIMARIES_COLUMN: &str = "primaries";

/// A node as returned by the driver.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WireNode {
    pub id: i64,
    pub labels: Vec<String>,
    pub properties: BTreeMap<String, Value>,
}

impl WireNode {
    pub fn new(id: i64, label: &str) -> Self {
        Self {
            id,
            labels: vec![label.to_string()],
            properties: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }
}

/// A relationship as returned by the driver.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WireEdge {
    pub id: i64,
    pub start_id: i64,
    pub end_id: i64,
    pub edge_type: String,
    pub properties: BTreeMap<String, Value>,
}

impl WireEdge {
    pub fn new(id: i64, start_id: i64, end_id: i64, edge_type: &str) -> Self {
        Self {
            id,
            start_id,
            end_id,
            edge_type: edge_type.to_string(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }
}

/// Edges (sentinel first), other visited nodes, and primary nodes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WireTuple {
    pub edges: Vec<Option<WireEdge>>,
    pub other_nodes: Vec<WireNode>,
    pub primary_nodes: Vec<WireNode>,
}

impl WireTuple {
    /// Assemble a tuple the way the load query shapes it: the sentinel is prepended to `edges`.
    pub fn from_parts(edges: Vec<WireEdge>, other_nodes: Vec<WireNode>, primary_nodes: Vec<WireNode>) -> Self {
        let mut with_sentinel = Vec::with_capacity(edges.len() + 1);
        with_sentinel.push(None);
        with_sentinel.extend(edges.into_iter().map(Some));
        Self {
            edges: with_sentinel,
            other_nodes,
            primary_nodes,
        }
    }

    pub fn has_primaries(&self) -> bool {
        !self.primary_nodes.is_empty()
    }

    /// Relationships after the sentinel. `None` entries past index 0 are a shape error.
    pub fn relationships(&self) -> Result<Vec<&WireEdge>> {
        self.edges
            .iter()
            .enumerate()
            .skip(1)
            .map(|(i, e)| {
                e.as_ref()
                    .ok_or_else(|| OgmError::Internal(format!("null edge at index {}", i)))
            })
            .collect()
    }
}
