//! Parameterised statements handed to the driver.

use crate::value::Value;
use std::collections::BTreeMap;
use std::fmt;

/// What a statement does, used for logging and by test drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// Batched node upsert, returns `key` and `id` per row.
    NodeUpsert,
    /// Batched relationship upsert.
    RelationshipUpsert,
    /// Load query returning a wire tuple.
    Load,
    /// Detach-delete by identity.
    Delete,
    /// Schema listing.
    SchemaList,
    /// Constraint or index DDL.
    SchemaChange,
    /// Anything else (connectivity checks).
    Admin,
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StatementKind::NodeUpsert => "node upsert",
            StatementKind::RelationshipUpsert => "relationship upsert",
            StatementKind::Load => "load",
            StatementKind::Delete => "delete",
            StatementKind::SchemaList => "schema listing",
            StatementKind::SchemaChange => "schema change",
            StatementKind::Admin => "admin",
        };
        f.write_str(s)
    }
}

/// Statement text, its parameters, and the columns the caller reads back.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub text: String,
    pub params: BTreeMap<String, Value>,
    pub columns: Vec<String>,
    pub kind: StatementKind,
}

impl Statement {
    pub fn new(kind: StatementKind, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: BTreeMap::new(),
            columns: Vec::new(),
            kind,
        }
    }

    /// Bind a parameter.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Bind several parameters.
    pub fn params(mut self, params: impl IntoIterator<Item = (String, Value)>) -> Self {
        self.params.extend(params);
        self
    }

    /// Declare the returned columns to decode.
    pub fn returning<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn has_parameters(&self) -> bool {
        !self.params.is_empty()
    }

    /// Number of rows in the `rows` batch parameter, if any.
    pub fn batch_len(&self) -> usize {
        match self.params.get("rows") {
            Some(Value::List(rows)) => rows.len(),
            _ => 0,
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self.text.split_whitespace().collect::<Vec<_>>().join(" ");
        f.write_str(&text)
    }
}
