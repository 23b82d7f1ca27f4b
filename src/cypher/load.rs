//! Load and delete query builders.

use super::escape::{escape_identifier, property};
use super::statement::{Statement, StatementKind};
use crate::value::Value;
use crate::wire::{EDGES_COLUMN, OTHERS_COLUMN, PRIMARIES_COLUMN};
use std::collections::BTreeMap;

/// Property comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Contains,
    StartsWith,
    In,
}

impl Comparison {
    fn operator(self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Ne => "<>",
            Comparison::Lt => "<",
            Comparison::Lte => "<=",
            Comparison::Gt => ">",
            Comparison::Gte => ">=",
            Comparison::Contains => "CONTAINS",
            Comparison::StartsWith => "STARTS WITH",
            Comparison::In => "IN",
        }
    }
}

/// Builder for parameterised WHERE clauses.
#[derive(Debug, Default)]
pub struct WhereBuilder {
    conditions: Vec<String>,
    params: BTreeMap<String, Value>,
}

impl WhereBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn bind(&mut self, value: Value) -> String {
        let name = format!("p{}", self.params.len());
        self.params.insert(name.clone(), value.into_storage());
        name
    }

    /// `alias.property <op> $pN`
    pub fn add_comparison(
        &mut self,
        alias: &str,
        name: &str,
        comparison: Comparison,
        value: Value,
    ) -> &mut Self {
        let param = self.bind(value);
        self.conditions.push(format!(
            "{} {} ${}",
            property(alias, name),
            comparison.operator(),
            param
        ));
        self
    }

    /// `alias.property IS [NOT] NULL`
    pub fn add_null_check(&mut self, alias: &str, name: &str, is_null: bool) -> &mut Self {
        let check = if is_null { "IS NULL" } else { "IS NOT NULL" };
        self.conditions
            .push(format!("{} {}", property(alias, name), check));
        self
    }

    /// `id(alias) = $pN`
    pub fn add_native_id(&mut self, alias: &str, id: i64) -> &mut Self {
        let param = self.bind(Value::Int(id));
        self.conditions.push(format!("id({}) = ${}", alias, param));
        self
    }

    /// Build the WHERE clause (empty string if no conditions).
    pub fn build(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.conditions.join(" AND "))
        }
    }

    pub fn has_conditions(&self) -> bool {
        !self.conditions.is_empty()
    }

    pub fn into_params(self) -> BTreeMap<String, Value> {
        self.params
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Condition {
    Compare(String, Comparison, Value),
    Null(String, bool),
    NativeId(i64),
}

/// Conjunction of property conditions on the primary nodes of a load.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare the stored property `name` with `value`.
    pub fn compare(mut self, name: &str, comparison: Comparison, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Compare(
            name.to_string(),
            comparison,
            value.into(),
        ));
        self
    }

    pub fn eq(self, name: &str, value: impl Into<Value>) -> Self {
        self.compare(name, Comparison::Eq, value)
    }

    pub fn is_null(mut self, name: &str) -> Self {
        self.conditions.push(Condition::Null(name.to_string(), true));
        self
    }

    pub fn is_not_null(mut self, name: &str) -> Self {
        self.conditions.push(Condition::Null(name.to_string(), false));
        self
    }

    /// Match the database-native id.
    pub fn native_id(mut self, id: i64) -> Self {
        self.conditions.push(Condition::NativeId(id));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    fn apply(&self, alias: &str, builder: &mut WhereBuilder) {
        for condition in &self.conditions {
            match condition {
                Condition::Compare(name, cmp, value) => {
                    builder.add_comparison(alias, name, *cmp, value.clone())
                }
                Condition::Null(name, is_null) => builder.add_null_check(alias, name, *is_null),
                Condition::NativeId(id) => builder.add_native_id(alias, *id),
            };
        }
    }
}

/// Sort key on a stored property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub property: String,
    pub descending: bool,
}

impl Order {
    pub fn asc(property: &str) -> Self {
        Self {
            property: property.to_string(),
            descending: false,
        }
    }

    pub fn desc(property: &str) -> Self {
        Self {
            property: property.to_string(),
            descending: true,
        }
    }
}

/// Skip/limit window over the primary nodes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pagination {
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

impl Pagination {
    pub fn new(skip: u64, limit: u64) -> Self {
        Self {
            skip: Some(skip),
            limit: Some(limit),
        }
    }

    /// Page `page` (zero-based) of `size` items.
    pub fn page(page: u64, size: u64) -> Self {
        Self::new(page.saturating_mul(size), size)
    }
}

/// Query loading primary nodes of one label plus everything within `depth` hops.
///
/// The statement returns a single row with three columns:
/// `edges` (`[null]` followed by every relationship on the matched paths),
/// `others` (every node on the matched paths) and `primaries`.
#[derive(Debug, Clone)]
pub struct LoadQuery {
    label: String,
    depth: usize,
    filter: Filter,
    order: Vec<Order>,
    pagination: Pagination,
}

impl LoadQuery {
    pub fn new(label: &str, depth: usize) -> Self {
        Self {
            label: label.to_string(),
            depth,
            filter: Filter::default(),
            order: Vec::new(),
            pagination: Pagination::default(),
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn order(mut self, order: Vec<Order>) -> Self {
        self.order = order;
        self
    }

    pub fn pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = pagination;
        self
    }

    pub fn to_statement(&self) -> Statement {
        let mut builder = WhereBuilder::new();
        self.filter.apply("n", &mut builder);

        let mut text = format!("MATCH (n:{})", escape_identifier(&self.label));
        if builder.has_conditions() {
            text.push('\n');
            text.push_str(&builder.build());
        }

        let mut window = String::new();
        if !self.order.is_empty() {
            let keys: Vec<String> = self
                .order
                .iter()
                .map(|o| {
                    let dir = if o.descending { " DESC" } else { "" };
                    format!("{}{}", property("n", &o.property), dir)
                })
                .collect();
            window.push_str(&format!(" ORDER BY {}", keys.join(", ")));
        }
        let mut params = builder.into_params();
        if let Some(skip) = self.pagination.skip {
            window.push_str(" SKIP $skip");
            params.insert("skip".to_string(), Value::Int(clamp(skip)));
        }
        if let Some(limit) = self.pagination.limit {
            window.push_str(" LIMIT $limit");
            params.insert("limit".to_string(), Value::Int(clamp(limit)));
        }
        if !window.is_empty() {
            text.push_str(&format!("\nWITH n{}", window));
        }

        text.push_str(&format!(
            "\nOPTIONAL MATCH path = (n)-[*0..{depth}]-()\n\
             WITH collect(DISTINCT n) AS {primaries}, collect(path) AS paths\n\
             RETURN [null] + reduce(rs = [], q IN paths | rs + relationships(q)) AS {edges},\n\
             reduce(ns = [], q IN paths | ns + nodes(q)) AS {others},\n\
             {primaries}",
            depth = self.depth,
            primaries = PRIMARIES_COLUMN,
            edges = EDGES_COLUMN,
            others = OTHERS_COLUMN,
        ));

        Statement::new(StatementKind::Load, text)
            .params(params)
            .returning([EDGES_COLUMN, OTHERS_COLUMN, PRIMARIES_COLUMN])
    }
}

fn clamp(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// `DETACH DELETE` of the nodes of `label` matching `filter`.
pub fn delete_statement(label: &str, filter: &Filter) -> Statement {
    let mut builder = WhereBuilder::new();
    filter.apply("n", &mut builder);
    let text = format!(
        "MATCH (n:{})\n{}\nDETACH DELETE n\nRETURN count(*) AS deleted",
        escape_identifier(label),
        builder.build()
    );
    Statement::new(StatementKind::Delete, text)
        .params(builder.into_params())
        .returning(["deleted"])
}
