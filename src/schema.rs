//! Schema reconciler.
//!
//! Derives the uniqueness constraints and indexes the registry declares,
//! compares them with what the database reports, and creates or drops them.
//! Every operation repeats once per configured database target, each in its
//! own transaction.

use crate::cypher::{escape_identifier, property, Statement, StatementKind};
use crate::error::{OgmError, Result};
use crate::metadata::{FieldKind, Registry};
use crate::neo4j::{rollback_quietly, GraphDriver, Record};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SchemaKind {
    Unique,
    Index,
}

/// A constraint or index on one node label.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchemaItem {
    pub kind: SchemaKind,
    pub label: String,
    pub properties: Vec<String>,
}

impl SchemaItem {
    pub fn unique(label: &str, property: &str) -> Self {
        Self {
            kind: SchemaKind::Unique,
            label: label.to_string(),
            properties: vec![property.to_string()],
        }
    }

    pub fn index<S: AsRef<str>>(label: &str, properties: &[S]) -> Self {
        Self {
            kind: SchemaKind::Index,
            label: label.to_string(),
            properties: properties.iter().map(|p| p.as_ref().to_string()).collect(),
        }
    }

    fn body(&self) -> String {
        let label = escape_identifier(&self.label);
        let props: Vec<String> = self.properties.iter().map(|p| property("n", p)).collect();
        match self.kind {
            SchemaKind::Unique => format!("FOR (n:{}) REQUIRE {} IS UNIQUE", label, props.join(", ")),
            SchemaKind::Index => format!("FOR (n:{}) ON ({})", label, props.join(", ")),
        }
    }

    fn keyword(&self) -> &'static str {
        match self.kind {
            SchemaKind::Unique => "CONSTRAINT",
            SchemaKind::Index => "INDEX",
        }
    }

    /// Canonical statement, used to report differences.
    pub fn statement(&self) -> String {
        format!("CREATE {} {}", self.keyword(), self.body())
    }

    /// Idempotent creation statement.
    pub fn create_statement(&self) -> Statement {
        Statement::new(
            StatementKind::SchemaChange,
            format!("CREATE {} IF NOT EXISTS {}", self.keyword(), self.body()),
        )
    }
}

impl fmt::Display for SchemaItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.statement())
    }
}

/// One constraint or index reported by the database.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveItem {
    pub name: String,
    /// Raw type as reported (`UNIQUENESS`, `RANGE`, `FULLTEXT`, ...).
    pub kind: String,
    /// Registry-comparable form; `None` for kinds the registry never declares.
    pub item: Option<SchemaItem>,
    pub is_constraint: bool,
}

impl LiveItem {
    fn drop_statement(&self) -> Statement {
        let keyword = if self.is_constraint { "CONSTRAINT" } else { "INDEX" };
        Statement::new(
            StatementKind::SchemaChange,
            format!("DROP {} {} IF EXISTS", keyword, escape_identifier(&self.name)),
        )
    }
}

/// Constraints and indexes of one database.
#[derive(Debug, Clone, Default)]
pub struct LiveSchema {
    pub constraints: Vec<LiveItem>,
    /// Indexes not backing a constraint.
    pub indexes: Vec<LiveItem>,
}

impl LiveSchema {
    pub fn items(&self) -> impl Iterator<Item = &LiveItem> {
        self.constraints.iter().chain(&self.indexes)
    }

    /// Comparable items, ignoring kinds the registry never declares.
    pub fn managed(&self) -> BTreeSet<SchemaItem> {
        self.items().filter_map(|i| i.item.clone()).collect()
    }
}

/// What to do with the schema at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexStrategy {
    /// Leave the schema alone.
    #[default]
    Ignore,
    /// Fail when the schema differs from the registry.
    Validate,
    /// Drop everything, recreate from the registry, then validate.
    Assert,
}

impl FromStr for IndexStrategy {
    type Err = OgmError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ignore" => Ok(Self::Ignore),
            "validate" => Ok(Self::Validate),
            "assert" => Ok(Self::Assert),
            other => Err(OgmError::Configuration(format!(
                "unknown index strategy '{}' (expected ignore, validate or assert)",
                other
            ))),
        }
    }
}

impl fmt::Display for IndexStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ignore => "ignore",
            Self::Validate => "validate",
            Self::Assert => "assert",
        })
    }
}

impl IndexStrategy {
    /// Run the strategy against every target, in order. The first failure stops it.
    pub async fn apply(self, registry: &Registry, drivers: &[Arc<dyn GraphDriver>]) -> Result<()> {
        if self == IndexStrategy::Ignore {
            tracing::debug!("Index strategy is ignore, leaving schema untouched");
            return Ok(());
        }
        let reconciler = SchemaReconciler::new(registry);
        for driver in drivers {
            let driver = driver.as_ref();
            if self == IndexStrategy::Assert {
                reconciler.drop_all(driver).await?;
                reconciler.create(driver).await?;
            }
            reconciler.verify(driver).await?;
        }
        tracing::info!("Index strategy '{}' applied to {} target(s)", self, drivers.len());
        Ok(())
    }
}

const SHOW_CONSTRAINTS: &str = "SHOW CONSTRAINTS YIELD name, type, entityType, labelsOrTypes, properties";
const SHOW_INDEXES: &str =
    "SHOW INDEXES YIELD name, type, entityType, labelsOrTypes, properties, owningConstraint";

/// Diffs the registry against live databases.
pub struct SchemaReconciler<'a> {
    registry: &'a Registry,
}

impl<'a> SchemaReconciler<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    /// Items the registry declares.
    ///
    /// One uniqueness constraint per primary-key or `unique` field and one
    /// composite index per label over its `index` fields. Graph-native keys
    /// and relationship-objects get nothing.
    pub fn expected(&self) -> BTreeSet<SchemaItem> {
        let native = self.registry.strategy().is_graph_native();
        let mut items = BTreeSet::new();
        for descriptor in self.registry.descriptors() {
            if descriptor.is_relationship_object {
                continue;
            }
            let mut indexed = Vec::new();
            for field in &descriptor.fields {
                let is_key = field.kind == FieldKind::PrimaryKey;
                if (is_key && !native) || (field.unique && !is_key) {
                    items.insert(SchemaItem::unique(&descriptor.label, &field.storage_name));
                }
                if field.indexed && !is_key {
                    indexed.push(field.storage_name.clone());
                }
            }
            if !indexed.is_empty() {
                items.insert(SchemaItem::index(&descriptor.label, &indexed));
            }
        }
        items
    }

    /// List constraints and indexes of one database.
    pub async fn live(&self, driver: &dyn GraphDriver) -> Result<LiveSchema> {
        let mut txn = driver.begin().await?;
        let listed = async {
            let constraints = txn
                .run(
                    &Statement::new(StatementKind::SchemaList, SHOW_CONSTRAINTS)
                        .returning(["name", "type", "entityType", "labelsOrTypes", "properties"]),
                )
                .await?;
            let indexes = txn
                .run(
                    &Statement::new(StatementKind::SchemaList, SHOW_INDEXES).returning([
                        "name",
                        "type",
                        "entityType",
                        "labelsOrTypes",
                        "properties",
                        "owningConstraint",
                    ]),
                )
                .await?;
            Ok::<_, OgmError>((constraints, indexes))
        }
        .await;
        let (constraints, indexes) = match listed {
            Ok(rows) => rows,
            Err(e) => {
                rollback_quietly(txn, "schema listing").await;
                return Err(e);
            }
        };
        txn.commit().await?;

        let schema = LiveSchema {
            constraints: constraints
                .iter()
                .map(|r| live_item(r, true))
                .collect::<Result<_>>()?,
            indexes: indexes
                .iter()
                .filter(|r| r.get_str("type") != Some("LOOKUP"))
                .filter(|r| r.get_str("owningConstraint").is_none())
                .map(|r| live_item(r, false))
                .collect::<Result<_>>()?,
        };
        tracing::debug!(
            "Database '{}' has {} constraints and {} indexes",
            driver.target_name(),
            schema.constraints.len(),
            schema.indexes.len()
        );
        Ok(schema)
    }

    /// Drop every listed constraint and index. Returns how many were dropped.
    pub async fn drop_all(&self, driver: &dyn GraphDriver) -> Result<usize> {
        let live = self.live(driver).await?;
        let expected = self.expected();
        for item in live.items() {
            let managed = item.item.as_ref().is_some_and(|i| expected.contains(i));
            if !managed {
                tracing::warn!(
                    "Dropping {} '{}' ({}) which the registry does not declare",
                    if item.is_constraint { "constraint" } else { "index" },
                    item.name,
                    item.kind
                );
            }
        }
        let statements: Vec<Statement> = live.items().map(LiveItem::drop_statement).collect();
        let count = run_all(driver, &statements).await?;
        tracing::info!("Dropped {} schema items on '{}'", count, driver.target_name());
        Ok(count)
    }

    /// Create every declared item that does not exist yet.
    pub async fn create(&self, driver: &dyn GraphDriver) -> Result<usize> {
        let statements: Vec<Statement> =
            self.expected().iter().map(SchemaItem::create_statement).collect();
        let count = run_all(driver, &statements).await?;
        tracing::info!("Ensured {} schema items on '{}'", count, driver.target_name());
        Ok(count)
    }

    /// Fail with the symmetric difference between declared and live items.
    pub async fn verify(&self, driver: &dyn GraphDriver) -> Result<()> {
        let expected = self.expected();
        let live = self.live(driver).await?.managed();
        let missing: Vec<String> = expected.difference(&live).map(SchemaItem::statement).collect();
        let unexpected: Vec<String> = live.difference(&expected).map(SchemaItem::statement).collect();
        if missing.is_empty() && unexpected.is_empty() {
            tracing::info!(
                "Schema on '{}' matches the registry ({} items)",
                driver.target_name(),
                expected.len()
            );
            return Ok(());
        }
        Err(OgmError::SchemaMismatch {
            missing,
            unexpected,
        })
    }
}

fn live_item(row: &Record, is_constraint: bool) -> Result<LiveItem> {
    let name = row
        .get_str("name")
        .ok_or_else(|| OgmError::Internal("schema listing row without a name".to_string()))?
        .to_string();
    let kind = row.get_str("type").unwrap_or_default().to_string();
    let on_nodes = row.get_str("entityType").map_or(true, |t| t == "NODE");
    let labels = row.get_strings("labelsOrTypes");
    let properties = row.get_strings("properties");

    let comparable = on_nodes && labels.len() == 1 && !properties.is_empty();
    let item = if !comparable {
        None
    } else if is_constraint && kind.contains("UNIQUENESS") && properties.len() == 1 {
        Some(SchemaItem::unique(&labels[0], &properties[0]))
    } else if !is_constraint && (kind == "RANGE" || kind == "BTREE") {
        Some(SchemaItem::index(&labels[0], &properties))
    } else {
        None
    };
    Ok(LiveItem {
        name,
        kind,
        item,
        is_constraint,
    })
}

/// Run statements in one transaction; roll back on the first failure.
async fn run_all(driver: &dyn GraphDriver, statements: &[Statement]) -> Result<usize> {
    if statements.is_empty() {
        return Ok(0);
    }
    let mut txn = driver.begin().await?;
    for statement in statements {
        tracing::debug!("Schema statement on '{}': {}", driver.target_name(), statement);
        if let Err(e) = txn.run(statement).await {
            rollback_quietly(txn, "schema change").await;
            return Err(e);
        }
    }
    txn.commit().await?;
    Ok(statements.len())
}
