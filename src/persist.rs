//! Batch persistence executor.
//!
//! Turns a [`SavePlan`] into one UNWIND statement per node label and one per
//! relationship type (and direction), runs them in the caller's transaction,
//! and returns the identity → graph id map. Relationships are written after
//! every node batch so both endpoints resolve to graph ids.

use crate::cypher::{escape_identifier, Statement, StatementKind};
use crate::error::{OgmError, Result};
use crate::metadata::{Direction, Registry};
use crate::neo4j::GraphTransaction;
use crate::planner::{PlannedNode, RelationshipEdge, SavePlan};
use crate::value::Value;
use std::collections::{BTreeMap, HashMap};

/// Identity → graph id of every persisted node.
pub type GraphIds = HashMap<String, i64>;

/// Persist the plan in `txn`. A failing statement aborts the remaining
/// batches; batches already run stay in the transaction for the caller to
/// commit or roll back.
pub async fn persist(
    txn: &mut dyn GraphTransaction,
    registry: &Registry,
    plan: &SavePlan,
) -> Result<GraphIds> {
    let native = registry.strategy().is_graph_native();
    let mut ids = GraphIds::new();

    for (label, nodes) in &plan.nodes {
        let pk_field = registry.strategy().db_field_name();
        for statement in node_statements(label, nodes, native, pk_field)? {
            let first = first_identity(&statement);
            let records = txn
                .run(&statement)
                .await
                .map_err(|e| wrap(label, &first, e))?;
            let expected = statement.batch_len();
            let mut returned = 0;
            for record in records {
                let key = record
                    .get("key")
                    .and_then(Value::to_key)
                    .ok_or_else(|| OgmError::Internal("upsert row without key".to_string()))?;
                let id = record
                    .get_int("id")
                    .ok_or_else(|| OgmError::Internal("upsert row without id".to_string()))?;
                ids.insert(key, id);
                returned += 1;
            }
            if returned != expected {
                return Err(wrap(
                    label,
                    &first,
                    OgmError::Data(format!(
                        "primary key round trip mismatch: sent {} rows, got {} back",
                        expected, returned
                    )),
                ));
            }
            tracing::debug!("Upserted {} {} nodes", expected, label);
        }
    }

    if plan.relationship_count() == 0 {
        tracing::debug!("No relationships to write");
        return Ok(ids);
    }

    for (label, edges) in &plan.relationships {
        let pk_field = registry.strategy().db_field_name();
        for statement in relationship_statements(label, edges, &ids, pk_field)? {
            let first = first_identity(&statement);
            let records = txn
                .run(&statement)
                .await
                .map_err(|e| wrap(label, &first, e))?;
            let expected = statement.batch_len() as i64;
            let written = records
                .first()
                .and_then(|r| r.get_int("written"))
                .unwrap_or_default();
            if written != expected {
                return Err(wrap(
                    label,
                    &first,
                    OgmError::Data(format!(
                        "wrote {} of {} relationships, an endpoint is missing",
                        written, expected
                    )),
                ));
            }
            tracing::debug!("Upserted {} {} relationships", expected, label);
        }
    }

    Ok(ids)
}

/// Write graph ids of freshly created nodes back onto their instances (native strategy).
pub fn write_back_ids(registry: &Registry, plan: &SavePlan, ids: &GraphIds) -> Result<usize> {
    if !registry.strategy().is_graph_native() {
        return Ok(0);
    }
    let mut written = 0;
    for node in plan.planned_nodes().filter(|n| n.is_new) {
        let id = ids.get(&node.identity).ok_or_else(|| {
            OgmError::Data(format!(
                "no graph id returned for new {} {}",
                node.label, node.identity
            ))
        })?;
        let descriptor = registry.descriptor_of(&node.entity)?;
        if let Some(pk) = descriptor.primary_key() {
            node.entity.write().set(pk.field_name, Value::Int(*id))?;
            written += 1;
        }
    }
    Ok(written)
}

fn wrap(label: &str, identity: &str, source: OgmError) -> OgmError {
    OgmError::Persist {
        label: label.to_string(),
        identity: identity.to_string(),
        source: Box::new(source),
    }
}

fn first_identity(statement: &Statement) -> String {
    match statement.params.get("rows") {
        Some(Value::List(rows)) => rows
            .first()
            .and_then(|row| match row {
                Value::Map(m) => m.get("key").and_then(Value::to_key),
                _ => None,
            })
            .unwrap_or_default(),
        _ => String::new(),
    }
}

fn row(entries: Vec<(&str, Value)>) -> Value {
    Value::Map(
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect::<BTreeMap<_, _>>(),
    )
}

/// Upsert statements for the nodes of one label.
fn node_statements(
    label: &str,
    nodes: &[PlannedNode],
    native: bool,
    pk_field: &str,
) -> Result<Vec<Statement>> {
    let label_ident = escape_identifier(label);
    let mut statements = Vec::new();

    if !native {
        let rows: Vec<Value> = nodes
            .iter()
            .map(|n| {
                row(vec![
                    ("key", Value::String(n.identity.clone())),
                    ("pk", n.key.clone().unwrap_or_default()),
                    ("props", Value::Map(n.params.clone())),
                ])
            })
            .collect();
        let text = format!(
            "UNWIND $rows AS row\n\
             MERGE (n:{} {{{}: row.pk}})\n\
             SET n += row.props\n\
             RETURN row.key AS key, id(n) AS id",
            label_ident,
            escape_identifier(pk_field)
        );
        statements.push(
            Statement::new(StatementKind::NodeUpsert, text)
                .param("rows", Value::List(rows))
                .returning(["key", "id"]),
        );
        return Ok(statements);
    }

    let (created, existing): (Vec<&PlannedNode>, Vec<&PlannedNode>) =
        nodes.iter().partition(|n| n.is_new);

    if !existing.is_empty() {
        let rows = existing
            .iter()
            .map(|n| {
                let id = n.native_id().ok_or_else(|| {
                    OgmError::Internal(format!(
                        "{} key '{}' is not a graph id",
                        label, n.identity
                    ))
                })?;
                Ok(row(vec![
                    ("key", Value::String(n.identity.clone())),
                    ("id", Value::Int(id)),
                    ("props", Value::Map(n.params.clone())),
                ]))
            })
            .collect::<Result<Vec<Value>>>()?;
        let text = format!(
            "UNWIND $rows AS row\n\
             MATCH (n:{}) WHERE id(n) = row.id\n\
             SET n += row.props\n\
             RETURN row.key AS key, id(n) AS id",
            label_ident
        );
        statements.push(
            Statement::new(StatementKind::NodeUpsert, text)
                .param("rows", Value::List(rows))
                .returning(["key", "id"]),
        );
    }

    if !created.is_empty() {
        let rows: Vec<Value> = created
            .iter()
            .map(|n| {
                row(vec![
                    ("key", Value::String(n.identity.clone())),
                    ("props", Value::Map(n.params.clone())),
                ])
            })
            .collect();
        let text = format!(
            "UNWIND $rows AS row\n\
             CREATE (n:{})\n\
             SET n += row.props\n\
             RETURN row.key AS key, id(n) AS id",
            label_ident
        );
        statements.push(
            Statement::new(StatementKind::NodeUpsert, text)
                .param("rows", Value::List(rows))
                .returning(["key", "id"]),
        );
    }

    Ok(statements)
}

/// Upsert statements for the relationships of one type, one per direction
/// and key shape. Keyless relationship-objects are always created, so two
/// instances between the same nodes stay two edges.
fn relationship_statements(
    label: &str,
    edges: &[RelationshipEdge],
    ids: &GraphIds,
    pk_field: &str,
) -> Result<Vec<Statement>> {
    let mut groups: BTreeMap<(bool, bool, bool), Vec<Value>> = BTreeMap::new();
    for edge in edges {
        let resolve = |key: &str| {
            ids.get(key).copied().ok_or_else(|| {
                wrap(
                    label,
                    key,
                    OgmError::Data(format!("endpoint {} was not persisted", key)),
                )
            })
        };
        let start = resolve(&edge.start_key)?;
        let end = resolve(&edge.end_key)?;
        let mut entries = vec![
            ("key", Value::String(format!("{}->{}", edge.start_key, edge.end_key))),
            ("start", Value::Int(start)),
            ("end", Value::Int(end)),
            ("props", Value::Map(edge.params.clone())),
        ];
        if let Some(pk) = &edge.key {
            entries.push(("pk", pk.clone()));
        }
        groups
            .entry((
                edge.direction == Direction::Both,
                edge.key.is_some(),
                edge.object,
            ))
            .or_default()
            .push(row(entries));
    }

    let type_ident = escape_identifier(label);
    Ok(groups
        .into_iter()
        .map(|((undirected, keyed, object), rows)| {
            let arrow = if undirected { "-" } else { "->" };
            let key_map = if keyed {
                format!(" {{{}: row.pk}}", escape_identifier(pk_field))
            } else {
                String::new()
            };
            let verb = if object && !keyed { "CREATE" } else { "MERGE" };
            let text = format!(
                "UNWIND $rows AS row\n\
                 MATCH (s) WHERE id(s) = row.start\n\
                 MATCH (e) WHERE id(e) = row.end\n\
                 {} (s)-[r:{}{}]{}(e)\n\
                 SET r += row.props\n\
                 RETURN count(r) AS written",
                verb, type_ident, key_map, arrow
            );
            Statement::new(StatementKind::RelationshipUpsert, text)
                .param("rows", Value::List(rows))
                .returning(["written"])
        })
        .collect())
}
