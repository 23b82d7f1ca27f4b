//! Read reconstructor.
//!
//! Rebuilds a typed, cross-linked object graph from a [`WireTuple`].
//!
//! Three passes run in parallel on rayon and only read the tuple:
//! node conversion (primaries and others into fresh instances), primary-id
//! extraction, and edge resolution (matching each relationship to the fields
//! it populates and building relationship-objects). Linking runs after the
//! join, single-threaded, because it mutates the converted instances.

use crate::entity::{Entity, EntityRef, Shared};
use crate::error::{OgmError, Result};
use crate::metadata::{Registry, RelationshipMatch, TypeDescriptor};
use crate::value::{parse_timestamp, Value};
use crate::wire::{WireEdge, WireNode, WireTuple};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Instant;

/// Result of a reconstruction. Owns every instance built from the tuple.
#[derive(Debug, Default)]
pub struct ObjectGraph {
    /// Every node instance, by graph id.
    pub by_id: HashMap<i64, EntityRef>,
    /// Relationship-object instances, by relationship id.
    pub edges_by_id: HashMap<i64, EntityRef>,
    /// Primary node ids in result order.
    pub primary_ids: Vec<i64>,
}

impl ObjectGraph {
    pub fn get(&self, id: i64) -> Option<&EntityRef> {
        self.by_id.get(&id)
    }

    /// Primary instances in result order.
    pub fn primaries(&self) -> Vec<EntityRef> {
        self.primary_ids
            .iter()
            .filter_map(|id| self.by_id.get(id).cloned())
            .collect()
    }

    /// The first primary instance, typed.
    pub fn into_single<T: Entity>(self) -> Result<Shared<T>> {
        let id = self
            .primary_ids
            .first()
            .ok_or_else(|| OgmError::NotFound("no primary nodes in result".to_string()))?;
        self.by_id
            .get(id)
            .ok_or_else(|| OgmError::Internal(format!("primary node {} was not built", id)))?
            .cast::<T>()
    }

    /// Every primary instance, typed, in result order.
    pub fn into_all<T: Entity>(self) -> Result<Vec<Shared<T>>> {
        self.primary_ids
            .iter()
            .map(|id| {
                self.by_id
                    .get(id)
                    .ok_or_else(|| {
                        OgmError::Internal(format!("primary node {} was not built", id))
                    })
                    .and_then(|e| e.cast::<T>())
            })
            .collect()
    }
}

/// One relationship ready to be linked.
struct Link<'a> {
    edge: &'a WireEdge,
    matched: &'a RelationshipMatch,
    object: Option<EntityRef>,
}

/// Rebuild the object graph held by `tuple`.
pub fn reconstruct(registry: &Registry, tuple: &WireTuple) -> Result<ObjectGraph> {
    let started = Instant::now();
    if !tuple.has_primaries() {
        return Err(OgmError::Data(
            "result has no primary nodes".to_string(),
        ));
    }
    if let Some(Some(edge)) = tuple.edges.first() {
        tracing::warn!(
            "Sentinel slot holds relationship {} ({}); skipping it",
            edge.id,
            edge.edge_type
        );
    }

    let (nodes, (primary_ids, links)) = rayon::join(
        || convert_nodes(registry, tuple),
        || {
            rayon::join(
                || primary_ids(tuple),
                || resolve_edges(registry, tuple),
            )
        },
    );
    let by_id = nodes?;
    let primary_ids = primary_ids?;
    let links = links?;
    tracing::debug!(
        "Converted {} nodes, {} primaries, {} edges",
        by_id.len(),
        primary_ids.len(),
        links.len()
    );

    let mut edges_by_id = HashMap::new();
    for link in links {
        let start = endpoint(&by_id, link.edge.start_id, link.edge)?;
        let end = endpoint(&by_id, link.edge.end_id, link.edge)?;
        match link.object {
            Some(object) => {
                {
                    let mut guard = object.write();
                    let sides = guard.as_edge_mut().ok_or_else(|| {
                        OgmError::Internal(format!(
                            "{} exposes no endpoints",
                            object.type_key()
                        ))
                    })?;
                    sides.set_start_node(start.clone())?;
                    sides.set_end_node(end.clone())?;
                }
                if let Some(side) = &link.matched.start_side {
                    start.write().relate(side.field_name, object.clone())?;
                }
                if let Some(side) = &link.matched.end_side {
                    end.write().relate(side.field_name, object.clone())?;
                }
                edges_by_id.insert(link.edge.id, object);
            }
            None => {
                if let Some(side) = &link.matched.start_side {
                    start.write().relate(side.field_name, end.clone())?;
                }
                if let Some(side) = &link.matched.end_side {
                    end.write().relate(side.field_name, start.clone())?;
                }
            }
        }
    }

    tracing::info!(
        "Reconstructed {} instances ({} primaries) in {:?}",
        by_id.len(),
        primary_ids.len(),
        started.elapsed()
    );
    Ok(ObjectGraph {
        by_id,
        edges_by_id,
        primary_ids,
    })
}

fn endpoint<'g>(
    by_id: &'g HashMap<i64, EntityRef>,
    id: i64,
    edge: &WireEdge,
) -> Result<&'g EntityRef> {
    by_id.get(&id).ok_or_else(|| {
        OgmError::Data(format!(
            "relationship {} ({}) points to node {} which is not in the result",
            edge.id, edge.edge_type, id
        ))
    })
}

fn convert_nodes(registry: &Registry, tuple: &WireTuple) -> Result<HashMap<i64, EntityRef>> {
    let mut by_id = HashMap::with_capacity(tuple.primary_nodes.len() + tuple.other_nodes.len());
    for node in &tuple.primary_nodes {
        if by_id.contains_key(&node.id) {
            tracing::warn!("Primary node {} appears twice in the result", node.id);
            continue;
        }
        by_id.insert(node.id, build_node(registry, node)?);
    }
    for node in &tuple.other_nodes {
        if by_id.contains_key(&node.id) {
            continue;
        }
        by_id.insert(node.id, build_node(registry, node)?);
    }
    Ok(by_id)
}

fn primary_ids(tuple: &WireTuple) -> Result<Vec<i64>> {
    let mut seen = HashSet::new();
    Ok(tuple
        .primary_nodes
        .iter()
        .map(|n| n.id)
        .filter(|id| seen.insert(*id))
        .collect())
}

fn resolve_edges<'a>(registry: &'a Registry, tuple: &'a WireTuple) -> Result<Vec<Link<'a>>> {
    let mut labels: HashMap<i64, &str> = HashMap::new();
    for node in tuple.primary_nodes.iter().chain(&tuple.other_nodes) {
        if let Ok(descriptor) = registry.for_labels(&node.labels) {
            labels.entry(node.id).or_insert(descriptor.label.as_str());
        }
    }

    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for edge in tuple.relationships()? {
        if !seen.insert(edge.id) {
            continue;
        }
        let label_of = |id: i64| {
            labels.get(&id).copied().ok_or_else(|| {
                OgmError::Data(format!(
                    "relationship {} ({}) points to node {} which is not in the result",
                    edge.id, edge.edge_type, id
                ))
            })
        };
        let matched = registry.resolve_relationship(
            label_of(edge.start_id)?,
            &edge.edge_type,
            label_of(edge.end_id)?,
        )?;
        let object = match matched.edge_type {
            Some(key) => {
                let descriptor = registry.descriptor(key)?;
                let instance = descriptor.instantiate();
                {
                    let mut guard = instance.write();
                    populate(&mut *guard, descriptor, &edge.properties, registry, edge.id)?;
                }
                Some(instance)
            }
            None => None,
        };
        links.push(Link {
            edge,
            matched,
            object,
        });
    }
    Ok(links)
}

fn build_node(registry: &Registry, node: &WireNode) -> Result<EntityRef> {
    let descriptor = registry.for_labels(&node.labels)?;
    let instance = descriptor.instantiate();
    {
        let mut guard = instance.write();
        populate(&mut *guard, descriptor, &node.properties, registry, node.id)?;
    }
    Ok(instance)
}

/// Set the identity and every stored property on a fresh instance.
fn populate(
    entity: &mut dyn Entity,
    descriptor: &TypeDescriptor,
    properties: &BTreeMap<String, Value>,
    registry: &Registry,
    graph_id: i64,
) -> Result<()> {
    if registry.strategy().is_graph_native() {
        if let Some(pk) = descriptor.primary_key() {
            entity.set(pk.field_name, Value::Int(graph_id))?;
        }
    }

    let mut maps: HashMap<&'static str, BTreeMap<String, Value>> = HashMap::new();
    for (key, value) in properties {
        if let Some(field) = descriptor.field_by_storage(key) {
            let value = if field.is_temporal {
                match value {
                    Value::String(text) => Value::DateTime(parse_timestamp(text)?),
                    Value::Null => Value::Null,
                    other => {
                        return Err(OgmError::Data(format!(
                            "{}.{} holds a {} value, expected a timestamp",
                            descriptor.label,
                            key,
                            other.value_type()
                        )))
                    }
                }
            } else {
                value.clone()
            };
            entity.set(field.field_name, value)?;
        } else if let Some((field, sub_key)) = descriptor.property_map_for(key) {
            maps.entry(field.field_name)
                .or_default()
                .insert(sub_key, value.clone());
        } else {
            return Err(OgmError::Data(format!(
                "unrecognized property '{}' on {} {}",
                key, descriptor.label, graph_id
            )));
        }
    }
    for field in descriptor.property_maps() {
        let map = maps.remove(field.field_name).unwrap_or_default();
        entity.set(field.field_name, Value::Map(map))?;
    }
    Ok(())
}
