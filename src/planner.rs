//! Write planner.
//!
//! Walks an object graph depth-first from a root entity and flattens it into
//! node upserts (grouped by label, one per identity) and relationship upserts
//! (grouped by relationship type).
//!
//! ## Cycles
//!
//! Before stepping into a neighbour the planner compares the neighbour's
//! identity with the identity it arrived from. A match ends that branch: the
//! edge is still recorded (and de-duplicated), but the walk does not step back.
//! The check is one step deep, not a global visited set, so a node reachable
//! through two paths is walked twice and both paths contribute their edges.
//! The depth bound keeps longer cycles finite.
//!
//! ## Generated keys
//!
//! Keys generated for new nodes and relationship-objects are kept on the plan
//! as [`AssignedKey`]s and only written onto the instances by
//! [`SavePlan::apply_assigned_keys`], once the save has committed.

use crate::entity::{Entity, EntityRef};
use crate::error::{OgmError, Result};
use crate::metadata::{Direction, FieldDescriptor, FieldKind, Registry, TypeDescriptor};
use crate::value::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Instant;

/// Largest accepted save/load depth.
pub const MAX_DEPTH: usize = 10;

/// Prefix of the planner-local identities given to new nodes under the native strategy.
pub const TEMP_KEY_PREFIX: &str = "new:";

/// Reject depths outside `0..=MAX_DEPTH`.
pub fn check_depth(depth: usize) -> Result<()> {
    if depth > MAX_DEPTH {
        return Err(OgmError::Configuration(format!(
            "depth {} is outside 0..={}",
            depth, MAX_DEPTH
        )));
    }
    Ok(())
}

/// One node upsert.
#[derive(Debug, Clone)]
pub struct PlannedNode {
    pub identity: String,
    pub label: String,
    /// The identity was assigned during this plan.
    pub is_new: bool,
    /// Primary-key value as stored (absent for native-strategy nodes).
    pub key: Option<Value>,
    /// Stored properties, primary key excluded.
    pub params: BTreeMap<String, Value>,
    pub entity: EntityRef,
}

impl PlannedNode {
    /// Graph id of an existing node under the native strategy.
    pub fn native_id(&self) -> Option<i64> {
        if self.is_new {
            None
        } else {
            self.identity.parse().ok()
        }
    }
}

/// One relationship upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipEdge {
    pub start_key: String,
    pub end_key: String,
    pub label: String,
    /// `Outgoing` (start to end) or `Both` (undirected).
    pub direction: Direction,
    /// Backed by a relationship-object instance.
    pub object: bool,
    /// Primary key of a relationship-object, when it carries one.
    pub key: Option<Value>,
    pub params: BTreeMap<String, Value>,
}

/// A key generated during planning, not yet written onto its instance.
#[derive(Debug, Clone)]
pub struct AssignedKey {
    pub entity: EntityRef,
    pub field_name: &'static str,
    pub value: Value,
}

/// Output of [`plan`].
#[derive(Debug, Default)]
pub struct SavePlan {
    pub nodes: BTreeMap<String, Vec<PlannedNode>>,
    pub relationships: BTreeMap<String, Vec<RelationshipEdge>>,
    pub assigned_keys: Vec<AssignedKey>,
}

impl SavePlan {
    pub fn node_count(&self) -> usize {
        self.nodes.values().map(Vec::len).sum()
    }

    pub fn relationship_count(&self) -> usize {
        self.relationships.values().map(Vec::len).sum()
    }

    /// All planned nodes, label by label.
    pub fn planned_nodes(&self) -> impl Iterator<Item = &PlannedNode> {
        self.nodes.values().flatten()
    }

    pub fn find_node(&self, label: &str, identity: &str) -> Option<&PlannedNode> {
        self.nodes
            .get(label)
            .and_then(|nodes| nodes.iter().find(|n| n.identity == identity))
    }

    /// Write generated keys onto their instances. Call after commit.
    pub fn apply_assigned_keys(&self) -> Result<usize> {
        for assigned in &self.assigned_keys {
            assigned
                .entity
                .write()
                .set(assigned.field_name, assigned.value.clone())?;
        }
        Ok(self.assigned_keys.len())
    }
}

#[derive(Clone)]
struct Identity {
    key: String,
    is_new: bool,
    /// Generated key value, pending write-back.
    generated: Option<Value>,
}

struct Planner<'r> {
    registry: &'r Registry,
    max_depth: usize,
    identities: HashMap<usize, Identity>,
    nodes_seen: HashSet<(String, String)>,
    edges_seen: HashSet<(String, String, String)>,
    objects_seen: HashSet<usize>,
    next_temp: usize,
    plan: SavePlan,
}

/// Walk `root` to `max_depth` hops and flatten what is reachable.
pub fn plan(registry: &Registry, root: &EntityRef, max_depth: usize) -> Result<SavePlan> {
    check_depth(max_depth)?;
    let started = Instant::now();

    let root_descriptor = registry.descriptor_of(root)?;
    if root_descriptor.is_relationship_object {
        return Err(OgmError::Configuration(format!(
            "{} is a relationship object and cannot be saved on its own",
            root_descriptor.type_key
        )));
    }

    let mut planner = Planner {
        registry,
        max_depth,
        identities: HashMap::new(),
        nodes_seen: HashSet::new(),
        edges_seen: HashSet::new(),
        objects_seen: HashSet::new(),
        next_temp: 0,
        plan: SavePlan::default(),
    };
    planner.visit(root, 0, None)?;

    let plan = planner.plan;
    tracing::info!(
        "Planned save of {}: {} nodes, {} relationships in {:?}",
        root_descriptor.label,
        plan.node_count(),
        plan.relationship_count(),
        started.elapsed()
    );
    Ok(plan)
}

impl<'r> Planner<'r> {
    fn visit(&mut self, entity: &EntityRef, depth: usize, from: Option<&str>) -> Result<String> {
        let registry = self.registry;
        let descriptor = registry.descriptor_of(entity)?;
        if descriptor.is_relationship_object {
            return Err(OgmError::Configuration(format!(
                "{} is a relationship object but was reached as a node",
                descriptor.type_key
            )));
        }
        let identity = self.identify(entity, descriptor)?;

        if self
            .nodes_seen
            .insert((descriptor.label.clone(), identity.key.clone()))
        {
            let (key, params) = {
                let guard = entity.read();
                let key = match descriptor.primary_key() {
                    Some(pk) if !registry.strategy().is_graph_native() => Some(
                        identity
                            .generated
                            .clone()
                            .unwrap_or_else(|| guard.get(pk.field_name).unwrap_or_default())
                            .into_storage(),
                    ),
                    _ => None,
                };
                (key, snapshot(&*guard, descriptor)?)
            };
            tracing::debug!(
                "Planning {} {} (new: {}, depth {})",
                descriptor.label,
                identity.key,
                identity.is_new,
                depth
            );
            self.plan
                .nodes
                .entry(descriptor.label.clone())
                .or_default()
                .push(PlannedNode {
                    identity: identity.key.clone(),
                    label: descriptor.label.clone(),
                    is_new: identity.is_new,
                    key,
                    params,
                    entity: entity.clone(),
                });
        }

        if depth >= self.max_depth {
            return Ok(identity.key);
        }

        for field in descriptor.relationships() {
            let targets = entity.read().related(field.field_name);
            for target in targets {
                self.follow(entity, &identity.key, field, &target, depth, from)?;
            }
        }
        Ok(identity.key)
    }

    fn follow(
        &mut self,
        owner: &EntityRef,
        owner_key: &str,
        field: &FieldDescriptor,
        target: &EntityRef,
        depth: usize,
        from: Option<&str>,
    ) -> Result<()> {
        let registry = self.registry;
        let label = field.relationship_label.as_deref().ok_or_else(|| {
            OgmError::Internal(format!("{} has no relationship label", field.field_name))
        })?;
        let target_descriptor = registry.descriptor_of(target)?;

        if target_descriptor.is_relationship_object {
            return self.follow_object(owner, owner_key, label, target, target_descriptor, depth, from);
        }

        let target_key = self.identify(target, target_descriptor)?.key;
        let (start, end) = match field.direction {
            Direction::Incoming => (target_key.as_str(), owner_key),
            _ => (owner_key, target_key.as_str()),
        };
        let direction = if field.direction == Direction::Both {
            Direction::Both
        } else {
            Direction::Outgoing
        };
        self.push_edge(RelationshipEdge {
            start_key: start.to_string(),
            end_key: end.to_string(),
            label: label.to_string(),
            direction,
            object: false,
            key: None,
            params: BTreeMap::new(),
        });

        if from == Some(target_key.as_str()) || target_key == owner_key {
            tracing::debug!("Not stepping back from {} into {}", owner_key, target_key);
            return Ok(());
        }
        self.visit(target, depth + 1, Some(owner_key))?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn follow_object(
        &mut self,
        owner: &EntityRef,
        owner_key: &str,
        label: &str,
        edge: &EntityRef,
        edge_descriptor: &TypeDescriptor,
        depth: usize,
        from: Option<&str>,
    ) -> Result<()> {
        let registry = self.registry;
        let (start, end) = {
            let guard = edge.read();
            let sides = guard.as_edge().ok_or_else(|| {
                OgmError::Internal(format!(
                    "{} is registered as a relationship object but exposes no endpoints",
                    edge_descriptor.type_key
                ))
            })?;
            (sides.start_node(), sides.end_node())
        };
        let (Some(start), Some(end)) = (start, end) else {
            return Err(OgmError::Data(format!(
                "{} edge is invalid, sides not set",
                edge_descriptor.label
            )));
        };

        let start_key = self.identify(&start, registry.descriptor_of(&start)?)?.key;
        let end_key = self.identify(&end, registry.descriptor_of(&end)?)?.key;

        let (other, other_key) = if start.ptr_eq(owner) || start_key == owner_key {
            (end, end_key.clone())
        } else if end.ptr_eq(owner) || end_key == owner_key {
            (start, start_key.clone())
        } else {
            return Err(OgmError::Data(format!(
                "{} edge doesn't point to parent {}",
                edge_descriptor.label, owner_key
            )));
        };

        if self.objects_seen.insert(edge.addr()) {
            let key = self.edge_key(edge, edge_descriptor)?;
            let mut params = {
                let guard = edge.read();
                snapshot(&*guard, edge_descriptor)?
            };
            if let (Some(pk), Some(value)) = (edge_descriptor.primary_key(), &key) {
                params.insert(pk.storage_name.clone(), value.clone().into_storage());
            }
            self.push_edge(RelationshipEdge {
                start_key: start_key.clone(),
                end_key: end_key.clone(),
                label: label.to_string(),
                direction: Direction::Outgoing,
                object: true,
                key,
                params,
            });
        }

        if from == Some(other_key.as_str()) || other_key == owner_key {
            tracing::debug!("Not stepping back from {} into {}", owner_key, other_key);
            return Ok(());
        }
        self.visit(&other, depth + 1, Some(owner_key))?;
        Ok(())
    }

    /// Resolve the identity of a node, assigning one if it has none.
    fn identify(&mut self, entity: &EntityRef, descriptor: &TypeDescriptor) -> Result<Identity> {
        if let Some(known) = self.identities.get(&entity.addr()) {
            return Ok(known.clone());
        }
        let pk = descriptor.primary_key().ok_or_else(|| {
            OgmError::Configuration(format!("{} has no primary key", descriptor.type_key))
        })?;
        let strategy = self.registry.strategy();

        let current = entity.read().get(pk.field_name).unwrap_or_default();
        let identity = match current.to_key() {
            Some(key) => Identity {
                key,
                is_new: false,
                generated: None,
            },
            None if strategy.is_graph_native() => {
                self.next_temp += 1;
                Identity {
                    key: format!("{}{}", TEMP_KEY_PREFIX, self.next_temp),
                    is_new: true,
                    generated: None,
                }
            }
            None => {
                let value = strategy.generate()?.ok_or_else(|| {
                    OgmError::Configuration(format!(
                        "strategy '{}' cannot generate keys",
                        strategy.name()
                    ))
                })?;
                let key = value.to_key().ok_or_else(|| {
                    OgmError::Internal(format!(
                        "strategy '{}' generated an unusable key",
                        strategy.name()
                    ))
                })?;
                self.plan.assigned_keys.push(AssignedKey {
                    entity: entity.clone(),
                    field_name: pk.field_name,
                    value: value.clone(),
                });
                Identity {
                    key,
                    is_new: true,
                    generated: Some(value),
                }
            }
        };
        self.identities.insert(entity.addr(), identity.clone());
        Ok(identity)
    }

    /// Primary key of a relationship-object, generated when missing. Native keys are left to the graph.
    fn edge_key(&mut self, edge: &EntityRef, descriptor: &TypeDescriptor) -> Result<Option<Value>> {
        let strategy = self.registry.strategy();
        let Some(pk) = descriptor.primary_key() else {
            return Ok(None);
        };
        if strategy.is_graph_native() {
            return Ok(None);
        }
        let current = edge.read().get(pk.field_name).unwrap_or_default();
        if current.to_key().is_some() {
            return Ok(Some(current));
        }
        let generated = strategy.generate()?;
        if let Some(value) = &generated {
            self.plan.assigned_keys.push(AssignedKey {
                entity: edge.clone(),
                field_name: pk.field_name,
                value: value.clone(),
            });
        }
        Ok(generated)
    }

    fn push_edge(&mut self, edge: RelationshipEdge) {
        // Object edges are de-duplicated by instance before reaching here.
        if !edge.object {
            let (a, b) = if edge.direction == Direction::Both && edge.end_key < edge.start_key {
                (&edge.end_key, &edge.start_key)
            } else {
                (&edge.start_key, &edge.end_key)
            };
            if !self
                .edges_seen
                .insert((edge.label.clone(), a.clone(), b.clone()))
            {
                return;
            }
        }
        self.plan
            .relationships
            .entry(edge.label.clone())
            .or_default()
            .push(edge);
    }
}

/// Stored properties of an entity: scalars and flattened property maps.
/// The primary key is left out.
pub fn snapshot(entity: &dyn Entity, descriptor: &TypeDescriptor) -> Result<BTreeMap<String, Value>> {
    let mut params = BTreeMap::new();
    for field in &descriptor.fields {
        match field.kind {
            FieldKind::Scalar => {
                let value = entity.get(field.field_name).unwrap_or_default();
                params.insert(field.storage_name.clone(), value.into_storage());
            }
            FieldKind::PropertyMap => match entity.get(field.field_name) {
                Some(Value::Map(map)) => {
                    let prefix = field.map_prefix();
                    for (k, v) in map {
                        params.insert(format!("{}{}", prefix, k), v.into_storage());
                    }
                }
                Some(Value::Null) | None => {}
                Some(other) => {
                    return Err(OgmError::Data(format!(
                        "{}.{} must be a map, got {}",
                        descriptor.type_key,
                        field.field_name,
                        other.value_type()
                    )))
                }
            },
            _ => {}
        }
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{shared, Shared};
    use crate::metadata::PrimaryKeyStrategy;
    use crate::test_helpers::{cast, registry, Movie, Person, Role, Tag};

    fn person(name: &str) -> Shared<Person> {
        shared(Person {
            name: name.to_string(),
            ..Default::default()
        })
    }

    fn movie(title: &str) -> Shared<Movie> {
        shared(Movie {
            title: title.to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn test_depth_zero_yields_single_node() {
        let registry = registry(PrimaryKeyStrategy::uuid());
        let a = person("Al");
        let b = person("Bo");
        a.write().friends.push(b.clone());
        let m = movie("Heat");
        Role::link(&a, &m, &["Neil"]);

        let plan = plan(&registry, &EntityRef::from_shared(&a), 0).unwrap();
        assert_eq!(plan.node_count(), 1);
        assert_eq!(plan.relationship_count(), 0);
    }

    #[test]
    fn test_depth_out_of_range_fails() {
        let registry = registry(PrimaryKeyStrategy::uuid());
        let a = EntityRef::from_shared(&person("Al"));
        assert!(matches!(
            plan(&registry, &a, MAX_DEPTH + 1),
            Err(OgmError::Configuration(_))
        ));
        assert!(plan(&registry, &a, MAX_DEPTH).is_ok());
    }

    #[test]
    fn test_generated_uuid_is_written_back_only_on_apply() {
        let registry = registry(PrimaryKeyStrategy::uuid());
        let a = person("Al");
        let plan = plan(&registry, &EntityRef::from_shared(&a), 1).unwrap();
        assert!(a.read().uuid.is_none());
        assert_eq!(plan.assigned_keys.len(), 1);

        let node = plan.planned_nodes().next().unwrap();
        assert!(node.is_new);
        assert_eq!(node.params["name"], Value::from("Al"));
        assert!(!node.params.contains_key("uuid"));

        assert_eq!(plan.apply_assigned_keys().unwrap(), 1);
        let uuid = a.read().uuid.clone().unwrap();
        assert_eq!(node.identity, uuid);
        assert_eq!(node.key, Some(Value::String(uuid)));
    }

    #[test]
    fn test_existing_identity_is_kept() {
        let registry = registry(PrimaryKeyStrategy::uuid());
        let a = person("Al");
        a.write().uuid = Some("fixed".into());
        let plan = plan(&registry, &EntityRef::from_shared(&a), 1).unwrap();
        let node = plan.find_node("Person", "fixed").unwrap();
        assert!(!node.is_new);
    }

    #[test]
    fn test_inverse_cycle_yields_one_edge() {
        let registry = registry(PrimaryKeyStrategy::uuid());
        let a = person("Al");
        let b = person("Bo");
        a.write().friends.push(b.clone());
        b.write().friend_of.push(a.clone());

        let plan = plan(&registry, &EntityRef::from_shared(&a), 3).unwrap();
        plan.apply_assigned_keys().unwrap();
        assert_eq!(plan.node_count(), 2);
        let edges = &plan.relationships["FRIENDS_WITH"];
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].start_key, a.read().uuid.clone().unwrap());
        assert_eq!(edges[0].end_key, b.read().uuid.clone().unwrap());
    }

    #[test]
    fn test_incoming_field_swaps_endpoints() {
        let registry = registry(PrimaryKeyStrategy::uuid());
        let a = person("Al");
        let b = person("Bo");
        b.write().friend_of.push(a.clone());

        let plan = plan(&registry, &EntityRef::from_shared(&b), 1).unwrap();
        plan.apply_assigned_keys().unwrap();
        let edge = &plan.relationships["FRIENDS_WITH"][0];
        assert_eq!(edge.start_key, a.read().uuid.clone().unwrap());
        assert_eq!(edge.end_key, b.read().uuid.clone().unwrap());
        assert_eq!(edge.direction, Direction::Outgoing);
    }

    #[test]
    fn test_longer_cycle_terminates() {
        let registry = registry(PrimaryKeyStrategy::uuid());
        let a = person("Al");
        let b = person("Bo");
        let c = person("Cy");
        a.write().friends.push(b.clone());
        b.write().friends.push(c.clone());
        c.write().friends.push(a.clone());

        let plan = plan(&registry, &EntityRef::from_shared(&a), MAX_DEPTH).unwrap();
        assert_eq!(plan.node_count(), 3);
        assert_eq!(plan.relationships["FRIENDS_WITH"].len(), 3);
    }

    #[test]
    fn test_relationship_object_becomes_edge_with_params() {
        let registry = registry(PrimaryKeyStrategy::uuid());
        let a = person("Al");
        let m = movie("Heat");
        let role = Role::link(&a, &m, &["Neil", "Narrator"]);

        let plan = plan(&registry, &EntityRef::from_shared(&a), 1).unwrap();
        assert!(role.read().uuid.is_none());
        plan.apply_assigned_keys().unwrap();
        assert_eq!(plan.node_count(), 2);
        let edges = &plan.relationships["ACTED_IN"];
        assert_eq!(edges.len(), 1);
        let edge = &edges[0];
        assert_eq!(edge.start_key, a.read().uuid.clone().unwrap());
        assert_eq!(edge.end_key, m.read().uuid.clone().unwrap());
        assert_eq!(
            edge.params["roles"],
            Value::from(vec!["Neil", "Narrator"])
        );
        assert!(edge.object);
        assert!(role.read().uuid.is_some());
        assert_eq!(edge.key, role.read().uuid.clone().map(Value::String));
        assert_eq!(edge.params.get("uuid"), edge.key.as_ref());
    }

    #[test]
    fn test_undirected_field_on_both_sides_yields_one_edge() {
        let registry = registry(PrimaryKeyStrategy::uuid());
        let a = person("Al");
        let b = person("Bo");
        a.write().knows.push(b.clone());
        b.write().knows.push(a.clone());

        for root in [&a, &b] {
            let plan = plan(&registry, &EntityRef::from_shared(root), 3).unwrap();
            let edges = &plan.relationships["KNOWS"];
            assert_eq!(edges.len(), 1);
            assert_eq!(edges[0].direction, Direction::Both);
            assert!(!edges[0].object);
        }
    }

    #[test]
    fn test_undirected_edges_dedupe_by_sorted_pair() {
        let registry = registry(PrimaryKeyStrategy::uuid());
        let a = person("Al");
        let b = person("Bo");
        a.write().uuid = Some("b-key".into());
        b.write().uuid = Some("a-key".into());
        a.write().knows.push(b.clone());
        b.write().knows.push(a.clone());
        // Reached through a third node, so the pair is seen from both ends.
        let c = person("Cy");
        c.write().knows.push(a.clone());
        c.write().knows.push(b.clone());

        let plan = plan(&registry, &EntityRef::from_shared(&c), MAX_DEPTH).unwrap();
        let edges = &plan.relationships["KNOWS"];
        let between = edges
            .iter()
            .filter(|e| {
                let mut pair = [e.start_key.as_str(), e.end_key.as_str()];
                pair.sort();
                pair == ["a-key", "b-key"]
            })
            .count();
        assert_eq!(between, 1);
        assert_eq!(edges.len(), 3);
    }

    #[test]
    fn test_single_valued_field_matches_inverse_collection() {
        let registry = registry(PrimaryKeyStrategy::uuid());
        let michael = person("Michael");
        let heat = movie("Heat");
        heat.write().director = Some(michael.clone());
        michael.write().directed.push(heat.clone());

        let plan = plan(&registry, &EntityRef::from_shared(&heat), 2).unwrap();
        plan.apply_assigned_keys().unwrap();
        let edges = &plan.relationships["DIRECTED"];
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].start_key, michael.read().uuid.clone().unwrap());
        assert_eq!(edges[0].end_key, heat.read().uuid.clone().unwrap());
        assert_eq!(edges[0].direction, Direction::Outgoing);
    }

    #[test]
    fn test_keyless_relationship_objects_are_kept_apart() {
        let registry = registry(PrimaryKeyStrategy::native());
        let a = person("Al");
        let m = movie("Heat");
        Role::link(&a, &m, &[]);
        Role::link(&a, &m, &[]);

        let plan = plan(&registry, &EntityRef::from_shared(&a), 1).unwrap();
        let edges = &plan.relationships["ACTED_IN"];
        assert_eq!(edges.len(), 2);
        assert!(edges.iter().all(|e| e.object && e.key.is_none()));
        assert!(plan.assigned_keys.is_empty());
    }

    #[test]
    fn test_relationship_object_reached_from_both_sides_is_emitted_once() {
        let registry = registry(PrimaryKeyStrategy::uuid());
        let a = person("Al");
        let m = movie("Heat");
        Role::link(&a, &m, &["Neil"]);

        let plan = plan(&registry, &EntityRef::from_shared(&m), 4).unwrap();
        assert_eq!(plan.relationships["ACTED_IN"].len(), 1);
        assert_eq!(plan.node_count(), 2);
    }

    #[test]
    fn test_relationship_object_without_sides_fails() {
        let registry = registry(PrimaryKeyStrategy::uuid());
        let a = person("Al");
        a.write().acted_in.push(shared(Role::default()));
        let err = plan(&registry, &EntityRef::from_shared(&a), 1).unwrap_err();
        assert!(err.to_string().contains("sides not set"));
    }

    #[test]
    fn test_relationship_object_not_pointing_to_parent_fails() {
        let registry = registry(PrimaryKeyStrategy::uuid());
        let a = person("Al");
        let stranger = person("Zed");
        let m = movie("Heat");
        let role = Role::link(&stranger, &m, &[]);
        a.write().acted_in.push(role);
        let err = plan(&registry, &EntityRef::from_shared(&a), 1).unwrap_err();
        assert!(err.to_string().contains("doesn't point to parent"));
    }

    #[test]
    fn test_unregistered_type_fails() {
        let mut builder = crate::metadata::RegistryBuilder::new(PrimaryKeyStrategy::uuid());
        builder.register::<Tag>().unwrap();
        let registry = builder.build().unwrap();
        let a = EntityRef::from_shared(&person("Al"));
        assert!(matches!(
            plan(&registry, &a, 1),
            Err(OgmError::UnregisteredType(_))
        ));
    }

    #[test]
    fn test_native_strategy_uses_temporary_keys() {
        let registry = registry(PrimaryKeyStrategy::native());
        let t = shared(Tag {
            name: "noir".into(),
            ..Default::default()
        });
        let plan = plan(&registry, &EntityRef::from_shared(&t), 0).unwrap();
        let node = plan.planned_nodes().next().unwrap();
        assert!(node.is_new);
        assert!(node.identity.starts_with(TEMP_KEY_PREFIX));
        assert_eq!(node.key, None);
        assert!(t.read().id.is_none());
        assert_eq!(node.native_id(), None);
    }

    #[test]
    fn test_native_strategy_existing_node() {
        let registry = registry(PrimaryKeyStrategy::native());
        let t = shared(Tag {
            id: Some(41),
            name: "noir".into(),
            ..Default::default()
        });
        let plan = plan(&registry, &EntityRef::from_shared(&t), 0).unwrap();
        let node = plan.planned_nodes().next().unwrap();
        assert!(!node.is_new);
        assert_eq!(node.native_id(), Some(41));
    }

    #[test]
    fn test_property_map_is_flattened() {
        let registry = registry(PrimaryKeyStrategy::uuid());
        let m = movie("Heat");
        m.write().attrs.insert("rating".into(), Value::from("R"));
        let plan = plan(&registry, &EntityRef::from_shared(&m), 0).unwrap();
        let node = plan.planned_nodes().next().unwrap();
        assert_eq!(node.params["attrs.rating"], Value::from("R"));
        let back = cast::<Movie>(&node.entity);
        assert!(std::sync::Arc::ptr_eq(&back, &m));
    }
}
