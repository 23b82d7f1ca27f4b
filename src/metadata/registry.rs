//! Type registry.
//!
//! ## Lifecycle
//!
//! 1. A [`RegistryBuilder`] collects types through `register::<T>()`. Each call
//!    parses the type's declarations once into a [`TypeDescriptor`].
//!    Registering the same type twice is an error until `reset()`.
//! 2. `build()` validates cross-type references (relationship targets,
//!    relationship-object endpoints), indexes relationships by
//!    `(start label, type, end label)` and freezes everything into a [`Registry`].
//! 3. The frozen registry is shared by reference (usually in an `Arc`) with the
//!    planner, reconstructor and schema reconciler. It is never mutated again.

use super::descriptor::{
    Direction, FieldDecl, FieldDescriptor, FieldKind, FieldShape, TypeDescriptor,
};
use super::strategy::PrimaryKeyStrategy;
use super::tags::{parse_tag, TagSpec};
use crate::cypher::is_valid_identifier;
use crate::entity::{EntityRef, Mapped, TypeKey};
use crate::error::{OgmError, Result};
use std::collections::{HashMap, HashSet};

/// Collects type registrations before freezing them.
pub struct RegistryBuilder {
    strategy: PrimaryKeyStrategy,
    types: Vec<TypeDescriptor>,
    index: HashMap<TypeKey, usize>,
}

impl RegistryBuilder {
    pub fn new(strategy: PrimaryKeyStrategy) -> Self {
        Self {
            strategy,
            types: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn strategy(&self) -> &PrimaryKeyStrategy {
        &self.strategy
    }

    /// Parse and record the declarations of `T`.
    pub fn register<T: Mapped>(&mut self) -> Result<&TypeDescriptor> {
        let key = TypeKey::of::<T>();
        if self.index.contains_key(&key) {
            return Err(OgmError::Configuration(format!(
                "type '{}' is already registered",
                key
            )));
        }
        let descriptor = describe::<T>(&self.strategy)?;
        tracing::debug!(
            "Registered {} as '{}' ({} fields, relationship object: {})",
            key,
            descriptor.label,
            descriptor.fields.len(),
            descriptor.is_relationship_object
        );
        self.index.insert(key, self.types.len());
        self.types.push(descriptor);
        Ok(&self.types[self.types.len() - 1])
    }

    /// Forget every registration.
    pub fn reset(&mut self) {
        self.types.clear();
        self.index.clear();
    }

    /// Validate cross-type references and freeze.
    pub fn build(self) -> Result<Registry> {
        let mut labels: HashMap<String, TypeKey> = HashMap::new();
        for descriptor in self.types.iter().filter(|d| !d.is_relationship_object) {
            if let Some(previous) = labels.insert(descriptor.label.clone(), descriptor.type_key) {
                return Err(OgmError::Configuration(format!(
                    "label '{}' is declared by both {} and {}",
                    descriptor.label, previous, descriptor.type_key
                )));
            }
        }

        let by_key: HashMap<TypeKey, &TypeDescriptor> =
            self.types.iter().map(|d| (d.type_key, d)).collect();
        let node_label = |key: &TypeKey, context: &str| -> Result<String> {
            match by_key.get(key) {
                Some(d) if !d.is_relationship_object => Ok(d.label.clone()),
                Some(_) => Err(OgmError::Configuration(format!(
                    "{}: {} is a relationship object, expected a node type",
                    context, key
                ))),
                None => Err(OgmError::UnregisteredType(format!("{} ({})", key, context))),
            }
        };

        for descriptor in self.types.iter().filter(|d| d.is_relationship_object) {
            if let Some((start, end)) = &descriptor.endpoints {
                let context = format!("endpoints of {}", descriptor.type_key);
                node_label(start, &context)?;
                node_label(end, &context)?;
            }
        }

        let mut candidates: HashMap<RelationshipKey, Candidates> = HashMap::new();
        for owner in self.types.iter().filter(|d| !d.is_relationship_object) {
            for field in owner.relationships() {
                let context = format!("{}.{}", owner.type_key, field.field_name);
                let target_key = field
                    .target
                    .ok_or_else(|| OgmError::Internal(format!("{} has no target", context)))?;
                let target = by_key.get(&target_key).ok_or_else(|| {
                    OgmError::UnregisteredType(format!("{} ({})", target_key, context))
                })?;
                let rel_type = field
                    .relationship_label
                    .clone()
                    .ok_or_else(|| OgmError::Internal(format!("{} has no label", context)))?;
                let binding = SideBinding {
                    owner: owner.type_key,
                    field_name: field.field_name,
                    many: field.kind == FieldKind::RelationshipMany,
                    direction: field.direction,
                };

                let mut sides: Vec<(RelationshipKey, Side)> = Vec::new();
                let edge_type = if target.is_relationship_object {
                    let (start, end) = target.endpoints.ok_or_else(|| {
                        OgmError::Internal(format!("{} has no endpoints", target_key))
                    })?;
                    let key = RelationshipKey::new(
                        node_label(&start, &context)?,
                        &rel_type,
                        node_label(&end, &context)?,
                    );
                    let owns_start = start == owner.type_key;
                    let owns_end = end == owner.type_key;
                    match field.direction {
                        Direction::Outgoing if owns_start => sides.push((key, Side::Start)),
                        Direction::Incoming if owns_end => sides.push((key, Side::End)),
                        Direction::Both if owns_start || owns_end => {
                            if owns_start {
                                sides.push((key.clone(), Side::Start));
                            }
                            if owns_end {
                                sides.push((key, Side::End));
                            }
                        }
                        _ => {
                            return Err(OgmError::Configuration(format!(
                                "{}: direction {} does not fit {} ({} -> {})",
                                context, field.direction, target_key, start, end
                            )))
                        }
                    }
                    Some(target_key)
                } else {
                    let here = owner.label.clone();
                    let there = node_label(&target_key, &context)?;
                    match field.direction {
                        Direction::Outgoing => {
                            sides.push((RelationshipKey::new(here, &rel_type, there), Side::Start))
                        }
                        Direction::Incoming => {
                            sides.push((RelationshipKey::new(there, &rel_type, here), Side::End))
                        }
                        _ => {
                            sides.push((
                                RelationshipKey::new(here.clone(), &rel_type, there.clone()),
                                Side::Start,
                            ));
                            sides.push((RelationshipKey::new(there, &rel_type, here), Side::End));
                        }
                    }
                    None
                };

                for (key, side) in sides {
                    let entry = candidates.entry(key.clone()).or_default();
                    if !entry.bindings_empty() && entry.edge_type != edge_type {
                        return Err(OgmError::Configuration(format!(
                            "relationship {} is mapped both as a plain relationship and as a relationship object",
                            key
                        )));
                    }
                    entry.edge_type = edge_type;
                    match side {
                        Side::Start => entry.start_side.push(binding.clone()),
                        Side::End => entry.end_side.push(binding.clone()),
                    }
                }
            }
        }

        let relationships = candidates
            .into_iter()
            .map(|(key, c)| {
                let resolved = RelationshipMatch {
                    start_side: pick(&c.start_side),
                    end_side: pick(&c.end_side),
                    edge_type: c.edge_type,
                };
                (key, resolved)
            })
            .collect();

        let order = self.types.iter().map(|d| d.type_key).collect();
        let types = self
            .types
            .into_iter()
            .map(|d| (d.type_key, d))
            .collect();

        Ok(Registry {
            strategy: self.strategy,
            types,
            order,
            labels,
            relationships,
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum Side {
    Start,
    End,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RelationshipKey {
    start_label: String,
    rel_type: String,
    end_label: String,
}

impl RelationshipKey {
    fn new(start_label: String, rel_type: &str, end_label: String) -> Self {
        Self {
            start_label,
            rel_type: rel_type.to_string(),
            end_label,
        }
    }
}

impl std::fmt::Display for RelationshipKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "(:{})-[:{}]->(:{})",
            self.start_label, self.rel_type, self.end_label
        )
    }
}

#[derive(Debug, Default)]
struct Candidates {
    start_side: Vec<SideBinding>,
    end_side: Vec<SideBinding>,
    edge_type: Option<TypeKey>,
}

impl Candidates {
    fn bindings_empty(&self) -> bool {
        self.start_side.is_empty() && self.end_side.is_empty()
    }
}

/// Prefer an outgoing declaration, then any directed one, then the first.
fn pick(bindings: &[SideBinding]) -> Option<SideBinding> {
    bindings
        .iter()
        .find(|b| b.direction == Direction::Outgoing)
        .or_else(|| bindings.iter().find(|b| b.direction != Direction::Both))
        .or_else(|| bindings.first())
        .cloned()
}

/// A relationship field on one endpoint type.
#[derive(Debug, Clone)]
pub struct SideBinding {
    pub owner: TypeKey,
    pub field_name: &'static str,
    pub many: bool,
    pub direction: Direction,
}

/// Fields to populate for an edge between two labelled nodes.
#[derive(Debug, Clone)]
pub struct RelationshipMatch {
    /// Field on the start node receiving the end node (or edge object).
    pub start_side: Option<SideBinding>,
    /// Field on the end node receiving the start node (or edge object).
    pub end_side: Option<SideBinding>,
    /// Relationship-object type, for edges that carry their own object.
    pub edge_type: Option<TypeKey>,
}

/// Frozen set of registered types.
#[derive(Debug)]
pub struct Registry {
    strategy: PrimaryKeyStrategy,
    types: HashMap<TypeKey, TypeDescriptor>,
    order: Vec<TypeKey>,
    labels: HashMap<String, TypeKey>,
    relationships: HashMap<RelationshipKey, RelationshipMatch>,
}

impl Registry {
    pub fn builder(strategy: PrimaryKeyStrategy) -> RegistryBuilder {
        RegistryBuilder::new(strategy)
    }

    pub fn strategy(&self) -> &PrimaryKeyStrategy {
        &self.strategy
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Descriptors in registration order.
    pub fn descriptors(&self) -> impl Iterator<Item = &TypeDescriptor> {
        self.order.iter().filter_map(|k| self.types.get(k))
    }

    pub fn descriptor(&self, key: TypeKey) -> Result<&TypeDescriptor> {
        self.types
            .get(&key)
            .ok_or_else(|| OgmError::UnregisteredType(key.name().to_string()))
    }

    pub fn descriptor_of(&self, entity: &EntityRef) -> Result<&TypeDescriptor> {
        self.descriptor(entity.type_key())
    }

    pub fn descriptor_for<T: Mapped>(&self) -> Result<&TypeDescriptor> {
        self.descriptor(TypeKey::of::<T>())
    }

    /// Node descriptor registered under `label`.
    pub fn by_label(&self, label: &str) -> Option<&TypeDescriptor> {
        self.labels.get(label).and_then(|k| self.types.get(k))
    }

    /// First registered node descriptor among a node's labels.
    pub fn for_labels<S: AsRef<str>>(&self, labels: &[S]) -> Result<&TypeDescriptor> {
        labels
            .iter()
            .find_map(|l| self.by_label(l.as_ref()))
            .ok_or_else(|| {
                let names: Vec<&str> = labels.iter().map(|l| l.as_ref()).collect();
                OgmError::UnregisteredType(format!("no type registered for labels {:?}", names))
            })
    }

    /// Fields to populate for an edge `(start)-[rel_type]->(end)`.
    pub fn resolve_relationship(
        &self,
        start_label: &str,
        rel_type: &str,
        end_label: &str,
    ) -> Result<&RelationshipMatch> {
        let key = RelationshipKey::new(start_label.to_string(), rel_type, end_label.to_string());
        self.relationships.get(&key).ok_or_else(|| {
            OgmError::Configuration(format!("no relationship field declared for {}", key))
        })
    }
}

/// Parse all declarations of `T` into a descriptor.
fn describe<T: Mapped>(strategy: &PrimaryKeyStrategy) -> Result<TypeDescriptor> {
    let type_key = TypeKey::of::<T>();
    let type_name = type_key.name();
    let label = T::label();
    if !is_valid_identifier(label) {
        return Err(OgmError::Configuration(format!(
            "type '{}' declares label '{}', expected a plain identifier",
            type_name, label
        )));
    }

    let sample = T::default();
    let endpoints = sample
        .as_edge()
        .map(|edge| (edge.start_node_type(), edge.end_node_type()));
    let is_relationship_object = endpoints.is_some();

    let mut fields = Vec::new();
    let mut storage_names = HashSet::new();
    for decl in T::fields() {
        let spec = parse_tag(decl.tag).map_err(|m| OgmError::tag(type_name, decl.name, m))?;
        let field = resolve_field(type_name, &decl, spec, strategy)?;
        if field.kind != FieldKind::Ignored
            && !field.kind.is_relationship()
            && !storage_names.insert(field.storage_name.clone())
        {
            return Err(OgmError::tag(
                type_name,
                decl.name,
                format!("storage name '{}' is used twice", field.storage_name),
            ));
        }
        if is_relationship_object && field.kind.is_relationship() {
            return Err(OgmError::tag(
                type_name,
                decl.name,
                "relationship objects cannot declare relationship fields",
            ));
        }
        fields.push(field);
    }

    if fields.iter().all(|f| f.kind == FieldKind::Ignored) {
        return Err(OgmError::Configuration(format!(
            "type '{}' has no mapped fields",
            type_name
        )));
    }

    let pk_count = fields
        .iter()
        .filter(|f| f.kind == FieldKind::PrimaryKey)
        .count();
    if pk_count > 1 {
        return Err(OgmError::Configuration(format!(
            "type '{}' declares {} primary keys for strategy '{}'",
            type_name,
            pk_count,
            strategy.name()
        )));
    }
    if pk_count == 0 && !is_relationship_object {
        return Err(OgmError::Configuration(format!(
            "type '{}' declares no primary key for strategy '{}'",
            type_name,
            strategy.name()
        )));
    }

    Ok(TypeDescriptor {
        type_key,
        label: label.to_string(),
        fields,
        is_relationship_object,
        endpoints,
        factory: EntityRef::default_of::<T>,
    })
}

fn resolve_field(
    type_name: &str,
    decl: &FieldDecl,
    spec: TagSpec,
    strategy: &PrimaryKeyStrategy,
) -> Result<FieldDescriptor> {
    let fail = |message: &str| OgmError::tag(type_name, decl.name, message);

    let mut descriptor = FieldDescriptor {
        storage_name: spec.name.clone().unwrap_or_else(|| decl.name.to_string()),
        field_name: decl.name,
        kind: FieldKind::Scalar,
        relationship_label: None,
        direction: Direction::None,
        target: None,
        is_temporal: false,
        unique: spec.unique,
        indexed: spec.index,
    };

    if spec.ignore {
        descriptor.kind = FieldKind::Ignored;
        return Ok(descriptor);
    }

    if let Some(label) = spec.relationship {
        let (kind, target) = match decl.shape {
            FieldShape::One(t) => (FieldKind::RelationshipSingle, t),
            FieldShape::Many(t) => (FieldKind::RelationshipMany, t),
            _ => return Err(fail("'relationship' needs a one/many relationship field")),
        };
        if spec.pk || spec.unique || spec.index || spec.properties || spec.name.is_some() {
            return Err(fail(
                "relationship fields accept only 'relationship' and 'direction'",
            ));
        }
        if !is_valid_identifier(&label) {
            return Err(fail(&format!(
                "relationship type '{}' is not a plain identifier",
                label
            )));
        }
        descriptor.kind = kind;
        descriptor.target = Some(target);
        descriptor.relationship_label = Some(label);
        descriptor.direction = spec.direction.unwrap_or(Direction::None);
        return Ok(descriptor);
    }

    match decl.shape {
        FieldShape::One(_) | FieldShape::Many(_) => {
            return Err(fail(
                "relationship field needs 'relationship' and 'direction'",
            ))
        }
        FieldShape::PropertyMap => {
            if !spec.properties {
                return Err(fail("property map fields need the 'properties' marker"));
            }
            if spec.pk || spec.unique || spec.index {
                return Err(fail("property maps cannot be keys or indexed"));
            }
            descriptor.kind = FieldKind::PropertyMap;
            return Ok(descriptor);
        }
        FieldShape::Scalar | FieldShape::Temporal => {
            if spec.properties {
                return Err(fail("'properties' needs a property map field"));
            }
            descriptor.is_temporal = decl.shape == FieldShape::Temporal;
        }
    }

    let active_pk = spec.pk
        && spec
            .pk_type
            .as_deref()
            .map_or(true, |t| t.eq_ignore_ascii_case(strategy.name()));
    if active_pk {
        if let Some(name) = &spec.name {
            if name != strategy.db_field_name() {
                return Err(fail(&format!(
                    "primary key is stored as '{}' under strategy '{}', not '{}'",
                    strategy.db_field_name(),
                    strategy.name(),
                    name
                )));
            }
        }
        descriptor.kind = FieldKind::PrimaryKey;
        descriptor.storage_name = strategy.db_field_name().to_string();
    }

    Ok(descriptor)
}
