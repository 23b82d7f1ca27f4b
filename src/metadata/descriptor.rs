//! Field and type descriptors produced by registration.

use crate::entity::{EntityRef, TypeKey};
use std::fmt;

/// Relationship direction, seen from the declaring type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Incoming,
    Outgoing,
    Both,
    /// Not a relationship field.
    None,
}

impl Direction {
    /// Parse a tag value (case-insensitive). `none` is not accepted.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "incoming" => Some(Direction::Incoming),
            "outgoing" => Some(Direction::Outgoing),
            "both" => Some(Direction::Both),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Direction::Incoming => "incoming",
            Direction::Outgoing => "outgoing",
            Direction::Both => "both",
            Direction::None => "none",
        };
        f.write_str(s)
    }
}

/// Rust-side shape of a declared field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldShape {
    Scalar,
    /// Scalar stored as a timestamp string.
    Temporal,
    /// Map flattened into `field.key` properties.
    PropertyMap,
    /// Optional single relationship target.
    One(TypeKey),
    /// Relationship target list.
    Many(TypeKey),
}

/// One field declaration: Rust field name, shape and tag string.
#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub name: &'static str,
    pub shape: FieldShape,
    pub tag: &'static str,
}

impl FieldDecl {
    pub fn scalar(name: &'static str, tag: &'static str) -> Self {
        Self {
            name,
            shape: FieldShape::Scalar,
            tag,
        }
    }

    pub fn temporal(name: &'static str, tag: &'static str) -> Self {
        Self {
            name,
            shape: FieldShape::Temporal,
            tag,
        }
    }

    pub fn property_map(name: &'static str, tag: &'static str) -> Self {
        Self {
            name,
            shape: FieldShape::PropertyMap,
            tag,
        }
    }

    /// Single relationship to `T` (a node or a relationship-object type).
    pub fn one<T: 'static>(name: &'static str, tag: &'static str) -> Self {
        Self {
            name,
            shape: FieldShape::One(TypeKey::of::<T>()),
            tag,
        }
    }

    /// Many relationship to `T` (a node or a relationship-object type).
    pub fn many<T: 'static>(name: &'static str, tag: &'static str) -> Self {
        Self {
            name,
            shape: FieldShape::Many(TypeKey::of::<T>()),
            tag,
        }
    }
}

/// Resolved role of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Scalar,
    PrimaryKey,
    RelationshipSingle,
    RelationshipMany,
    PropertyMap,
    Ignored,
}

impl FieldKind {
    pub fn is_relationship(self) -> bool {
        matches!(
            self,
            FieldKind::RelationshipSingle | FieldKind::RelationshipMany
        )
    }
}

/// Per-field mapping metadata.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    /// Property name in the graph.
    pub storage_name: String,
    /// Rust field name, as passed to `Entity::get`/`set`/`related`/`relate`.
    pub field_name: &'static str,
    pub kind: FieldKind,
    pub relationship_label: Option<String>,
    pub direction: Direction,
    /// Target type of relationship fields.
    pub target: Option<TypeKey>,
    pub is_temporal: bool,
    pub unique: bool,
    pub indexed: bool,
}

impl FieldDescriptor {
    /// Prefix of the flattened properties of a property-map field.
    pub fn map_prefix(&self) -> String {
        format!("{}.", self.storage_name)
    }
}

/// Mapping metadata of one registered type. Immutable after registration.
#[derive(Clone)]
pub struct TypeDescriptor {
    pub type_key: TypeKey,
    pub label: String,
    pub fields: Vec<FieldDescriptor>,
    pub is_relationship_object: bool,
    /// Declared (start, end) endpoint types of relationship-objects.
    pub endpoints: Option<(TypeKey, TypeKey)>,
    pub(crate) factory: fn() -> EntityRef,
}

impl TypeDescriptor {
    /// The primary-key field under the active strategy.
    pub fn primary_key(&self) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.kind == FieldKind::PrimaryKey)
    }

    /// Plain scalar fields (temporal included, primary key excluded).
    pub fn scalars(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.kind == FieldKind::Scalar)
    }

    pub fn property_maps(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields
            .iter()
            .filter(|f| f.kind == FieldKind::PropertyMap)
    }

    pub fn relationships(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.kind.is_relationship())
    }

    /// Field stored under `storage_name` (scalars and primary key only).
    pub fn field_by_storage(&self, storage_name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| {
            matches!(f.kind, FieldKind::Scalar | FieldKind::PrimaryKey)
                && f.storage_name == storage_name
        })
    }

    /// Property-map field owning a flattened `prefix.key` property.
    pub fn property_map_for(&self, property: &str) -> Option<(&FieldDescriptor, String)> {
        self.property_maps().find_map(|f| {
            property
                .strip_prefix(&f.map_prefix())
                .filter(|rest| !rest.is_empty())
                .map(|rest| (f, rest.to_string()))
        })
    }

    /// Fresh default instance of the described type.
    pub fn instantiate(&self) -> EntityRef {
        (self.factory)()
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("type_key", &self.type_key)
            .field("label", &self.label)
            .field("fields", &self.fields)
            .field("is_relationship_object", &self.is_relationship_object)
            .field("endpoints", &self.endpoints)
            .finish()
    }
}
