//! Mapping metadata: tag parsing, descriptors, key strategies and the type registry.

pub mod descriptor;
pub mod registry;
pub mod strategy;
pub mod tags;

pub use descriptor::{
    Direction, FieldDecl, FieldDescriptor, FieldKind, FieldShape, TypeDescriptor,
};
pub use registry::{Registry, RegistryBuilder, RelationshipMatch, SideBinding};
pub use strategy::{PrimaryKeyStrategy, NATIVE_STRATEGY, UUID_STRATEGY};
pub use tags::{parse_tag, TagSpec};
