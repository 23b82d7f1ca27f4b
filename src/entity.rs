//! Entity traits and shared handles.
//!
//! Domain types implement [`Entity`] (field access by name) and [`Mapped`]
//! (static label and field declarations). Relationship-objects additionally
//! implement [`EdgeEntity`] and expose it through [`Entity::as_edge`].
//!
//! Object graphs may be cyclic, so instances are shared through
//! [`Shared<T>`] (`Arc<RwLock<T>>`). The mapping layer works on the
//! type-erased [`EntityRef`], which can be downcast back to `Shared<T>`.

use crate::error::{OgmError, Result};
use crate::metadata::FieldDecl;
use crate::value::Value;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Shared, mutable handle to a typed entity.
pub type Shared<T> = Arc<RwLock<T>>;

/// Wrap a value into a [`Shared`] handle.
pub fn shared<T>(value: T) -> Shared<T> {
    Arc::new(RwLock::new(value))
}

/// Identity of a Rust type, with a readable name for diagnostics.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// Key of `T`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        let full = std::any::type_name::<T>();
        let name = full.rsplit("::").next().unwrap_or(full);
        Self {
            id: TypeId::of::<T>(),
            name,
        }
    }

    /// Short type name (last path segment).
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Field-level access to a mapped instance.
///
/// `get`/`set` cover scalar, temporal, property-map and primary-key fields;
/// `related`/`relate` cover relationship fields. Field names are the Rust
/// field names used in [`Mapped::fields`].
pub trait Entity: Any + Send + Sync {
    /// Key of the concrete type.
    fn type_key(&self) -> TypeKey {
        TypeKey::of::<Self>()
    }

    /// Read a non-relationship field. `None` if the field is not mapped.
    fn get(&self, field: &str) -> Option<Value>;

    /// Write a non-relationship field.
    fn set(&mut self, field: &str, value: Value) -> Result<()>;

    /// Current targets of a relationship field (empty when unset).
    fn related(&self, _field: &str) -> Vec<EntityRef> {
        Vec::new()
    }

    /// Append `target` to a many-relationship field, or assign a single one.
    fn relate(&mut self, field: &str, _target: EntityRef) -> Result<()> {
        Err(no_such_field(self.type_key(), field))
    }

    /// Relationship-object capability, if this type carries one.
    fn as_edge(&self) -> Option<&dyn EdgeEntity> {
        None
    }

    /// Mutable relationship-object capability.
    fn as_edge_mut(&mut self) -> Option<&mut dyn EdgeEntity> {
        None
    }
}

/// Static mapping metadata of an entity type.
pub trait Mapped: Entity + Default {
    /// Graph label (node label, or relationship type for relationship-objects).
    fn label() -> &'static str;

    /// Field declarations, parsed once at registration.
    fn fields() -> Vec<FieldDecl>;
}

/// Relationship that carries its own properties and endpoint accessors.
pub trait EdgeEntity {
    /// Start endpoint, if set.
    fn start_node(&self) -> Option<EntityRef>;

    /// Declared type of the start endpoint.
    fn start_node_type(&self) -> TypeKey;

    /// Assign the start endpoint.
    fn set_start_node(&mut self, node: EntityRef) -> Result<()>;

    /// End endpoint, if set.
    fn end_node(&self) -> Option<EntityRef>;

    /// Declared type of the end endpoint.
    fn end_node_type(&self) -> TypeKey;

    /// Assign the end endpoint.
    fn set_end_node(&mut self, node: EntityRef) -> Result<()>;
}

/// Error for a field name an entity does not map.
pub fn no_such_field(type_key: TypeKey, field: &str) -> OgmError {
    OgmError::Data(format!("{} has no mapped field '{}'", type_key, field))
}

/// Type-erased handle to a shared entity.
#[derive(Clone)]
pub struct EntityRef {
    key: TypeKey,
    inner: Arc<RwLock<dyn Entity>>,
    any: Arc<dyn Any + Send + Sync>,
}

impl EntityRef {
    /// Wrap a fresh value.
    pub fn new<T: Entity>(value: T) -> Self {
        Self::from_shared(&shared(value))
    }

    /// Build a default instance of `T` (used as a registry factory).
    pub fn default_of<T: Mapped>() -> Self {
        Self::new(T::default())
    }

    /// Erase an existing typed handle. Both handles point to the same instance.
    pub fn from_shared<T: Entity>(value: &Shared<T>) -> Self {
        let inner: Arc<RwLock<dyn Entity>> = value.clone();
        let any: Arc<dyn Any + Send + Sync> = value.clone();
        Self {
            key: TypeKey::of::<T>(),
            inner,
            any,
        }
    }

    /// Erase a slice of typed handles.
    pub fn all<T: Entity>(values: &[Shared<T>]) -> Vec<EntityRef> {
        values.iter().map(Self::from_shared).collect()
    }

    /// Erase an optional typed handle.
    pub fn maybe<T: Entity>(value: &Option<Shared<T>>) -> Vec<EntityRef> {
        value.iter().map(Self::from_shared).collect()
    }

    /// Key of the concrete type behind this handle.
    pub fn type_key(&self) -> TypeKey {
        self.key
    }

    /// Recover the typed handle, if `T` is the concrete type.
    pub fn downcast<T: Entity>(&self) -> Option<Shared<T>> {
        self.any.clone().downcast::<RwLock<T>>().ok()
    }

    /// Recover the typed handle or fail with a data error.
    pub fn cast<T: Entity>(&self) -> Result<Shared<T>> {
        self.downcast::<T>().ok_or_else(|| {
            OgmError::Data(format!(
                "expected {}, got {}",
                TypeKey::of::<T>(),
                self.key
            ))
        })
    }

    /// Lock for reading.
    pub fn read(&self) -> RwLockReadGuard<'_, dyn Entity> {
        self.inner.read()
    }

    /// Lock for writing.
    pub fn write(&self) -> RwLockWriteGuard<'_, dyn Entity> {
        self.inner.write()
    }

    /// Address of the shared instance, stable for its lifetime.
    pub fn addr(&self) -> usize {
        Arc::as_ptr(&self.any) as *const () as usize
    }

    /// Whether both handles point to the same instance.
    pub fn ptr_eq(&self, other: &EntityRef) -> bool {
        self.addr() == other.addr()
    }
}

impl fmt::Debug for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityRef({}@{:#x})", self.key, self.addr())
    }
}
