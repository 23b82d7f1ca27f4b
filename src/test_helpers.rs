//! Test fixtures: a small movie graph mapped for both key strategies.
//!
//! Every node type carries a native `id` and a `uuid`, tagged with `pk_type`
//! so the same types register under either strategy.
#![allow(dead_code)]

use crate::entity::{no_such_field, shared, EdgeEntity, Entity, EntityRef, Mapped, Shared, TypeKey};
use crate::error::Result;
use crate::metadata::{FieldDecl, PrimaryKeyStrategy, Registry, RegistryBuilder};
use crate::value::{FromValue, Value};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

// ============================================================================
// Fixture types
// ============================================================================

#[derive(Debug, Default)]
pub struct Person {
    pub id: Option<i64>,
    pub uuid: Option<String>,
    pub name: String,
    pub born: Option<DateTime<Utc>>,
    pub friends: Vec<Shared<Person>>,
    pub friend_of: Vec<Shared<Person>>,
    pub knows: Vec<Shared<Person>>,
    pub acted_in: Vec<Shared<Role>>,
    pub directed: Vec<Shared<Movie>>,
}

impl Entity for Person {
    fn get(&self, field: &str) -> Option<Value> {
        match field {
            "id" => Some(self.id.into()),
            "uuid" => Some(self.uuid.clone().into()),
            "name" => Some(Value::from(&self.name)),
            "born" => Some(self.born.into()),
            _ => None,
        }
    }

    fn set(&mut self, field: &str, value: Value) -> Result<()> {
        match field {
            "id" => self.id = FromValue::from_value(value)?,
            "uuid" => self.uuid = FromValue::from_value(value)?,
            "name" => self.name = FromValue::from_value(value)?,
            "born" => self.born = FromValue::from_value(value)?,
            _ => return Err(no_such_field(self.type_key(), field)),
        }
        Ok(())
    }

    fn related(&self, field: &str) -> Vec<EntityRef> {
        match field {
            "friends" => EntityRef::all(&self.friends),
            "friend_of" => EntityRef::all(&self.friend_of),
            "knows" => EntityRef::all(&self.knows),
            "acted_in" => EntityRef::all(&self.acted_in),
            "directed" => EntityRef::all(&self.directed),
            _ => Vec::new(),
        }
    }

    fn relate(&mut self, field: &str, target: EntityRef) -> Result<()> {
        match field {
            "friends" => self.friends.push(target.cast()?),
            "friend_of" => self.friend_of.push(target.cast()?),
            "knows" => self.knows.push(target.cast()?),
            "acted_in" => self.acted_in.push(target.cast()?),
            "directed" => self.directed.push(target.cast()?),
            _ => return Err(no_such_field(self.type_key(), field)),
        }
        Ok(())
    }
}

impl Mapped for Person {
    fn label() -> &'static str {
        "Person"
    }

    fn fields() -> Vec<FieldDecl> {
        vec![
            FieldDecl::scalar("id", "pk;pk_type=native"),
            FieldDecl::scalar("uuid", "pk;pk_type=uuid"),
            FieldDecl::scalar("name", "name=name;index"),
            FieldDecl::temporal("born", "name=born"),
            FieldDecl::many::<Person>("friends", "relationship=FRIENDS_WITH;direction=outgoing"),
            FieldDecl::many::<Person>("friend_of", "relationship=FRIENDS_WITH;direction=incoming"),
            FieldDecl::many::<Person>("knows", "relationship=KNOWS;direction=both"),
            FieldDecl::many::<Role>("acted_in", "relationship=ACTED_IN;direction=outgoing"),
            FieldDecl::many::<Movie>("directed", "relationship=DIRECTED;direction=outgoing"),
        ]
    }
}

#[derive(Debug, Default)]
pub struct Movie {
    pub id: Option<i64>,
    pub uuid: Option<String>,
    pub title: String,
    pub attrs: BTreeMap<String, Value>,
    pub actors: Vec<Shared<Role>>,
    pub director: Option<Shared<Person>>,
}

impl Entity for Movie {
    fn get(&self, field: &str) -> Option<Value> {
        match field {
            "id" => Some(self.id.into()),
            "uuid" => Some(self.uuid.clone().into()),
            "title" => Some(Value::from(&self.title)),
            "attrs" => Some(Value::Map(self.attrs.clone())),
            _ => None,
        }
    }

    fn set(&mut self, field: &str, value: Value) -> Result<()> {
        match field {
            "id" => self.id = FromValue::from_value(value)?,
            "uuid" => self.uuid = FromValue::from_value(value)?,
            "title" => self.title = FromValue::from_value(value)?,
            "attrs" => self.attrs = FromValue::from_value(value)?,
            _ => return Err(no_such_field(self.type_key(), field)),
        }
        Ok(())
    }

    fn related(&self, field: &str) -> Vec<EntityRef> {
        match field {
            "actors" => EntityRef::all(&self.actors),
            "director" => EntityRef::maybe(&self.director),
            _ => Vec::new(),
        }
    }

    fn relate(&mut self, field: &str, target: EntityRef) -> Result<()> {
        match field {
            "actors" => self.actors.push(target.cast()?),
            "director" => self.director = Some(target.cast()?),
            _ => return Err(no_such_field(self.type_key(), field)),
        }
        Ok(())
    }
}

impl Mapped for Movie {
    fn label() -> &'static str {
        "Movie"
    }

    fn fields() -> Vec<FieldDecl> {
        vec![
            FieldDecl::scalar("id", "pk;pk_type=native"),
            FieldDecl::scalar("uuid", "pk;pk_type=uuid"),
            FieldDecl::scalar("title", "name=title;unique"),
            FieldDecl::property_map("attrs", "name=attrs;properties"),
            FieldDecl::many::<Role>("actors", "relationship=ACTED_IN;direction=incoming"),
            FieldDecl::one::<Person>("director", "relationship=DIRECTED;direction=incoming"),
        ]
    }
}

/// `(Person)-[:ACTED_IN]->(Movie)` with its own properties.
#[derive(Debug, Default)]
pub struct Role {
    pub uuid: Option<String>,
    pub roles: Vec<String>,
    pub start: Option<Shared<Person>>,
    pub end: Option<Shared<Movie>>,
}

impl Role {
    /// Create a role and attach it to both endpoints.
    pub fn link(person: &Shared<Person>, movie: &Shared<Movie>, roles: &[&str]) -> Shared<Role> {
        let role = shared(Role {
            uuid: None,
            roles: roles.iter().map(|r| r.to_string()).collect(),
            start: Some(person.clone()),
            end: Some(movie.clone()),
        });
        person.write().acted_in.push(role.clone());
        movie.write().actors.push(role.clone());
        role
    }
}

impl Entity for Role {
    fn get(&self, field: &str) -> Option<Value> {
        match field {
            "uuid" => Some(self.uuid.clone().into()),
            "roles" => Some(self.roles.clone().into()),
            _ => None,
        }
    }

    fn set(&mut self, field: &str, value: Value) -> Result<()> {
        match field {
            "uuid" => self.uuid = FromValue::from_value(value)?,
            "roles" => {
                self.roles = Option::<Vec<String>>::from_value(value)?.unwrap_or_default()
            }
            _ => return Err(no_such_field(self.type_key(), field)),
        }
        Ok(())
    }

    fn as_edge(&self) -> Option<&dyn EdgeEntity> {
        Some(self)
    }

    fn as_edge_mut(&mut self) -> Option<&mut dyn EdgeEntity> {
        Some(self)
    }
}

impl EdgeEntity for Role {
    fn start_node(&self) -> Option<EntityRef> {
        self.start.as_ref().map(EntityRef::from_shared)
    }

    fn start_node_type(&self) -> TypeKey {
        TypeKey::of::<Person>()
    }

    fn set_start_node(&mut self, node: EntityRef) -> Result<()> {
        self.start = Some(node.cast()?);
        Ok(())
    }

    fn end_node(&self) -> Option<EntityRef> {
        self.end.as_ref().map(EntityRef::from_shared)
    }

    fn end_node_type(&self) -> TypeKey {
        TypeKey::of::<Movie>()
    }

    fn set_end_node(&mut self, node: EntityRef) -> Result<()> {
        self.end = Some(node.cast()?);
        Ok(())
    }
}

impl Mapped for Role {
    fn label() -> &'static str {
        "ACTED_IN"
    }

    fn fields() -> Vec<FieldDecl> {
        vec![
            FieldDecl::scalar("uuid", "pk;pk_type=uuid"),
            FieldDecl::scalar("roles", "name=roles"),
        ]
    }
}

/// Standalone node with no relationships.
#[derive(Debug, Default)]
pub struct Tag {
    pub id: Option<i64>,
    pub uuid: Option<String>,
    pub name: String,
}

impl Entity for Tag {
    fn get(&self, field: &str) -> Option<Value> {
        match field {
            "id" => Some(self.id.into()),
            "uuid" => Some(self.uuid.clone().into()),
            "name" => Some(Value::from(&self.name)),
            _ => None,
        }
    }

    fn set(&mut self, field: &str, value: Value) -> Result<()> {
        match field {
            "id" => self.id = FromValue::from_value(value)?,
            "uuid" => self.uuid = FromValue::from_value(value)?,
            "name" => self.name = FromValue::from_value(value)?,
            _ => return Err(no_such_field(self.type_key(), field)),
        }
        Ok(())
    }
}

impl Mapped for Tag {
    fn label() -> &'static str {
        "Tag"
    }

    fn fields() -> Vec<FieldDecl> {
        vec![
            FieldDecl::scalar("id", "pk;pk_type=native"),
            FieldDecl::scalar("uuid", "pk;pk_type=uuid"),
            FieldDecl::scalar("name", "name=name"),
        ]
    }
}

// ============================================================================
// Registry builders
// ============================================================================

/// Registry with every fixture type.
pub fn registry(strategy: PrimaryKeyStrategy) -> Registry {
    let mut builder = RegistryBuilder::new(strategy);
    builder.register::<Person>().expect("register Person");
    builder.register::<Movie>().expect("register Movie");
    builder.register::<Role>().expect("register Role");
    builder.register::<Tag>().expect("register Tag");
    builder.build().expect("build registry")
}

/// Typed handle behind an erased one.
pub fn cast<T: Entity>(entity: &EntityRef) -> Shared<T> {
    entity.cast::<T>().expect("unexpected entity type")
}
