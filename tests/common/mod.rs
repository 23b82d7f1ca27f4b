//! Shared fixtures for integration tests.
#![allow(dead_code)]

use graph_ogm::entity::no_such_field;
use graph_ogm::error::Result;
use graph_ogm::{
    shared, Config, EdgeEntity, Entity, EntityRef, FieldDecl, FromValue, Mapped,
    PrimaryKeyStrategy, Registry, RegistryBuilder, Shared, TypeKey, Value,
};
use std::time::Duration;

#[derive(Default)]
pub struct Actor {
    pub uuid: Option<String>,
    pub name: String,
    pub castings: Vec<Shared<Casting>>,
}

impl Entity for Actor {
    fn get(&self, field: &str) -> Option<Value> {
        match field {
            "uuid" => Some(self.uuid.clone().into()),
            "name" => Some(Value::from(&self.name)),
            _ => None,
        }
    }

    fn set(&mut self, field: &str, value: Value) -> Result<()> {
        match field {
            "uuid" => self.uuid = FromValue::from_value(value)?,
            "name" => self.name = FromValue::from_value(value)?,
            _ => return Err(no_such_field(self.type_key(), field)),
        }
        Ok(())
    }

    fn related(&self, field: &str) -> Vec<EntityRef> {
        match field {
            "castings" => EntityRef::all(&self.castings),
            _ => Vec::new(),
        }
    }

    fn relate(&mut self, field: &str, target: EntityRef) -> Result<()> {
        match field {
            "castings" => self.castings.push(target.cast()?),
            _ => return Err(no_such_field(self.type_key(), field)),
        }
        Ok(())
    }
}

impl Mapped for Actor {
    fn label() -> &'static str {
        "OgmItActor"
    }

    fn fields() -> Vec<FieldDecl> {
        vec![
            FieldDecl::scalar("uuid", "pk"),
            FieldDecl::scalar("name", "name=name;index"),
            FieldDecl::many::<Casting>("castings", "relationship=CAST_IN;direction=outgoing"),
        ]
    }
}

#[derive(Default)]
pub struct Film {
    pub uuid: Option<String>,
    pub title: String,
    pub castings: Vec<Shared<Casting>>,
}

impl Entity for Film {
    fn get(&self, field: &str) -> Option<Value> {
        match field {
            "uuid" => Some(self.uuid.clone().into()),
            "title" => Some(Value::from(&self.title)),
            _ => None,
        }
    }

    fn set(&mut self, field: &str, value: Value) -> Result<()> {
        match field {
            "uuid" => self.uuid = FromValue::from_value(value)?,
            "title" => self.title = FromValue::from_value(value)?,
            _ => return Err(no_such_field(self.type_key(), field)),
        }
        Ok(())
    }

    fn related(&self, field: &str) -> Vec<EntityRef> {
        match field {
            "castings" => EntityRef::all(&self.castings),
            _ => Vec::new(),
        }
    }

    fn relate(&mut self, field: &str, target: EntityRef) -> Result<()> {
        match field {
            "castings" => self.castings.push(target.cast()?),
            _ => return Err(no_such_field(self.type_key(), field)),
        }
        Ok(())
    }
}

impl Mapped for Film {
    fn label() -> &'static str {
        "OgmItFilm"
    }

    fn fields() -> Vec<FieldDecl> {
        vec![
            FieldDecl::scalar("uuid", "pk"),
            FieldDecl::scalar("title", "name=title;unique"),
            FieldDecl::many::<Casting>("castings", "relationship=CAST_IN;direction=incoming"),
        ]
    }
}

#[derive(Default)]
pub struct Casting {
    pub uuid: Option<String>,
    pub roles: Vec<String>,
    pub actor: Option<Shared<Actor>>,
    pub film: Option<Shared<Film>>,
}

impl Casting {
    pub fn link(actor: &Shared<Actor>, film: &Shared<Film>, roles: &[&str]) -> Shared<Casting> {
        let casting = shared(Casting {
            uuid: None,
            roles: roles.iter().map(|r| r.to_string()).collect(),
            actor: Some(actor.clone()),
            film: Some(film.clone()),
        });
        actor.write().castings.push(casting.clone());
        film.write().castings.push(casting.clone());
        casting
    }
}

impl Entity for Casting {
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

impl EdgeEntity for Casting {
    fn start_node(&self) -> Option<EntityRef> {
        self.actor.as_ref().map(EntityRef::from_shared)
    }

    fn start_node_type(&self) -> TypeKey {
        TypeKey::of::<Actor>()
    }

    fn set_start_node(&mut self, node: EntityRef) -> Result<()> {
        self.actor = Some(node.cast()?);
        Ok(())
    }

    fn end_node(&self) -> Option<EntityRef> {
        self.film.as_ref().map(EntityRef::from_shared)
    }

    fn end_node_type(&self) -> TypeKey {
        TypeKey::of::<Film>()
    }

    fn set_end_node(&mut self, node: EntityRef) -> Result<()> {
        self.film = Some(node.cast()?);
        Ok(())
    }
}

impl Mapped for Casting {
    fn label() -> &'static str {
        "CAST_IN"
    }

    fn fields() -> Vec<FieldDecl> {
        vec![
            FieldDecl::scalar("uuid", "pk"),
            FieldDecl::scalar("roles", "name=roles"),
        ]
    }
}

/// Registry of the integration fixture types.
pub fn registry() -> Registry {
    let mut builder = RegistryBuilder::new(PrimaryKeyStrategy::uuid());
    builder.register::<Actor>().expect("register Actor");
    builder.register::<Film>().expect("register Film");
    builder.register::<Casting>().expect("register Casting");
    builder.build().expect("build registry")
}

/// Configuration from the environment, with a short timeout.
pub fn test_config() -> Config {
    let mut config = Config::from_env().expect("config from env");
    config.primary_key = PrimaryKeyStrategy::uuid();
    config.index_strategy = graph_ogm::IndexStrategy::Ignore;
    config.query_timeout = Duration::from_secs(10);
    config
}

/// Check if Neo4j is reachable with the test configuration
pub async fn neo4j_available() -> bool {
    let config = test_config();
    let settings = config.connection_settings();
    let Some(settings) = settings.first() else {
        return false;
    };
    match graph_ogm::neo4j::Neo4jClient::new(settings).await {
        Ok(client) => {
            use graph_ogm::neo4j::GraphDriver;
            if client.ping().await.is_ok() {
                true
            } else {
                eprintln!("Neo4j at {} does not answer", config.neo4j_uri);
                false
            }
        }
        Err(e) => {
            eprintln!("Neo4j not available at {}: {}", config.neo4j_uri, e);
            false
        }
    }
}
