//! Neo4j driver boundary and its neo4rs implementation

pub mod client;
pub mod traits;

pub use client::{ConnectionSettings, Neo4jClient};
pub use traits::{rollback_quietly, GraphDriver, GraphTransaction, Record};

#[cfg(test)]
pub(crate) mod mock;
