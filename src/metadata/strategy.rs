//! Primary-key strategies.

use crate::error::{OgmError, Result};
use crate::value::{Value, ValueType};
use std::fmt;

/// Name of the generated-UUID strategy.
pub const UUID_STRATEGY: &str = "uuid";
/// Name of the database-native-id strategy.
pub const NATIVE_STRATEGY: &str = "native";

fn generate_uuid() -> Value {
    Value::String(uuid::Uuid::new_v4().to_string())
}

/// How entity identities are assigned and stored.
#[derive(Clone)]
pub struct PrimaryKeyStrategy {
    name: String,
    db_field_name: String,
    value_type: ValueType,
    generator: Option<fn() -> Value>,
    graph_native: bool,
}

impl PrimaryKeyStrategy {
    /// UUID v4 strings stored in a `uuid` property.
    pub fn uuid() -> Self {
        Self {
            name: UUID_STRATEGY.to_string(),
            db_field_name: "uuid".to_string(),
            value_type: ValueType::String,
            generator: Some(generate_uuid),
            graph_native: false,
        }
    }

    /// The graph engine's own row id; nothing is generated.
    pub fn native() -> Self {
        Self {
            name: NATIVE_STRATEGY.to_string(),
            db_field_name: "id".to_string(),
            value_type: ValueType::Int,
            generator: None,
            graph_native: true,
        }
    }

    /// A generated identity stored in `db_field_name`.
    ///
    /// The generator is sampled once; its value type must equal `value_type`.
    pub fn custom(
        name: &str,
        db_field_name: &str,
        value_type: ValueType,
        generator: fn() -> Value,
    ) -> Result<Self> {
        if name.is_empty() || db_field_name.is_empty() {
            return Err(OgmError::Configuration(
                "primary key strategy needs a name and a field name".to_string(),
            ));
        }
        if name == NATIVE_STRATEGY {
            return Err(OgmError::Configuration(
                "the native strategy cannot carry a generator".to_string(),
            ));
        }
        let sample = generator();
        if sample.value_type() != value_type {
            return Err(OgmError::Configuration(format!(
                "generator of strategy '{}' produces {} values, declared {}",
                name,
                sample.value_type(),
                value_type
            )));
        }
        Ok(Self {
            name: name.to_string(),
            db_field_name: db_field_name.to_string(),
            value_type,
            generator: Some(generator),
            graph_native: false,
        })
    }

    /// Resolve a built-in strategy by name.
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            UUID_STRATEGY => Ok(Self::uuid()),
            NATIVE_STRATEGY => Ok(Self::native()),
            other => Err(OgmError::Configuration(format!(
                "unknown primary key strategy '{}'",
                other
            ))),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Property (or native id alias) holding the key.
    pub fn db_field_name(&self) -> &str {
        &self.db_field_name
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn is_graph_native(&self) -> bool {
        self.graph_native
    }

    pub fn has_generator(&self) -> bool {
        self.generator.is_some()
    }

    /// Produce a fresh identity, or `None` for strategies without a generator.
    pub fn generate(&self) -> Result<Option<Value>> {
        let Some(generator) = self.generator else {
            return Ok(None);
        };
        let value = generator();
        if value.value_type() != self.value_type {
            return Err(OgmError::Internal(format!(
                "strategy '{}' generated a {} value, expected {}",
                self.name,
                value.value_type(),
                self.value_type
            )));
        }
        Ok(Some(value))
    }
}

impl Default for PrimaryKeyStrategy {
    fn default() -> Self {
        Self::uuid()
    }
}

impl fmt::Debug for PrimaryKeyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrimaryKeyStrategy")
            .field("name", &self.name)
            .field("db_field_name", &self.db_field_name)
            .field("value_type", &self.value_type)
            .field("graph_native", &self.graph_native)
            .finish()
    }
}
