//! Error taxonomy for mapping operations.
//!
//! Every component returns [`OgmError`]. The variants group into four
//! categories (configuration, data, backend, internal); callers decide on
//! retries through [`OgmError::is_retryable`].

use std::time::Duration;
use thiserror::Error;

/// Broad classification of an [`OgmError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad or missing declarations, unregistered types, ambiguous matches.
    Configuration,
    /// Malformed edges, missing properties, key round-trip mismatches.
    Data,
    /// Connection, timeout and transient transaction failures.
    Backend,
    /// Unexpected shape or cast failures while decoding results.
    Internal,
}

/// Error type for every mapping operation.
#[derive(Debug, Error)]
pub enum OgmError {
    /// Generic configuration problem.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A field declaration could not be parsed.
    #[error("invalid declaration on {type_name}.{field}: {message}")]
    Tag {
        /// Type owning the field.
        type_name: String,
        /// Offending field.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// A type was reached that the registry does not know.
    #[error("type '{0}' is not registered")]
    UnregisteredType(String),

    /// Inconsistent object graph or query result.
    #[error("data error: {0}")]
    Data(String),

    /// The query matched nothing.
    #[error("not found: {0}")]
    NotFound(String),

    /// A persistence batch failed; earlier batches of the same call may be committed.
    #[error("persisting '{label}' (identity {identity}) failed: {source}")]
    Persist {
        /// Node or relationship label of the failing batch.
        label: String,
        /// First identity of the failing batch.
        identity: String,
        /// Underlying failure.
        #[source]
        source: Box<OgmError>,
    },

    /// Live schema differs from the registry.
    #[error("schema mismatch: missing [{}], unexpected [{}]", missing.join("; "), unexpected.join("; "))]
    SchemaMismatch {
        /// Statements the registry expects but the database lacks.
        missing: Vec<String>,
        /// Live items the registry does not declare.
        unexpected: Vec<String>,
    },

    /// Driver failure.
    #[error("backend error: {0}")]
    Backend(#[from] neo4rs::Error),

    /// The call exceeded its deadline.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Shape or cast failure while interpreting results.
    #[error("internal error: {0}")]
    Internal(String),
}

impl OgmError {
    /// Category of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            OgmError::Configuration(_) | OgmError::Tag { .. } | OgmError::UnregisteredType(_) => {
                ErrorCategory::Configuration
            }
            OgmError::Data(_) | OgmError::NotFound(_) | OgmError::SchemaMismatch { .. } => {
                ErrorCategory::Data
            }
            OgmError::Persist { source, .. } => source.category(),
            OgmError::Backend(_) | OgmError::Timeout(_) => ErrorCategory::Backend,
            OgmError::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Whether the caller may retry the operation as a whole.
    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Backend
    }

    pub(crate) fn tag(type_name: &str, field: &str, message: impl Into<String>) -> Self {
        OgmError::Tag {
            type_name: type_name.to_string(),
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Result type alias for mapping operations.
pub type Result<T> = std::result::Result<T, OgmError>;
