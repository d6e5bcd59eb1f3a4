use std::fmt;

use autorepo_metadata::CompileError;
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error(
        "No metadata for {repository}::{signature}; the repository was not compiled or its metadata table is stale"
    )]
    MetadataResolution {
        repository: String,
        signature: String,
    },

    #[error(
        "No session bound to the current context during {operation} (thread {thread}); the boundary was left outside the managed call path"
    )]
    SessionOutOfContext { operation: String, thread: String },

    #[error("Invalid operation {repository}::{method}: {detail}")]
    InvalidOperation {
        repository: String,
        method: String,
        detail: String,
    },

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Query returned no result")]
    EmptyResult,

    #[error("Query returned {rows} rows where exactly one was expected")]
    NonUniqueResult { rows: usize },

    #[error("Expected a {expected} result but the operation produced {found}")]
    ResultShape {
        expected: &'static str,
        found: &'static str,
    },
}

/// Root-cause classification of a persistence engine failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PersistenceErrorKind {
    /// The engine could not load the configured driver.
    MissingDriver,
    /// The driver loaded but the database could not be reached.
    Connection,
    /// The engine rejected its own configuration (dialect, mapping, schema).
    Configuration,
    Constraint,
    Query,
    Other,
}

impl fmt::Display for PersistenceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PersistenceErrorKind::MissingDriver => "missing driver",
            PersistenceErrorKind::Connection => "connection failure",
            PersistenceErrorKind::Configuration => "engine misconfiguration",
            PersistenceErrorKind::Constraint => "constraint violation",
            PersistenceErrorKind::Query => "query failure",
            PersistenceErrorKind::Other => "persistence failure",
        };
        f.write_str(label)
    }
}

/// Failure reported by the persistence engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct PersistenceError {
    pub kind: PersistenceErrorKind,
    pub message: String,
}

impl PersistenceError {
    pub fn new(kind: PersistenceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn missing_driver(message: impl Into<String>) -> Self {
        Self::new(PersistenceErrorKind::MissingDriver, message)
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(PersistenceErrorKind::Connection, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(PersistenceErrorKind::Configuration, message)
    }

    pub fn constraint(message: impl Into<String>) -> Self {
        Self::new(PersistenceErrorKind::Constraint, message)
    }

    pub fn query(message: impl Into<String>) -> Self {
        Self::new(PersistenceErrorKind::Query, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(PersistenceErrorKind::Other, message)
    }
}
