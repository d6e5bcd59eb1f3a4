//! Autorepo - declarative repositories over a pluggable persistence engine.
//!
//! Repository traits are declared once; their metadata is compiled from
//! method names and `query` attributes, and every call is executed by a
//! runtime dispatcher that manages sessions and transactions.
//!
//! # Core Concepts
//!
//! - **Entity**: a serde type with exactly one `#[id]` field.
//! - **Metadata table**: per-method operation, query text, bindings and
//!   return strategy, produced at build time.
//! - **Session context**: the sessions bound to the current call tree, so
//!   nested calls share one transaction.
//!
//! # Traits
//!
//! - [`Entity`]: persistable types (derive with `#[derive(Entity)]`)
//! - [`CrudRepository`]: base operations every repository provides
//! - [`RepositoryDefinition`]: generated description of a `#[repository]` trait
//! - [`EntityManager`] / [`PersistenceEngine`]: the engine boundary
//!
//! # Example
//!
//! ```ignore
//! #[derive(Entity, Serialize, Deserialize)]
//! struct User {
//!     #[id]
//!     id: i64,
//!     name: String,
//! }
//!
//! #[repository(entity = User, id = i64)]
//! trait UserRepository {
//!     fn find_by_name(&self, name: &str) -> Result<Vec<User>, RepositoryError>;
//! }
//!
//! let registry = RepositoryRegistry::compile(vec![CompilationUnit::of::<UserRepositoryMetadata>()])?;
//! let users = registry.repository::<UserRepositoryMetadata>(engine, context)?;
//! let alices = users.find_by_name("alice")?;
//! ```

#![cfg_attr(
    test,
    allow(clippy::unwrap_used, clippy::expect_used, clippy::unwrap_in_result)
)]

extern crate self as autorepo;

mod config;
mod context;
mod dispatcher;
mod error;
mod registry;
mod repository;
mod session;
mod transactional;
mod value;

pub use config::{ConfigError, DatabaseConfiguration, Dialect, SchemaMode, initialize_engine};
pub use context::{OwnerToken, SessionContext, SessionHandle};
pub use dispatcher::{Dispatcher, Outcome};
pub use error::{PersistenceError, PersistenceErrorKind, RepositoryError};
pub use registry::{CompilationUnit, RegistryError, RepositoryRegistry};
pub use repository::{CrudRepository, Entity, Repository, RepositoryDefinition};
pub use session::{
    DatabaseSession, EntityManager, PersistenceEngine, PreparedQuery, run_in_transaction,
};
pub use transactional::{TransactionToken, TransactionalBoundary};
pub use value::{Row, Value};

pub use autorepo_metadata::{
    CompileError, EntityDescriptor, FieldDescriptor, MetadataTable, MethodDeclaration,
    OperationType, ParamDeclaration, QueryAnnotation, RepositoryDeclaration, RepositoryMetainfo,
    ReturnShape, ReturnStrategy,
};

// Derive macros: `#[derive(Entity)]` and the `#[repository]` trait attribute.
pub use autorepo_derive::{Entity, repository};
