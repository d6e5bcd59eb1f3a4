//! Typed repositories over the dispatcher.

use std::marker::PhantomData;

use autorepo_metadata::{EntityDescriptor, RepositoryDeclaration};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::{Dispatcher, Outcome, RepositoryError, Value};

/// A persistable type with exactly one identifier field.
///
/// Implemented by `#[derive(Entity)]`. Entities cross the engine boundary as
/// JSON documents, so they must also be serde types.
pub trait Entity: Serialize + DeserializeOwned {
    /// Type of the identifier field.
    type Id: Into<Value>;

    fn descriptor() -> EntityDescriptor;
}

/// Compile-time description of a `#[repository]` trait.
///
/// Generated as `<Trait>Metadata` next to each repository trait.
pub trait RepositoryDefinition {
    type Entity: Entity;

    /// Repository name, as used in metadata tables and diagnostics.
    const NAME: &'static str;

    fn declaration() -> RepositoryDeclaration;
}

/// Base operations every repository provides.
pub trait CrudRepository<E: Entity> {
    /// Persist `entity`, returning the managed instance.
    fn save(&self, entity: &E) -> Result<E, RepositoryError>;

    /// Like [`save`](Self::save), flushing pending writes immediately.
    fn save_and_flush(&self, entity: &E) -> Result<E, RepositoryError>;

    /// Persist each entity in order.
    fn save_all(&self, entities: &[E]) -> Result<Vec<E>, RepositoryError>;

    fn delete(&self, entity: &E) -> Result<(), RepositoryError>;

    fn delete_and_flush(&self, entity: &E) -> Result<(), RepositoryError>;

    fn delete_by_id(&self, id: E::Id) -> Result<(), RepositoryError>;

    fn find_all(&self) -> Result<Vec<E>, RepositoryError>;

    fn find_by_id(&self, id: E::Id) -> Result<Option<E>, RepositoryError>;

    fn count(&self) -> Result<i64, RepositoryError>;
}

/// Repository handle for entity `E`.
///
/// Implements [`CrudRepository`] directly; each `#[repository]` trait for `E`
/// is implemented on it by the macro.
pub struct Repository<E> {
    dispatcher: Dispatcher,
    _marker: PhantomData<fn() -> E>,
}

impl<E: Entity> Repository<E> {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            _marker: PhantomData,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Dispatch a method by signature key.
    pub fn invoke(&self, signature: &str, args: Vec<Value>) -> Result<Outcome, RepositoryError> {
        self.dispatcher.invoke(signature, args)
    }
}

impl<E> std::fmt::Debug for Repository<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

impl<E: Entity> CrudRepository<E> for Repository<E> {
    fn save(&self, entity: &E) -> Result<E, RepositoryError> {
        self.invoke("save", vec![Value::document(entity)?])?
            .into_single()
    }

    fn save_and_flush(&self, entity: &E) -> Result<E, RepositoryError> {
        self.invoke("saveAndFlush", vec![Value::document(entity)?])?
            .into_single()
    }

    fn save_all(&self, entities: &[E]) -> Result<Vec<E>, RepositoryError> {
        self.invoke("saveAll", vec![Value::document(&entities)?])?
            .into_collection()
    }

    fn delete(&self, entity: &E) -> Result<(), RepositoryError> {
        self.invoke("delete", vec![Value::document(entity)?])?
            .into_unit()
    }

    fn delete_and_flush(&self, entity: &E) -> Result<(), RepositoryError> {
        self.invoke("deleteAndFlush", vec![Value::document(entity)?])?
            .into_unit()
    }

    fn delete_by_id(&self, id: E::Id) -> Result<(), RepositoryError> {
        self.invoke("deleteById", vec![id.into()])?.into_unit()
    }

    fn find_all(&self) -> Result<Vec<E>, RepositoryError> {
        self.invoke("findAll", Vec::new())?.into_collection()
    }

    fn find_by_id(&self, id: E::Id) -> Result<Option<E>, RepositoryError> {
        self.invoke("findById", vec![id.into()])?.into_optional()
    }

    fn count(&self) -> Result<i64, RepositoryError> {
        self.invoke("count", Vec::new())?.into_scalar()
    }
}
