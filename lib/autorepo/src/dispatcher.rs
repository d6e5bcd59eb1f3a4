//! Invocation dispatcher.
//!
//! Every repository method funnels into [`Dispatcher::invoke`] with its
//! signature key and arguments. The dispatcher resolves the compiled
//! metadata, finds or opens a session, runs the operation, and shapes the
//! rows into an [`Outcome`].

use std::sync::Arc;

use autorepo_metadata::{
    MetadataLookup, MetadataTable, OperationType, RepositoryMetainfo, ReturnStrategy,
    is_data_modification,
};
use serde::de::DeserializeOwned;
use tracing::{debug, error};

use crate::context::{OwnerToken, SessionContext};
use crate::transactional::current_thread;
use crate::session::{
    DatabaseSession, EntityManager, PersistenceEngine, PreparedQuery, run_in_transaction,
};
use crate::{PersistenceError, RepositoryError, Row, Value};

/// Raw result of a dispatched operation, before typed conversion.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Single row or nothing.
    Entity(Option<Row>),
    Entities(Vec<Row>),
    Optional(Option<Row>),
    /// Exactly one scalar row.
    Scalar(Row),
    Unit,
}

impl Outcome {
    fn kind(&self) -> &'static str {
        match self {
            Outcome::Entity(_) => "single entity",
            Outcome::Entities(_) => "collection",
            Outcome::Optional(_) => "optional",
            Outcome::Scalar(_) => "scalar",
            Outcome::Unit => "unit",
        }
    }

    fn mismatch(&self, expected: &'static str) -> RepositoryError {
        RepositoryError::ResultShape {
            expected,
            found: self.kind(),
        }
    }

    /// A single entity; no row is [`RepositoryError::EmptyResult`].
    pub fn into_single<T: DeserializeOwned>(self) -> Result<T, RepositoryError> {
        match self {
            Outcome::Entity(row) | Outcome::Optional(row) => {
                let row = row.ok_or(RepositoryError::EmptyResult)?;
                Ok(serde_json::from_value(row)?)
            }
            other => Err(other.mismatch("single entity")),
        }
    }

    pub fn into_optional<T: DeserializeOwned>(self) -> Result<Option<T>, RepositoryError> {
        match self {
            Outcome::Entity(row) | Outcome::Optional(row) => {
                Ok(row.map(serde_json::from_value).transpose()?)
            }
            other => Err(other.mismatch("optional")),
        }
    }

    pub fn into_collection<T: DeserializeOwned>(self) -> Result<Vec<T>, RepositoryError> {
        match self {
            Outcome::Entities(rows) => rows
                .into_iter()
                .map(|row| serde_json::from_value(row).map_err(RepositoryError::from))
                .collect(),
            other => Err(other.mismatch("collection")),
        }
    }

    /// A numeric or boolean scalar.
    ///
    /// Single-column rows (`{"count": 3}`) are unwrapped, and numeric results
    /// read as `bool` are true when non-zero, so `existsBy` methods can
    /// declare a `bool` return over a count query.
    pub fn into_scalar<T: DeserializeOwned>(self) -> Result<T, RepositoryError> {
        let row = match self {
            Outcome::Scalar(row) => row,
            other => return Err(other.mismatch("scalar")),
        };

        let row = match row {
            Row::Object(map) if map.len() == 1 => {
                map.into_iter().next().map_or(Row::Null, |(_, v)| v)
            }
            other => other,
        };

        match serde_json::from_value::<T>(row.clone()) {
            Ok(value) => Ok(value),
            Err(e) => match row.as_f64() {
                Some(n) => Ok(serde_json::from_value(Row::Bool(n != 0.0)).map_err(|_| e)?),
                None => Err(e.into()),
            },
        }
    }

    pub fn into_unit(self) -> Result<(), RepositoryError> {
        match self {
            Outcome::Unit => Ok(()),
            other => Err(other.mismatch("unit")),
        }
    }
}

/// Executes compiled repository operations against a persistence engine.
///
/// Owns no session itself: an operation reuses the session bound in the
/// context under [`OwnerToken::dispatcher`], or opens, commits and closes its
/// own.
pub struct Dispatcher {
    repository: String,
    table: Arc<MetadataTable>,
    engine: Arc<dyn PersistenceEngine>,
    context: SessionContext,
}

impl Dispatcher {
    pub fn new(
        table: Arc<MetadataTable>,
        engine: Arc<dyn PersistenceEngine>,
        context: SessionContext,
    ) -> Self {
        Self {
            repository: table.repository.clone(),
            table,
            engine,
            context,
        }
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn table(&self) -> &MetadataTable {
        &self.table
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn invoke(&self, signature: &str, args: Vec<Value>) -> Result<Outcome, RepositoryError> {
        let metainfo = self.table.get_by_method(signature).ok_or_else(|| {
            error!(
                repository = %self.repository,
                %signature,
                "no metadata for method; recompile the repository"
            );
            RepositoryError::MetadataResolution {
                repository: self.repository.clone(),
                signature: signature.to_string(),
            }
        })?;

        let result = self.dispatch(signature, metainfo, args);

        if let Err(e) = &result {
            error!(
                repository = %self.repository,
                %signature,
                query = %metainfo.query_template,
                thread = %current_thread(),
                error = %e,
                "repository operation failed"
            );
        }

        result
    }

    /// Reuse the bound session, or run in a session of our own.
    fn dispatch(
        &self,
        signature: &str,
        metainfo: &RepositoryMetainfo,
        args: Vec<Value>,
    ) -> Result<Outcome, RepositoryError> {
        if let Some(handle) = self.context.session(&OwnerToken::dispatcher()) {
            debug!(repository = %self.repository, %signature, "reusing bound session");
            let mut session = handle
                .try_borrow_mut()
                .map_err(|_| self.invalid(metainfo, "the bound session is already in use"))?;
            session.begin_transaction()?;
            return self.execute(&mut session, metainfo, args);
        }

        debug!(repository = %self.repository, %signature, "opening session");
        let mut session = self.engine.create_database_session()?;
        run_in_transaction(&mut session, |session| {
            self.execute(session, metainfo, args)
        })
    }

    fn execute(
        &self,
        session: &mut DatabaseSession,
        metainfo: &RepositoryMetainfo,
        args: Vec<Value>,
    ) -> Result<Outcome, RepositoryError> {
        let em = session
            .entity_manager()
            .ok_or_else(|| PersistenceError::configuration("session has no entity manager"))?;

        match metainfo.operation_type {
            OperationType::Save => {
                let entity = self.entity_argument(metainfo, args, "save a null entity")?;
                Ok(Outcome::Entity(Some(save(em, entity, metainfo.auto_flush)?)))
            }
            OperationType::SaveAll => {
                let Row::Array(items) =
                    self.entity_argument(metainfo, args, "save a null collection")?
                else {
                    return Err(self.invalid(metainfo, "expected a collection of entities"));
                };

                let mut saved = Vec::with_capacity(items.len());
                for item in items {
                    if item.is_null() {
                        return Err(self.invalid(metainfo, "cannot save a null entity"));
                    }
                    saved.push(save(em, item, metainfo.auto_flush)?);
                }
                Ok(Outcome::Entities(saved))
            }
            OperationType::Delete => {
                let entity = self.entity_argument(metainfo, args, "remove a null entity")?;
                delete(em, entity, metainfo.auto_flush)?;
                Ok(Outcome::Unit)
            }
            OperationType::FindById | OperationType::DeleteById => {
                if args.first().is_none_or(Value::is_null) {
                    return Err(self.invalid(metainfo, "the entity id must be provided"));
                }
                self.query(em, metainfo, args)
            }
            OperationType::FindAll | OperationType::Count | OperationType::Query => {
                self.query(em, metainfo, args)
            }
        }
    }

    fn query(
        &self,
        em: &mut dyn EntityManager,
        metainfo: &RepositoryMetainfo,
        args: Vec<Value>,
    ) -> Result<Outcome, RepositoryError> {
        let mut query = PreparedQuery::new(
            &metainfo.query_template,
            metainfo.is_native,
            &metainfo.result_type,
        );
        for (&index, name) in &metainfo.param_map {
            let value = args.get(index).cloned().ok_or_else(|| {
                self.invalid(
                    metainfo,
                    &format!("missing argument {index} for parameter :{name}"),
                )
            })?;
            query = query.bind(name, value);
        }

        if metainfo.auto_flush {
            em.flush()?;
        }

        let outcome = match metainfo.return_strategy {
            ReturnStrategy::SingleEntity => Outcome::Entity(single_or_none(em.fetch(&query)?)?),
            ReturnStrategy::Collection => Outcome::Entities(em.fetch(&query)?),
            ReturnStrategy::Optional => Outcome::Optional(single_or_none(em.fetch(&query)?)?),
            ReturnStrategy::Primitive => {
                if is_data_modification(&query.text) {
                    Outcome::Scalar(Row::from(em.execute_update(&query)?))
                } else {
                    Outcome::Scalar(exactly_one(em.fetch(&query)?)?)
                }
            }
            ReturnStrategy::Void => {
                if is_data_modification(&query.text) {
                    em.execute_update(&query)?;
                } else {
                    // Read-check methods: run the read, keep nothing.
                    em.fetch(&query.max_results(1))?;
                }
                Outcome::Unit
            }
        };

        if metainfo.auto_flush {
            em.flush()?;
        }

        Ok(outcome)
    }

    fn entity_argument(
        &self,
        metainfo: &RepositoryMetainfo,
        args: Vec<Value>,
        null_detail: &str,
    ) -> Result<Row, RepositoryError> {
        let mut args = args.into_iter();
        match (args.next(), args.next()) {
            (Some(value), None) if !value.is_null() => Ok(value.to_json()),
            (Some(_), None) | (None, _) => {
                Err(self.invalid(metainfo, &format!("cannot {null_detail}")))
            }
            (Some(_), Some(_)) => Err(self.invalid(metainfo, "expected exactly one argument")),
        }
    }

    fn invalid(&self, metainfo: &RepositoryMetainfo, detail: &str) -> RepositoryError {
        RepositoryError::InvalidOperation {
            repository: self.repository.clone(),
            method: metainfo.method_name.clone(),
            detail: detail.to_string(),
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("repository", &self.repository)
            .field("entries", &self.table.len())
            .field("context", &self.context)
            .finish()
    }
}

/// Attached entities are flushed and returned as-is; detached ones are merged.
fn save(em: &mut dyn EntityManager, entity: Row, flush: bool) -> Result<Row, PersistenceError> {
    if em.contains(&entity) {
        em.flush()?;
        return Ok(entity);
    }

    let managed = em.merge(entity)?;
    if flush {
        em.flush()?;
    }
    Ok(managed)
}

fn delete(em: &mut dyn EntityManager, entity: Row, flush: bool) -> Result<(), PersistenceError> {
    let target = if em.contains(&entity) {
        entity
    } else {
        em.merge(entity)?
    };

    em.remove(&target)?;
    if flush {
        em.flush()?;
    }
    Ok(())
}

fn single_or_none(mut rows: Vec<Row>) -> Result<Option<Row>, RepositoryError> {
    match rows.len() {
        0 | 1 => Ok(rows.pop()),
        n => Err(RepositoryError::NonUniqueResult { rows: n }),
    }
}

fn exactly_one(rows: Vec<Row>) -> Result<Row, RepositoryError> {
    single_or_none(rows)?.ok_or(RepositoryError::EmptyResult)
}
