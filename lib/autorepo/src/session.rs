//! Boundary to the external persistence engine.
//!
//! The engine owns connections, mapping and query execution. This crate only
//! drives it through [`EntityManager`] and [`PersistenceEngine`].

use std::collections::BTreeMap;

use tracing::{debug, error};

use crate::{DatabaseConfiguration, PersistenceError, Row, Value};

/// A query ready to run: text, dialect flag and bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedQuery {
    pub text: String,
    /// Native storage dialect rather than the portable query language.
    pub native: bool,
    /// Type tag the engine should map result rows to.
    pub result_type: String,
    pub params: BTreeMap<String, Value>,
    pub max_results: Option<u64>,
}

impl PreparedQuery {
    pub fn new(text: impl Into<String>, native: bool, result_type: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            native,
            result_type: result_type.into(),
            params: BTreeMap::new(),
            max_results: None,
        }
    }

    /// Bind a named parameter.
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Set the maximum number of rows to fetch.
    pub fn max_results(mut self, max: u64) -> Self {
        self.max_results = Some(max);
        self
    }
}

/// Entity-manager-style session exposed by the persistence engine.
///
/// One manager backs one [`DatabaseSession`]. Managers are bound to the
/// thread that created them and are never required to be `Send`.
pub trait EntityManager {
    fn is_open(&self) -> bool;

    fn is_transaction_active(&self) -> bool;

    fn begin(&mut self) -> Result<(), PersistenceError>;

    fn commit(&mut self) -> Result<(), PersistenceError>;

    fn rollback(&mut self) -> Result<(), PersistenceError>;

    fn close(&mut self) -> Result<(), PersistenceError>;

    /// Whether the entity is attached to this manager's persistence context.
    fn contains(&self, entity: &Row) -> bool;

    /// Attach a detached entity, returning the managed instance.
    fn merge(&mut self, entity: Row) -> Result<Row, PersistenceError>;

    fn remove(&mut self, entity: &Row) -> Result<(), PersistenceError>;

    /// Write pending changes without committing.
    fn flush(&mut self) -> Result<(), PersistenceError>;

    /// Execute a read and return the result rows.
    fn fetch(&mut self, query: &PreparedQuery) -> Result<Vec<Row>, PersistenceError>;

    /// Execute a data-modification statement and return the affected row count.
    fn execute_update(&mut self, query: &PreparedQuery) -> Result<u64, PersistenceError>;
}

/// Factory for entity managers, built once from a [`DatabaseConfiguration`].
///
/// Shared across threads; the managers it creates are not.
pub trait PersistenceEngine: Send + Sync {
    fn configuration(&self) -> &DatabaseConfiguration;

    fn create_entity_manager(&self) -> Result<Box<dyn EntityManager>, PersistenceError>;

    fn create_database_session(&self) -> Result<DatabaseSession, PersistenceError> {
        Ok(DatabaseSession::new(self.create_entity_manager()?))
    }
}

/// Transaction lifecycle around an optional entity manager.
///
/// Every lifecycle method is a no-op when no manager is present.
pub struct DatabaseSession {
    manager: Option<Box<dyn EntityManager>>,
}

impl DatabaseSession {
    pub fn new(manager: Box<dyn EntityManager>) -> Self {
        Self {
            manager: Some(manager),
        }
    }

    /// A session with no backing manager.
    pub fn detached() -> Self {
        Self { manager: None }
    }

    pub fn entity_manager(&mut self) -> Option<&mut dyn EntityManager> {
        match &mut self.manager {
            Some(em) => Some(&mut **em),
            None => None,
        }
    }

    pub fn is_valid_session(&self) -> bool {
        self.manager.as_ref().is_some_and(|em| em.is_open())
    }

    pub fn is_transaction_active(&self) -> bool {
        self.manager
            .as_ref()
            .is_some_and(|em| em.is_transaction_active())
    }

    /// Begin a transaction unless one is already active.
    pub fn begin_transaction(&mut self) -> Result<(), PersistenceError> {
        match self.manager.as_deref_mut() {
            Some(em) if !em.is_transaction_active() => em.begin(),
            _ => Ok(()),
        }
    }

    pub fn commit_if_active(&mut self) -> Result<(), PersistenceError> {
        match self.manager.as_deref_mut() {
            Some(em) if em.is_transaction_active() => em.commit(),
            _ => Ok(()),
        }
    }

    pub fn rollback_if_active(&mut self) -> Result<(), PersistenceError> {
        match self.manager.as_deref_mut() {
            Some(em) if em.is_transaction_active() => em.rollback(),
            _ => Ok(()),
        }
    }

    pub fn close(&mut self) -> Result<(), PersistenceError> {
        match self.manager.as_deref_mut() {
            Some(em) if em.is_open() => em.close(),
            _ => Ok(()),
        }
    }
}

impl std::fmt::Debug for DatabaseSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseSession")
            .field("attached", &self.manager.is_some())
            .field("valid", &self.is_valid_session())
            .field("transaction_active", &self.is_transaction_active())
            .finish()
    }
}

/// Run `action` inside begin / commit-or-rollback / close.
///
/// The session is always closed. On failure the transaction is rolled back and
/// the action's own error is returned; a rollback or close failure on that path
/// is logged rather than replacing it.
pub fn run_in_transaction<T, E, F>(session: &mut DatabaseSession, action: F) -> Result<T, E>
where
    E: From<PersistenceError>,
    F: FnOnce(&mut DatabaseSession) -> Result<T, E>,
{
    if let Err(e) = session.begin_transaction() {
        close_quietly(session);
        return Err(e.into());
    }

    let result = action(&mut *session).and_then(|value| {
        session.commit_if_active()?;
        Ok(value)
    });

    match result {
        Ok(value) => {
            session.close()?;
            debug!("transaction committed");
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = session.rollback_if_active() {
                error!(error = %rollback, "rollback failed");
            }
            close_quietly(session);
            Err(e)
        }
    }
}

fn close_quietly(session: &mut DatabaseSession) {
    if let Err(e) = session.close() {
        error!(error = %e, "failed to close session");
    }
}
