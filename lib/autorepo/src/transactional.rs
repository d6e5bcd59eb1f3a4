//! Transactional boundaries.
//!
//! A boundary opens one session for a span of repository calls and owns the
//! single commit-or-rollback decision for it. Ownership is an explicit
//! [`TransactionToken`] returned by [`TransactionalBoundary::begin`]; only the
//! token that opened the session may end it.
//!
//! ```ignore
//! let boundary = TransactionalBoundary::new(engine, context.clone());
//! boundary.run("transfer", || {
//!     accounts.save(&debit)?;
//!     accounts.save(&credit)?;
//!     Ok::<_, RepositoryError>(())
//! })?;
//! ```

use std::cell::{RefCell, RefMut};
use std::rc::Rc;
use std::sync::Arc;
use std::thread;

use tracing::{debug, error};

use crate::context::{OwnerToken, SessionContext, SessionHandle};
use crate::{DatabaseSession, PersistenceEngine, RepositoryError};

/// Proof of entry into a boundary, consumed by `complete` or `fail`.
#[derive(Debug)]
#[must_use = "a transaction token must be completed or failed"]
pub struct TransactionToken {
    owner: OwnerToken,
    method: String,
    owning: bool,
}

impl TransactionToken {
    /// True if this token opened the session and will end it.
    pub fn is_owner(&self) -> bool {
        self.owning
    }

    pub fn method(&self) -> &str {
        &self.method
    }
}

/// Opens, commits and rolls back sessions around transactional methods.
#[derive(Clone)]
pub struct TransactionalBoundary {
    engine: Arc<dyn PersistenceEngine>,
    context: SessionContext,
}

impl TransactionalBoundary {
    pub fn new(engine: Arc<dyn PersistenceEngine>, context: SessionContext) -> Self {
        Self { engine, context }
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Enter a boundary for `method`.
    ///
    /// Inside an open boundary the bound session is reused and the returned
    /// token does not own it. Otherwise a session is opened, a transaction
    /// begun, and the session bound both under a fresh owner and under the
    /// dispatcher key so repository calls pick it up.
    pub fn begin(&self, method: &str) -> Result<TransactionToken, RepositoryError> {
        if let Some(handle) = self.context.session(&OwnerToken::dispatcher()) {
            borrow(&handle, method)?.begin_transaction()?;
            debug!(%method, "joined enclosing transaction");
            return Ok(TransactionToken {
                owner: OwnerToken::dispatcher(),
                method: method.to_string(),
                owning: false,
            });
        }

        let mut session = self.engine.create_database_session().map_err(|e| {
            error!(%method, kind = %e.kind, error = %e, "failed to open session");
            RepositoryError::from(e)
        })?;
        if let Err(e) = session.begin_transaction() {
            error!(%method, kind = %e.kind, error = %e, "failed to begin transaction");
            if let Err(close) = session.close() {
                error!(%method, error = %close, "failed to close session");
            }
            return Err(e.into());
        }

        let owner = OwnerToken::new(method.to_string());
        self.context.add_session(
            Rc::new(RefCell::new(session)),
            &owner,
            &[OwnerToken::dispatcher()],
        );
        debug!(%method, %owner, "transaction opened");

        Ok(TransactionToken {
            owner,
            method: method.to_string(),
            owning: true,
        })
    }

    /// Leave the boundary normally.
    ///
    /// The owning token commits and unbinds the session; a nested token leaves
    /// the decision to its owner. The session is unbound even if the commit
    /// fails.
    pub fn complete(&self, token: TransactionToken) -> Result<(), RepositoryError> {
        let handle = self.bound_session(&token, "complete")?;
        if !token.owning {
            return Ok(());
        }

        let commit = borrow(&handle, &token.method)?.commit_if_active();
        drop(handle);
        let remove = self.context.remove_session(&token.owner);

        match commit.and(remove) {
            Ok(()) => {
                debug!(method = %token.method, owner = %token.owner, "transaction committed");
                Ok(())
            }
            Err(e) => {
                error!(method = %token.method, error = %e, "commit failed");
                Err(e.into())
            }
        }
    }

    /// Leave the boundary after an error.
    ///
    /// Rolls back the shared transaction even from a nested token, so the
    /// enclosing owner has nothing left to commit.
    pub fn fail(&self, token: TransactionToken) -> Result<(), RepositoryError> {
        let handle = self.bound_session(&token, "fail")?;
        let rollback = borrow(&handle, &token.method)?.rollback_if_active();
        drop(handle);

        let remove = if token.owning {
            self.context.remove_session(&token.owner)
        } else {
            Ok(())
        };

        debug!(method = %token.method, owner = %token.owner, "transaction rolled back");
        Ok(rollback.and(remove)?)
    }

    /// Run `body` inside a boundary.
    ///
    /// Commits when `body` succeeds, rolls back when it fails. The body's own
    /// error is returned; a rollback failure on that path is logged.
    pub fn run<T, E, F>(&self, method: &str, body: F) -> Result<T, E>
    where
        E: From<RepositoryError>,
        F: FnOnce() -> Result<T, E>,
    {
        let token = self.begin(method)?;
        match body() {
            Ok(value) => {
                self.complete(token)?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = self.fail(token) {
                    error!(%method, error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }

    fn bound_session(
        &self,
        token: &TransactionToken,
        operation: &str,
    ) -> Result<SessionHandle, RepositoryError> {
        let dispatcher = OwnerToken::dispatcher();
        let key = if token.owning {
            &token.owner
        } else {
            &dispatcher
        };

        self.context.session(key).ok_or_else(|| {
            let thread = current_thread();
            error!(
                method = %token.method,
                owner = %token.owner,
                %thread,
                "no session bound at transaction {operation}"
            );
            RepositoryError::SessionOutOfContext {
                operation: format!("{operation} of {}", token.method),
                thread,
            }
        })
    }
}

impl std::fmt::Debug for TransactionalBoundary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionalBoundary")
            .field("context", &self.context)
            .finish()
    }
}

fn borrow<'a>(
    handle: &'a SessionHandle,
    method: &str,
) -> Result<RefMut<'a, DatabaseSession>, RepositoryError> {
    handle
        .try_borrow_mut()
        .map_err(|_| RepositoryError::InvalidOperation {
            repository: "transaction".to_string(),
            method: method.to_string(),
            detail: "the bound session is already in use".to_string(),
        })
}

pub(crate) fn current_thread() -> String {
    let current = thread::current();
    match current.name() {
        Some(name) => name.to_string(),
        None => format!("{:?}", current.id()),
    }
}
