//! Session synchronization context.
//!
//! Holds the sessions opened by transactional boundaries for one call tree,
//! keyed by the owner that opened them. Nested calls find the session under
//! a well-known owner key ([`OwnerToken::dispatcher`]) and reuse it instead of
//! opening their own.
//!
//! The context is built on `Rc` and is neither `Send` nor `Sync`: a session
//! cannot escape to another thread.

use std::borrow::Cow;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::{DatabaseSession, PersistenceError};

/// Shared handle to a session bound in a [`SessionContext`].
pub type SessionHandle = Rc<RefCell<DatabaseSession>>;

static NEXT_OWNER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of whoever bound a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OwnerToken {
    name: Cow<'static, str>,
    id: u64,
}

impl OwnerToken {
    /// A fresh owner, distinct from every other token.
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            id: NEXT_OWNER_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// The key repository dispatchers look sessions up under.
    pub fn dispatcher() -> Self {
        Self {
            name: Cow::Borrowed("dispatcher"),
            id: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for OwnerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.id)
    }
}

/// Owner-keyed session registry for a single thread's call tree.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone, Default)]
pub struct SessionContext {
    sessions: Rc<RefCell<HashMap<OwnerToken, SessionHandle>>>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if a session is bound under `owner` and reports itself open.
    pub fn has_session(&self, owner: &OwnerToken) -> bool {
        self.session(owner).is_some()
    }

    /// The open session bound under `owner`, if any.
    pub fn session(&self, owner: &OwnerToken) -> Option<SessionHandle> {
        let sessions = self.sessions.borrow();
        let handle = sessions.get(owner)?;
        // A session that is mutably borrowed is mid-operation, hence open.
        let valid = handle
            .try_borrow()
            .map_or(true, |session| session.is_valid_session());
        valid.then(|| Rc::clone(handle))
    }

    /// Bind `session` under `owner` and every alias.
    pub fn add_session(&self, session: SessionHandle, owner: &OwnerToken, aliases: &[OwnerToken]) {
        let mut sessions = self.sessions.borrow_mut();
        for alias in aliases {
            sessions.insert(alias.clone(), Rc::clone(&session));
        }
        debug!(owner = %owner, aliases = aliases.len(), "session bound");
        sessions.insert(owner.clone(), session);
    }

    /// Unbind the session owned by `owner`, roll it back if still active, and
    /// close it.
    ///
    /// Every alias of the same session is evicted as well. Removing an owner
    /// with nothing bound is a no-op.
    pub fn remove_session(&self, owner: &OwnerToken) -> Result<(), PersistenceError> {
        let removed = {
            let mut sessions = self.sessions.borrow_mut();
            let Some(session) = sessions.remove(owner) else {
                return Ok(());
            };
            sessions.retain(|_, bound| !Rc::ptr_eq(bound, &session));
            if sessions.is_empty() {
                *sessions = HashMap::new();
            }
            session
        };

        debug!(owner = %owner, "session unbound");

        let mut session = removed.borrow_mut();
        let rollback = session.rollback_if_active();
        let close = session.close();
        rollback.and(close)
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.borrow().is_empty()
    }

    pub fn len(&self) -> usize {
        self.sessions.borrow().len()
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sessions = self.sessions.borrow();
        let mut owners: Vec<String> = sessions.keys().map(ToString::to_string).collect();
        owners.sort();
        f.debug_struct("SessionContext")
            .field("owners", &owners)
            .finish()
    }
}
