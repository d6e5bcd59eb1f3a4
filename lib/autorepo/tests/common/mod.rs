#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use autorepo::{
    CompilationUnit, DatabaseConfiguration, Entity, EntityManager, PersistenceEngine,
    PersistenceError, PreparedQuery, Repository, RepositoryError, RepositoryRegistry, Row,
    SessionContext, repository,
};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

/// Route logs to the test harness; `RUST_LOG=autorepo=debug` to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Log sink for asserting on emitted events.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    /// Run `f` with events at `error` and above written here.
    pub fn during<T>(&self, f: impl FnOnce() -> T) -> T {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::ERROR)
            .finish();
        tracing::subscriber::with_default(subscriber, f)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Entity, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[id]
    pub id: i64,
    pub name: String,
    pub age: i32,
    pub email: String,
}

pub fn user(id: i64, name: &str, age: i32) -> User {
    User {
        id,
        name: name.to_string(),
        age,
        email: format!("{name}@example.com"),
    }
}

pub fn row(user: &User) -> Row {
    serde_json::to_value(user).unwrap()
}

#[repository(entity = User, id = i64)]
pub trait UserRepository {
    fn find_by_name(&self, name: &str) -> Result<Vec<User>, RepositoryError>;

    fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;

    fn find_by_name_and_age(&self, name: &str, age: i32) -> Result<User, RepositoryError>;

    fn count_by_age(&self, age: i32) -> Result<i64, RepositoryError>;

    fn exists_by_email(&self, email: &str) -> Result<bool, RepositoryError>;

    fn delete_by_name(&self, name: &str) -> Result<(), RepositoryError>;

    #[query("SELECT u FROM User u WHERE u.age > :age")]
    fn older_than(&self, #[param("age")] min_age: i32) -> Result<Vec<User>, RepositoryError>;

    #[query(value = "UPDATE users SET age = age + 1 WHERE name = :name", native)]
    #[auto_flush]
    fn birthday(&self, name: &str) -> Result<u64, RepositoryError>;

    #[query("SELECT u FROM User u WHERE u.email = :email")]
    fn check_email(&self, email: &str) -> Result<(), RepositoryError>;

    #[non_queryable]
    fn label(&self) -> String {
        "users".to_string()
    }
}

/// Everything the fake engine was asked to do, across all its managers.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    pub sessions: usize,
    pub begins: usize,
    pub commits: usize,
    pub rollbacks: usize,
    pub closes: usize,
    pub merges: usize,
    pub removes: usize,
    pub flushes: usize,
    pub fetches: Vec<PreparedQuery>,
    pub updates: Vec<PreparedQuery>,
}

#[derive(Debug, Default)]
struct State {
    journal: Journal,
    results: VecDeque<Result<Vec<Row>, PersistenceError>>,
    attached: Vec<Row>,
    update_count: u64,
    fail_begin: bool,
}

/// In-memory engine that records calls and replays scripted results.
///
/// Merging an entity named "duplicate" fails with a constraint violation.
#[derive(Debug)]
pub struct FakeEngine {
    config: DatabaseConfiguration,
    state: Arc<Mutex<State>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::with_config(DatabaseConfiguration::from("jdbc:h2:mem:test"))
    }

    pub fn with_config(config: DatabaseConfiguration) -> Self {
        let state = State {
            update_count: 1,
            ..State::default()
        };
        Self {
            config,
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn journal(&self) -> Journal {
        self.state().journal.clone()
    }

    pub fn push_rows(&self, rows: Vec<Row>) {
        self.state().results.push_back(Ok(rows));
    }

    pub fn push_failure(&self, error: PersistenceError) {
        self.state().results.push_back(Err(error));
    }

    pub fn attach(&self, entity: Row) {
        self.state().attached.push(entity);
    }

    pub fn set_update_count(&self, count: u64) {
        self.state().update_count = count;
    }

    /// The next `begin` on any manager fails with a connection error.
    pub fn fail_next_begin(&self) {
        self.state().fail_begin = true;
    }
}

impl PersistenceEngine for FakeEngine {
    fn configuration(&self) -> &DatabaseConfiguration {
        &self.config
    }

    fn create_entity_manager(&self) -> Result<Box<dyn EntityManager>, PersistenceError> {
        self.state().journal.sessions += 1;
        Ok(Box::new(FakeManager {
            state: Arc::clone(&self.state),
            open: true,
            active: false,
        }))
    }
}

struct FakeManager {
    state: Arc<Mutex<State>>,
    open: bool,
    active: bool,
}

impl FakeManager {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }
}

impl EntityManager for FakeManager {
    fn is_open(&self) -> bool {
        self.open
    }

    fn is_transaction_active(&self) -> bool {
        self.active
    }

    fn begin(&mut self) -> Result<(), PersistenceError> {
        {
            let mut state = self.state();
            if std::mem::take(&mut state.fail_begin) {
                return Err(PersistenceError::connection("connection reset"));
            }
            state.journal.begins += 1;
        }
        self.active = true;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), PersistenceError> {
        self.active = false;
        self.state().journal.commits += 1;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), PersistenceError> {
        self.active = false;
        self.state().journal.rollbacks += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), PersistenceError> {
        self.open = false;
        self.state().journal.closes += 1;
        Ok(())
    }

    fn contains(&self, entity: &Row) -> bool {
        self.state().attached.contains(entity)
    }

    fn merge(&mut self, entity: Row) -> Result<Row, PersistenceError> {
        self.state().journal.merges += 1;
        if entity.get("name").and_then(Row::as_str) == Some("duplicate") {
            return Err(PersistenceError::constraint("duplicate key"));
        }
        Ok(entity)
    }

    fn remove(&mut self, _entity: &Row) -> Result<(), PersistenceError> {
        self.state().journal.removes += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), PersistenceError> {
        self.state().journal.flushes += 1;
        Ok(())
    }

    fn fetch(&mut self, query: &PreparedQuery) -> Result<Vec<Row>, PersistenceError> {
        let mut state = self.state();
        state.journal.fetches.push(query.clone());
        state.results.pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }

    fn execute_update(&mut self, query: &PreparedQuery) -> Result<u64, PersistenceError> {
        let mut state = self.state();
        state.journal.updates.push(query.clone());
        Ok(state.update_count)
    }
}

pub struct Fixture {
    pub engine: Arc<FakeEngine>,
    pub context: SessionContext,
    pub users: Repository<User>,
}

pub fn fixture() -> Fixture {
    init_tracing();
    let registry =
        RepositoryRegistry::compile(vec![CompilationUnit::of::<UserRepositoryMetadata>()])
            .unwrap();
    let engine = Arc::new(FakeEngine::new());
    let context = SessionContext::new();
    let users = registry
        .repository::<UserRepositoryMetadata>(engine.clone(), context.clone())
        .unwrap();

    Fixture {
        engine,
        context,
        users,
    }
}
