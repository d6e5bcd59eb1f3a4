#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use std::sync::Arc;

use autorepo::{
    CompilationUnit, CompileError, ConfigError, CrudRepository, DatabaseConfiguration, Entity,
    MethodDeclaration, PersistenceError, PersistenceErrorKind, RepositoryDefinition,
    RepositoryError, RepositoryRegistry, ReturnShape, SessionContext, Value, initialize_engine,
};
use common::{FakeEngine, User, UserRepositoryMetadata};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Entity, Serialize, Deserialize)]
#[entity(name = "Orders")]
pub struct OrderRecord {
    #[id]
    #[property(name = "orderId")]
    pub order_ref: String,
    pub customer_name: String,
    #[property(skip)]
    #[serde(default)]
    pub cached_total: Option<f64>,
}

#[autorepo::repository(entity = OrderRecord, id = String)]
pub trait OrderRepository {
    fn find_by_customer_name(&self, customer_name: &str)
    -> Result<Vec<OrderRecord>, RepositoryError>;
}

#[derive(Debug, Clone, PartialEq, Entity, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sensor {
    #[id]
    pub id: i16,
    pub level: i16,
    pub serial: i64,
}

#[autorepo::repository(entity = Sensor, id = i16)]
pub trait SensorRepository {
    fn find_by_level(&self, level: i16) -> Result<Vec<Sensor>, RepositoryError>;

    fn find_by_serial(&self, serial: &i64) -> Result<Option<Sensor>, RepositoryError>;
}

#[test]
fn entity_derive_describes_fields() {
    let descriptor = OrderRecord::descriptor();

    assert_eq!(descriptor.type_name, "OrderRecord");
    assert_eq!(descriptor.name, "Orders");
    assert_eq!(descriptor.id_property, "orderId");
    assert_eq!(descriptor.id_type, "String");
    assert_eq!(descriptor.fields.len(), 2);
    assert_eq!(
        descriptor.field_by_property("customerName").unwrap().field,
        "customer_name"
    );
    assert!(descriptor.field_by_property("cachedTotal").is_none());
}

#[test]
fn repository_macro_describes_methods() {
    assert_eq!(UserRepositoryMetadata::NAME, "UserRepository");

    let declaration = UserRepositoryMetadata::declaration();
    assert_eq!(declaration.entity, "User");
    assert_eq!(declaration.id_type, "i64");

    let older = declaration
        .methods
        .iter()
        .find(|m| m.name == "olderThan")
        .unwrap();
    assert_eq!(older.params[0].effective_bind_name(), "age");
    assert_eq!(
        older.query.as_ref().unwrap().text,
        "SELECT u FROM User u WHERE u.age > :age"
    );

    let birthday = declaration
        .methods
        .iter()
        .find(|m| m.name == "birthday")
        .unwrap();
    assert!(birthday.auto_flush);
    assert!(birthday.query.as_ref().unwrap().native);
    assert_eq!(birthday.return_type, ReturnShape::Primitive("u64".into()));

    let label = declaration.methods.iter().find(|m| m.name == "label").unwrap();
    assert!(label.non_queryable);
}

#[test]
fn compiles_units_in_parallel() {
    let registry = RepositoryRegistry::compile(vec![
        CompilationUnit::of::<UserRepositoryMetadata>(),
        CompilationUnit::of::<OrderRepositoryMetadata>(),
    ])
    .unwrap();

    assert_eq!(registry.len(), 2);

    let orders = registry.table("OrderRepository").unwrap();
    assert_eq!(orders.entity_name, "Orders");
    let users = registry.table("UserRepository").unwrap();
    assert!(users.len() > 9);
}

#[test]
fn compiled_order_repository_dispatches() {
    let registry =
        RepositoryRegistry::compile(vec![CompilationUnit::of::<OrderRepositoryMetadata>()])
            .unwrap();
    let engine = Arc::new(FakeEngine::new());
    let orders = registry
        .repository::<OrderRepositoryMetadata>(engine.clone(), SessionContext::new())
        .unwrap();

    assert!(orders.find_by_customer_name("ada").unwrap().is_empty());

    let journal = engine.journal();
    assert_eq!(
        journal.fetches[0].text,
        "SELECT e FROM Orders e WHERE e.customerName = :customerName"
    );
}

#[test]
fn failures_are_aggregated_and_do_not_drop_other_units() {
    let mut unknown = CompilationUnit::of::<UserRepositoryMetadata>();
    unknown.declaration.name = "BrokenByProperty".into();
    unknown.declaration.methods = vec![
        MethodDeclaration::new("findByNickname", ReturnShape::Collection("User".into()))
            .param("nickname", "String"),
    ];

    let mut arity = CompilationUnit::of::<UserRepositoryMetadata>();
    arity.declaration.name = "BrokenByArity".into();
    arity.declaration.methods = vec![
        MethodDeclaration::new("findByNameAndAge", ReturnShape::Collection("User".into()))
            .param("name", "String"),
    ];

    let err = RepositoryRegistry::compile(vec![
        unknown,
        CompilationUnit::of::<OrderRepositoryMetadata>(),
        arity,
    ])
    .unwrap_err();

    assert_eq!(err.failures.len(), 2);
    assert!(
        err.failures
            .iter()
            .any(|e| matches!(e, CompileError::UnknownProperty { property, .. } if property == "nickname"))
    );
    assert!(
        err.failures
            .iter()
            .any(|e| matches!(e, CompileError::ArityMismatch { .. }))
    );
    assert_eq!(err.registry.len(), 1);
    assert!(err.registry.table("OrderRepository").is_some());
}

#[test]
fn empty_batch_compiles_to_empty_registry() {
    let registry = RepositoryRegistry::compile(Vec::new()).unwrap();
    assert!(registry.is_empty());
}

#[test]
fn unregistered_repository_is_a_resolution_error() {
    let engine = Arc::new(FakeEngine::new());
    let err = RepositoryRegistry::new()
        .repository::<UserRepositoryMetadata>(engine, SessionContext::new())
        .unwrap_err();

    assert!(matches!(err, RepositoryError::MetadataResolution { .. }));
}

#[test]
fn engine_initialization_classifies_failures() {
    let config = DatabaseConfiguration::new("postgresql", "jdbc:postgresql://db/app", "app", "");

    let engine = initialize_engine(config.clone(), |c| Ok(FakeEngine::with_config(c))).unwrap();
    assert_eq!(engine.journal().sessions, 0);

    let err = initialize_engine(config.clone(), |_| {
        Err::<FakeEngine, _>(PersistenceError::missing_driver("org.postgresql.Driver"))
    })
    .unwrap_err();
    assert!(matches!(
        err,
        RepositoryError::Persistence(ref e) if e.kind == PersistenceErrorKind::MissingDriver
    ));

    let err = initialize_engine(config, |_| {
        Err::<FakeEngine, _>(PersistenceError::connection("connection refused"))
    })
    .unwrap_err();
    assert!(matches!(
        err,
        RepositoryError::Persistence(ref e) if e.kind == PersistenceErrorKind::Connection
    ));

    let unknown = DatabaseConfiguration::new("x", "jdbc:sqlite:app.db", "", "");
    let err = initialize_engine(unknown, |c| Ok(FakeEngine::with_config(c))).unwrap_err();
    assert!(matches!(
        err,
        RepositoryError::Configuration(ConfigError::UnknownDialect { .. })
    ));
}

#[test]
fn typed_entity_ids_are_checked() {
    fn id_of<E: Entity>(id: E::Id) -> autorepo::Value {
        id.into()
    }

    assert_eq!(id_of::<User>(5), autorepo::Value::Int(5));
    assert_eq!(
        id_of::<OrderRecord>("A-1".to_string()),
        autorepo::Value::String("A-1".into())
    );
}

#[test]
fn narrow_and_borrowed_parameters_bind() {
    let registry =
        RepositoryRegistry::compile(vec![CompilationUnit::of::<SensorRepositoryMetadata>()])
            .unwrap();
    let engine = Arc::new(FakeEngine::new());
    let sensors = registry
        .repository::<SensorRepositoryMetadata>(engine.clone(), SessionContext::new())
        .unwrap();

    assert!(sensors.find_by_level(3).unwrap().is_empty());
    assert_eq!(sensors.find_by_serial(&42).unwrap(), None);
    assert_eq!(sensors.find_by_id(7).unwrap(), None);

    let journal = engine.journal();
    assert_eq!(
        journal.fetches[0].text,
        "SELECT e FROM Sensor e WHERE e.level = :level"
    );
    assert_eq!(journal.fetches[0].params.get("level"), Some(&Value::Int(3)));
    assert_eq!(journal.fetches[1].params.get("serial"), Some(&Value::Int(42)));
    assert_eq!(journal.fetches[2].params.get("id"), Some(&Value::Int(7)));
}
