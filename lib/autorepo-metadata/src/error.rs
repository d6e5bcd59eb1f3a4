use thiserror::Error;

/// Validation failure raised while compiling a repository declaration.
///
/// Every variant names the repository (and method, where one is involved) so
/// the diagnostic points at the offending declaration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error(
        "{repository}::{method} redeclares a base CRUD operation; remove the declaration to use the built-in implementation"
    )]
    ReservedMethod { repository: String, method: String },

    #[error(
        "{repository}::{method} cannot be derived from its name; use a findBy/countBy/existsBy/deleteBy prefix or annotate it with an explicit query"
    )]
    NotDerivable { repository: String, method: String },

    #[error("{repository}::{method} repeats the same logical operator twice in a row")]
    RepeatedOperator { repository: String, method: String },

    #[error(
        "{repository}::{method} declares {properties} criteria but takes {params} parameter(s)"
    )]
    ArityMismatch {
        repository: String,
        method: String,
        properties: usize,
        params: usize,
    },

    #[error("{repository}::{method} references property '{property}' which entity {entity} does not declare")]
    UnknownProperty {
        repository: String,
        method: String,
        property: String,
        entity: String,
    },

    #[error(
        "{repository}::{method} parameter {index} ('{param}') has type {param_type}, but {entity}.{field} has type {field_type}"
    )]
    ParameterTypeMismatch {
        repository: String,
        method: String,
        index: usize,
        param: String,
        param_type: String,
        entity: String,
        field: String,
        field_type: String,
    },

    #[error(
        "{repository}::{method} returns {found}, expected {entity}, Option<{entity}>, Vec<{entity}>, a numeric/boolean primitive or ()"
    )]
    UnsupportedReturnType {
        repository: String,
        method: String,
        found: String,
        entity: String,
    },

    #[error("{repository}::{method} has an empty query annotation")]
    EmptyQuery { repository: String, method: String },

    #[error("{repository}::{method} parameter '{param}' is not referenced by the query")]
    UnboundParameter {
        repository: String,
        method: String,
        param: String,
    },

    #[error(
        "{repository}::{method} query parameter ':{bind}' has no matching method parameter; name a parameter '{bind}' or mark it #[param(\"{bind}\")]"
    )]
    OrphanBindParameter {
        repository: String,
        method: String,
        bind: String,
    },

    #[error("{repository}::{method} binds ':{bind}' from more than one parameter")]
    DuplicateBinding {
        repository: String,
        method: String,
        bind: String,
    },

    #[error("{repository}::{method} has an invalid {dialect} query: {query}")]
    InvalidQueryText {
        repository: String,
        method: String,
        dialect: &'static str,
        query: String,
    },

    #[error("{repository} is declared for entity {declared} but was compiled against {found}")]
    EntityMismatch {
        repository: String,
        declared: String,
        found: String,
    },

    #[error(
        "{repository} declares id type {id_type}, but the identifier {entity}.{field} has type {field_type}"
    )]
    IdTypeMismatch {
        repository: String,
        entity: String,
        field: String,
        field_type: String,
        id_type: String,
    },
}

/// Failure while writing or reading an emitted metadata table.
#[derive(Error, Debug)]
pub enum EmitError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
