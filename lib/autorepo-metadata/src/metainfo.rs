use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Database operation performed by a repository method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    Save,
    SaveAll,
    Delete,
    DeleteById,
    FindById,
    FindAll,
    Count,
    Query,
}

/// How a query's raw result set is shaped into the method's return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReturnStrategy {
    /// Single row or null.
    SingleEntity,
    Collection,
    /// Single row or null, wrapped.
    Optional,
    /// Exactly one row; zero or several is an error.
    Primitive,
    Void,
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationType::Save => "SAVE",
            OperationType::SaveAll => "SAVE_ALL",
            OperationType::Delete => "DELETE",
            OperationType::DeleteById => "DELETE_BY_ID",
            OperationType::FindById => "FIND_BY_ID",
            OperationType::FindAll => "FIND_ALL",
            OperationType::Count => "COUNT",
            OperationType::Query => "QUERY",
        };
        f.write_str(name)
    }
}

/// Compiled description of a single repository method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryMetainfo {
    pub method_name: String,
    pub operation_type: OperationType,
    /// Empty for operations that need no query (`SAVE`, `DELETE`).
    pub query_template: String,
    pub is_native: bool,
    pub return_strategy: ReturnStrategy,
    /// Type tag for the rows the query produces.
    pub result_type: String,
    /// Positional argument index to bind-parameter name.
    pub param_map: BTreeMap<usize, String>,
    pub auto_flush: bool,
}

impl RepositoryMetainfo {
    pub fn new(
        method_name: impl Into<String>,
        operation_type: OperationType,
        return_strategy: ReturnStrategy,
        result_type: impl Into<String>,
    ) -> Self {
        Self {
            method_name: method_name.into(),
            operation_type,
            query_template: String::new(),
            is_native: false,
            return_strategy,
            result_type: result_type.into(),
            param_map: BTreeMap::new(),
            auto_flush: false,
        }
    }

    pub fn with_query(mut self, query: impl Into<String>, native: bool) -> Self {
        self.query_template = query.into();
        self.is_native = native;
        self
    }

    pub fn bind(mut self, index: usize, name: impl Into<String>) -> Self {
        self.param_map.insert(index, name.into());
        self
    }

    pub fn with_auto_flush(mut self, auto_flush: bool) -> Self {
        self.auto_flush = auto_flush;
        self
    }
}

/// Base CRUD methods every repository provides. They are looked up by bare name.
pub const BASE_METHODS: [&str; 9] = [
    "save",
    "saveAndFlush",
    "saveAll",
    "delete",
    "deleteAndFlush",
    "deleteById",
    "findAll",
    "findById",
    "count",
];

pub fn is_base_method(name: &str) -> bool {
    BASE_METHODS.contains(&name)
}

/// Lookup key for a repository method.
pub struct MethodSignature;

impl MethodSignature {
    /// `findByName[String]`, or the bare name for base CRUD methods.
    pub fn key<S: AsRef<str>>(name: &str, param_types: &[S]) -> String {
        if is_base_method(name) {
            return name.to_string();
        }

        let params = param_types
            .iter()
            .map(|ty| ty.as_ref().split_whitespace().collect::<String>())
            .collect::<Vec<_>>()
            .join(",");
        format!("{name}[{params}]")
    }
}
