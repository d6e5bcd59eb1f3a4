//! Plain-data descriptions of entities and repository declarations.
//!
//! These are what `#[derive(Entity)]` and `#[repository]` produce at build
//! time, and what the compiler consumes. They carry type names as strings so
//! they can be emitted and reloaded without the Rust types in scope.

use serde::{Deserialize, Serialize};

/// A persistable type with exactly one identifier field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    /// Rust type name, as repositories and return types refer to it.
    pub type_name: String,
    /// Entity name as used in query text.
    pub name: String,
    /// camelCase property of the identifier field.
    pub id_property: String,
    pub id_type: String,
    pub fields: Vec<FieldDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Rust field name (snake_case).
    pub field: String,
    /// Query property name (camelCase).
    pub property: String,
    pub type_name: String,
}

impl EntityDescriptor {
    pub fn field_by_property(&self, property: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.property == property)
    }

    pub fn id_field(&self) -> Option<&FieldDescriptor> {
        self.field_by_property(&self.id_property)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryDeclaration {
    pub name: String,
    /// Entity name the repository is declared for.
    pub entity: String,
    pub id_type: String,
    pub methods: Vec<MethodDeclaration>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDeclaration {
    /// camelCase method name.
    pub name: String,
    pub params: Vec<ParamDeclaration>,
    pub return_type: ReturnShape,
    pub query: Option<QueryAnnotation>,
    pub auto_flush: bool,
    pub non_queryable: bool,
}

impl MethodDeclaration {
    pub fn new(name: impl Into<String>, return_type: ReturnShape) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            return_type,
            query: None,
            auto_flush: false,
            non_queryable: false,
        }
    }

    pub fn param(mut self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.params.push(ParamDeclaration {
            name: name.into(),
            type_name: type_name.into(),
            bind_name: None,
        });
        self
    }

    pub fn bound_param(
        mut self,
        name: impl Into<String>,
        type_name: impl Into<String>,
        bind_name: impl Into<String>,
    ) -> Self {
        self.params.push(ParamDeclaration {
            name: name.into(),
            type_name: type_name.into(),
            bind_name: Some(bind_name.into()),
        });
        self
    }

    pub fn query(mut self, text: impl Into<String>, native: bool) -> Self {
        self.query = Some(QueryAnnotation {
            text: text.into(),
            native,
        });
        self
    }

    pub fn auto_flush(mut self) -> Self {
        self.auto_flush = true;
        self
    }

    pub fn non_queryable(mut self) -> Self {
        self.non_queryable = true;
        self
    }

    pub fn param_types(&self) -> Vec<&str> {
        self.params.iter().map(|p| p.type_name.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamDeclaration {
    pub name: String,
    pub type_name: String,
    /// Explicit bind name from `#[param("..")]`.
    pub bind_name: Option<String>,
}

impl ParamDeclaration {
    pub fn effective_bind_name(&self) -> &str {
        self.bind_name.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryAnnotation {
    pub text: String,
    pub native: bool,
}

/// Declared return type, with the `Result` wrapper removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnShape {
    Unit,
    Entity(String),
    Optional(String),
    Collection(String),
    Primitive(String),
}

impl ReturnShape {
    pub fn type_name(&self) -> &str {
        match self {
            ReturnShape::Unit => "()",
            ReturnShape::Entity(ty)
            | ReturnShape::Optional(ty)
            | ReturnShape::Collection(ty)
            | ReturnShape::Primitive(ty) => ty,
        }
    }
}

impl std::fmt::Display for ReturnShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReturnShape::Unit => f.write_str("()"),
            ReturnShape::Entity(ty) | ReturnShape::Primitive(ty) => f.write_str(ty),
            ReturnShape::Optional(ty) => write!(f, "Option<{ty}>"),
            ReturnShape::Collection(ty) => write!(f, "Vec<{ty}>"),
        }
    }
}

/// Numeric and boolean types accepted as `PRIMITIVE` results.
pub const PRIMITIVE_TYPES: [&str; 15] = [
    "bool", "i8", "i16", "i32", "i64", "i128", "isize", "u8", "u16", "u32", "u64", "u128",
    "usize", "f32", "f64",
];

pub fn is_primitive(type_name: &str) -> bool {
    PRIMITIVE_TYPES.contains(&normalize_type_name(type_name).as_str())
}

/// Reduce a Rust type name to a comparable form.
///
/// `&'a str`, `std::string::String` and `Option<String>` all normalize to
/// `String`.
pub fn normalize_type_name(type_name: &str) -> String {
    let mut ty = type_name.trim();

    loop {
        let before = ty;
        if let Some(rest) = ty.strip_prefix('&') {
            ty = rest.trim_start();
        }
        if ty.starts_with('\'') {
            ty = ty
                .find(char::is_whitespace)
                .map_or("", |idx| &ty[idx..])
                .trim_start();
        }
        if let Some(rest) = ty.strip_prefix("mut ") {
            ty = rest.trim_start();
        }
        if ty == before {
            break;
        }
    }

    let compact: String = ty.split_whitespace().collect();
    let mut ty = compact.as_str();
    for prefix in [
        "::std::string::",
        "std::string::",
        "alloc::string::",
        "::std::option::",
        "std::option::",
        "core::option::",
    ] {
        if let Some(rest) = ty.strip_prefix(prefix) {
            ty = rest;
            break;
        }
    }

    if let Some(inner) = ty
        .strip_prefix("Option<")
        .and_then(|rest| rest.strip_suffix('>'))
    {
        return normalize_type_name(inner);
    }

    match ty {
        "str" => "String".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_string_like_types() {
        assert_eq!(normalize_type_name("&str"), "String");
        assert_eq!(normalize_type_name("&'a str"), "String");
        assert_eq!(normalize_type_name("std::string::String"), "String");
        assert_eq!(normalize_type_name("Option<&str>"), "String");
        assert_eq!(normalize_type_name("& mut i64"), "i64");
        assert_eq!(normalize_type_name("Vec < String >"), "Vec<String>");
    }

    #[test]
    fn primitive_detection() {
        assert!(is_primitive("i64"));
        assert!(is_primitive("bool"));
        assert!(is_primitive("f64"));
        assert!(!is_primitive("String"));
        assert!(!is_primitive("User"));
    }

    #[test]
    fn effective_bind_name_prefers_explicit() {
        let method = MethodDeclaration::new("byName", ReturnShape::Unit)
            .param("name", "String")
            .bound_param("n", "String", "other");
        assert_eq!(method.params[0].effective_bind_name(), "name");
        assert_eq!(method.params[1].effective_bind_name(), "other");
    }

    #[test]
    fn return_shape_display() {
        assert_eq!(ReturnShape::Optional("User".into()).to_string(), "Option<User>");
        assert_eq!(ReturnShape::Collection("User".into()).to_string(), "Vec<User>");
        assert_eq!(ReturnShape::Unit.to_string(), "()");
    }
}
