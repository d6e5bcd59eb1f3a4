//! Query text generation for derived and base CRUD operations.
//!
//! All generated text uses the portable query language with `e` as the
//! entity alias and named bind parameters (`:name`).

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::method_name::{LogicalOperator, ParsedQueryMethod, QueryPrefix, lower_first};

// `::` is matched first so type casts (`x::text`) never read as binds.
#[allow(clippy::expect_used)]
static BIND_PARAMETER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"::|:([a-zA-Z_][a-zA-Z0-9_]*)").expect("bind parameter pattern is valid")
});

/// Build query text for a parsed method name.
///
/// Each property `P` becomes `e.p = :p`; predicates are joined left to right
/// with the recorded operators and never parenthesized.
pub fn generate(parsed: &ParsedQueryMethod, entity_name: &str) -> String {
    let mut query = match parsed.prefix {
        QueryPrefix::FindBy => format!("SELECT e FROM {entity_name} e"),
        QueryPrefix::CountBy | QueryPrefix::ExistsBy => {
            format!("SELECT COUNT(e) FROM {entity_name} e")
        }
        QueryPrefix::DeleteBy => format!("DELETE FROM {entity_name} e"),
    };

    for (idx, property) in parsed.properties.iter().enumerate() {
        if idx == 0 {
            query.push_str(" WHERE ");
        } else {
            let op = parsed
                .operators
                .get(idx - 1)
                .copied()
                .unwrap_or(LogicalOperator::And);
            query.push(' ');
            query.push_str(op.sql());
            query.push(' ');
        }

        let name = lower_first(property);
        query.push_str(&format!("e.{name} = :{name}"));
    }

    query
}

pub fn select_all(entity_name: &str) -> String {
    format!("SELECT e FROM {entity_name} e")
}

pub fn select_by_id(entity_name: &str, id_property: &str) -> String {
    format!("SELECT e FROM {entity_name} e WHERE e.{id_property} = :{id_property}")
}

pub fn delete_by_id(entity_name: &str, id_property: &str) -> String {
    format!("DELETE FROM {entity_name} e WHERE e.{id_property} = :{id_property}")
}

pub fn count_all(entity_name: &str) -> String {
    format!("SELECT COUNT(e) FROM {entity_name} e")
}

/// Collect every named bind parameter referenced by the query text.
pub fn extract_bind_parameters(query: &str) -> BTreeSet<String> {
    BIND_PARAMETER
        .captures_iter(query)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// True for `UPDATE`, `DELETE` and `INSERT` statements.
pub fn is_data_modification(query: &str) -> bool {
    starts_with_keyword(query, &["UPDATE", "DELETE", "INSERT"])
}

pub fn is_valid_portable(query: &str) -> bool {
    starts_with_keyword(query, &["SELECT", "UPDATE", "DELETE", "FROM"])
}

pub fn is_valid_native(query: &str) -> bool {
    starts_with_keyword(query, &["SELECT", "INSERT", "UPDATE", "DELETE"])
}

fn starts_with_keyword(query: &str, keywords: &[&str]) -> bool {
    let upper = query.trim().to_ascii_uppercase();
    keywords.iter().any(|kw| {
        upper.strip_prefix(kw).is_some_and(|rest| {
            rest.chars()
                .next()
                .is_none_or(|c| !c.is_alphanumeric() && c != '_')
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method_name::parse;

    #[test]
    fn generates_select_with_conjunction() {
        let parsed = parse("findByNameAndAge").unwrap();
        assert_eq!(
            generate(&parsed, "User"),
            "SELECT e FROM User e WHERE e.name = :name AND e.age = :age"
        );
    }

    #[test]
    fn generates_count_for_count_and_exists() {
        let parsed = parse("countByStatusOrRegion").unwrap();
        assert_eq!(
            generate(&parsed, "Order"),
            "SELECT COUNT(e) FROM Order e WHERE e.status = :status OR e.region = :region"
        );

        let parsed = parse("existsByEmail").unwrap();
        assert_eq!(
            generate(&parsed, "User"),
            "SELECT COUNT(e) FROM User e WHERE e.email = :email"
        );
    }

    #[test]
    fn generates_delete() {
        let parsed = parse("deleteByFirstName").unwrap();
        assert_eq!(
            generate(&parsed, "User"),
            "DELETE FROM User e WHERE e.firstName = :firstName"
        );
    }

    #[test]
    fn missing_operator_defaults_to_and() {
        let parsed = ParsedQueryMethod {
            prefix: QueryPrefix::FindBy,
            properties: vec!["A".into(), "B".into()],
            operators: Vec::new(),
        };
        assert_eq!(
            generate(&parsed, "T"),
            "SELECT e FROM T e WHERE e.a = :a AND e.b = :b"
        );
    }

    #[test]
    fn generation_is_deterministic() {
        let parsed = parse("findByAAndBOrC").unwrap();
        assert_eq!(generate(&parsed, "T"), generate(&parsed.clone(), "T"));
    }

    #[test]
    fn base_templates() {
        assert_eq!(select_all("User"), "SELECT e FROM User e");
        assert_eq!(
            select_by_id("User", "id"),
            "SELECT e FROM User e WHERE e.id = :id"
        );
        assert_eq!(
            delete_by_id("User", "id"),
            "DELETE FROM User e WHERE e.id = :id"
        );
        assert_eq!(count_all("User"), "SELECT COUNT(e) FROM User e");
    }

    #[test]
    fn extracts_bind_parameters() {
        let binds = extract_bind_parameters(
            "SELECT e FROM User e WHERE e.name = :name AND e.age > :min_age OR e.x = :name",
        );
        assert_eq!(
            binds.into_iter().collect::<Vec<_>>(),
            vec!["min_age".to_string(), "name".to_string()]
        );
        assert!(extract_bind_parameters("SELECT e FROM User e").is_empty());
    }

    #[test]
    fn type_casts_are_not_bind_parameters() {
        let binds = extract_bind_parameters(
            "SELECT id::text FROM users WHERE created_at > :since::timestamptz",
        );
        assert_eq!(binds.into_iter().collect::<Vec<_>>(), vec!["since".to_string()]);
    }

    #[test]
    fn classifies_statements() {
        assert!(is_data_modification("  update User e set e.active = false"));
        assert!(is_data_modification("DELETE FROM User e"));
        assert!(is_data_modification("insert into users values (1)"));
        assert!(!is_data_modification("SELECT e FROM User e"));
        assert!(!is_data_modification("UPDATED_AT"));

        assert!(is_valid_portable("FROM User e"));
        assert!(!is_valid_portable("INSERT INTO users VALUES (1)"));
        assert!(is_valid_native("INSERT INTO users VALUES (1)"));
        assert!(!is_valid_native("FROM users"));
        assert!(!is_valid_native("DROP TABLE users"));
    }
}
