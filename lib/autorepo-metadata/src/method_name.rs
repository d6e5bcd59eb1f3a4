//! Query derivation grammar for repository method names.
//!
//! A derivable name is one of the supported prefixes followed by one or more
//! capitalized property names joined by `And` / `Or`:
//!
//! ```text
//! findByNameAndAge      -> FindBy, [Name, Age], [And]
//! countByStatusOrRegion -> CountBy, [Status, Region], [Or]
//! ```
//!
//! Operators are only recognized on a word boundary: `And`/`Or` must follow a
//! non-empty property and be followed by an uppercase letter. Property names
//! such as `AndroidVersion` or `OrderId` therefore stay whole.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Supported method-name prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryPrefix {
    FindBy,
    CountBy,
    ExistsBy,
    DeleteBy,
}

impl QueryPrefix {
    /// Prefixes in match priority order. The first match wins; none of the
    /// current prefixes overlap, so the order only matters if one is added
    /// that starts with another.
    pub const ALL: [QueryPrefix; 4] = [
        QueryPrefix::FindBy,
        QueryPrefix::CountBy,
        QueryPrefix::ExistsBy,
        QueryPrefix::DeleteBy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryPrefix::FindBy => "findBy",
            QueryPrefix::CountBy => "countBy",
            QueryPrefix::ExistsBy => "existsBy",
            QueryPrefix::DeleteBy => "deleteBy",
        }
    }
}

/// Boolean connective between two derived properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalOperator {
    And,
    Or,
}

impl LogicalOperator {
    /// The keyword as it appears inside a method name.
    pub fn keyword(&self) -> &'static str {
        match self {
            LogicalOperator::And => "And",
            LogicalOperator::Or => "Or",
        }
    }

    /// The keyword as emitted into query text.
    pub fn sql(&self) -> &'static str {
        match self {
            LogicalOperator::And => "AND",
            LogicalOperator::Or => "OR",
        }
    }
}

impl fmt::Display for LogicalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql())
    }
}

/// Structured predicate parsed from a derivable method name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedQueryMethod {
    pub prefix: QueryPrefix,
    /// Capitalized property tokens, in declaration order.
    pub properties: Vec<String>,
    /// Operators between consecutive properties; always one shorter than `properties`.
    pub operators: Vec<LogicalOperator>,
}

impl ParsedQueryMethod {
    /// True when two consecutive operators are identical (`AAndBAndC`).
    ///
    /// Such names are rejected by the compiler rather than silently grouped.
    pub fn has_repeated_operator(&self) -> bool {
        self.operators.windows(2).any(|pair| pair[0] == pair[1])
    }

    /// Rebuild the criteria part of the method name (everything after the prefix).
    pub fn criteria(&self) -> String {
        let mut criteria = String::new();
        for (idx, property) in self.properties.iter().enumerate() {
            if idx > 0 {
                if let Some(op) = self.operators.get(idx - 1) {
                    criteria.push_str(op.keyword());
                }
            }
            criteria.push_str(property);
        }
        criteria
    }
}

/// Parse a method name into a derived query description.
///
/// Returns `None` when the name has no supported prefix or nothing follows the
/// prefix; such methods need an explicit query annotation.
pub fn parse(method_name: &str) -> Option<ParsedQueryMethod> {
    let prefix = QueryPrefix::ALL
        .into_iter()
        .find(|p| method_name.starts_with(p.as_str()))?;

    let criteria = &method_name[prefix.as_str().len()..];
    if criteria.is_empty() {
        return None;
    }

    let mut properties = Vec::new();
    let mut operators = Vec::new();
    let mut current = String::new();
    let mut rest = criteria;

    while let Some(c) = rest.chars().next() {
        if let Some(op) = operator_at(rest, &current) {
            properties.push(std::mem::take(&mut current));
            operators.push(op);
            rest = &rest[op.keyword().len()..];
            continue;
        }

        current.push(c);
        rest = &rest[c.len_utf8()..];
    }

    // An operator is only recognized when another property follows it, so the
    // trailing token is never empty here.
    properties.push(current);

    Some(ParsedQueryMethod {
        prefix,
        properties,
        operators,
    })
}

fn operator_at(rest: &str, current: &str) -> Option<LogicalOperator> {
    if current.is_empty() {
        return None;
    }

    [LogicalOperator::And, LogicalOperator::Or]
        .into_iter()
        .find(|op| {
            rest.strip_prefix(op.keyword())
                .and_then(|tail| tail.chars().next())
                .is_some_and(|c| c.is_ascii_uppercase())
        })
}

/// Convert snake_case to camelCase
pub fn to_camel_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut capitalize_next = false;

    for c in s.chars() {
        if c == '_' {
            capitalize_next = !result.is_empty();
        } else if capitalize_next {
            result.push(c.to_ascii_uppercase());
            capitalize_next = false;
        } else {
            result.push(c);
        }
    }

    result
}

/// Lowercase the first character: `FirstName` -> `firstName`.
pub fn lower_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_conjunction() {
        let parsed = parse("findByNameAndAge").unwrap();
        assert_eq!(parsed.prefix, QueryPrefix::FindBy);
        assert_eq!(parsed.properties, vec!["Name", "Age"]);
        assert_eq!(parsed.operators, vec![LogicalOperator::And]);
    }

    #[test]
    fn parses_or_disjunction() {
        let parsed = parse("countByStatusOrRegion").unwrap();
        assert_eq!(parsed.prefix, QueryPrefix::CountBy);
        assert_eq!(parsed.properties, vec!["Status", "Region"]);
        assert_eq!(parsed.operators, vec![LogicalOperator::Or]);
    }

    #[test]
    fn rejects_names_without_prefix() {
        assert_eq!(parse("save"), None);
        assert_eq!(parse("findAll"), None);
        assert_eq!(parse("lookupByName"), None);
    }

    #[test]
    fn rejects_bare_prefix() {
        assert_eq!(parse("findBy"), None);
        assert_eq!(parse("deleteBy"), None);
    }

    #[test]
    fn keeps_operator_like_subwords_intact() {
        let parsed = parse("findByAndroidVersion").unwrap();
        assert_eq!(parsed.properties, vec!["AndroidVersion"]);
        assert!(parsed.operators.is_empty());

        let parsed = parse("existsByOrderIdOrBrand").unwrap();
        assert_eq!(parsed.prefix, QueryPrefix::ExistsBy);
        assert_eq!(parsed.properties, vec!["OrderId", "Brand"]);
        assert_eq!(parsed.operators, vec![LogicalOperator::Or]);

        let parsed = parse("findByColorAndOrigin").unwrap();
        assert_eq!(parsed.properties, vec!["Color", "Origin"]);
    }

    #[test]
    fn trailing_keyword_is_part_of_property() {
        let parsed = parse("findByNameAnd").unwrap();
        assert_eq!(parsed.properties, vec!["NameAnd"]);
        assert!(parsed.operators.is_empty());
    }

    #[test]
    fn detects_repeated_operators() {
        let parsed = parse("deleteByAAndBAndC").unwrap();
        assert!(parsed.has_repeated_operator());

        let parsed = parse("findByAAndBOrC").unwrap();
        assert!(!parsed.has_repeated_operator());
    }

    #[test]
    fn criteria_reconstructs_suffix() {
        let parsed = parse("findByFirstNameOrLastNameAndAge").unwrap();
        assert_eq!(parsed.criteria(), "FirstNameOrLastNameAndAge");
    }

    #[test]
    fn camel_case_conversion() {
        assert_eq!(to_camel_case("find_by_name_and_age"), "findByNameAndAge");
        assert_eq!(to_camel_case("count"), "count");
        assert_eq!(to_camel_case("save_and_flush"), "saveAndFlush");
        assert_eq!(lower_first("FirstName"), "firstName");
        assert_eq!(lower_first(""), "");
    }
}
