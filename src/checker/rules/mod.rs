//! Built-in rule set.

pub mod identity;
pub mod instance;
pub mod metadata;
pub mod schema;
pub mod synthesis;

use super::rule::Rule;

/// Every built-in rule, in reporting order.
pub static BUILTIN_RULES: &[Rule] = &[
    instance::UNKNOWN_ENTITY,
    instance::UNKNOWN_FIELD,
    instance::MISSING_REQUIRED_FIELD,
    instance::INVALID_FIELD_TYPE,
    instance::MISSING_REQUIRED_SECTION,
    instance::UNKNOWN_SECTION,
    metadata::DUPLICATE_METADATA_KEY,
    metadata::INVALID_DATE_RANGE,
    metadata::UNRESOLVED_LINK,
    schema::DUPLICATE_FIELD_IN_SCHEMA,
    schema::INVALID_TYPE_EXPRESSION,
    schema::INVALID_DEFAULT_VALUE,
    schema::DUPLICATE_ENTITY_DEFINITION,
    schema::ALTER_UNDEFINED_ENTITY,
    schema::ALTER_BEFORE_DEFINE,
    schema::REMOVE_UNDEFINED_FIELD,
    synthesis::SYNTHESIS_MISSING_SOURCES,
    synthesis::SYNTHESIS_MISSING_PROMPT,
    synthesis::SYNTHESIS_UNKNOWN_QUERY_ENTITY,
    synthesis::ACTUALIZE_UNRESOLVED_TARGET,
    synthesis::ACTUALIZE_MISSING_UPDATED,
    synthesis::INVALID_CHECKPOINT,
    identity::DUPLICATE_TIMESTAMP,
    identity::DUPLICATE_LINK_ID,
];

pub fn builtin_rules() -> Vec<Rule> {
    BUILTIN_RULES.to_vec()
}

pub fn find_rule(code: &str) -> Option<&'static Rule> {
    BUILTIN_RULES.iter().find(|rule| rule.code == code)
}
