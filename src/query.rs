//! Entity + condition matching for synthesis sources.
//!
//! ```text
//! lore
//! lore where #career
//! lore where subject = ^self and #career
//! journal where mood = "good"
//! ```
//!
//! Conditions within one query are conjunctive. A list of queries is a union: an entry matching any
//! query is returned once, deduplicated by (file, timestamp).

use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt, str::FromStr};

use crate::{
    ast::{value::split_top_level, Entry, LinkId, ValueContent},
    ThaloError,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Condition {
    /// `#tag`
    Tag(String),
    /// `^id`: the entry declares or references the id.
    Link(LinkId),
    /// `field = value`, compared on normalized value text.
    FieldEquals { field: String, value: String },
}

impl Condition {
    pub fn matches(&self, entry: &Entry) -> bool {
        match self {
            Condition::Tag(tag) => entry.header().has_tag(tag),
            Condition::Link(link) => {
                entry.link_id() == Some(link)
                    || entry.outgoing_links().iter().any(|(l, _)| *l == link)
            }
            Condition::FieldEquals { field, value } => entry
                .metadata()
                .iter()
                .filter(|m| &m.key == field)
                .any(|m| {
                    m.value
                        .content
                        .scalars()
                        .iter()
                        .any(|scalar| &scalar.normalized() == value)
                }),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Tag(tag) => write!(f, "#{tag}"),
            Condition::Link(link) => write!(f, "{link}"),
            Condition::FieldEquals { field, value } => {
                if value.starts_with('^') || !value.contains(char::is_whitespace) {
                    write!(f, "{field} = {value}")
                } else {
                    write!(f, "{field} = \"{}\"", value.replace('"', "\\\""))
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Query {
    pub entity: String,
    pub conditions: Vec<Condition>,
}

impl Query {
    pub fn new<S: Into<String>>(entity: S) -> Self {
        Query {
            entity: entity.into(),
            conditions: vec![],
        }
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Instances of the query's entity that satisfy every condition.
    pub fn matches(&self, entry: &Entry) -> bool {
        match entry {
            Entry::Instance(instance) => {
                instance.entity == self.entity && self.conditions.iter().all(|c| c.matches(entry))
            }
            _ => false,
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.entity)?;
        for (idx, condition) in self.conditions.iter().enumerate() {
            let joiner = if idx == 0 { " where " } else { " and " };
            write!(f, "{joiner}{condition}")?;
        }
        Ok(())
    }
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false)
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Whitespace-separated words, keeping quoted strings whole.
fn words(text: &str) -> Vec<&str> {
    split_top_level(text, ' ')
        .into_iter()
        .flat_map(|part| part.split(['\t', '\n']))
        .filter(|w| !w.is_empty())
        .collect()
}

fn parse_condition(text: &str) -> Result<Condition, ThaloError> {
    let text = text.trim();
    if let Some(tag) = text.strip_prefix('#') {
        if !tag.is_empty() && !tag.contains(char::is_whitespace) {
            return Ok(Condition::Tag(tag.to_string()));
        }
    }
    if text.starts_with('^') && text.len() > 1 && !text.contains(char::is_whitespace) {
        return Ok(Condition::Link(LinkId::new(text)));
    }
    if let Some((field, value)) = text.split_once('=') {
        let field = field.trim();
        let value = value.trim();
        if is_identifier(field) && !value.is_empty() {
            return Ok(Condition::FieldEquals {
                field: field.to_string(),
                value: ValueContent::parse(value).normalized(),
            });
        }
    }
    Err(ThaloError::Serialization(format!(
        "invalid query condition `{text}`"
    )))
}

impl FromStr for Query {
    type Err = ThaloError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let words = words(text.trim());
        let Some((entity, rest)) = words.split_first() else {
            return Err(ThaloError::Serialization("empty query".to_string()));
        };
        if !is_identifier(entity) {
            return Err(ThaloError::Serialization(format!(
                "invalid query entity `{entity}`"
            )));
        }
        let mut query = Query::new(*entity);
        match rest.split_first() {
            None => return Ok(query),
            Some((kw, conditions)) if *kw == "where" && !conditions.is_empty() => {
                for group in conditions.split(|w| *w == "and") {
                    if group.is_empty() {
                        return Err(ThaloError::Serialization(format!(
                            "dangling `and` in query `{text}`"
                        )));
                    }
                    query.conditions.push(parse_condition(&group.join(" "))?);
                }
            }
            Some(_) => {
                return Err(ThaloError::Serialization(format!(
                    "expected `where` in query `{text}`"
                )))
            }
        }
        Ok(query)
    }
}

/// Entries matching any of `queries`, in input order, each (file, timestamp) at most once.
pub fn execute<'a, I>(queries: &[Query], entries: I) -> Vec<&'a Entry>
where
    I: IntoIterator<Item = &'a Entry>,
{
    let mut seen = BTreeSet::new();
    let mut matched = vec![];
    for entry in entries {
        if !queries.iter().any(|q| q.matches(entry)) {
            continue;
        }
        if seen.insert((entry.file().to_string(), entry.timestamp().raw().to_string())) {
            matched.push(entry);
        }
    }
    tracing::trace!(
        "[query::execute] {} queries matched {} entries",
        queries.len(),
        matched.len()
    );
    matched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DocumentOptions, Workspace};

    const ENTRIES: &str = "2026-01-01T00:00Z create lore \"Job\" ^job #career\n  type: \"fact\"\n\n2026-01-02T00:00Z create lore \"Hobby\" #hobby\n  subject: ^job\n\n2026-01-03T00:00Z create journal \"Day\" #career\n\n2026-01-04T00:00Z create lore \"Promotion\" #career #hobby\n  type: \"insight\"\n";

    fn titles(ws: &Workspace, queries: &[&str]) -> Vec<String> {
        let queries: Vec<Query> = queries.iter().map(|q| q.parse().unwrap()).collect();
        execute(&queries, ws.all_entries())
            .into_iter()
            .map(|e| e.title().to_string())
            .collect()
    }

    fn workspace() -> Workspace {
        let mut ws = Workspace::new();
        ws.add_document(ENTRIES, DocumentOptions::new("a.thalo"));
        ws
    }

    #[test]
    fn test_parse_entity_only() {
        let query: Query = "lore".parse().unwrap();
        assert_eq!(query, Query::new("lore"));
    }

    #[test]
    fn test_parse_conditions() {
        let query: Query = "lore where subject = ^self and #career and type = \"a fact\""
            .parse()
            .unwrap();
        assert_eq!(query.entity, "lore");
        assert_eq!(
            query.conditions,
            vec![
                Condition::FieldEquals {
                    field: "subject".into(),
                    value: "^self".into()
                },
                Condition::Tag("career".into()),
                Condition::FieldEquals {
                    field: "type".into(),
                    value: "a fact".into()
                },
            ]
        );
        assert_eq!(
            query.to_string(),
            "lore where subject = ^self and #career and type = \"a fact\""
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!("".parse::<Query>().is_err());
        assert!("lore #career".parse::<Query>().is_err());
        assert!("lore where".parse::<Query>().is_err());
        assert!("lore where #a and".parse::<Query>().is_err());
        assert!("9lore".parse::<Query>().is_err());
    }

    #[test]
    fn test_tag_condition_selects_entity_instances() {
        let ws = workspace();
        assert_eq!(titles(&ws, &["lore where #career"]), vec!["Job", "Promotion"]);
        assert_eq!(titles(&ws, &["journal"]), vec!["Day"]);
        assert!(titles(&ws, &["opinion where #career"]).is_empty());
    }

    #[test]
    fn test_union_returns_each_entry_once() {
        let ws = workspace();
        assert_eq!(
            titles(&ws, &["lore where #career", "lore where #hobby"]),
            vec!["Job", "Hobby", "Promotion"]
        );
        assert_eq!(
            titles(&ws, &["lore where #career", "journal where #career"]),
            vec!["Job", "Day", "Promotion"]
        );
        let queries: Vec<Query> = vec!["lore where #hobby".parse().unwrap(), Query::new("lore")];
        assert_eq!(ws.query(&queries).len(), 3);
    }

    #[test]
    fn test_link_and_field_conditions() {
        let ws = workspace();
        // declaring and referencing both count
        assert_eq!(titles(&ws, &["lore where ^job"]), vec!["Job", "Hobby"]);
        assert_eq!(
            titles(&ws, &["lore where type = \"insight\""]),
            vec!["Promotion"]
        );
        assert_eq!(
            titles(&ws, &["lore where #career and type = \"fact\""]),
            vec!["Job"]
        );
        assert_eq!(titles(&ws, &["lore where subject = ^job"]), vec!["Hobby"]);
    }
}
