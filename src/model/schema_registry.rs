// Schema registry for entity definitions
//
// Every `define-entity`/`alter-entity` entry in the workspace contributes to the schema of its
// entity. The registry keeps the contributions per entity and a resolved schema folded from them,
// re-folding only the entities a document change touches.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::ast::{FieldDefinition, SchemaEntry, SectionDefinition, Timestamp};

/// Identifies one schema entry inside the workspace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SchemaSource {
    pub file: String,
    pub timestamp: String,
}

impl SchemaSource {
    fn of(entry: &SchemaEntry) -> Self {
        SchemaSource {
            file: entry.header.file.clone(),
            timestamp: entry.header.timestamp.raw().to_string(),
        }
    }
}

/// The effective schema of one entity after folding its define and alters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedSchema {
    pub entity: String,
    pub title: String,
    /// Fields in definition order; fields added by alters come after the base set.
    pub fields: Vec<FieldDefinition>,
    pub sections: Vec<SectionDefinition>,
    /// The `define-entity` the fold is based on.
    pub defined_by: SchemaSource,
    /// Alters applied on top, in fold order.
    pub altered_by: Vec<SchemaSource>,
    pub defined_at: Timestamp,
}

impl ResolvedSchema {
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn section(&self, name: &str) -> Option<&SectionDefinition> {
        self.sections
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }

    /// Source of the schema entry that last contributed `field`.
    pub fn field_source(&self, field: &str, registry: &SchemaRegistry) -> Option<SchemaSource> {
        registry
            .fold_order(&self.entity)
            .into_iter()
            .rev()
            .find(|entry| entry.fields.iter().any(|f| f.name == field))
            .map(SchemaSource::of)
    }
}

fn fold_key(entry: &SchemaEntry) -> (&Timestamp, &str, usize) {
    (
        &entry.header.timestamp,
        entry.header.file.as_str(),
        entry.header.file_offset(),
    )
}

fn upsert<T, F>(items: &mut Vec<T>, item: T, same: F)
where
    F: Fn(&T, &T) -> bool,
{
    match items.iter().position(|existing| same(existing, &item)) {
        Some(idx) => items[idx] = item,
        None => items.push(item),
    }
}

/// Fold the schema entries of one entity in ascending (timestamp, file, position) order.
///
/// A define resets the field and section sets; an alter adds its fields and sections, then
/// applies its removals. Alters ordered before the first define are skipped.
pub fn fold(entity: &str, entries: &[&SchemaEntry]) -> Option<ResolvedSchema> {
    let mut ordered: Vec<&SchemaEntry> = entries.to_vec();
    ordered.sort_by(|a, b| fold_key(a).cmp(&fold_key(b)));

    let mut resolved: Option<ResolvedSchema> = None;
    for entry in ordered {
        if entry.is_define() {
            resolved = Some(ResolvedSchema {
                entity: entity.to_string(),
                title: entry.title.clone(),
                fields: entry.fields.clone(),
                sections: entry.sections.clone(),
                defined_by: SchemaSource::of(entry),
                altered_by: vec![],
                defined_at: entry.header.timestamp.clone(),
            });
            continue;
        }
        let Some(schema) = resolved.as_mut() else {
            tracing::debug!(
                "[schema_registry::fold] skipping alter of '{}' at {} before any define",
                entity,
                entry.header.timestamp
            );
            continue;
        };
        for field in &entry.fields {
            upsert(&mut schema.fields, field.clone(), |a, b| a.name == b.name);
        }
        for section in &entry.sections {
            upsert(&mut schema.sections, section.clone(), |a, b| {
                a.name.eq_ignore_ascii_case(&b.name)
            });
        }
        schema
            .fields
            .retain(|f| !entry.removed_fields.iter().any(|r| r.name == f.name));
        schema.sections.retain(|s| {
            !entry
                .removed_sections
                .iter()
                .any(|r| r.name.eq_ignore_ascii_case(&s.name))
        });
        schema.altered_by.push(SchemaSource::of(entry));
    }
    resolved
}

/// Entity name → schema contributions and the resolved schema.
///
/// Owned by a [`Workspace`](super::Workspace); patched per touched entity when documents are added
/// or removed.
#[derive(Debug, Default, Clone)]
pub struct SchemaRegistry {
    entries: BTreeMap<String, Vec<SchemaEntry>>,
    resolved: BTreeMap<String, ResolvedSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        SchemaRegistry::default()
    }

    /// Resolved schema for `entity`. `None` when the entity has no define.
    pub fn get(&self, entity: &str) -> Option<&ResolvedSchema> {
        self.resolved.get(entity)
    }

    pub fn has(&self, entity: &str) -> bool {
        self.resolved.contains_key(entity)
    }

    /// Entity names with at least one schema entry (defined or only altered).
    pub fn entities(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn resolved(&self) -> impl Iterator<Item = &ResolvedSchema> {
        self.resolved.values()
    }

    /// Schema entries for `entity` in fold order.
    pub fn fold_order(&self, entity: &str) -> Vec<&SchemaEntry> {
        let mut ordered: Vec<&SchemaEntry> = self
            .entries
            .get(entity)
            .map(|entries| entries.iter().collect())
            .unwrap_or_default();
        ordered.sort_by(|a, b| fold_key(a).cmp(&fold_key(b)));
        ordered
    }

    /// Add schema entries, returning the entity names they touch. Call [`Self::refresh`] after.
    pub(crate) fn add_entries<'a, I>(&mut self, entries: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'a SchemaEntry>,
    {
        let mut touched = BTreeSet::new();
        for entry in entries {
            touched.insert(entry.entity.clone());
            self.entries
                .entry(entry.entity.clone())
                .or_default()
                .push(entry.clone());
        }
        touched
    }

    /// Drop every contribution from `file`, returning the touched entity names.
    pub(crate) fn remove_file(&mut self, file: &str) -> BTreeSet<String> {
        let mut touched = BTreeSet::new();
        for (entity, entries) in self.entries.iter_mut() {
            let before = entries.len();
            entries.retain(|e| e.header.file != file);
            if entries.len() != before {
                touched.insert(entity.clone());
            }
        }
        self.entries.retain(|_, entries| !entries.is_empty());
        touched
    }

    /// Re-fold the given entities.
    pub(crate) fn refresh<'a, I>(&mut self, entities: I)
    where
        I: IntoIterator<Item = &'a String>,
    {
        for entity in entities {
            let folded = self
                .entries
                .get(entity)
                .and_then(|entries| fold(entity, &entries.iter().collect::<Vec<_>>()));
            match folded {
                Some(schema) => {
                    tracing::trace!(
                        "[SchemaRegistry::refresh] '{}' resolved with {} fields",
                        entity,
                        schema.fields.len()
                    );
                    self.resolved.insert(entity.clone(), schema);
                }
                None => {
                    self.resolved.remove(entity);
                }
            }
        }
    }
}
