//! Editor navigation over a [`Workspace`]: definition, references, hover and completion.
//!
//! Positions and returned locations are file-absolute. In markdown files, positions outside a
//! thalo block resolve to nothing. Results are plain data; mapping them onto an editor protocol
//! is up to the host.

pub mod completion;
pub mod definition;
pub mod hover;
pub mod references;

use serde::{Deserialize, Serialize};
use std::ops::Range;

pub use completion::{completions, CompletionItem, CompletionKind};
pub use definition::find_definition;
pub use hover::{hover, HoverInfo};
pub use references::find_references;

use crate::{
    ast::{Entry, LinkId, SchemaEntry},
    model::{Document, SchemaSource, Workspace},
    source_map::{Location, Position},
};

/// A location in a named file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileLocation {
    pub file: String,
    pub location: Location,
}

impl FileLocation {
    pub fn new<S: Into<String>>(file: S, location: Location) -> Self {
        FileLocation {
            file: file.into(),
            location,
        }
    }

    /// The header span of `entry`.
    pub fn of_header(entry: &Entry) -> Self {
        let header = entry.header();
        FileLocation::new(header.file.as_str(), header.to_file(&header.header_location))
    }
}

/// What the cursor is on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Symbol {
    Link(LinkId),
    Tag(String),
    Entity(String),
    Field { entity: String, field: String },
}

/// A symbol together with the entry containing it and its file-absolute span.
#[derive(Debug, Clone)]
pub struct SymbolAt<'w> {
    pub entry: &'w Entry,
    pub symbol: Symbol,
    pub location: Location,
}

fn is_word(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '/')
}

/// The word under `offset`, including a leading `^` or `#` sigil.
fn token_at(source: &str, offset: usize) -> Option<Range<usize>> {
    if offset > source.len() || !source.is_char_boundary(offset) {
        return None;
    }
    let mut start = source[..offset]
        .char_indices()
        .rev()
        .take_while(|(_, c)| is_word(*c))
        .last()
        .map(|(i, _)| i)
        .unwrap_or(offset);
    if start == offset && matches!(source[offset..].chars().next(), Some('^' | '#')) {
        start = offset;
    } else if matches!(source[..start].chars().next_back(), Some('^' | '#')) {
        start -= 1;
    }
    let word_from = if matches!(source[start..].chars().next(), Some('^' | '#')) {
        start + 1
    } else {
        start
    };
    let scan_from = offset.max(word_from);
    let mut end = source[scan_from..]
        .char_indices()
        .find(|(_, c)| !is_word(*c))
        .map(|(i, _)| scan_from + i)
        .unwrap_or(source.len());
    while end > word_from && source[..end].ends_with('.') {
        end -= 1;
    }
    (end > word_from).then_some(start..end)
}

/// Resolve the symbol at a file-absolute position.
pub fn symbol_at<'w>(workspace: &'w Workspace, file: &str, position: Position) -> Option<SymbolAt<'w>> {
    let document = workspace.get_document(file)?;
    let entry = document.entry_at(position)?;
    let header = entry.header();

    if let Some(found) = sigil_at(document, entry, position) {
        return Some(found);
    }

    let (entity, entity_location) = match entry {
        Entry::Instance(instance) => (&instance.entity, &instance.entity_location),
        Entry::Schema(schema) => (&schema.entity, &schema.entity_location),
        _ => return None,
    };
    let location = header.to_file(entity_location);
    if location.contains(position) {
        return Some(SymbolAt {
            entry,
            symbol: Symbol::Entity(entity.clone()),
            location,
        });
    }

    let fields: Vec<(&str, &Location)> = match entry {
        Entry::Instance(instance) => instance
            .metadata
            .iter()
            .map(|m| (m.key.as_str(), &m.key_location))
            .collect(),
        Entry::Schema(schema) => schema
            .fields
            .iter()
            .map(|f| (f.name.as_str(), &f.location))
            .collect(),
        _ => vec![],
    };
    fields.into_iter().find_map(|(field, location)| {
        let location = header.to_file(location);
        location.contains(position).then(|| SymbolAt {
            entry,
            symbol: Symbol::Field {
                entity: entity.clone(),
                field: field.to_string(),
            },
            location,
        })
    })
}

fn sigil_at<'w>(document: &Document, entry: &'w Entry, position: Position) -> Option<SymbolAt<'w>> {
    let offset = document.offset_at(position)?;
    let range = token_at(document.source(), offset)?;
    let text = &document.source()[range.clone()];
    let symbol = if text.starts_with('^') {
        Symbol::Link(LinkId::new(text))
    } else if let Some(tag) = text.strip_prefix('#') {
        Symbol::Tag(tag.to_string())
    } else {
        return None;
    };
    Some(SymbolAt {
        entry,
        symbol,
        location: document.location(range),
    })
}

/// The schema entry identified by `source`, among the contributions to `entity`.
fn schema_entry<'w>(
    workspace: &'w Workspace,
    entity: &str,
    source: &SchemaSource,
) -> Option<&'w SchemaEntry> {
    workspace
        .schema_registry()
        .fold_order(entity)
        .into_iter()
        .find(|entry| entry.header.file == source.file && entry.header.timestamp.raw() == source.timestamp)
}
