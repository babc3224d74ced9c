use serde::{Deserialize, Serialize};
use std::fmt::Write;

use super::{schema_entry, symbol_at, Symbol};
use crate::{
    ast::{Entry, FieldDefinition},
    model::{ResolvedSchema, Workspace},
    source_map::{Location, Position},
};

/// Markdown hover text and the span it describes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoverInfo {
    pub contents: String,
    pub location: Location,
}

pub fn hover(workspace: &Workspace, file: &str, position: Position) -> Option<HoverInfo> {
    let found = symbol_at(workspace, file, position)?;
    let contents = match &found.symbol {
        Symbol::Link(link_id) => match workspace.get_link_entry(link_id) {
            Some(entry) => entry_hover(entry),
            None => format!("Unresolved link `{link_id}`"),
        },
        Symbol::Tag(tag) => {
            let count = workspace.all_tags().get(tag).copied().unwrap_or(0);
            format!(
                "`#{tag}` is used by {count} {}",
                if count == 1 { "entry" } else { "entries" }
            )
        }
        Symbol::Entity(entity) => match workspace.schema_registry().get(entity) {
            Some(schema) => schema_hover(schema),
            None => format!("Unknown entity `{entity}`"),
        },
        Symbol::Field { entity, field } => {
            let registry = workspace.schema_registry();
            let schema = registry.get(entity)?;
            let definition = schema.field(field)?;
            let mut out = field_line(definition);
            if let Some(description) = &definition.description {
                let _ = write!(out, "\n\n{description}");
            }
            if let Some(declaring) = schema
                .field_source(field, registry)
                .and_then(|source| schema_entry(workspace, entity, &source))
            {
                let _ = write!(
                    out,
                    "\n\nDeclared by `{}` in {}",
                    declaring.header.timestamp, declaring.header.file
                );
            }
            out
        }
    };
    Some(HoverInfo {
        contents,
        location: found.location,
    })
}

fn entry_hover(entry: &Entry) -> String {
    let mut out = format!("**{}**", entry.summary());
    let _ = write!(
        out,
        "\n\n{}:{}",
        entry.file(),
        entry.file_location().start.line + 1
    );
    if !entry.tags().is_empty() {
        let tags: Vec<String> = entry.tags().iter().map(|t| format!("#{t}")).collect();
        let _ = write!(out, "\n\n{}", tags.join(" "));
    }
    for metadata in entry.metadata() {
        let _ = write!(out, "\n- {}: {}", metadata.key, metadata.value.raw);
    }
    if let Entry::Synthesis(synthesis) = entry {
        let sources: Vec<String> = synthesis.sources.iter().map(|q| q.to_string()).collect();
        if !sources.is_empty() {
            let _ = write!(out, "\n\nSources: `{}`", sources.join("`, `"));
        }
    }
    out
}

fn field_line(field: &FieldDefinition) -> String {
    let type_text = match &field.type_expr {
        Ok(type_expr) => type_expr.to_string(),
        Err(invalid) => invalid.text.clone(),
    };
    let mut line = format!(
        "`{}{}`: `{}`",
        field.name,
        if field.optional { "?" } else { "" },
        type_text
    );
    if let Some(default) = &field.default {
        let _ = write!(line, " = `{}`", default.raw);
    }
    line
}

fn schema_hover(schema: &ResolvedSchema) -> String {
    let mut out = format!("### {}\n\n{}", schema.entity, schema.title);
    if !schema.fields.is_empty() {
        out.push_str("\n\n**Fields**");
        for field in &schema.fields {
            let _ = write!(out, "\n- {}", field_line(field));
            if let Some(description) = &field.description {
                let _ = write!(out, " {description}");
            }
        }
    }
    if !schema.sections.is_empty() {
        out.push_str("\n\n**Sections**");
        for section in &schema.sections {
            let _ = write!(
                out,
                "\n- {}{}",
                section.name,
                if section.optional { " (optional)" } else { "" }
            );
        }
    }
    let _ = write!(
        out,
        "\n\nDefined in {} at `{}`",
        schema.defined_by.file, schema.defined_at
    );
    if !schema.altered_by.is_empty() {
        let _ = write!(out, ", altered {} time(s)", schema.altered_by.len());
    }
    out
}
