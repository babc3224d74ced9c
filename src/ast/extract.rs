//! Node tree → typed [`Entry`] conversion.
//!
//! Extraction is total: every entry node yields either an [`Entry`] or a [`SyntaxError`], and
//! recoverable error nodes anywhere in the tree are reported alongside. A header that is missing
//! a required part (timestamp timezone, directive, entity, title, link id) drops the entry; body
//! problems (malformed metadata, bad field definitions) only drop the affected line.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

use super::{
    metadata_value,
    types::{InvalidType, TypeExpression},
    value::{split_top_level, unquote, ValueContent},
    ActualizeEntry, Entry, EntryHeader, FieldDefinition, InstanceDirective, InstanceEntry, LinkId,
    Metadata, MetadataValue, Removal, SchemaDirective, SchemaEntry, SectionDefinition,
    SynthesisEntry, Timestamp,
};
use crate::{
    source_map::{Location, SourceMap},
    syntax::{
        thalo::{heading_name, ACTUALIZE_DIRECTIVE, SYNTHESIS_DIRECTIVE},
        ErrorCode, SyntaxKind, SyntaxNode,
    },
};

/// A recoverable syntax problem. `location` is block-relative; use
/// [`SyntaxError::file_location`] for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntaxError {
    pub code: ErrorCode,
    pub message: String,
    pub location: Location,
    pub source_map: SourceMap,
}

impl SyntaxError {
    pub fn new<S: Into<String>>(
        code: ErrorCode,
        message: S,
        location: Location,
        source_map: SourceMap,
    ) -> Self {
        SyntaxError {
            code,
            message: message.into(),
            location,
            source_map,
        }
    }

    fn from_node(node: &SyntaxNode, text: &str, source_map: SourceMap) -> Option<Self> {
        let code = node.error_code()?;
        let snippet = node.text(text).trim();
        let message = if snippet.is_empty() || snippet.len() > 60 {
            code.default_message().to_string()
        } else {
            format!("{}: `{}`", code.default_message(), snippet)
        };
        Some(SyntaxError::new(
            code,
            message,
            node.location.clone(),
            source_map,
        ))
    }

    pub fn file_location(&self) -> Location {
        self.source_map.to_file_location(&self.location)
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Extraction {
    pub entries: Vec<Entry>,
    pub errors: Vec<SyntaxError>,
}

/// Extract every entry of one parsed block.
pub fn extract_block(tree: &SyntaxNode, text: &str, file: &str, source_map: SourceMap) -> Extraction {
    let mut extraction = Extraction::default();
    for child in &tree.children {
        match child.kind {
            SyntaxKind::Entry => {
                let node_errors: Vec<SyntaxError> = child
                    .errors()
                    .into_iter()
                    .filter_map(|n| SyntaxError::from_node(n, text, source_map))
                    .collect();
                let mut nested = vec![];
                let result = extract_entry(child, text, file, source_map, &mut nested);
                match result {
                    Ok(entry) => extraction.entries.push(entry),
                    Err(err) => {
                        if !node_errors
                            .iter()
                            .any(|e| e.code == err.code && e.location == err.location)
                        {
                            extraction.errors.push(err);
                        }
                    }
                }
                extraction.errors.extend(node_errors);
                extraction.errors.extend(nested);
            }
            _ => {
                extraction.errors.extend(
                    child
                        .errors()
                        .into_iter()
                        .filter_map(|n| SyntaxError::from_node(n, text, source_map)),
                );
            }
        }
    }
    extraction
        .errors
        .sort_by_key(|e| (e.location.start_index, e.location.end_index));
    tracing::trace!(
        "[extract_block] {}: {} entries, {} syntax errors",
        file,
        extraction.entries.len(),
        extraction.errors.len()
    );
    extraction
}

struct Ctx<'a> {
    text: &'a str,
    source_map: SourceMap,
}

impl Ctx<'_> {
    fn error<S: Into<String>>(&self, code: ErrorCode, message: S, location: &Location) -> SyntaxError {
        SyntaxError::new(code, message, location.clone(), self.source_map)
    }
}

/// Convert one entry node. `nested` collects recoverable problems found while extracting the body
/// of an entry that is otherwise kept.
pub fn extract_entry(
    node: &SyntaxNode,
    text: &str,
    file: &str,
    source_map: SourceMap,
    nested: &mut Vec<SyntaxError>,
) -> Result<Entry, SyntaxError> {
    let ctx = Ctx { text, source_map };
    let header = node.child(SyntaxKind::Header).ok_or_else(|| {
        ctx.error(ErrorCode::ParseError, "entry without a header", &node.location)
    })?;
    if let Some(fatal) = header
        .children
        .iter()
        .find(|c| matches!(c.error_code(), Some(code) if code != ErrorCode::ParseError))
    {
        return Err(SyntaxError::from_node(fatal, text, source_map).unwrap_or_else(|| {
            ctx.error(ErrorCode::ParseError, "invalid entry header", &fatal.location)
        }));
    }

    let timestamp_node = header.child(SyntaxKind::Timestamp).ok_or_else(|| {
        ctx.error(
            ErrorCode::InvalidTimestamp,
            ErrorCode::InvalidTimestamp.default_message(),
            &header.location,
        )
    })?;
    let timestamp_text = timestamp_node.text(text);
    let timestamp = Timestamp::parse(timestamp_text).map_err(|code| {
        ctx.error(
            code,
            format!("{}: `{}`", code.default_message(), timestamp_text),
            &timestamp_node.location,
        )
    })?;
    let directive = header
        .child(SyntaxKind::Directive)
        .map(|d| d.text(text))
        .ok_or_else(|| {
            ctx.error(
                ErrorCode::InvalidDirective,
                ErrorCode::InvalidDirective.default_message(),
                &header.location,
            )
        })?;

    let links: Vec<&SyntaxNode> = header.children_of(SyntaxKind::LinkId).collect();
    let mut tags: Vec<String> = vec![];
    for tag in header.children_of(SyntaxKind::Tag) {
        let name = tag.text(text).trim_start_matches('#').to_string();
        if !tags.contains(&name) {
            tags.push(name);
        }
    }
    for extra in links.iter().skip(1) {
        nested.push(ctx.error(
            ErrorCode::ParseError,
            format!("Entry declares more than one link id: `{}`", extra.text(text)),
            &extra.location,
        ));
    }
    let link_id = if directive == ACTUALIZE_DIRECTIVE {
        None
    } else {
        links.first().map(|l| LinkId::new(l.text(text)))
    };

    let entry_header = EntryHeader {
        timestamp,
        link_id,
        tags,
        file: file.to_string(),
        location: node.location.clone(),
        header_location: header.location.clone(),
        source_map,
        fingerprint: fingerprint(node.text(text)),
    };
    let metadata = extract_metadata(node, &ctx);
    let content = node.child(SyntaxKind::Content);

    let entry = match directive {
        "create" | "update" => Entry::Instance(InstanceEntry {
            header: entry_header,
            directive: if directive == "create" {
                InstanceDirective::Create
            } else {
                InstanceDirective::Update
            },
            entity: required_text(header, SyntaxKind::Entity, text),
            entity_location: required_location(header, SyntaxKind::Entity),
            title: title(header, text),
            metadata,
            sections: content
                .map(|c| {
                    c.children_of(SyntaxKind::Heading)
                        .filter_map(|h| heading_name(h.text(text)))
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            content: content
                .map(|c| dedent(&c.children, text, |_| true))
                .unwrap_or_default(),
        }),
        "define-entity" | "alter-entity" => {
            for m in &metadata {
                nested.push(ctx.error(
                    ErrorCode::MalformedMetadata,
                    format!(
                        "Schema entries declare fields under `# Metadata`, not as `{}:`",
                        m.key
                    ),
                    &m.location,
                ));
            }
            let mut schema = SchemaEntry {
                header: entry_header,
                directive: if directive == "define-entity" {
                    SchemaDirective::DefineEntity
                } else {
                    SchemaDirective::AlterEntity
                },
                entity: required_text(header, SyntaxKind::Entity, text),
                entity_location: required_location(header, SyntaxKind::Entity),
                title: title(header, text),
                fields: vec![],
                sections: vec![],
                removed_fields: vec![],
                removed_sections: vec![],
            };
            if let Some(content) = content {
                extract_schema_body(&mut schema, content, &ctx, nested);
            }
            Entry::Schema(schema)
        }
        SYNTHESIS_DIRECTIVE => {
            let link_id = entry_header.link_id.clone().ok_or_else(|| {
                ctx.error(
                    ErrorCode::MissingLinkId,
                    ErrorCode::MissingLinkId.default_message(),
                    &header.location,
                )
            })?;
            let sources = metadata_value(&metadata, "sources")
                .map(|m| extract_sources(m, &ctx, nested))
                .unwrap_or_default();
            let prompt = content.and_then(|c| prompt_text(c, text));
            Entry::Synthesis(SynthesisEntry {
                header: entry_header,
                title: title(header, text),
                link_id,
                metadata,
                sources,
                prompt,
            })
        }
        _ => {
            let target_node = links.first().ok_or_else(|| {
                ctx.error(
                    ErrorCode::MissingLinkId,
                    ErrorCode::MissingLinkId.default_message(),
                    &header.location,
                )
            })?;
            let updated = metadata_value(&metadata, "updated").map(|m| {
                unquote(&m.value.raw).unwrap_or_else(|| m.value.raw.trim().to_string())
            });
            Entry::Actualize(ActualizeEntry {
                header: entry_header,
                target: LinkId::new(target_node.text(text)),
                target_location: target_node.location.clone(),
                metadata,
                updated,
            })
        }
    };
    Ok(entry)
}

fn required_text(header: &SyntaxNode, kind: SyntaxKind, text: &str) -> String {
    header
        .child(kind)
        .map(|n| n.text(text).to_string())
        .unwrap_or_default()
}

fn required_location(header: &SyntaxNode, kind: SyntaxKind) -> Location {
    header
        .child(kind)
        .map(|n| n.location.clone())
        .unwrap_or_else(|| header.location.clone())
}

fn title(header: &SyntaxNode, text: &str) -> String {
    header
        .child(SyntaxKind::Title)
        .map(|n| {
            let raw = n.text(text);
            unquote(raw).unwrap_or_else(|| raw.trim_matches('"').to_string())
        })
        .unwrap_or_default()
}

fn extract_metadata(node: &SyntaxNode, ctx: &Ctx) -> Vec<Metadata> {
    node.children_of(SyntaxKind::Metadata)
        .filter_map(|m| {
            let key = m.child(SyntaxKind::Key)?;
            let value = m.child(SyntaxKind::Value)?;
            let raw = value.text(ctx.text).to_string();
            Some(Metadata {
                key: key.text(ctx.text).to_string(),
                key_location: key.location.clone(),
                value: MetadataValue {
                    content: ValueContent::parse(&raw),
                    raw,
                    location: value.location.clone(),
                },
                location: m.location.clone(),
            })
        })
        .collect()
}

fn extract_sources(
    sources: &Metadata,
    ctx: &Ctx,
    nested: &mut Vec<SyntaxError>,
) -> Vec<crate::query::Query> {
    let queries = sources.value.content.queries();
    let scalars = sources.value.content.scalars();
    let valid = scalars
        .iter()
        .filter(|s| match s {
            ValueContent::Query(_) => true,
            ValueContent::Plain(text) => text.parse::<crate::query::Query>().is_ok(),
            _ => false,
        })
        .count();
    if valid < scalars.len() {
        nested.push(ctx.error(
            ErrorCode::ParseError,
            format!("Invalid source query in `{}`", sources.value.raw),
            &sources.value.location,
        ));
    }
    queries
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SchemaBlock {
    Metadata,
    Sections,
    RemoveMetadata,
    RemoveSections,
    Unknown,
}

fn extract_schema_body(
    schema: &mut SchemaEntry,
    content: &SyntaxNode,
    ctx: &Ctx,
    nested: &mut Vec<SyntaxError>,
) {
    let mut block = None;
    for child in &content.children {
        let line = child.text(ctx.text).trim();
        if child.kind == SyntaxKind::Heading {
            let name = heading_name(line).unwrap_or_default();
            block = Some(match name {
                "Metadata" => SchemaBlock::Metadata,
                "Sections" => SchemaBlock::Sections,
                "Remove Metadata" => SchemaBlock::RemoveMetadata,
                "Remove Sections" => SchemaBlock::RemoveSections,
                _ => {
                    nested.push(ctx.error(
                        ErrorCode::ParseError,
                        format!("Unknown schema block `{name}`"),
                        &child.location,
                    ));
                    SchemaBlock::Unknown
                }
            });
            continue;
        }
        let location = trimmed_location(child, ctx.text);
        let result = match block {
            Some(SchemaBlock::Metadata) => {
                parse_field(line, &location).map(|field| schema.fields.push(field))
            }
            Some(SchemaBlock::Sections) => {
                parse_section(line, &location).map(|section| schema.sections.push(section))
            }
            Some(SchemaBlock::RemoveMetadata) => {
                parse_removal(line, &location).map(|r| schema.removed_fields.push(r))
            }
            Some(SchemaBlock::RemoveSections) => {
                parse_removal(line, &location).map(|r| schema.removed_sections.push(r))
            }
            Some(SchemaBlock::Unknown) => Ok(()),
            None => Err("Schema content must follow a `# Metadata` or `# Sections` heading"
                .to_string()),
        };
        if let Err(message) = result {
            nested.push(ctx.error(ErrorCode::MalformedMetadata, message, &location));
        }
    }
}

fn trimmed_location(node: &SyntaxNode, text: &str) -> Location {
    let raw = node.text(text);
    let lead = raw.len() - raw.trim_start().len();
    let mut location = node.location.clone();
    location.start_index += lead;
    location.start.column += lead as u32;
    location
}

fn split_description(line: &str) -> (&str, Option<String>) {
    let parts = split_top_level(line, ';');
    let head = parts[0].trim();
    let description = if parts.len() > 1 {
        let rest = line[parts[0].len() + 1..].trim();
        Some(unquote(rest).unwrap_or_else(|| rest.to_string()))
    } else {
        None
    };
    (head, description)
}

fn split_optional(name: &str) -> (&str, bool) {
    match name.strip_suffix('?') {
        Some(stripped) => (stripped.trim_end(), true),
        None => (name, false),
    }
}

fn is_field_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false)
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// `name?: type = default ; "description"`
fn parse_field(line: &str, location: &Location) -> Result<FieldDefinition, String> {
    let (head, description) = split_description(line);
    let (name, rest) = head
        .split_once(':')
        .ok_or_else(|| format!("Field definition needs `name: type`, got `{line}`"))?;
    let (name, optional) = split_optional(name.trim());
    if !is_field_name(name) {
        return Err(format!("Invalid field name `{name}`"));
    }
    let parts = split_top_level(rest, '=');
    let type_text = parts[0].trim();
    let default = if parts.len() > 1 {
        let raw = rest[parts[0].len() + 1..].trim().to_string();
        Some(MetadataValue {
            content: ValueContent::parse(&raw),
            raw,
            location: location.clone(),
        })
    } else {
        None
    };
    let type_expr = if type_text.is_empty() {
        Err(InvalidType {
            text: String::new(),
            message: "missing type".to_string(),
        })
    } else {
        TypeExpression::parse(type_text)
    };
    Ok(FieldDefinition {
        name: name.to_string(),
        optional,
        type_expr,
        default,
        description,
        location: location.clone(),
    })
}

/// `Name? ; "description"`
fn parse_section(line: &str, location: &Location) -> Result<SectionDefinition, String> {
    let (head, description) = split_description(line);
    let (name, optional) = split_optional(head);
    if name.is_empty() {
        return Err("Section definition needs a name".to_string());
    }
    Ok(SectionDefinition {
        name: name.to_string(),
        optional,
        description,
        location: location.clone(),
    })
}

fn parse_removal(line: &str, location: &Location) -> Result<Removal, String> {
    let (name, reason) = split_description(line);
    if name.is_empty() {
        return Err("Removal needs a name".to_string());
    }
    Ok(Removal {
        name: name.to_string(),
        reason,
        location: location.clone(),
    })
}

/// Join content nodes back into text with the common indentation removed. Blank lines between
/// nodes are restored from their line numbers.
fn dedent<F>(nodes: &[SyntaxNode], text: &str, keep: F) -> String
where
    F: Fn(&SyntaxNode) -> bool,
{
    let kept: Vec<&SyntaxNode> = nodes.iter().filter(|n| keep(n)).collect();
    let indent = kept
        .iter()
        .filter(|n| n.kind == SyntaxKind::Line)
        .map(|n| {
            let line = n.text(text);
            line.len() - line.trim_start().len()
        })
        .min()
        .unwrap_or(0);
    let mut out = String::new();
    let mut last_line: Option<u32> = None;
    for node in kept {
        if let Some(last) = last_line {
            out.push('\n');
            for _ in last + 1..node.location.start.line {
                out.push('\n');
            }
        }
        let line = node.text(text);
        let body = match node.kind {
            SyntaxKind::Line => {
                let lead = line.len() - line.trim_start().len();
                &line[lead.min(indent)..]
            }
            _ => line,
        };
        out.push_str(body.trim_end());
        last_line = Some(node.location.start.line);
    }
    out
}

fn prompt_text(content: &SyntaxNode, text: &str) -> Option<String> {
    let start = content
        .children
        .iter()
        .position(|c| c.kind == SyntaxKind::Heading && heading_name(c.text(text)) == Some("Prompt"))?;
    let body: Vec<SyntaxNode> = content.children[start + 1..]
        .iter()
        .take_while(|c| c.kind != SyntaxKind::Heading)
        .cloned()
        .collect();
    let prompt = dedent(&body, text, |_| true).trim().to_string();
    (!prompt.is_empty()).then_some(prompt)
}

/// SHA-256 over the entry text with comment and blank lines dropped, runs of whitespace collapsed
/// and Unicode NFC applied.
pub fn fingerprint(entry_text: &str) -> String {
    let normalized = entry_text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("//"))
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join("\n")
        .nfc()
        .collect::<String>();
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}
