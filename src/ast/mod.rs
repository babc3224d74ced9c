//! Typed entry records extracted from parser node trees.
//!
//! - [`Entry`] - the four entry variants behind one enum, with accessors for the common header
//! - [`types`] - field type expressions (`string`, `"a" | "b"`, `link[]`, ...)
//! - [`value`] - typed metadata value content
//! - [`extract`] - the node tree → [`Entry`] conversion

use chrono::{DateTime, FixedOffset};
use enumset::EnumSetType;
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, fmt};

use crate::{
    query::Query,
    source_map::{Location, SourceMap},
    syntax::ErrorCode,
};

pub mod extract;
pub mod types;
pub mod value;

pub use extract::{extract_block, Extraction, SyntaxError};
pub use types::{InvalidType, PrimitiveType, TypeExpression};
pub use value::ValueContent;

/// An explicitly declared link identifier, stored without its leading `^`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkId(String);

impl LinkId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        let id = id.into();
        match id.strip_prefix('^') {
            Some(stripped) => LinkId(stripped.to_string()),
            None => LinkId(id),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "^{}", self.0)
    }
}

impl From<&str> for LinkId {
    fn from(id: &str) -> Self {
        LinkId::new(id)
    }
}

/// An entry timestamp: the source text and the instant it denotes. A timezone is mandatory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    raw: String,
    instant: DateTime<FixedOffset>,
}

impl Timestamp {
    /// Parse `YYYY-MM-DDTHH:MM[:SS[.fff]]` followed by `Z`, `±HH:MM` or `±HHMM`.
    pub fn parse(raw: &str) -> Result<Self, ErrorCode> {
        let t_idx = raw.find('T').ok_or(ErrorCode::InvalidTimestamp)?;
        let tz_idx = raw[t_idx..]
            .find(['Z', 'z', '+', '-'])
            .map(|idx| idx + t_idx)
            .ok_or(ErrorCode::MissingTimezone)?;
        let (date_time, tz) = raw.split_at(tz_idx);
        let mut normalized = date_time.to_string();
        if date_time.len() - t_idx == 6 {
            normalized.push_str(":00");
        }
        match tz {
            "Z" | "z" => normalized.push('Z'),
            _ if tz.len() == 5 => {
                normalized.push_str(&tz[..3]);
                normalized.push(':');
                normalized.push_str(&tz[3..]);
            }
            _ => normalized.push_str(tz),
        }
        let instant =
            DateTime::parse_from_rfc3339(&normalized).map_err(|_| ErrorCode::InvalidTimestamp)?;
        Ok(Timestamp {
            raw: raw.to_string(),
            instant,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn instant(&self) -> DateTime<FixedOffset> {
        self.instant
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.instant
            .cmp(&other.instant)
            .then_with(|| self.raw.cmp(&other.raw))
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[derive(Debug, Hash, Serialize, Deserialize, EnumSetType)]
pub enum EntryKind {
    Instance,
    Schema,
    Synthesis,
    Actualize,
}

/// Structural identity of an entry: its explicit link id, else its timestamp. Unique per file,
/// not across the workspace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntryIdentity {
    Link(LinkId),
    Timestamp(String),
}

impl fmt::Display for EntryIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryIdentity::Link(link) => write!(f, "{link}"),
            EntryIdentity::Timestamp(ts) => f.write_str(ts),
        }
    }
}

/// Fields shared by every entry variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryHeader {
    pub timestamp: Timestamp,
    /// Explicit `^id` declared by the entry. Never derived from the timestamp.
    pub link_id: Option<LinkId>,
    pub tags: Vec<String>,
    pub file: String,
    /// Whole-entry span, block-relative.
    pub location: Location,
    /// Header line span, block-relative.
    pub header_location: Location,
    pub source_map: SourceMap,
    /// SHA-256 (hex) of the whitespace- and Unicode-normalized entry text.
    pub fingerprint: String,
}

impl EntryHeader {
    pub fn file_location(&self) -> Location {
        self.source_map.to_file_location(&self.location)
    }

    /// File-absolute version of a block-relative location inside this entry.
    pub fn to_file(&self, location: &Location) -> Location {
        self.source_map.to_file_location(location)
    }

    /// Byte offset of the entry inside its file, for in-file ordering.
    pub fn file_offset(&self) -> usize {
        self.location.start_index + self.source_map.char_offset
    }

    pub fn identity(&self) -> EntryIdentity {
        match &self.link_id {
            Some(link) => EntryIdentity::Link(link.clone()),
            None => EntryIdentity::Timestamp(self.timestamp.raw().to_string()),
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        let tag = tag.strip_prefix('#').unwrap_or(tag);
        self.tags.iter().any(|t| t == tag)
    }
}

/// A typed metadata value with its source text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataValue {
    pub raw: String,
    pub content: ValueContent,
    pub location: Location,
}

impl MetadataValue {
    pub fn links(&self) -> Vec<&LinkId> {
        self.content.links()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub key: String,
    pub key_location: Location,
    pub value: MetadataValue,
    pub location: Location,
}

impl Metadata {
    /// First link the value points at, if any.
    pub fn link(&self) -> Option<&LinkId> {
        self.value.links().into_iter().next()
    }
}

/// Last metadata value recorded for `key`. Duplicate keys are kept in the entry; lookups see the
/// final occurrence.
pub fn metadata_value<'a>(metadata: &'a [Metadata], key: &str) -> Option<&'a Metadata> {
    metadata.iter().rev().find(|m| m.key == key)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstanceDirective {
    Create,
    Update,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceEntry {
    pub header: EntryHeader,
    pub directive: InstanceDirective,
    pub entity: String,
    pub entity_location: Location,
    pub title: String,
    pub metadata: Vec<Metadata>,
    /// Section headings found in the content, in order.
    pub sections: Vec<String>,
    /// Dedented content text.
    pub content: String,
}

impl InstanceEntry {
    pub fn get(&self, key: &str) -> Option<&Metadata> {
        metadata_value(&self.metadata, key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchemaDirective {
    DefineEntity,
    AlterEntity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    pub optional: bool,
    pub type_expr: Result<TypeExpression, InvalidType>,
    pub default: Option<MetadataValue>,
    pub description: Option<String>,
    pub location: Location,
}

impl FieldDefinition {
    /// Required fields must be present on instances: not optional and no default.
    pub fn is_required(&self) -> bool {
        !self.optional && self.default.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionDefinition {
    pub name: String,
    pub optional: bool,
    pub description: Option<String>,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Removal {
    pub name: String,
    pub reason: Option<String>,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaEntry {
    pub header: EntryHeader,
    pub directive: SchemaDirective,
    pub entity: String,
    pub entity_location: Location,
    pub title: String,
    pub fields: Vec<FieldDefinition>,
    pub sections: Vec<SectionDefinition>,
    pub removed_fields: Vec<Removal>,
    pub removed_sections: Vec<Removal>,
}

impl SchemaEntry {
    pub fn is_define(&self) -> bool {
        self.directive == SchemaDirective::DefineEntity
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisEntry {
    pub header: EntryHeader,
    pub title: String,
    pub link_id: LinkId,
    pub metadata: Vec<Metadata>,
    pub sources: Vec<Query>,
    /// Text following the `# Prompt` heading.
    pub prompt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActualizeEntry {
    pub header: EntryHeader,
    pub target: LinkId,
    pub target_location: Location,
    pub metadata: Vec<Metadata>,
    /// Raw checkpoint recorded in the `updated` metadata value.
    pub updated: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Entry {
    Instance(InstanceEntry),
    Schema(SchemaEntry),
    Synthesis(SynthesisEntry),
    Actualize(ActualizeEntry),
}

impl Entry {
    pub fn header(&self) -> &EntryHeader {
        match self {
            Entry::Instance(e) => &e.header,
            Entry::Schema(e) => &e.header,
            Entry::Synthesis(e) => &e.header,
            Entry::Actualize(e) => &e.header,
        }
    }

    pub fn kind(&self) -> EntryKind {
        match self {
            Entry::Instance(_) => EntryKind::Instance,
            Entry::Schema(_) => EntryKind::Schema,
            Entry::Synthesis(_) => EntryKind::Synthesis,
            Entry::Actualize(_) => EntryKind::Actualize,
        }
    }

    pub fn file(&self) -> &str {
        &self.header().file
    }

    pub fn timestamp(&self) -> &Timestamp {
        &self.header().timestamp
    }

    pub fn link_id(&self) -> Option<&LinkId> {
        self.header().link_id.as_ref()
    }

    pub fn tags(&self) -> &[String] {
        &self.header().tags
    }

    pub fn identity(&self) -> EntryIdentity {
        self.header().identity()
    }

    pub fn fingerprint(&self) -> &str {
        &self.header().fingerprint
    }

    pub fn file_location(&self) -> Location {
        self.header().file_location()
    }

    pub fn metadata(&self) -> &[Metadata] {
        match self {
            Entry::Instance(e) => &e.metadata,
            Entry::Schema(_) => &[],
            Entry::Synthesis(e) => &e.metadata,
            Entry::Actualize(e) => &e.metadata,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Entry::Instance(e) => &e.title,
            Entry::Schema(e) => &e.title,
            Entry::Synthesis(e) => &e.title,
            Entry::Actualize(_) => "",
        }
    }

    /// Every link this entry points at (metadata values, actualize target, source query links).
    pub fn outgoing_links(&self) -> Vec<(&LinkId, Location)> {
        let mut links: Vec<(&LinkId, Location)> = self
            .metadata()
            .iter()
            .flat_map(|m| m.value.links().into_iter().map(|l| (l, m.value.location.clone())))
            .collect();
        if let Entry::Actualize(actualize) = self {
            links.insert(0, (&actualize.target, actualize.target_location.clone()));
        }
        links
    }

    /// Short human label: `2026-01-01T00:00Z create lore "Title"`.
    pub fn summary(&self) -> String {
        let header = self.header();
        match self {
            Entry::Instance(e) => format!(
                "{} {} {} \"{}\"",
                header.timestamp,
                match e.directive {
                    InstanceDirective::Create => "create",
                    InstanceDirective::Update => "update",
                },
                e.entity,
                e.title
            ),
            Entry::Schema(e) => format!(
                "{} {} {} \"{}\"",
                header.timestamp,
                if e.is_define() {
                    "define-entity"
                } else {
                    "alter-entity"
                },
                e.entity,
                e.title
            ),
            Entry::Synthesis(e) => format!(
                "{} define-synthesis \"{}\" {}",
                header.timestamp, e.title, e.link_id
            ),
            Entry::Actualize(e) => {
                format!("{} actualize-synthesis {}", header.timestamp, e.target)
            }
        }
    }
}
