//! The parser boundary.
//!
//! The grammar itself is a collaborator: anything implementing [`Parser`] can feed a
//! [`Workspace`](crate::model::Workspace). A parser turns one block of thalo text into a
//! [`SyntaxNode`] tree with byte offsets and row/column positions. Recoverable malformed spans are
//! kept in the tree as [`SyntaxKind::Error`] nodes tagged with an [`ErrorCode`]; a block that cannot
//! be processed at all is reported as a [`BlockFailure`].
//!
//! ## Built-in implementations
//!
//! - [`ThaloParser`] - line-oriented parser for the thalo surface syntax
//! - [`md::extract_blocks`] - finds the fenced ` ```thalo ` regions of a markdown file
//!
//! The provided [`Parser::parse`] method handles file types: a thalo file is one block with the
//! identity [`SourceMap`], a markdown file yields one block per fenced region.

use serde::{Deserialize, Serialize};
use std::{fmt, path::Path};

use crate::source_map::{Location, SourceMap};

pub mod md;
pub mod thalo;

pub use thalo::ThaloParser;

/// Fixed vocabulary of recoverable syntax error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    MissingTimezone,
    MissingEntity,
    MissingTitle,
    MissingLinkId,
    InvalidDirective,
    InvalidTimestamp,
    MalformedMetadata,
    ParseError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::MissingTimezone => "missing_timezone",
            ErrorCode::MissingEntity => "missing_entity",
            ErrorCode::MissingTitle => "missing_title",
            ErrorCode::MissingLinkId => "missing_link_id",
            ErrorCode::InvalidDirective => "invalid_directive",
            ErrorCode::InvalidTimestamp => "invalid_timestamp",
            ErrorCode::MalformedMetadata => "malformed_metadata",
            ErrorCode::ParseError => "parse_error",
        }
    }

    /// The diagnostic code reported for this error, e.g. `syntax-missing_title`.
    pub fn diagnostic_code(&self) -> String {
        format!("syntax-{}", self.as_str())
    }

    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::MissingTimezone => "Timestamp is missing a timezone (use Z or +HH:MM)",
            ErrorCode::MissingEntity => "Entry header is missing an entity name",
            ErrorCode::MissingTitle => "Entry header is missing a quoted title",
            ErrorCode::MissingLinkId => "Entry header is missing a required ^link-id",
            ErrorCode::InvalidDirective => "Unknown directive",
            ErrorCode::InvalidTimestamp => "Invalid timestamp",
            ErrorCode::MalformedMetadata => "Malformed metadata line (expected `key: value`)",
            ErrorCode::ParseError => "Unparsable content",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyntaxKind {
    SourceFile,
    Entry,
    Header,
    Timestamp,
    Directive,
    Entity,
    Title,
    LinkId,
    Tag,
    Metadata,
    Key,
    Value,
    Content,
    Heading,
    Line,
    Error(ErrorCode),
}

/// One node of a parsed block. Locations are block-relative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntaxNode {
    pub kind: SyntaxKind,
    pub location: Location,
    pub children: Vec<SyntaxNode>,
}

impl SyntaxNode {
    pub fn new(kind: SyntaxKind, location: Location) -> Self {
        SyntaxNode {
            kind,
            location,
            children: vec![],
        }
    }

    pub fn with_children(kind: SyntaxKind, location: Location, children: Vec<SyntaxNode>) -> Self {
        SyntaxNode {
            kind,
            location,
            children,
        }
    }

    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        source
            .get(self.location.start_index..self.location.end_index)
            .unwrap_or_default()
    }

    pub fn child(&self, kind: SyntaxKind) -> Option<&SyntaxNode> {
        self.children.iter().find(|c| c.kind == kind)
    }

    pub fn children_of(&self, kind: SyntaxKind) -> impl Iterator<Item = &SyntaxNode> {
        self.children.iter().filter(move |c| c.kind == kind)
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        match self.kind {
            SyntaxKind::Error(code) => Some(code),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error_code().is_some()
    }

    /// All error nodes in this subtree, in document order.
    pub fn errors(&self) -> Vec<&SyntaxNode> {
        let mut found = vec![];
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if node.is_error() {
                found.push(node);
            }
            stack.extend(node.children.iter().rev());
        }
        found
    }
}

/// An unrecoverable failure to parse one block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockFailure {
    pub message: String,
    /// Block-relative span the failure is anchored at.
    pub location: Location,
}

/// One independently parsed region of a file.
#[derive(Debug, Clone)]
pub struct ParsedBlock {
    pub text: String,
    pub source_map: SourceMap,
    pub tree: Result<SyntaxNode, BlockFailure>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    #[default]
    Thalo,
    Markdown,
}

impl FileType {
    /// Infer the file type from an extension: `.md`/`.markdown` are markdown, anything else is
    /// treated as thalo.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        match path
            .as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("md") | Some("markdown") => FileType::Markdown,
            _ => FileType::Thalo,
        }
    }

    /// Whether `path` has an extension the workspace loads by default.
    pub fn is_supported<P: AsRef<Path>>(path: P) -> bool {
        matches!(
            path.as_ref()
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.to_ascii_lowercase())
                .as_deref(),
            Some("thalo") | Some("md") | Some("markdown")
        )
    }
}

pub trait Parser {
    /// Parse one block of thalo text.
    fn parse_block(&self, text: &str) -> Result<SyntaxNode, BlockFailure>;

    /// Split `source` into blocks according to `file_type` and parse each one.
    fn parse(&self, source: &str, file_type: FileType) -> Vec<ParsedBlock> {
        match file_type {
            FileType::Thalo => vec![ParsedBlock {
                text: source.to_string(),
                source_map: SourceMap::for_standalone(source),
                tree: self.parse_block(source),
            }],
            FileType::Markdown => md::extract_blocks(source)
                .into_iter()
                .map(|block| ParsedBlock {
                    tree: self.parse_block(&block.text),
                    text: block.text,
                    source_map: block.source_map,
                })
                .collect(),
        }
    }
}
