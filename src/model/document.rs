use serde::{Deserialize, Serialize};

use super::link_index::LinkContributions;
use crate::{
    ast::{extract_block, Entry, SyntaxError},
    source_map::{find_block, LineIndex, Location, Position, SourceMap},
    syntax::{ErrorCode, FileType, Parser},
};

/// Options for [`Workspace::add_document`](super::Workspace::add_document).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentOptions {
    pub file: String,
    /// Inferred from the file extension when absent.
    pub file_type: Option<FileType>,
}

impl DocumentOptions {
    pub fn new<S: Into<String>>(file: S) -> Self {
        DocumentOptions {
            file: file.into(),
            file_type: None,
        }
    }

    pub fn with_file_type(mut self, file_type: FileType) -> Self {
        self.file_type = Some(file_type);
        self
    }

    pub fn resolved_file_type(&self) -> FileType {
        self.file_type
            .unwrap_or_else(|| FileType::from_path(&self.file))
    }
}

/// The semantic content of one file: entries in file order and their link contributions.
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticModel {
    pub file: String,
    pub entries: Vec<Entry>,
    pub links: LinkContributions,
    /// One map per parsed block, in file order.
    pub source_maps: Vec<SourceMap>,
}

/// An immutable snapshot of one parsed file. Re-parsing replaces the whole document.
#[derive(Debug, Clone)]
pub struct Document {
    file_type: FileType,
    source: String,
    line_index: LineIndex,
    model: SemanticModel,
    syntax_errors: Vec<SyntaxError>,
}

impl Document {
    pub fn parse(parser: &dyn Parser, source: &str, options: &DocumentOptions) -> Self {
        let file_type = options.resolved_file_type();
        let file = options.file.as_str();
        let mut entries = vec![];
        let mut syntax_errors = vec![];
        let mut source_maps = vec![];
        for block in parser.parse(source, file_type) {
            source_maps.push(block.source_map);
            match &block.tree {
                Ok(tree) => {
                    let extraction = extract_block(tree, &block.text, file, block.source_map);
                    entries.extend(extraction.entries);
                    syntax_errors.extend(extraction.errors);
                }
                Err(failure) => {
                    tracing::warn!(
                        "[Document::parse] {}: block at line {} failed to parse: {}",
                        file,
                        block.source_map.line_offset,
                        failure.message
                    );
                    syntax_errors.push(SyntaxError::new(
                        ErrorCode::ParseError,
                        failure.message.clone(),
                        failure.location.clone(),
                        block.source_map,
                    ));
                }
            }
        }
        let links = LinkContributions::collect(file, &entries);
        Document {
            file_type,
            line_index: LineIndex::new(source),
            source: source.to_string(),
            model: SemanticModel {
                file: file.to_string(),
                entries,
                links,
                source_maps,
            },
            syntax_errors,
        }
    }

    pub fn file(&self) -> &str {
        &self.model.file
    }

    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn model(&self) -> &SemanticModel {
        &self.model
    }

    pub fn entries(&self) -> &[Entry] {
        &self.model.entries
    }

    pub fn syntax_errors(&self) -> &[SyntaxError] {
        &self.syntax_errors
    }

    pub fn source_maps(&self) -> &[SourceMap] {
        &self.model.source_maps
    }

    /// Route a file-absolute position to its block. Markdown positions outside any thalo fence
    /// yield `None`.
    pub fn find_block(&self, position: Position) -> Option<(usize, Position)> {
        find_block(&self.model.source_maps, position)
    }

    /// Byte offset of a file-absolute position.
    pub fn offset_at(&self, position: Position) -> Option<usize> {
        self.line_index.offset(position)
    }

    pub fn location(&self, range: std::ops::Range<usize>) -> Location {
        self.line_index.location(range)
    }

    /// The entry whose span contains the file-absolute `position`.
    pub fn entry_at(&self, position: Position) -> Option<&Entry> {
        self.find_block(position)?;
        self.model
            .entries
            .iter()
            .find(|entry| entry.file_location().contains(position))
    }

    /// Source text of an entry (file-absolute span).
    pub fn entry_text(&self, entry: &Entry) -> &str {
        let location = entry.file_location();
        self.source
            .get(location.start_index..location.end_index)
            .unwrap_or_default()
    }
}
