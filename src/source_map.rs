//! Position translation between block-relative and file-absolute coordinates.
//!
//! A markdown file may embed several fenced thalo regions, each parsed independently. Every
//! parsed block carries a [`SourceMap`] recording where it starts inside its file, so locations
//! produced by the parser (block-relative) can be reported against the file (file-absolute), and
//! editor positions (file-absolute) can be routed back into the right block.
//!
//! Offsets are byte offsets and columns are byte columns. Translating to an editor encoding
//! (UTF-16 code units, for example) is left to the protocol adapter.

use serde::{Deserialize, Serialize};
use std::ops::Range;

/// A zero-based (line, column) pair.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub const fn new(line: u32, column: u32) -> Self {
        Position { line, column }
    }
}

/// A byte range plus the matching start/end positions.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub start_index: usize,
    pub end_index: usize,
    pub start: Position,
    pub end: Position,
}

impl Location {
    pub fn new(range: Range<usize>, start: Position, end: Position) -> Self {
        Location {
            start_index: range.start,
            end_index: range.end,
            start,
            end,
        }
    }

    /// Compute a location for `range` by scanning `text`.
    pub fn from_range(text: &str, range: Range<usize>) -> Self {
        let start = position_at(text, range.start);
        let end = position_at(text, range.end);
        Location::new(range, start, end)
    }

    pub fn range(&self) -> Range<usize> {
        self.start_index..self.end_index
    }

    /// Whether `position` lies inside this location. The end position is inclusive so a cursor
    /// placed right after the last character still hits.
    pub fn contains(&self, position: Position) -> bool {
        self.start <= position && position <= self.end
    }
}

/// Position of byte `offset` inside `text`. Offsets past the end clamp to the end of `text`.
pub fn position_at(text: &str, offset: usize) -> Position {
    let offset = offset.min(text.len());
    let prefix = &text.as_bytes()[..offset];
    let line = prefix.iter().filter(|b| **b == b'\n').count() as u32;
    let line_start = prefix
        .iter()
        .rposition(|b| *b == b'\n')
        .map(|idx| idx + 1)
        .unwrap_or(0);
    Position::new(line, (offset - line_start) as u32)
}

/// Line start offsets of a text, for repeated offset → position lookups.
#[derive(Debug, Clone)]
pub struct LineIndex {
    starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(
            text.bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(idx, _)| idx + 1),
        );
        LineIndex {
            starts,
            len: text.len(),
        }
    }

    pub fn position(&self, offset: usize) -> Position {
        let offset = offset.min(self.len);
        let line = self.starts.partition_point(|start| *start <= offset) - 1;
        Position::new(line as u32, (offset - self.starts[line]) as u32)
    }

    pub fn location(&self, range: Range<usize>) -> Location {
        let start = self.position(range.start);
        let end = self.position(range.end);
        Location::new(range, start, end)
    }

    /// Byte offset of `position`, if the line exists.
    pub fn offset(&self, position: Position) -> Option<usize> {
        let start = *self.starts.get(position.line as usize)?;
        Some((start + position.column as usize).min(self.len))
    }
}

/// Number of lines in `text`: newline count, plus one when the last line is unterminated.
pub fn line_count(text: &str) -> u32 {
    let newlines = text.bytes().filter(|b| *b == b'\n').count() as u32;
    if text.is_empty() || text.ends_with('\n') {
        newlines
    } else {
        newlines + 1
    }
}

/// Offsets of one embedded block inside its file.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceMap {
    /// Byte offset of the block's first character in the file.
    pub char_offset: usize,
    /// File line of the block's first line.
    pub line_offset: u32,
    /// File column of the block's first character (applies to the first line only).
    pub column_offset: u32,
    /// Number of lines the block spans.
    pub line_count: u32,
}

impl SourceMap {
    /// The all-zero map used for standalone files.
    pub const fn identity() -> Self {
        SourceMap {
            char_offset: 0,
            line_offset: 0,
            column_offset: 0,
            line_count: 0,
        }
    }

    /// Identity map for a standalone file, with the line count filled in.
    pub fn for_standalone(text: &str) -> Self {
        SourceMap {
            line_count: line_count(text),
            ..SourceMap::identity()
        }
    }

    /// Map for a block starting at byte `char_offset` of `file_text` and spanning `block_text`.
    pub fn for_block(file_text: &str, char_offset: usize, block_text: &str) -> Self {
        let start = position_at(file_text, char_offset);
        SourceMap {
            char_offset,
            line_offset: start.line,
            column_offset: start.column,
            line_count: line_count(block_text),
        }
    }

    pub fn is_identity(&self) -> bool {
        self.char_offset == 0 && self.line_offset == 0 && self.column_offset == 0
    }

    pub fn to_file_position(&self, position: Position) -> Position {
        if position.line == 0 {
            Position::new(self.line_offset, position.column + self.column_offset)
        } else {
            Position::new(position.line + self.line_offset, position.column)
        }
    }

    /// Inverse of [`SourceMap::to_file_position`]. `None` when `position` lies outside the block's
    /// line range, or before the block's starting column on its first line.
    ///
    /// A standalone map (identity offsets) accepts every position, even when its line count is
    /// stale or zero.
    pub fn to_block_position(&self, position: Position) -> Option<Position> {
        if position.line < self.line_offset {
            return None;
        }
        let line = position.line - self.line_offset;
        if !self.is_identity() && line >= self.line_count {
            return None;
        }
        if line == 0 {
            if position.column < self.column_offset {
                return None;
            }
            Some(Position::new(0, position.column - self.column_offset))
        } else {
            Some(Position::new(line, position.column))
        }
    }

    pub fn to_file_location(&self, location: &Location) -> Location {
        Location {
            start_index: location.start_index + self.char_offset,
            end_index: location.end_index + self.char_offset,
            start: self.to_file_position(location.start),
            end: self.to_file_position(location.end),
        }
    }

    pub fn to_file_range(&self, range: Range<usize>) -> Range<usize> {
        range.start + self.char_offset..range.end + self.char_offset
    }
}

/// Route a file-absolute `position` to the first block whose map contains it.
///
/// Returns the block index and the block-relative position.
pub fn find_block<'a, I>(maps: I, position: Position) -> Option<(usize, Position)>
where
    I: IntoIterator<Item = &'a SourceMap>,
{
    maps.into_iter()
        .enumerate()
        .find_map(|(idx, map)| map.to_block_position(position).map(|pos| (idx, pos)))
}
