//! Line-oriented parser for the thalo surface syntax.
//!
//! ```text
//! 2026-01-05T18:00Z create lore "Title" ^link-id #tag
//!   key: value
//!
//!   # Section
//!   free text
//! ```
//!
//! Entry headers start unindented; metadata and content lines are indented. Metadata runs until
//! the first blank line or heading, content after that. Lines whose first non-blank characters are
//! `//` are comments. Unindented lines that are not headers become root-level `parse_error` nodes
//! spanning the whole run of junk.

use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;

use super::{BlockFailure, ErrorCode, Parser, SyntaxKind, SyntaxNode};
use crate::source_map::{LineIndex, Location};

pub const INSTANCE_DIRECTIVES: &[&str] = &["create", "update"];
pub const SCHEMA_DIRECTIVES: &[&str] = &["define-entity", "alter-entity"];
pub const SYNTHESIS_DIRECTIVE: &str = "define-synthesis";
pub const ACTUALIZE_DIRECTIVE: &str = "actualize-synthesis";

static TIMESTAMP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}(?::\d{2}(?:\.\d+)?)?(?P<tz>Z|[+-]\d{2}:?\d{2})?$",
    )
    .expect("timestamp pattern is valid")
});

static METADATA_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<key>[A-Za-z_][A-Za-z0-9_\-]*)[ \t]*:(?P<value>.*)$")
        .expect("metadata pattern is valid")
});

#[derive(Debug, Default, Clone, Copy)]
pub struct ThaloParser;

impl ThaloParser {
    pub fn new() -> Self {
        ThaloParser
    }
}

impl Parser for ThaloParser {
    fn parse_block(&self, text: &str) -> Result<SyntaxNode, BlockFailure> {
        if let Some(idx) = text.find('\0') {
            let index = LineIndex::new(text);
            return Err(BlockFailure {
                message: "block contains binary (NUL) content".to_string(),
                location: index.location(idx..idx + 1),
            });
        }
        Ok(BlockParser::new(text).parse())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Metadata,
    Content,
}

struct EntryBuilder {
    range: Range<usize>,
    children: Vec<SyntaxNode>,
    content: Vec<SyntaxNode>,
    phase: Phase,
}

struct Token {
    range: Range<usize>,
    text: String,
}

struct BlockParser<'a> {
    text: &'a str,
    index: LineIndex,
    nodes: Vec<SyntaxNode>,
    entry: Option<EntryBuilder>,
    junk: Option<Range<usize>>,
}

impl<'a> BlockParser<'a> {
    fn new(text: &'a str) -> Self {
        BlockParser {
            text,
            index: LineIndex::new(text),
            nodes: vec![],
            entry: None,
            junk: None,
        }
    }

    fn loc(&self, range: Range<usize>) -> Location {
        self.index.location(range)
    }

    fn node(&self, kind: SyntaxKind, range: Range<usize>) -> SyntaxNode {
        SyntaxNode::new(kind, self.loc(range))
    }

    fn parse(mut self) -> SyntaxNode {
        let mut offset = 0;
        let text = self.text;
        for raw_line in text.split_inclusive('\n') {
            let start = offset;
            offset += raw_line.len();
            let line = raw_line.trim_end_matches(['\n', '\r']);
            let end = start + line.len();
            let trimmed = line.trim_start();
            let indent = line.len() - trimmed.len();

            if trimmed.is_empty() {
                self.blank_line();
                continue;
            }
            if trimmed.starts_with("//") {
                continue;
            }
            if indent == 0 {
                self.finish_entry();
                if trimmed.starts_with(|c: char| c.is_ascii_digit()) {
                    self.flush_junk();
                    let header = self.parse_header(start, line);
                    self.entry = Some(EntryBuilder {
                        range: start..end,
                        children: vec![header],
                        content: vec![],
                        phase: Phase::Metadata,
                    });
                } else {
                    self.extend_junk(start..end);
                }
            } else if self.entry.is_some() {
                self.entry_line(start, end, indent);
            } else {
                self.extend_junk(start..end);
            }
        }
        self.finish_entry();
        self.flush_junk();
        SyntaxNode::with_children(
            SyntaxKind::SourceFile,
            self.loc(0..text.len()),
            std::mem::take(&mut self.nodes),
        )
    }

    fn blank_line(&mut self) {
        self.flush_junk();
        if let Some(entry) = self.entry.as_mut() {
            entry.phase = Phase::Content;
        }
    }

    fn extend_junk(&mut self, range: Range<usize>) {
        match self.junk.as_mut() {
            Some(junk) => junk.end = range.end,
            None => self.junk = Some(range),
        }
    }

    fn flush_junk(&mut self) {
        if let Some(range) = self.junk.take() {
            let node = self.node(SyntaxKind::Error(ErrorCode::ParseError), range);
            self.nodes.push(node);
        }
    }

    fn finish_entry(&mut self) {
        let Some(mut entry) = self.entry.take() else {
            return;
        };
        if let (Some(first), Some(last)) = (entry.content.first(), entry.content.last()) {
            let range = first.location.start_index..last.location.end_index;
            let content = SyntaxNode::with_children(
                SyntaxKind::Content,
                self.loc(range),
                std::mem::take(&mut entry.content),
            );
            entry.children.push(content);
        }
        let node = SyntaxNode::with_children(SyntaxKind::Entry, self.loc(entry.range), entry.children);
        self.nodes.push(node);
    }

    fn entry_line(&mut self, start: usize, end: usize, indent: usize) {
        let body_start = start + indent;
        let body = &self.text[body_start..end];
        let is_heading = heading_name(body).is_some();
        let phase = match self.entry.as_ref() {
            Some(entry) => entry.phase,
            None => return,
        };

        let node = if phase == Phase::Metadata && !is_heading {
            match METADATA_RE.captures(body) {
                Some(caps) => {
                    let key = caps.name("key").map(|m| m.range()).unwrap_or(0..0);
                    let value = caps.name("value").map(|m| m.range()).unwrap_or(0..0);
                    let raw_value = &body[value.clone()];
                    let value_start = body_start + value.start;
                    let trimmed_value = raw_value.trim();
                    let lead = if trimmed_value.is_empty() {
                        raw_value.len()
                    } else {
                        raw_value.len() - raw_value.trim_start().len()
                    };
                    let value_range =
                        value_start + lead..value_start + lead + trimmed_value.len();
                    SyntaxNode::with_children(
                        SyntaxKind::Metadata,
                        self.loc(body_start..end),
                        vec![
                            self.node(SyntaxKind::Key, body_start + key.start..body_start + key.end),
                            self.node(SyntaxKind::Value, value_range),
                        ],
                    )
                }
                None => self.node(
                    SyntaxKind::Error(ErrorCode::MalformedMetadata),
                    body_start..end,
                ),
            }
        } else if is_heading {
            self.node(SyntaxKind::Heading, body_start..end)
        } else {
            // content lines keep their indentation so extraction can dedent consistently
            self.node(SyntaxKind::Line, start..end)
        };

        if let Some(entry) = self.entry.as_mut() {
            entry.range.end = end;
            if is_heading {
                entry.phase = Phase::Content;
            }
            match entry.phase {
                Phase::Content => entry.content.push(node),
                Phase::Metadata => entry.children.push(node),
            }
        }
    }

    fn parse_header(&self, start: usize, line: &str) -> SyntaxNode {
        let tokens = tokenize(line, start);
        let line_end = start + line.len();
        let mut children = vec![];
        let mut tokens = tokens.into_iter().peekable();

        let Some(timestamp) = tokens.next() else {
            return self.node(SyntaxKind::Error(ErrorCode::ParseError), start..line_end);
        };
        match TIMESTAMP_RE.captures(&timestamp.text) {
            Some(caps) if caps.name("tz").is_some() => {
                children.push(self.node(SyntaxKind::Timestamp, timestamp.range.clone()))
            }
            Some(_) => children.push(self.node(
                SyntaxKind::Error(ErrorCode::MissingTimezone),
                timestamp.range.clone(),
            )),
            None => children.push(self.node(
                SyntaxKind::Error(ErrorCode::InvalidTimestamp),
                timestamp.range.clone(),
            )),
        }

        let directive = match tokens.next() {
            Some(token) if is_directive(&token.text) => {
                children.push(self.node(SyntaxKind::Directive, token.range.clone()));
                token.text
            }
            Some(token) => {
                children.push(self.node(
                    SyntaxKind::Error(ErrorCode::InvalidDirective),
                    token.range.start..line_end,
                ));
                return self.header(start..line_end, children);
            }
            None => {
                children.push(self.node(
                    SyntaxKind::Error(ErrorCode::InvalidDirective),
                    line_end..line_end,
                ));
                return self.header(start..line_end, children);
            }
        };

        let mut link_required = false;
        if INSTANCE_DIRECTIVES.contains(&directive.as_str())
            || SCHEMA_DIRECTIVES.contains(&directive.as_str())
        {
            match tokens.peek() {
                Some(token) if is_bare_word(&token.text) => {
                    children.push(self.node(SyntaxKind::Entity, token.range.clone()));
                    tokens.next();
                }
                Some(token) => children.push(self.node(
                    SyntaxKind::Error(ErrorCode::MissingEntity),
                    token.range.start..token.range.start,
                )),
                None => children.push(self.node(
                    SyntaxKind::Error(ErrorCode::MissingEntity),
                    line_end..line_end,
                )),
            }
            self.expect_title(&mut tokens, &mut children, line_end);
        } else if directive == SYNTHESIS_DIRECTIVE {
            link_required = true;
            self.expect_title(&mut tokens, &mut children, line_end);
        } else {
            match tokens.peek() {
                Some(token) if is_link(&token.text) => {
                    children.push(self.node(SyntaxKind::LinkId, token.range.clone()));
                    tokens.next();
                }
                Some(token) => children.push(self.node(
                    SyntaxKind::Error(ErrorCode::MissingLinkId),
                    token.range.start..token.range.start,
                )),
                None => children.push(self.node(
                    SyntaxKind::Error(ErrorCode::MissingLinkId),
                    line_end..line_end,
                )),
            }
        }

        for token in tokens {
            if token.text.starts_with("//") {
                break;
            }
            let kind = if is_link(&token.text) {
                SyntaxKind::LinkId
            } else if is_tag(&token.text) {
                SyntaxKind::Tag
            } else {
                SyntaxKind::Error(ErrorCode::ParseError)
            };
            children.push(self.node(kind, token.range));
        }

        if link_required && !children.iter().any(|c| c.kind == SyntaxKind::LinkId) {
            children.push(self.node(
                SyntaxKind::Error(ErrorCode::MissingLinkId),
                line_end..line_end,
            ));
        }
        self.header(start..line_end, children)
    }

    fn expect_title<I: Iterator<Item = Token>>(
        &self,
        tokens: &mut std::iter::Peekable<I>,
        children: &mut Vec<SyntaxNode>,
        line_end: usize,
    ) {
        match tokens.peek() {
            Some(token) if is_complete_string(&token.text) => {
                children.push(self.node(SyntaxKind::Title, token.range.clone()));
                tokens.next();
            }
            Some(token) if token.text.starts_with('"') => {
                children.push(self.node(
                    SyntaxKind::Error(ErrorCode::MissingTitle),
                    token.range.clone(),
                ));
                tokens.next();
            }
            Some(token) => children.push(self.node(
                SyntaxKind::Error(ErrorCode::MissingTitle),
                token.range.start..token.range.start,
            )),
            None => children.push(self.node(
                SyntaxKind::Error(ErrorCode::MissingTitle),
                line_end..line_end,
            )),
        }
    }

    fn header(&self, range: Range<usize>, children: Vec<SyntaxNode>) -> SyntaxNode {
        SyntaxNode::with_children(SyntaxKind::Header, self.loc(range), children)
    }
}

/// Name of a `# Heading` line (leading hashes followed by whitespace), if `body` is one.
pub fn heading_name(body: &str) -> Option<&str> {
    let rest = body.trim_start_matches('#');
    if rest.len() == body.len() || !rest.starts_with([' ', '\t']) {
        return None;
    }
    Some(rest.trim())
}

pub fn is_directive(word: &str) -> bool {
    INSTANCE_DIRECTIVES.contains(&word)
        || SCHEMA_DIRECTIVES.contains(&word)
        || word == SYNTHESIS_DIRECTIVE
        || word == ACTUALIZE_DIRECTIVE
}

fn is_link(token: &str) -> bool {
    token.len() > 1 && token.starts_with('^')
}

fn is_tag(token: &str) -> bool {
    token.len() > 1 && token.starts_with('#')
}

fn is_bare_word(token: &str) -> bool {
    token
        .chars()
        .next()
        .map(|c| c.is_alphabetic() || c == '_')
        .unwrap_or(false)
}

fn is_complete_string(token: &str) -> bool {
    token.len() >= 2 && token.starts_with('"') && token.ends_with('"') && !token.ends_with("\\\"")
}

/// Split a header line into whitespace separated tokens, keeping quoted strings (with `\"`
/// escapes) whole. Ranges are offset by `base`.
fn tokenize(line: &str, base: usize) -> Vec<Token> {
    let mut tokens = vec![];
    let bytes = line.as_bytes();
    let mut idx = 0;
    while idx < bytes.len() {
        if bytes[idx].is_ascii_whitespace() {
            idx += 1;
            continue;
        }
        let start = idx;
        if bytes[idx] == b'"' {
            idx += 1;
            while idx < bytes.len() {
                match bytes[idx] {
                    b'\\' => idx += 2,
                    b'"' => {
                        idx += 1;
                        break;
                    }
                    _ => idx += 1,
                }
            }
            idx = idx.min(bytes.len());
        } else {
            while idx < bytes.len() && !bytes[idx].is_ascii_whitespace() {
                idx += 1;
            }
        }
        tokens.push(Token {
            range: base + start..base + idx,
            text: line[start..idx].to_string(),
        });
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> SyntaxNode {
        ThaloParser.parse_block(text).expect("block parses")
    }

    fn kinds(node: &SyntaxNode) -> Vec<SyntaxKind> {
        node.children.iter().map(|c| c.kind).collect()
    }

    #[test]
    fn test_instance_entry_structure() {
        let text = "2026-01-05T18:00Z create lore \"My \\\"first\\\" note\" ^first #a #b\n  type: \"fact\"\n  subject: ^self\n\n  # Content\n  Hello there.\n";
        let root = parse(text);
        assert_eq!(root.children.len(), 1);
        let entry = &root.children[0];
        assert_eq!(entry.kind, SyntaxKind::Entry);
        assert_eq!(
            kinds(entry),
            vec![
                SyntaxKind::Header,
                SyntaxKind::Metadata,
                SyntaxKind::Metadata,
                SyntaxKind::Content
            ]
        );
        let header = &entry.children[0];
        assert_eq!(
            kinds(header),
            vec![
                SyntaxKind::Timestamp,
                SyntaxKind::Directive,
                SyntaxKind::Entity,
                SyntaxKind::Title,
                SyntaxKind::LinkId,
                SyntaxKind::Tag,
                SyntaxKind::Tag
            ]
        );
        assert_eq!(
            header.child(SyntaxKind::Title).unwrap().text(text),
            "\"My \\\"first\\\" note\""
        );
        let metadata = &entry.children[2];
        assert_eq!(metadata.child(SyntaxKind::Key).unwrap().text(text), "subject");
        assert_eq!(metadata.child(SyntaxKind::Value).unwrap().text(text), "^self");
        let content = entry.child(SyntaxKind::Content).unwrap();
        assert_eq!(kinds(content), vec![SyntaxKind::Heading, SyntaxKind::Line]);
        assert_eq!(content.children[1].location.start.line, 5);
    }

    #[test]
    fn test_header_errors() {
        let root = parse("2026-01-05T18:00 create lore \"x\"\n");
        assert_eq!(
            root.errors()[0].kind,
            SyntaxKind::Error(ErrorCode::MissingTimezone)
        );

        let root = parse("2026-01-05 create lore \"x\"\n");
        assert_eq!(
            root.errors()[0].kind,
            SyntaxKind::Error(ErrorCode::InvalidTimestamp)
        );

        let root = parse("2026-01-05T18:00Z scribble lore \"x\"\n");
        assert_eq!(
            root.errors()[0].kind,
            SyntaxKind::Error(ErrorCode::InvalidDirective)
        );

        let root = parse("2026-01-05T18:00Z create \"x\"\n");
        assert_eq!(
            root.errors()[0].kind,
            SyntaxKind::Error(ErrorCode::MissingEntity)
        );

        let root = parse("2026-01-05T18:00Z create lore ^x\n");
        assert_eq!(
            root.errors()[0].kind,
            SyntaxKind::Error(ErrorCode::MissingTitle)
        );

        let root = parse("2026-01-05T18:00Z define-synthesis \"Profile\" #p\n");
        assert_eq!(
            root.errors()[0].kind,
            SyntaxKind::Error(ErrorCode::MissingLinkId)
        );

        let root = parse("2026-01-05T18:00Z actualize-synthesis\n");
        assert_eq!(
            root.errors()[0].kind,
            SyntaxKind::Error(ErrorCode::MissingLinkId)
        );
    }

    #[test]
    fn test_junk_and_malformed_metadata() {
        let text = "this is not an entry\nneither is this\n\n2026-01-05T18:00Z create lore \"ok\"\n  no colon here\n  key: v\n";
        let root = parse(text);
        assert_eq!(root.children.len(), 2);
        let junk = &root.children[0];
        assert_eq!(junk.kind, SyntaxKind::Error(ErrorCode::ParseError));
        assert_eq!(junk.location.start.line, 0);
        assert_eq!(junk.location.end.line, 1);

        let entry = &root.children[1];
        assert_eq!(
            kinds(entry),
            vec![
                SyntaxKind::Header,
                SyntaxKind::Error(ErrorCode::MalformedMetadata),
                SyntaxKind::Metadata
            ]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        let text = "// leading comment\n2026-01-05T18:00Z create lore \"ok\"\n  // commented key\n  key: v\n";
        let root = parse(text);
        assert_eq!(root.children.len(), 1);
        assert!(root.errors().is_empty());
        assert_eq!(kinds(&root.children[0]), vec![SyntaxKind::Header, SyntaxKind::Metadata]);
    }

    #[test]
    fn test_schema_body_is_content() {
        let text = "2026-01-01T00:00Z define-entity lore \"Lore\"\n  # Metadata\n  type: string\n  # Sections\n  Content\n";
        let root = parse(text);
        let entry = &root.children[0];
        assert_eq!(kinds(entry), vec![SyntaxKind::Header, SyntaxKind::Content]);
        let content = entry.child(SyntaxKind::Content).unwrap();
        assert_eq!(
            kinds(content),
            vec![
                SyntaxKind::Heading,
                SyntaxKind::Line,
                SyntaxKind::Heading,
                SyntaxKind::Line
            ]
        );
    }

    #[test]
    fn test_binary_block_fails() {
        let failure = ThaloParser.parse_block("2026\0").unwrap_err();
        assert_eq!(failure.location.start_index, 4);
    }

    #[test]
    fn test_heading_name() {
        assert_eq!(heading_name("# Prompt"), Some("Prompt"));
        assert_eq!(heading_name("## Remove Metadata "), Some("Remove Metadata"));
        assert_eq!(heading_name("#tag"), None);
        assert_eq!(heading_name("plain"), None);
    }
}
