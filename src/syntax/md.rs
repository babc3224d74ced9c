use pulldown_cmark::{CodeBlockKind, Event as MdEvent, Options, Parser as MdParser, Tag as MdTag};
use std::ops::Range;

use crate::source_map::SourceMap;

pub use pulldown_cmark;

/// Info-string languages recognized as embedded thalo.
pub const THALO_FENCE_LANGUAGES: &[&str] = &["thalo"];

pub fn thalo_md_options() -> Options {
    let mut md_options = Options::empty();
    // Only extensions that change block structure matter for locating fences.
    md_options.insert(Options::ENABLE_FOOTNOTES);
    md_options.insert(Options::ENABLE_GFM);
    md_options.insert(Options::ENABLE_MATH);
    md_options.insert(Options::ENABLE_TABLES);
    md_options.insert(Options::ENABLE_YAML_STYLE_METADATA_BLOCKS);
    md_options
}

/// A fenced thalo region of a markdown file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedBlock {
    pub text: String,
    pub source_map: SourceMap,
}

fn is_thalo_fence(info: &str) -> bool {
    info.split_whitespace()
        .next()
        .map(|lang| THALO_FENCE_LANGUAGES.contains(&lang.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Content collected for the thalo fence being read.
struct OpenFence {
    span: Option<Range<usize>>,
    /// Every text run so far started where the previous one ended.
    contiguous: bool,
}

/// Find every fenced ` ```thalo ` region in `source`, in document order.
///
/// Empty fences are skipped. Fences never nest, so the returned blocks never overlap. A fence whose
/// lines carry a container prefix (block quote markers, list or fence indentation) is skipped as
/// well: its content is not a contiguous slice of `source`, so block offsets could not be mapped
/// back to the file.
pub fn extract_blocks(source: &str) -> Vec<EmbeddedBlock> {
    let mut blocks = vec![];
    let mut current: Option<OpenFence> = None;
    for (event, range) in MdParser::new_ext(source, thalo_md_options()).into_offset_iter() {
        match event {
            MdEvent::Start(MdTag::CodeBlock(CodeBlockKind::Fenced(info))) => {
                if is_thalo_fence(&info) {
                    current = Some(OpenFence {
                        span: None,
                        contiguous: true,
                    });
                }
            }
            MdEvent::Text(_) => {
                if let Some(fence) = current.as_mut() {
                    match fence.span.as_mut() {
                        Some(existing) => {
                            fence.contiguous &= existing.end == range.start;
                            existing.end = range.end;
                        }
                        None => fence.span = Some(range),
                    }
                }
            }
            MdEvent::End(pulldown_cmark::TagEnd::CodeBlock) => {
                let Some(OpenFence {
                    span: Some(span),
                    contiguous,
                }) = current.take()
                else {
                    continue;
                };
                if !contiguous {
                    tracing::debug!(
                        "[md::extract_blocks] skipping prefixed thalo fence at bytes {}..{}",
                        span.start,
                        span.end
                    );
                    continue;
                }
                let text = &source[span.clone()];
                tracing::debug!(
                    "[md::extract_blocks] thalo fence at bytes {}..{}",
                    span.start,
                    span.end
                );
                blocks.push(EmbeddedBlock {
                    text: text.to_string(),
                    source_map: SourceMap::for_block(source, span.start, text),
                });
            }
            _ => {}
        }
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_only_thalo_fences() {
        let source = "# Journal\n\nSome prose.\n\n```thalo\n2026-01-01T00:00Z create lore \"A\"\n```\n\n```rust\nfn main() {}\n```\n\n```thalo\n2026-01-02T00:00Z create lore \"B\"\n  type: \"fact\"\n```\n";
        let blocks = extract_blocks(source);
        assert_eq!(blocks.len(), 2);

        assert_eq!(blocks[0].text, "2026-01-01T00:00Z create lore \"A\"\n");
        assert_eq!(blocks[0].source_map.line_offset, 5);
        assert_eq!(blocks[0].source_map.column_offset, 0);
        assert_eq!(blocks[0].source_map.line_count, 1);
        assert_eq!(
            &source[blocks[0].source_map.char_offset..][..17],
            "2026-01-01T00:00Z"
        );

        assert_eq!(blocks[1].source_map.line_offset, 13);
        assert_eq!(blocks[1].source_map.line_count, 2);
    }

    #[test]
    fn test_empty_and_missing_fences() {
        assert!(extract_blocks("no code here").is_empty());
        assert!(extract_blocks("```thalo\n```\n").is_empty());
    }

    #[test]
    fn test_prefixed_fences_are_skipped() {
        let quoted = "> ```thalo\n> 2026-01-01T00:00Z create lore \"A\"\n>   type: \"fact\"\n> ```\n";
        assert!(extract_blocks(quoted).is_empty());

        let listed = "- item\n\n  ```thalo\n  2026-01-01T00:00Z create lore \"A\"\n    type: \"fact\"\n  ```\n";
        assert!(extract_blocks(listed).is_empty());

        let indented = "  ```thalo\n  2026-01-01T00:00Z create lore \"A\"\n    type: \"fact\"\n  ```\n";
        assert!(extract_blocks(indented).is_empty());

        // a top-level fence next to them is still found
        let mixed = format!("{quoted}\n```thalo\n2026-01-02T00:00Z create lore \"B\"\n  type: \"fact\"\n```\n");
        let blocks = extract_blocks(&mixed);
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].text.starts_with("2026-01-02T00:00Z"));
        assert_eq!(blocks[0].source_map.line_offset, 6);
    }
}
