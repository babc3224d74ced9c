use serde::{Deserialize, Serialize};

use super::is_word;
use crate::{model::Workspace, source_map::Position};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionKind {
    Link,
    Tag,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionItem {
    /// Text to insert, including the sigil.
    pub label: String,
    pub kind: CompletionKind,
    pub detail: Option<String>,
}

/// Candidates for a `^link` or `#tag` being typed at `position`, filtered by the typed prefix.
/// A candidate equal to the prefix is already complete and is left out.
pub fn completions(workspace: &Workspace, file: &str, position: Position) -> Vec<CompletionItem> {
    let Some(document) = workspace.get_document(file) else {
        return vec![];
    };
    if document.find_block(position).is_none() {
        return vec![];
    }
    let Some(offset) = document.offset_at(position) else {
        return vec![];
    };
    let source = document.source();
    let line_start = source[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let before = &source[line_start..offset];
    let prefix_start = before
        .char_indices()
        .rev()
        .take_while(|(_, c)| is_word(*c))
        .last()
        .map(|(i, _)| i)
        .unwrap_or(before.len());
    let prefix = &before[prefix_start..];
    let Some(sigil) = before[..prefix_start].chars().next_back() else {
        return vec![];
    };
    let leading = &before[..prefix_start - sigil.len_utf8()];

    let items: Vec<CompletionItem> = match sigil {
        '^' => workspace
            .all_link_ids()
            .into_iter()
            .filter(|id| id.as_str().starts_with(prefix) && id.as_str() != prefix)
            .map(|id| CompletionItem {
                label: id.to_string(),
                kind: CompletionKind::Link,
                detail: workspace.get_link_entry(id).map(|entry| entry.summary()),
            })
            .collect(),
        // `#` opening a line is a heading
        '#' if !leading.trim().is_empty() => workspace
            .all_tags()
            .into_iter()
            .filter(|(tag, _)| tag.starts_with(prefix) && tag != prefix)
            .map(|(tag, count)| CompletionItem {
                label: format!("#{tag}"),
                kind: CompletionKind::Tag,
                detail: Some(format!(
                    "{count} {}",
                    if count == 1 { "entry" } else { "entries" }
                )),
            })
            .collect(),
        _ => vec![],
    };
    tracing::trace!(
        "[completions] {:?} prefix {:?}: {} candidates",
        sigil,
        prefix,
        items.len()
    );
    items
}
