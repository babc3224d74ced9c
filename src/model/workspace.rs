use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::Path,
};
use walkdir::WalkDir;

use super::{
    document::{Document, DocumentOptions, SemanticModel},
    link_index::{LinkDefinition, LinkIndex, LinkReference},
    schema_registry::SchemaRegistry,
};
use crate::{
    ast::{
        ActualizeEntry, Entry, EntryIdentity, Extraction, InstanceEntry, LinkId, SchemaEntry,
        SynthesisEntry,
    },
    query::{self, Query},
    syntax::{FileType, Parser, ThaloParser},
    ThaloError,
};

/// What a document change invalidated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationResult {
    pub file: String,
    /// Some schema entry was added, removed or structurally changed.
    pub schemas_changed: bool,
    /// The set of link definitions or references changed.
    pub links_changed: bool,
    /// The set of tags in use by the file changed.
    pub tags_changed: bool,
    /// Entity names whose schema contributions changed.
    pub entities_changed: BTreeSet<String>,
    /// Identities of entries that are new or structurally different.
    pub changed_entries: BTreeSet<EntryIdentity>,
    /// Identities of entries that no longer exist.
    pub removed_entries: BTreeSet<EntryIdentity>,
}

impl InvalidationResult {
    pub fn is_empty(&self) -> bool {
        !self.schemas_changed
            && !self.links_changed
            && !self.tags_changed
            && self.changed_entries.is_empty()
            && self.removed_entries.is_empty()
    }

    fn between(file: &str, old: Option<&Document>, new: Option<&Document>) -> Self {
        let empty: &[Entry] = &[];
        let old_entries = old.map(|d| d.entries()).unwrap_or(empty);
        let new_entries = new.map(|d| d.entries()).unwrap_or(empty);

        let fingerprints = |entries: &[Entry]| -> BTreeMap<EntryIdentity, Vec<String>> {
            let mut map: BTreeMap<EntryIdentity, Vec<String>> = BTreeMap::new();
            for entry in entries {
                map.entry(entry.identity())
                    .or_default()
                    .push(entry.fingerprint().to_string());
            }
            map
        };
        let old_prints = fingerprints(old_entries);
        let new_prints = fingerprints(new_entries);

        let changed_entries: BTreeSet<EntryIdentity> = new_prints
            .iter()
            .filter(|(identity, prints)| old_prints.get(*identity) != Some(*prints))
            .map(|(identity, _)| identity.clone())
            .collect();
        let removed_entries: BTreeSet<EntryIdentity> = old_prints
            .keys()
            .filter(|identity| !new_prints.contains_key(*identity))
            .cloned()
            .collect();

        let schema_prints = |entries: &[Entry]| -> BTreeSet<(String, String)> {
            entries
                .iter()
                .filter_map(|e| match e {
                    Entry::Schema(schema) => {
                        Some((schema.entity.clone(), schema.header.fingerprint.clone()))
                    }
                    _ => None,
                })
                .collect()
        };
        let old_schemas = schema_prints(old_entries);
        let new_schemas = schema_prints(new_entries);
        let entities_changed: BTreeSet<String> = old_schemas
            .symmetric_difference(&new_schemas)
            .map(|(entity, _)| entity.clone())
            .collect();

        let tags = |entries: &[Entry]| -> BTreeSet<String> {
            entries.iter().flat_map(|e| e.tags().iter().cloned()).collect()
        };

        let signature = |doc: Option<&Document>| {
            doc.map(|d| {
                d.model()
                    .links
                    .signature()
                    .into_iter()
                    .map(|(defined, link)| (defined, link.clone()))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default()
        };

        InvalidationResult {
            file: file.to_string(),
            schemas_changed: !entities_changed.is_empty(),
            links_changed: signature(old) != signature(new),
            tags_changed: tags(old_entries) != tags(new_entries),
            entities_changed,
            changed_entries,
            removed_entries,
        }
    }
}

/// All documents of a knowledge base plus the derived global indices.
///
/// Single-writer: callers serialize [`Workspace::add_document`] and
/// [`Workspace::remove_document`] themselves.
pub struct Workspace {
    parser: Box<dyn Parser>,
    documents: BTreeMap<String, Document>,
    schemas: SchemaRegistry,
    links: LinkIndex,
}

impl Default for Workspace {
    fn default() -> Self {
        Workspace::new()
    }
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("documents", &self.documents.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Workspace {
    /// A workspace using the built-in [`ThaloParser`].
    pub fn new() -> Self {
        Workspace::with_parser(Box::new(ThaloParser))
    }

    pub fn with_parser(parser: Box<dyn Parser>) -> Self {
        Workspace {
            parser,
            documents: BTreeMap::new(),
            schemas: SchemaRegistry::new(),
            links: LinkIndex::new(),
        }
    }

    /// Parse `source` and replace any document previously stored under `options.file`.
    #[tracing::instrument(skip_all, fields(file = %options.file))]
    pub fn add_document(&mut self, source: &str, options: DocumentOptions) -> InvalidationResult {
        if let Some(existing) = self.documents.get(&options.file) {
            if existing.source() == source && existing.file_type() == options.resolved_file_type()
            {
                tracing::trace!("[Workspace::add_document] {} unchanged", options.file);
                return InvalidationResult {
                    file: options.file,
                    ..Default::default()
                };
            }
        }
        let document = Document::parse(self.parser.as_ref(), source, &options);
        let file = options.file;
        let previous = self.documents.remove(&file);

        let result = InvalidationResult::between(&file, previous.as_ref(), Some(&document));
        if previous.is_some() {
            self.retract(&file);
        }

        let touched = self.schemas.add_entries(document.entries().iter().filter_map(|e| match e {
            Entry::Schema(schema) => Some(schema),
            _ => None,
        }));
        let touched: BTreeSet<String> = touched
            .into_iter()
            .chain(result.entities_changed.iter().cloned())
            .collect();
        self.schemas.refresh(touched.iter());
        self.links.add(&document.model().links);

        tracing::debug!(
            "[Workspace::add_document] {}: {} entries, {} syntax errors, schemas_changed={}, links_changed={}",
            file,
            document.entries().len(),
            document.syntax_errors().len(),
            result.schemas_changed,
            result.links_changed
        );
        self.documents.insert(file, document);
        result
    }

    /// Remove the document at `file`. Unknown paths are a no-op with an empty result.
    pub fn remove_document(&mut self, file: &str) -> InvalidationResult {
        let Some(previous) = self.documents.remove(file) else {
            return InvalidationResult {
                file: file.to_string(),
                ..Default::default()
            };
        };
        let result = InvalidationResult::between(file, Some(&previous), None);
        self.retract(file);
        tracing::debug!("[Workspace::remove_document] removed {}", file);
        result
    }

    fn retract(&mut self, file: &str) {
        let touched = self.schemas.remove_file(file);
        self.schemas.refresh(touched.iter());
        self.links.remove_file(file);
    }

    /// Parse and extract without touching workspace state.
    pub fn extract_entries(&self, source: &str, options: &DocumentOptions) -> Extraction {
        let document = Document::parse(self.parser.as_ref(), source, options);
        Extraction {
            errors: document.syntax_errors().to_vec(),
            entries: document.model().entries.clone(),
        }
    }

    /// Add every `.thalo` and markdown file below `root`, keyed by root-relative path with `/`
    /// separators. Returns the keys added, in walk order.
    pub fn load_directory<P: AsRef<Path>>(&mut self, root: P) -> Result<Vec<String>, ThaloError> {
        let root = root.as_ref();
        let mut added = vec![];
        for entry in WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0
                    || !e
                        .file_name()
                        .to_str()
                        .map(|name| name.starts_with('.'))
                        .unwrap_or(false)
            })
        {
            let entry = entry?;
            if !entry.file_type().is_file() || !FileType::is_supported(entry.path()) {
                continue;
            }
            let relative = entry.path().strip_prefix(root)?;
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let source = fs::read_to_string(entry.path())?;
            self.add_document(&source, DocumentOptions::new(key.clone()));
            added.push(key);
        }
        tracing::info!(
            "[Workspace::load_directory] loaded {} files from {}",
            added.len(),
            root.display()
        );
        Ok(added)
    }

    pub fn get_document(&self, file: &str) -> Option<&Document> {
        self.documents.get(file)
    }

    pub fn get_model(&self, file: &str) -> Option<&SemanticModel> {
        self.documents.get(file).map(Document::model)
    }

    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.documents.values()
    }

    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.documents.keys().map(String::as_str)
    }

    pub fn schema_registry(&self) -> &SchemaRegistry {
        &self.schemas
    }

    pub fn link_index(&self) -> &LinkIndex {
        &self.links
    }

    /// Every entry, ordered by file then in-file position. Each call starts a fresh iteration.
    pub fn all_entries(&self) -> impl Iterator<Item = &Entry> {
        self.documents.values().flat_map(|doc| doc.entries().iter())
    }

    pub fn all_instance_entries(&self) -> impl Iterator<Item = &InstanceEntry> {
        self.all_entries().filter_map(|e| match e {
            Entry::Instance(instance) => Some(instance),
            _ => None,
        })
    }

    pub fn all_schema_entries(&self) -> impl Iterator<Item = &SchemaEntry> {
        self.all_entries().filter_map(|e| match e {
            Entry::Schema(schema) => Some(schema),
            _ => None,
        })
    }

    pub fn all_synthesis_entries(&self) -> impl Iterator<Item = &SynthesisEntry> {
        self.all_entries().filter_map(|e| match e {
            Entry::Synthesis(synthesis) => Some(synthesis),
            _ => None,
        })
    }

    pub fn all_actualize_entries(&self) -> impl Iterator<Item = &ActualizeEntry> {
        self.all_entries().filter_map(|e| match e {
            Entry::Actualize(actualize) => Some(actualize),
            _ => None,
        })
    }

    pub fn get_link_definition(&self, link_id: &LinkId) -> Option<&LinkDefinition> {
        self.links.definition(link_id)
    }

    pub fn get_link_references(&self, link_id: &LinkId) -> &[LinkReference] {
        self.links.references(link_id)
    }

    /// The entry the current definition of `link_id` points at.
    pub fn get_link_entry(&self, link_id: &LinkId) -> Option<&Entry> {
        let definition = self.links.definition(link_id)?;
        self.documents
            .get(&definition.file)?
            .entries()
            .get(definition.entry_index)
    }

    pub fn get_entry(&self, file: &str, entry_index: usize) -> Option<&Entry> {
        self.documents.get(file)?.entries().get(entry_index)
    }

    /// Tags in use with their entry counts.
    pub fn all_tags(&self) -> BTreeMap<String, usize> {
        let mut tags = BTreeMap::new();
        for entry in self.all_entries() {
            for tag in entry.tags() {
                *tags.entry(tag.clone()).or_insert(0) += 1;
            }
        }
        tags
    }

    pub fn all_link_ids(&self) -> Vec<&LinkId> {
        self.links.link_ids()
    }

    /// Entries matching any of `queries`; see [`query::execute`].
    pub fn query(&self, queries: &[Query]) -> Vec<&Entry> {
        query::execute(queries, self.all_entries())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(file: &str) -> DocumentOptions {
        DocumentOptions::new(file)
    }

    #[test]
    fn test_content_edit_invalidates_only_the_entry() {
        let mut ws = Workspace::new();
        ws.add_document(
            "2026-01-01T00:00Z create lore \"A\" ^a #x\n  subject: ^b\n\n  # Content\n  one\n",
            opts("a.thalo"),
        );
        let result = ws.add_document(
            "2026-01-01T00:00Z create lore \"A\" ^a #x\n  subject: ^b\n\n  # Content\n  two\n",
            opts("a.thalo"),
        );
        assert!(!result.schemas_changed);
        assert!(!result.links_changed);
        assert!(!result.tags_changed);
        assert_eq!(
            result.changed_entries.into_iter().collect::<Vec<_>>(),
            vec![EntryIdentity::Link(LinkId::new("a"))]
        );
    }

    #[test]
    fn test_reformatting_is_not_a_change() {
        let mut ws = Workspace::new();
        ws.add_document("2026-01-01T00:00Z create lore \"A\"\n  k: v\n", opts("a.thalo"));
        let result = ws.add_document(
            "2026-01-01T00:00Z   create lore \"A\"\n      k:    v\n\n",
            opts("a.thalo"),
        );
        assert!(result.is_empty(), "{result:?}");
    }

    #[test]
    fn test_schema_and_link_changes_are_flagged() {
        let mut ws = Workspace::new();
        let result = ws.add_document(
            "2026-01-01T00:00Z define-entity lore \"Lore\"\n  # Metadata\n  a: string\n",
            opts("s.thalo"),
        );
        assert!(result.schemas_changed);
        assert!(result.entities_changed.contains("lore"));
        assert!(!result.links_changed);
        assert!(ws.schema_registry().has("lore"));

        let result = ws.add_document("2026-01-02T00:00Z create lore \"A\" ^a\n", opts("a.thalo"));
        assert!(result.links_changed);

        let result = ws.remove_document("s.thalo");
        assert!(result.schemas_changed);
        assert!(!ws.schema_registry().has("lore"));
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let mut ws = Workspace::new();
        let result = ws.remove_document("missing.thalo");
        assert!(result.is_empty());
        assert!(ws.get_document("missing.thalo").is_none());
        assert!(ws.get_model("missing.thalo").is_none());
    }

    #[test]
    fn test_iteration_order_and_restartability() {
        let mut ws = Workspace::new();
        ws.add_document("2026-01-02T00:00Z create lore \"B1\"\n", opts("b.thalo"));
        ws.add_document(
            "2026-01-05T00:00Z create lore \"A1\"\n\n2026-01-01T00:00Z create lore \"A2\"\n",
            opts("a.thalo"),
        );
        let titles: Vec<&str> = ws.all_instance_entries().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["A1", "A2", "B1"]);
        assert_eq!(ws.all_instance_entries().count(), 3);
    }

    #[test]
    fn test_extract_entries_leaves_state_alone() {
        let ws = Workspace::new();
        let extraction =
            ws.extract_entries("2026-01-02T00:00Z create lore \"B1\" ^b\n", &opts("b.thalo"));
        assert_eq!(extraction.entries.len(), 1);
        assert!(ws.get_link_definition(&LinkId::new("b")).is_none());
        assert_eq!(ws.files().count(), 0);
    }
}
