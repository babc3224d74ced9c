use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::{
    ast::{Entry, EntryIdentity, EntryKind, LinkId},
    source_map::Location,
};

/// An entry explicitly declaring a link id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkDefinition {
    pub link_id: LinkId,
    pub file: String,
    pub identity: EntryIdentity,
    pub kind: EntryKind,
    /// Index of the entry in its document.
    pub entry_index: usize,
    /// File-absolute span of the declaring entry's header.
    pub location: Location,
}

/// A value pointing at a link id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkReference {
    pub link_id: LinkId,
    pub file: String,
    pub identity: EntryIdentity,
    pub kind: EntryKind,
    pub entry_index: usize,
    /// File-absolute span of the referencing value.
    pub location: Location,
}

/// The definitions and references contributed by one document.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkContributions {
    pub definitions: Vec<LinkDefinition>,
    pub references: Vec<LinkReference>,
}

impl LinkContributions {
    /// Only explicit link ids create definitions; a bare timestamp never does.
    pub fn collect(file: &str, entries: &[Entry]) -> Self {
        let mut contributions = LinkContributions::default();
        for (entry_index, entry) in entries.iter().enumerate() {
            let header = entry.header();
            if let Some(link_id) = &header.link_id {
                contributions.definitions.push(LinkDefinition {
                    link_id: link_id.clone(),
                    file: file.to_string(),
                    identity: entry.identity(),
                    kind: entry.kind(),
                    entry_index,
                    location: header.to_file(&header.header_location),
                });
            }
            for (link_id, location) in entry.outgoing_links() {
                contributions.references.push(LinkReference {
                    link_id: link_id.clone(),
                    file: file.to_string(),
                    identity: entry.identity(),
                    kind: entry.kind(),
                    entry_index,
                    location: header.to_file(&location),
                });
            }
        }
        contributions
    }

    /// Multiset of (defined?, link id) pairs, for detecting whether an edit changed linkage.
    pub fn signature(&self) -> Vec<(bool, &LinkId)> {
        let mut signature: Vec<(bool, &LinkId)> = self
            .definitions
            .iter()
            .map(|d| (true, &d.link_id))
            .chain(self.references.iter().map(|r| (false, &r.link_id)))
            .collect();
        signature.sort();
        signature
    }
}

/// Link id → definitions and references across the workspace.
///
/// Every definition candidate is kept, in insertion order, so removing a file is exact. Lookups
/// return the most recently added definition.
#[derive(Debug, Default, Clone)]
pub struct LinkIndex {
    definitions: HashMap<LinkId, Vec<LinkDefinition>>,
    references: HashMap<LinkId, Vec<LinkReference>>,
}

impl LinkIndex {
    pub fn new() -> Self {
        LinkIndex::default()
    }

    pub fn definition(&self, link_id: &LinkId) -> Option<&LinkDefinition> {
        self.definitions.get(link_id).and_then(|defs| defs.last())
    }

    /// Every definition candidate for `link_id`, oldest first.
    pub fn definitions(&self, link_id: &LinkId) -> &[LinkDefinition] {
        self.definitions
            .get(link_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn references(&self, link_id: &LinkId) -> &[LinkReference] {
        self.references
            .get(link_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn is_defined(&self, link_id: &LinkId) -> bool {
        self.definitions.contains_key(link_id)
    }

    /// Defined link ids, sorted.
    pub fn link_ids(&self) -> Vec<&LinkId> {
        let mut ids: Vec<&LinkId> = self.definitions.keys().collect();
        ids.sort();
        ids
    }

    pub(crate) fn add(&mut self, contributions: &LinkContributions) -> BTreeSet<LinkId> {
        let mut touched = BTreeSet::new();
        for definition in &contributions.definitions {
            touched.insert(definition.link_id.clone());
            self.definitions
                .entry(definition.link_id.clone())
                .or_default()
                .push(definition.clone());
        }
        for reference in &contributions.references {
            touched.insert(reference.link_id.clone());
            self.references
                .entry(reference.link_id.clone())
                .or_default()
                .push(reference.clone());
        }
        touched
    }

    pub(crate) fn remove_file(&mut self, file: &str) -> BTreeSet<LinkId> {
        let mut touched = BTreeSet::new();
        for (link_id, defs) in self.definitions.iter_mut() {
            let before = defs.len();
            defs.retain(|d| d.file != file);
            if defs.len() != before {
                touched.insert(link_id.clone());
            }
        }
        for (link_id, refs) in self.references.iter_mut() {
            let before = refs.len();
            refs.retain(|r| r.file != file);
            if refs.len() != before {
                touched.insert(link_id.clone());
            }
        }
        self.definitions.retain(|_, defs| !defs.is_empty());
        self.references.retain(|_, refs| !refs.is_empty());
        touched
    }
}
