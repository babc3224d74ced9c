use std::collections::HashMap;

use crate::{
    ast::{ActualizeEntry, Entry, InstanceEntry, LinkId, SchemaEntry, SynthesisEntry},
    model::Workspace,
};

/// Read model built once per check pass so rules answer cross-entry questions with lookups
/// instead of scanning the workspace.
#[derive(Debug, Default)]
pub struct WorkspaceIndex<'w> {
    pub instances: Vec<&'w InstanceEntry>,
    pub schemas: Vec<&'w SchemaEntry>,
    pub syntheses: Vec<&'w SynthesisEntry>,
    pub actualizes: Vec<&'w ActualizeEntry>,
    pub instances_by_entity: HashMap<&'w str, Vec<&'w InstanceEntry>>,
    /// Schema entries per entity, in fold order.
    pub schemas_by_entity: HashMap<&'w str, Vec<&'w SchemaEntry>>,
    /// Entries explicitly declaring each link id, in workspace order.
    pub definitions_by_link: HashMap<&'w LinkId, Vec<&'w Entry>>,
    /// Entries referencing each link id.
    pub references_by_link: HashMap<&'w LinkId, Vec<&'w Entry>>,
    /// Syntheses whose source queries name each entity.
    pub queries_by_entity: HashMap<&'w str, Vec<&'w SynthesisEntry>>,
    /// Entries sharing a timestamp within one file.
    pub by_file_timestamp: HashMap<(&'w str, &'w str), Vec<&'w Entry>>,
}

impl<'w> WorkspaceIndex<'w> {
    #[tracing::instrument(skip_all)]
    pub fn build(workspace: &'w Workspace) -> Self {
        let mut index = WorkspaceIndex::default();
        for entry in workspace.all_entries() {
            let header = entry.header();
            if let Some(link_id) = &header.link_id {
                index
                    .definitions_by_link
                    .entry(link_id)
                    .or_default()
                    .push(entry);
            }
            for (link_id, _) in entry.outgoing_links() {
                index
                    .references_by_link
                    .entry(link_id)
                    .or_default()
                    .push(entry);
            }
            index
                .by_file_timestamp
                .entry((header.file.as_str(), header.timestamp.raw()))
                .or_default()
                .push(entry);

            match entry {
                Entry::Instance(instance) => {
                    index.instances.push(instance);
                    index
                        .instances_by_entity
                        .entry(instance.entity.as_str())
                        .or_default()
                        .push(instance);
                }
                Entry::Schema(schema) => {
                    index.schemas.push(schema);
                    index
                        .schemas_by_entity
                        .entry(schema.entity.as_str())
                        .or_default()
                        .push(schema);
                }
                Entry::Synthesis(synthesis) => {
                    index.syntheses.push(synthesis);
                    for query in &synthesis.sources {
                        index
                            .queries_by_entity
                            .entry(query.entity.as_str())
                            .or_default()
                            .push(synthesis);
                    }
                }
                Entry::Actualize(actualize) => index.actualizes.push(actualize),
            }
        }
        for schemas in index.schemas_by_entity.values_mut() {
            schemas.sort_by(|a, b| {
                (&a.header.timestamp, &a.header.file, a.header.file_offset()).cmp(&(
                    &b.header.timestamp,
                    &b.header.file,
                    b.header.file_offset(),
                ))
            });
        }
        tracing::trace!(
            "[WorkspaceIndex::build] {} instances, {} schemas, {} syntheses, {} actualizes",
            index.instances.len(),
            index.schemas.len(),
            index.syntheses.len(),
            index.actualizes.len()
        );
        index
    }

    pub fn definitions(&self, link_id: &LinkId) -> &[&'w Entry] {
        self.definitions_by_link
            .get(link_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn schemas_for(&self, entity: &str) -> &[&'w SchemaEntry] {
        self.schemas_by_entity
            .get(entity)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Fold-ordered index of the first `define-entity` for `entity`.
    pub fn first_define(&self, entity: &str) -> Option<usize> {
        self.schemas_for(entity).iter().position(|s| s.is_define())
    }
}
