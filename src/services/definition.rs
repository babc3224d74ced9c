use super::{schema_entry, symbol_at, FileLocation, Symbol};
use crate::{model::Workspace, source_map::Position};

/// Where the symbol at `position` is defined: the entry declaring a `^link-id`, the
/// `define-entity` of an entity, or the schema line declaring a field. Tags have no definition.
pub fn find_definition(workspace: &Workspace, file: &str, position: Position) -> Option<FileLocation> {
    let found = symbol_at(workspace, file, position)?;
    tracing::trace!("[find_definition] {:?}", found.symbol);
    match found.symbol {
        Symbol::Link(link_id) => {
            let definition = workspace.get_link_definition(&link_id)?;
            Some(FileLocation::new(
                definition.file.as_str(),
                definition.location.clone(),
            ))
        }
        Symbol::Entity(entity) => {
            let schema = workspace.schema_registry().get(&entity)?;
            let define = schema_entry(workspace, &entity, &schema.defined_by)?;
            let header = &define.header;
            Some(FileLocation::new(
                header.file.as_str(),
                header.to_file(&define.entity_location),
            ))
        }
        Symbol::Field { entity, field } => {
            let registry = workspace.schema_registry();
            let source = registry.get(&entity)?.field_source(&field, registry)?;
            let declaring = schema_entry(workspace, &entity, &source)?;
            let definition = declaring.fields.iter().rev().find(|f| f.name == field)?;
            Some(FileLocation::new(
                declaring.header.file.as_str(),
                declaring.header.to_file(&definition.location),
            ))
        }
        Symbol::Tag(_) => None,
    }
}
