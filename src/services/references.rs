use super::{symbol_at, FileLocation, Symbol};
use crate::{
    ast::Entry,
    model::Workspace,
    source_map::Position,
};

/// Every place the symbol at `position` is used.
///
/// - `^link-id`: each value referencing it, plus its definitions when `include_declaration`.
/// - `#tag`: the header of every entry carrying the tag.
/// - entity: every instance of it and every `alter-entity` targeting it, plus the
///   `define-entity` entries when `include_declaration`.
/// - field: every instance metadata key setting it, plus its schema lines when
///   `include_declaration`.
///
/// Results are ordered by file and position.
pub fn find_references(
    workspace: &Workspace,
    file: &str,
    position: Position,
    include_declaration: bool,
) -> Vec<FileLocation> {
    let Some(found) = symbol_at(workspace, file, position) else {
        return vec![];
    };
    let mut locations: Vec<FileLocation> = match &found.symbol {
        Symbol::Link(link_id) => {
            let index = workspace.link_index();
            let declarations = include_declaration
                .then(|| index.definitions(link_id))
                .unwrap_or_default()
                .iter()
                .map(|d| FileLocation::new(d.file.as_str(), d.location.clone()));
            let references = index
                .references(link_id)
                .iter()
                .map(|r| FileLocation::new(r.file.as_str(), r.location.clone()));
            declarations.chain(references).collect()
        }
        Symbol::Tag(tag) => workspace
            .all_entries()
            .filter(|entry| entry.header().has_tag(tag))
            .map(FileLocation::of_header)
            .collect(),
        Symbol::Entity(entity) => workspace
            .all_entries()
            .filter_map(|entry| {
                let (header, location) = match entry {
                    Entry::Instance(i) if &i.entity == entity => (&i.header, &i.entity_location),
                    Entry::Schema(s)
                        if &s.entity == entity && (include_declaration || !s.is_define()) =>
                    {
                        (&s.header, &s.entity_location)
                    }
                    _ => return None,
                };
                Some(FileLocation::new(header.file.as_str(), header.to_file(location)))
            })
            .collect(),
        Symbol::Field { entity, field } => {
            let mut locations: Vec<FileLocation> = workspace
                .all_instance_entries()
                .filter(|instance| &instance.entity == entity)
                .flat_map(|instance| {
                    instance
                        .metadata
                        .iter()
                        .filter(|m| &m.key == field)
                        .map(|m| {
                            FileLocation::new(
                                instance.header.file.as_str(),
                                instance.header.to_file(&m.key_location),
                            )
                        })
                })
                .collect();
            if include_declaration {
                for schema in workspace.schema_registry().fold_order(entity) {
                    locations.extend(schema.fields.iter().filter(|f| &f.name == field).map(|f| {
                        FileLocation::new(schema.header.file.as_str(), schema.header.to_file(&f.location))
                    }));
                }
            }
            locations
        }
    };
    locations.sort_by(|a, b| {
        (a.file.as_str(), a.location.start_index).cmp(&(b.file.as_str(), b.location.start_index))
    });
    locations.dedup();
    tracing::trace!("[find_references] {:?}: {} locations", found.symbol, locations.len());
    locations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::fixtures;

    fn files(locations: &[FileLocation]) -> Vec<(&str, u32)> {
        locations
            .iter()
            .map(|l| (l.file.as_str(), l.location.start.line))
            .collect()
    }

    #[test]
    fn test_link_references() {
        let ws = fixtures::workspace();
        let refs = find_references(&ws, "entries.thalo", Position::new(0, 38), false);
        assert_eq!(files(&refs), vec![("entries.thalo", 8), ("notes.md", 6)]);
        let refs = find_references(&ws, "entries.thalo", Position::new(0, 38), true);
        assert_eq!(
            files(&refs),
            vec![("entries.thalo", 0), ("entries.thalo", 8), ("notes.md", 6)]
        );
    }

    #[test]
    fn test_tag_references() {
        let ws = fixtures::workspace();
        let refs = find_references(&ws, "entries.thalo", Position::new(6, 40), false);
        assert_eq!(files(&refs), vec![("entries.thalo", 0), ("entries.thalo", 6)]);
    }

    #[test]
    fn test_entity_references() {
        let ws = fixtures::workspace();
        let refs = find_references(&ws, "entries.thalo", Position::new(0, 27), false);
        assert_eq!(
            files(&refs),
            vec![
                ("entries.thalo", 0),
                ("entries.thalo", 6),
                ("notes.md", 5),
                ("schema.thalo", 7)
            ]
        );
        let refs = find_references(&ws, "entries.thalo", Position::new(0, 27), true);
        assert_eq!(refs.len(), 5);
    }

    #[test]
    fn test_field_references() {
        let ws = fixtures::workspace();
        let refs = find_references(&ws, "entries.thalo", Position::new(1, 3), true);
        assert_eq!(
            files(&refs),
            vec![("entries.thalo", 1), ("entries.thalo", 7), ("schema.thalo", 2)]
        );
    }
}
