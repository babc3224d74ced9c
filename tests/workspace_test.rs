//! Workspace loading and cross-file model tests.

mod common;

use common::{write_files, LORE_SCHEMA};
use tempfile::TempDir;
use test_log::test;
use thalo_core::{
    ast::LinkId,
    model::{DocumentOptions, Workspace},
};

const ENTRIES: &str = r#"2026-01-05T00:00Z create lore "Ada" ^ada #people
  type: "fact"

  # Content
  Mathematician.
"#;

const NOTES: &str = r#"# Notes

Some prose mentioning ^ada.

```thalo
2026-01-06T00:00Z create lore "Note" #people
  type: "insight"
  subject: ^ada

  # Content
  See above.
```
"#;

#[test]
fn test_load_directory() {
    let temp = TempDir::new().unwrap();
    let root = write_files(
        &temp,
        &[
            ("schema.thalo", LORE_SCHEMA),
            ("a.thalo", ENTRIES),
            ("sub/notes.md", NOTES),
            (".hidden/ignored.thalo", ENTRIES),
            ("readme.txt", "not thalo"),
        ],
    );

    let mut ws = Workspace::new();
    let added = ws.load_directory(&root).unwrap();
    assert_eq!(added, vec!["a.thalo", "schema.thalo", "sub/notes.md"]);
    assert_eq!(ws.all_entries().count(), 3);
    assert!(ws.schema_registry().has("lore"));

    let ada = LinkId::new("ada");
    assert_eq!(ws.get_link_definition(&ada).unwrap().file, "a.thalo");
    // the prose mention is outside the fence
    let referencing: Vec<&str> = ws
        .get_link_references(&ada)
        .iter()
        .map(|r| r.file.as_str())
        .collect();
    assert_eq!(referencing, vec!["sub/notes.md"]);
}

#[test]
fn test_re_adding_identical_source_invalidates_nothing() {
    let mut ws = Workspace::new();
    ws.add_document(LORE_SCHEMA, DocumentOptions::new("schema.thalo"));
    let first = ws.add_document(ENTRIES, DocumentOptions::new("a.thalo"));
    assert!(!first.is_empty());
    assert!(first.links_changed);

    let again = ws.add_document(ENTRIES, DocumentOptions::new("a.thalo"));
    assert!(again.is_empty(), "{again:?}");
    assert_eq!(ws.all_entries().count(), 2);
}

#[test]
fn test_schema_fold_ignores_insertion_order() {
    let alter = r#"2026-01-02T00:00Z alter-entity lore "Add source"
  # Metadata
  source?: string
"#;
    let mut forward = Workspace::new();
    forward.add_document(LORE_SCHEMA, DocumentOptions::new("schema.thalo"));
    forward.add_document(alter, DocumentOptions::new("alter.thalo"));

    let mut backward = Workspace::new();
    backward.add_document(alter, DocumentOptions::new("alter.thalo"));
    backward.add_document(LORE_SCHEMA, DocumentOptions::new("schema.thalo"));

    let a = forward.schema_registry().get("lore").unwrap();
    let b = backward.schema_registry().get("lore").unwrap();
    let names = |fields: &[thalo_core::ast::FieldDefinition]| -> Vec<String> {
        fields.iter().map(|f| f.name.clone()).collect()
    };
    assert_eq!(names(&a.fields), vec!["type", "subject", "source"]);
    assert_eq!(names(&a.fields), names(&b.fields));
    assert_eq!(a.altered_by, b.altered_by);
    assert_eq!(a.defined_by.file, "schema.thalo");
}

#[test]
fn test_link_index_follows_documents() {
    let mut ws = Workspace::new();
    ws.add_document(LORE_SCHEMA, DocumentOptions::new("schema.thalo"));
    ws.add_document(ENTRIES, DocumentOptions::new("a.thalo"));
    ws.add_document(NOTES, DocumentOptions::new("notes.md"));

    let ada = LinkId::new("ada");
    let entry = ws.get_link_entry(&ada).unwrap();
    assert_eq!(entry.title(), "Ada");
    assert_eq!(entry.link_id(), Some(&ada));

    let removed = ws.remove_document("a.thalo");
    assert!(removed.links_changed);
    assert!(ws.get_link_entry(&ada).is_none());
    // references survive their target
    assert_eq!(ws.get_link_references(&ada).len(), 1);
    assert_eq!(ws.get_link_references(&ada)[0].file, "notes.md");
}
