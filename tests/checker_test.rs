//! End-to-end checker tests over multi-file workspaces.

mod common;

use common::{init_logging, LORE_SCHEMA};
use std::sync::atomic::{AtomicUsize, Ordering};
use test_log::test;
use thalo_core::{
    ast::InstanceEntry,
    checker::{Checker, Diagnostic, Rule, RuleContext, RuleDependencies, RuleVisitor, Severity},
    config::CheckerConfig,
    model::{DocumentOptions, Workspace},
};

fn workspace(files: &[(&str, &str)]) -> Workspace {
    let mut ws = Workspace::new();
    for (file, source) in files {
        ws.add_document(source, DocumentOptions::new(*file));
    }
    ws
}

fn codes(diagnostics: &[Diagnostic]) -> Vec<(&str, &str)> {
    diagnostics
        .iter()
        .map(|d| (d.file.as_str(), d.code.as_str()))
        .collect()
}

const ADA: &str = r#"2026-01-05T00:00Z create lore "Ada" ^ada
  type: "fact"
  source: "book"

  # Content
  Mathematician.
"#;

const ALTER_SOURCE: &str = r#"2026-01-02T00:00Z alter-entity lore "Add source"
  # Metadata
  source?: string
"#;

#[test]
fn test_alter_entity_extends_instances() {
    init_logging();
    let checker = Checker::new();

    let ws = workspace(&[("schema.thalo", LORE_SCHEMA), ("a.thalo", ADA)]);
    assert_eq!(
        codes(&checker.check(&ws)),
        vec![("a.thalo", "unknown-field")]
    );

    let ws = workspace(&[
        ("schema.thalo", LORE_SCHEMA),
        ("alter.thalo", ALTER_SOURCE),
        ("a.thalo", ADA),
    ]);
    assert!(checker.check(&ws).is_empty());
}

#[test]
fn test_duplicate_link_id_reported_in_both_files() {
    let other = r#"2026-01-07T00:00Z create lore "Also Ada" ^ada
  type: "insight"

  # Content
  Duplicate.
"#;
    let ws = workspace(&[
        ("schema.thalo", LORE_SCHEMA),
        ("alter.thalo", ALTER_SOURCE),
        ("a.thalo", ADA),
        ("b.thalo", other),
    ]);
    let diagnostics = Checker::new().check(&ws);
    assert_eq!(
        codes(&diagnostics),
        vec![("a.thalo", "duplicate-link-id"), ("b.thalo", "duplicate-link-id")]
    );
    assert!(diagnostics.iter().all(|d| d.severity == Severity::Error));

    let mut config = CheckerConfig::default();
    config.set_severity("duplicate-link-id", Severity::Off);
    assert!(Checker::with_config(config).check(&ws).is_empty());
}

#[test]
fn test_incremental_matches_full_check_after_schema_edit() {
    init_logging();
    let other = r#"2026-01-06T00:00Z create lore "Other"
  type: "insight"

  # Content
  Text.
"#;
    let mut ws = workspace(&[
        ("schema.thalo", LORE_SCHEMA),
        ("alter.thalo", ALTER_SOURCE),
        ("a.thalo", ADA),
        ("b.thalo", other),
    ]);
    let checker = Checker::new();
    let before = checker.check(&ws);
    assert!(before.is_empty());

    // `source` becomes required: b.thalo is now missing it
    let invalidation = ws.add_document(
        "2026-01-02T00:00Z alter-entity lore \"Add source\"\n  # Metadata\n  source: string\n",
        DocumentOptions::new("alter.thalo"),
    );
    assert!(invalidation.schemas_changed);
    assert!(invalidation.entities_changed.contains("lore"));

    let full = checker.check(&ws);
    assert_eq!(codes(&full), vec![("b.thalo", "missing-required-field")]);
    for file in ["schema.thalo", "alter.thalo", "a.thalo", "b.thalo"] {
        let expected: Vec<Diagnostic> = full.iter().filter(|d| d.file == file).cloned().collect();
        assert_eq!(
            checker.check_incremental(&ws, file, &invalidation, &before),
            expected,
            "{file}"
        );
    }
}

#[test]
fn test_syntax_errors_in_markdown_blocks_are_file_absolute() {
    let md = "# Title\n\n```thalo\n2026-01-05T00:00 create lore \"No zone\"\n  type: \"fact\"\n```\n";
    let ws = workspace(&[("schema.thalo", LORE_SCHEMA), ("notes.md", md)]);
    let diagnostics = Checker::new().check(&ws);
    let syntax: Vec<&Diagnostic> = diagnostics.iter().filter(|d| d.is_syntax()).collect();
    assert_eq!(syntax.len(), 1);
    assert_eq!(syntax[0].file, "notes.md");
    assert_eq!(syntax[0].location.start.line, 3);
}

fn lore(timestamp: &str, title: &str, extra: &str, text: &str) -> String {
    format!("{timestamp} create lore \"{title}\"\n  type: \"fact\"\n{extra}\n  # Content\n  {text}\n")
}

#[test]
fn test_incremental_content_edit_keeps_other_entries_findings() {
    let mut ws = workspace(&[("schema.thalo", LORE_SCHEMA)]);
    let first = lore("2026-01-02T00:00Z", "A", "  bogus: 1\n  subject: ^nowhere\n", "a");
    let second = |text: &str| lore("2026-01-03T00:00Z", "B", "", text);
    ws.add_document(
        &format!("{first}\n{}", second("b")),
        DocumentOptions::new("a.thalo"),
    );
    let checker = Checker::new();
    let before: Vec<Diagnostic> = checker.check(&ws);
    assert_eq!(
        codes(&before),
        vec![("a.thalo", "unknown-field"), ("a.thalo", "unresolved-link")]
    );

    let invalidation = ws.add_document(
        &format!("{first}\n{}", second("b, rewritten")),
        DocumentOptions::new("a.thalo"),
    );
    assert_eq!(invalidation.changed_entries.len(), 1);
    assert!(!invalidation.links_changed && !invalidation.schemas_changed);

    let incremental = checker.check_incremental(&ws, "a.thalo", &invalidation, &before);
    let full: Vec<Diagnostic> = checker.check(&ws);
    assert_eq!(incremental, full);
}

static WORKSPACE_PASSES: AtomicUsize = AtomicUsize::new(0);
static INSTANCE_VISITS: AtomicUsize = AtomicUsize::new(0);

fn count_pass(_: &mut RuleContext<'_, '_>) {
    WORKSPACE_PASSES.fetch_add(1, Ordering::SeqCst);
}

fn count_visit(_: &mut RuleContext<'_, '_>, _: &InstanceEntry) {
    INSTANCE_VISITS.fetch_add(1, Ordering::SeqCst);
}

const COUNT_PASSES: Rule = Rule {
    code: "count-passes",
    name: "Count passes",
    description: "Counts workspace passes",
    default_severity: Severity::Info,
    dependencies: RuleDependencies::workspace().with_links().with_schemas(),
    visitor: RuleVisitor {
        after_check: Some(count_pass),
        ..RuleVisitor::EMPTY
    },
};

const COUNT_VISITS: Rule = Rule {
    code: "count-visits",
    name: "Count visits",
    description: "Counts instance visits",
    default_severity: Severity::Info,
    dependencies: RuleDependencies::entry(),
    visitor: RuleVisitor {
        visit_instance: Some(count_visit),
        ..RuleVisitor::EMPTY
    },
};

#[test]
fn test_instance_edit_does_not_rerun_workspace_rules() {
    let mut ws = workspace(&[
        ("schema.thalo", LORE_SCHEMA),
        ("b.thalo", lore("2026-01-04T00:00Z", "C", "", "c").as_str()),
    ]);
    ws.add_document(
        &format!(
            "{}\n{}",
            lore("2026-01-02T00:00Z", "A", "", "a"),
            lore("2026-01-03T00:00Z", "B", "", "b")
        ),
        DocumentOptions::new("a.thalo"),
    );
    let checker = Checker::with_rules(vec![COUNT_PASSES, COUNT_VISITS], CheckerConfig::default());
    checker.check(&ws);
    assert_eq!(WORKSPACE_PASSES.load(Ordering::SeqCst), 1);
    assert_eq!(INSTANCE_VISITS.load(Ordering::SeqCst), 3);

    let invalidation = ws.add_document(
        &format!(
            "{}\n{}",
            lore("2026-01-02T00:00Z", "A", "", "a"),
            lore("2026-01-03T00:00Z", "B", "", "b, edited")
        ),
        DocumentOptions::new("a.thalo"),
    );
    assert!(!invalidation.schemas_changed);
    assert!(!invalidation.links_changed);
    assert!(!invalidation.tags_changed);
    assert!(invalidation.entities_changed.is_empty());

    checker.check_incremental(&ws, "a.thalo", &invalidation, &[]);
    assert_eq!(WORKSPACE_PASSES.load(Ordering::SeqCst), 1);
    assert_eq!(INSTANCE_VISITS.load(Ordering::SeqCst), 4);

    // a new link reference does invalidate it
    let invalidation = ws.add_document(
        &format!(
            "{}\n{}",
            lore("2026-01-02T00:00Z", "A", "", "a"),
            lore("2026-01-03T00:00Z", "B", "  subject: ^c\n", "b, edited")
        ),
        DocumentOptions::new("a.thalo"),
    );
    assert!(invalidation.links_changed);
    checker.check_incremental(&ws, "a.thalo", &invalidation, &[]);
    assert_eq!(WORKSPACE_PASSES.load(Ordering::SeqCst), 2);
}
