//! Rule engine over a [`Workspace`].
//!
//! Every enabled rule is a set of optional callbacks (see [`RuleVisitor`]). A check pass builds
//! one [`WorkspaceIndex`], runs the `before_check` hooks, walks the workspace entries once while
//! dispatching each entry to the rules interested in its kind, then runs the `after_check` hooks.
//!
//! [`Checker::check_incremental`] reuses the same driver but narrows the traversal using the
//! [`InvalidationResult`] of the edit and each rule's declared [`RuleDependencies`]:
//!
//! - entry-scope rules visit the changed entries only, or the whole edited document when the edit
//!   changed schemas (or links, for rules depending on links);
//! - document-scope rules visit the whole edited document;
//! - workspace-scope rules run only when a dependency they declare was invalidated, and always
//!   when they declare none.
//!
//! Findings the narrowed pass skips are carried forward from the file's previous diagnostics, so
//! an incremental result equals a full check restricted to the edited file.

pub mod diagnostic;
pub mod index;
pub mod rule;
pub mod rules;

use std::collections::BTreeSet;

pub use diagnostic::{sort_diagnostics, Diagnostic, Severity};
pub use index::WorkspaceIndex;
pub use rule::{Rule, RuleContext, RuleDependencies, RuleScope, RuleVisitor};
pub use rules::{builtin_rules, BUILTIN_RULES};

use crate::{
    ast::{Entry, EntryIdentity},
    config::CheckerConfig,
    model::{InvalidationResult, Workspace},
};

/// Which entries a rule visits during one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Selection {
    Everything,
    Document,
    ChangedEntries,
}

struct ActiveRule<'r> {
    rule: &'r Rule,
    severity: Severity,
    selection: Selection,
}

struct Target<'i> {
    file: &'i str,
    changed: &'i BTreeSet<EntryIdentity>,
}

#[derive(Debug, Clone)]
pub struct Checker {
    rules: Vec<Rule>,
    config: CheckerConfig,
}

impl Default for Checker {
    fn default() -> Self {
        Checker::new()
    }
}

impl Checker {
    /// All built-in rules at their default severities.
    pub fn new() -> Self {
        Checker::with_config(CheckerConfig::default())
    }

    pub fn with_config(config: CheckerConfig) -> Self {
        Checker::with_rules(builtin_rules(), config)
    }

    pub fn with_rules(rules: Vec<Rule>, config: CheckerConfig) -> Self {
        Checker { rules, config }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn config(&self) -> &CheckerConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: CheckerConfig) {
        self.config = config;
    }

    /// Configured severity of `rule`. [`Severity::Off`] disables it.
    pub fn severity(&self, rule: &Rule) -> Severity {
        self.config.severity_for(rule.code, rule.default_severity)
    }

    /// Check the whole workspace. Syntax errors come first, then rule findings, all ordered by
    /// file and position.
    #[tracing::instrument(skip_all)]
    pub fn check(&self, workspace: &Workspace) -> Vec<Diagnostic> {
        let mut diagnostics: Vec<Diagnostic> = workspace
            .documents()
            .flat_map(|document| {
                document
                    .syntax_errors()
                    .iter()
                    .map(|error| Diagnostic::from_syntax_error(document.file(), error))
            })
            .collect();

        let active: Vec<ActiveRule> = self
            .rules
            .iter()
            .filter_map(|rule| self.activate(rule, Selection::Everything))
            .collect();
        self.run(workspace, &active, None, &mut diagnostics);

        sort_diagnostics(&mut diagnostics);
        tracing::debug!(
            "[Checker::check] {} rules, {} documents, {} diagnostics",
            active.len(),
            workspace.documents().count(),
            diagnostics.len()
        );
        diagnostics
    }

    /// Re-check `file` after the edit described by `invalidation`.
    ///
    /// `previous` holds the diagnostics last reported for `file`. Rule findings that the narrowed
    /// pass does not recompute are carried forward from it: findings of entry rules on unchanged
    /// entries, and findings of workspace rules the edit could not affect. Carried findings move
    /// with their entry. The result replaces everything previously reported for `file`.
    #[tracing::instrument(skip_all, fields(file = %file))]
    pub fn check_incremental(
        &self,
        workspace: &Workspace,
        file: &str,
        invalidation: &InvalidationResult,
        previous: &[Diagnostic],
    ) -> Vec<Diagnostic> {
        let Some(document) = workspace.get_document(file) else {
            tracing::debug!("[Checker::check_incremental] {} is not in the workspace", file);
            return vec![];
        };
        let mut diagnostics: Vec<Diagnostic> = document
            .syntax_errors()
            .iter()
            .map(|error| Diagnostic::from_syntax_error(file, error))
            .collect();

        let active: Vec<ActiveRule> = self
            .rules
            .iter()
            .filter_map(|rule| {
                let selection = Self::selection(rule, invalidation)?;
                self.activate(rule, selection)
            })
            .collect();
        let target = Target {
            file,
            changed: &invalidation.changed_entries,
        };
        self.run(workspace, &active, Some(&target), &mut diagnostics);
        diagnostics.retain(|d| d.file == file);

        let mut carried = 0;
        for prior in previous.iter().filter(|d| d.file == file && !d.is_syntax()) {
            let Some(rule) = self.rules.iter().find(|r| r.code == prior.code) else {
                continue;
            };
            let severity = self.severity(rule);
            if !severity.is_enabled() {
                continue;
            }
            match Self::selection(rule, invalidation) {
                Some(Selection::Everything | Selection::Document) => continue,
                Some(Selection::ChangedEntries) | None => {}
            }
            let Some(owner) = &prior.owner else {
                continue;
            };
            if invalidation.changed_entries.contains(&owner.identity) {
                continue;
            }
            let Some(entry) = document
                .entries()
                .iter()
                .find(|e| e.identity() == owner.identity)
            else {
                continue;
            };
            if let Some(mut moved) = prior.moved_to(&entry.file_location()) {
                moved.severity = severity;
                diagnostics.push(moved);
                carried += 1;
            }
        }

        sort_diagnostics(&mut diagnostics);
        tracing::debug!(
            "[Checker::check_incremental] re-ran {} of {} rules, carried {} findings, {} diagnostics",
            active.len(),
            self.rules.len(),
            carried,
            diagnostics.len()
        );
        diagnostics
    }

    fn activate<'r>(&self, rule: &'r Rule, selection: Selection) -> Option<ActiveRule<'r>> {
        let severity = self.severity(rule);
        severity.is_enabled().then_some(ActiveRule {
            rule,
            severity,
            selection,
        })
    }

    /// How much of the workspace `rule` must revisit after `invalidation`, if anything.
    fn selection(rule: &Rule, invalidation: &InvalidationResult) -> Option<Selection> {
        let deps = &rule.dependencies;
        match deps.scope {
            RuleScope::Entry => {
                if invalidation.schemas_changed || (deps.links && invalidation.links_changed) {
                    Some(Selection::Document)
                } else {
                    Some(Selection::ChangedEntries)
                }
            }
            RuleScope::Document => Some(Selection::Document),
            RuleScope::Workspace => {
                let declared = deps.schemas || deps.links || deps.entities;
                let invalidated = (deps.schemas && invalidation.schemas_changed)
                    || (deps.links && invalidation.links_changed)
                    || (deps.entities && !invalidation.entities_changed.is_empty());
                (!declared || invalidated).then_some(Selection::Everything)
            }
        }
    }

    fn run<'w>(
        &self,
        workspace: &'w Workspace,
        active: &[ActiveRule],
        target: Option<&Target>,
        diagnostics: &mut Vec<Diagnostic>,
    ) {
        if active.is_empty() {
            return;
        }
        let index = WorkspaceIndex::build(workspace);

        for current in active {
            if let Some(hook) = current.rule.visitor.before_check {
                let mut ctx =
                    RuleContext::new(workspace, &index, current.rule, current.severity, diagnostics);
                hook(&mut ctx);
            }
        }

        let kinds: Vec<_> = active.iter().map(|a| a.rule.visitor.kinds()).collect();
        let whole_workspace = target.is_none()
            || active
                .iter()
                .zip(&kinds)
                .any(|(a, wanted)| a.selection == Selection::Everything && !wanted.is_empty());
        let entries: Box<dyn Iterator<Item = &'w Entry>> = match target {
            Some(target) if !whole_workspace => match workspace.get_document(target.file) {
                Some(document) => Box::new(document.entries().iter()),
                None => Box::new(std::iter::empty()),
            },
            _ => Box::new(workspace.all_entries()),
        };

        for entry in entries {
            let kind = entry.kind();
            let mut identity = None;
            for (current, wanted) in active.iter().zip(&kinds) {
                if !wanted.contains(kind) {
                    continue;
                }
                let selected = match (current.selection, target) {
                    (Selection::Everything, _) | (_, None) => true,
                    (Selection::Document, Some(target)) => entry.file() == target.file,
                    (Selection::ChangedEntries, Some(target)) => {
                        entry.file() == target.file
                            && target
                                .changed
                                .contains(identity.get_or_insert_with(|| entry.identity()))
                    }
                };
                if !selected {
                    continue;
                }
                let mut ctx =
                    RuleContext::new(workspace, &index, current.rule, current.severity, diagnostics);
                dispatch(&mut ctx, &current.rule.visitor, entry);
            }
        }

        for current in active {
            if let Some(hook) = current.rule.visitor.after_check {
                let mut ctx =
                    RuleContext::new(workspace, &index, current.rule, current.severity, diagnostics);
                hook(&mut ctx);
            }
        }
    }
}

fn dispatch<'a, 'w>(ctx: &mut RuleContext<'a, 'w>, visitor: &RuleVisitor, entry: &'w Entry) {
    match entry {
        Entry::Instance(instance) => {
            if let Some(visit) = visitor.visit_instance {
                visit(ctx, instance);
            }
        }
        Entry::Schema(schema) => {
            if let Some(visit) = visitor.visit_schema {
                visit(ctx, schema);
            }
        }
        Entry::Synthesis(synthesis) => {
            if let Some(visit) = visitor.visit_synthesis {
                visit(ctx, synthesis);
            }
        }
        Entry::Actualize(actualize) => {
            if let Some(visit) = visitor.visit_actualize {
                visit(ctx, actualize);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DocumentOptions;

    const SCHEMA: &str = "2026-01-01T00:00Z define-entity lore \"Lore\"\n  # Metadata\n  type: \"fact\" | \"insight\"\n  subject?: link\n  # Sections\n  Content\n";

    fn workspace(files: &[(&str, &str)]) -> Workspace {
        let mut ws = Workspace::new();
        for (file, source) in files {
            ws.add_document(source, DocumentOptions::new(*file));
        }
        ws
    }

    fn codes(diagnostics: &[Diagnostic]) -> Vec<&str> {
        diagnostics.iter().map(|d| d.code.as_str()).collect()
    }

    #[test]
    fn test_clean_workspace() {
        let ws = workspace(&[
            ("schema.thalo", SCHEMA),
            (
                "a.thalo",
                "2026-01-02T00:00Z create lore \"A\" ^a\n  type: \"fact\"\n\n  # Content\n  Body.\n",
            ),
        ]);
        let diagnostics = Checker::new().check(&ws);
        assert!(diagnostics.is_empty(), "{diagnostics:#?}");
    }

    #[test]
    fn test_instance_findings() {
        let ws = workspace(&[
            ("schema.thalo", SCHEMA),
            (
                "a.thalo",
                "2026-01-02T00:00Z create lore \"A\"\n  type: \"opinion\"\n  mood: happy\n  subject: ^nowhere\n\n  # Content\n  x\n\n  # Extra\n  y\n",
            ),
        ]);
        let diagnostics = Checker::new().check(&ws);
        assert_eq!(
            codes(&diagnostics),
            vec!["unknown-section", "invalid-field-type", "unknown-field", "unresolved-link"]
        );
        let field = &diagnostics[2];
        assert_eq!(field.file, "a.thalo");
        assert_eq!(field.location.start.line, 2);
        assert_eq!(field.location.start.column, 2);
    }

    #[test]
    fn test_nested_array_type_through_union() {
        let schema = "2026-01-01T00:00Z define-entity lore \"Lore\"\n  # Metadata\n  type: \"fact\" | \"insight\"\n  refs?: (link[] | string)[]\n  # Sections\n  Content\n";
        let ws = workspace(&[
            ("schema.thalo", schema),
            (
                "a.thalo",
                "2026-01-02T00:00Z create lore \"A\" ^a\n  type: \"fact\"\n  refs: ^a\n\n  # Content\n  x\n",
            ),
        ]);
        let diagnostics = Checker::new().check(&ws);
        // the field type is rejected once, on the schema; values are not judged against it
        assert_eq!(codes(&diagnostics), vec!["invalid-type-expression"]);
        assert_eq!(diagnostics[0].file, "schema.thalo");
        assert_eq!(diagnostics[0].location.start.line, 3);
    }

    #[test]
    fn test_syntax_errors_ignore_configuration() {
        let ws = workspace(&[("a.thalo", "2026-01-02T00:00 create lore \"A\"\n")]);
        let mut config = CheckerConfig::default();
        for rule in BUILTIN_RULES {
            config.set_severity(rule.code, Severity::Off);
        }
        let diagnostics = Checker::with_config(config).check(&ws);
        assert_eq!(codes(&diagnostics), vec!["syntax-missing_timezone"]);
        assert_eq!(diagnostics[0].severity, Severity::Error);
    }

    #[test]
    fn test_severity_override() {
        let ws = workspace(&[("a.thalo", "2026-01-02T00:00Z create lore \"A\"\n")]);
        let mut config = CheckerConfig::default();
        config.set_severity("unknown-entity", Severity::Info);
        let diagnostics = Checker::with_config(config).check(&ws);
        assert_eq!(codes(&diagnostics), vec!["unknown-entity"]);
        assert_eq!(diagnostics[0].severity, Severity::Info);
    }

    #[test]
    fn test_duplicate_link_id_across_files() {
        let ws = workspace(&[
            ("schema.thalo", SCHEMA),
            ("a.thalo", "2026-01-02T00:00Z create lore \"A\" ^shared-id\n  type: \"fact\"\n\n  # Content\n  a\n"),
            ("b.thalo", "2026-01-03T00:00Z create lore \"B\" ^shared-id\n  type: \"fact\"\n\n  # Content\n  b\n"),
        ]);
        let diagnostics = Checker::new().check(&ws);
        let files: Vec<&str> = diagnostics
            .iter()
            .filter(|d| d.code == "duplicate-link-id")
            .map(|d| d.file.as_str())
            .collect();
        assert_eq!(files, vec!["a.thalo", "b.thalo"]);
    }

    #[test]
    fn test_selection() {
        let content_edit = InvalidationResult {
            file: "a.thalo".to_string(),
            changed_entries: [EntryIdentity::Timestamp("2026-01-02T00:00Z".to_string())]
                .into_iter()
                .collect(),
            ..Default::default()
        };
        let pick = |rule: &Rule, inv: &InvalidationResult| Checker::selection(rule, inv);
        assert_eq!(
            pick(&rules::instance::UNKNOWN_FIELD, &content_edit),
            Some(Selection::ChangedEntries)
        );
        assert_eq!(
            pick(&rules::identity::DUPLICATE_TIMESTAMP, &content_edit),
            Some(Selection::Document)
        );
        assert_eq!(pick(&rules::identity::DUPLICATE_LINK_ID, &content_edit), None);
        assert_eq!(pick(&rules::schema::ALTER_BEFORE_DEFINE, &content_edit), None);

        let link_edit = InvalidationResult {
            links_changed: true,
            ..content_edit.clone()
        };
        assert_eq!(
            pick(&rules::metadata::UNRESOLVED_LINK, &link_edit),
            Some(Selection::Document)
        );
        assert_eq!(
            pick(&rules::identity::DUPLICATE_LINK_ID, &link_edit),
            Some(Selection::Everything)
        );
        assert_eq!(pick(&rules::schema::ALTER_BEFORE_DEFINE, &link_edit), None);
    }

    fn findings_for(checker: &Checker, ws: &Workspace, file: &str) -> Vec<Diagnostic> {
        checker
            .check(ws)
            .into_iter()
            .filter(|d| d.file == file)
            .collect()
    }

    #[test]
    fn test_incremental_matches_full_check_for_entry_edit() {
        let mut ws = workspace(&[
            ("schema.thalo", SCHEMA),
            (
                "a.thalo",
                "2026-01-02T00:00Z create lore \"A\"\n  type: \"fact\"\n\n  # Content\n  x\n",
            ),
        ]);
        let checker = Checker::new();
        let before = findings_for(&checker, &ws, "a.thalo");
        let invalidation = ws.add_document(
            "2026-01-02T00:00Z create lore \"A\"\n  type: \"rumor\"\n\n  # Content\n  x\n",
            DocumentOptions::new("a.thalo"),
        );
        assert!(!invalidation.schemas_changed && !invalidation.links_changed);

        let incremental = checker.check_incremental(&ws, "a.thalo", &invalidation, &before);
        assert_eq!(incremental, findings_for(&checker, &ws, "a.thalo"));
        assert_eq!(codes(&incremental), vec!["invalid-field-type"]);
    }

    #[test]
    fn test_incremental_keeps_findings_on_untouched_entries() {
        let first = "2026-01-02T00:00Z create lore \"A\"\n  type: \"fact\"\n  bogus: 1\n\n  # Content\n  a\n\n";
        let mut ws = workspace(&[
            ("schema.thalo", SCHEMA),
            ("a.thalo", format!("{first}2026-01-03T00:00Z create lore \"B\"\n  type: \"fact\"\n\n  # Content\n  b\n").as_str()),
        ]);
        let checker = Checker::new();
        let before = findings_for(&checker, &ws, "a.thalo");
        assert_eq!(codes(&before), vec!["unknown-field"]);

        // B grows, A is untouched
        let invalidation = ws.add_document(
            &format!("{first}2026-01-03T00:00Z create lore \"B\"\n  type: \"fact\"\n\n  # Content\n  b\n  more b\n"),
            DocumentOptions::new("a.thalo"),
        );
        assert_eq!(invalidation.changed_entries.len(), 1);

        let incremental = checker.check_incremental(&ws, "a.thalo", &invalidation, &before);
        assert_eq!(incremental, findings_for(&checker, &ws, "a.thalo"));
        assert_eq!(codes(&incremental), vec!["unknown-field"]);
    }

    #[test]
    fn test_incremental_moves_carried_findings_with_their_entry() {
        let shared = "2026-01-05T00:00Z create lore \"Shared\" ^shared-id\n  type: \"fact\"\n\n  # Content\n  s\n";
        let mut ws = workspace(&[
            ("schema.thalo", SCHEMA),
            (
                "a.thalo",
                format!("2026-01-02T00:00Z create lore \"A\"\n  type: \"fact\"\n\n  # Content\n  a\n\n{shared}").as_str(),
            ),
            ("b.thalo", shared),
        ]);
        let checker = Checker::new();
        let before = findings_for(&checker, &ws, "a.thalo");
        assert_eq!(codes(&before), vec!["duplicate-link-id"]);
        assert_eq!(before[0].location.start.line, 6);

        // the first entry grows by two lines, pushing ^shared-id down
        let invalidation = ws.add_document(
            &format!("2026-01-02T00:00Z create lore \"A\"\n  type: \"fact\"\n\n  # Content\n  a\n  a\n  a\n\n{shared}"),
            DocumentOptions::new("a.thalo"),
        );
        assert!(!invalidation.links_changed);
        assert_eq!(
            Checker::selection(&rules::identity::DUPLICATE_LINK_ID, &invalidation),
            None
        );

        let incremental = checker.check_incremental(&ws, "a.thalo", &invalidation, &before);
        assert_eq!(incremental, findings_for(&checker, &ws, "a.thalo"));
        assert_eq!(incremental[0].location.start.line, 8);
    }

    #[test]
    fn test_incremental_drops_findings_of_disabled_rules() {
        let source = "2026-01-02T00:00Z create lore \"A\"\n  type: \"fact\"\n  bogus: 1\n\n  # Content\n  a\n\n2026-01-03T00:00Z create lore \"B\"\n  type: \"fact\"\n\n  # Content\n  b\n";
        let mut ws = workspace(&[("schema.thalo", SCHEMA), ("a.thalo", source)]);
        let before = findings_for(&Checker::new(), &ws, "a.thalo");
        let invalidation = ws.add_document(
            &source.replace("  b\n", "  b!\n"),
            DocumentOptions::new("a.thalo"),
        );

        let mut config = CheckerConfig::default();
        config.set_severity("unknown-field", Severity::Off);
        let checker = Checker::with_config(config);
        assert!(checker
            .check_incremental(&ws, "a.thalo", &invalidation, &before)
            .is_empty());
    }

    #[test]
    fn test_incremental_unknown_file() {
        let ws = Workspace::new();
        let result = Checker::new().check_incremental(&ws, "nope.thalo", &InvalidationResult::default(), &[]);
        assert!(result.is_empty());
    }
}
