use enumset::EnumSet;
use serde::{Deserialize, Serialize};

use super::{
    diagnostic::{Diagnostic, DiagnosticOwner, Severity},
    index::WorkspaceIndex,
};
use crate::{
    ast::{ActualizeEntry, EntryHeader, EntryKind, InstanceEntry, SchemaEntry, SynthesisEntry},
    model::Workspace,
    source_map::Location,
};

/// Granularity at which a rule must be re-run after an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleScope {
    /// Findings depend only on the visited entry (plus the declared global indices).
    Entry,
    /// Findings depend on the other entries of the same file.
    Document,
    /// Findings depend on entries across files.
    Workspace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleDependencies {
    pub scope: RuleScope,
    pub schemas: bool,
    pub links: bool,
    pub entities: bool,
}

impl RuleDependencies {
    pub const fn entry() -> Self {
        RuleDependencies {
            scope: RuleScope::Entry,
            schemas: false,
            links: false,
            entities: false,
        }
    }

    pub const fn document() -> Self {
        RuleDependencies {
            scope: RuleScope::Document,
            ..RuleDependencies::entry()
        }
    }

    pub const fn workspace() -> Self {
        RuleDependencies {
            scope: RuleScope::Workspace,
            ..RuleDependencies::entry()
        }
    }

    pub const fn with_schemas(mut self) -> Self {
        self.schemas = true;
        self
    }

    pub const fn with_links(mut self) -> Self {
        self.links = true;
        self
    }
}

/// State handed to rule callbacks. Findings are reported against the rule's code with its
/// configured severity.
pub struct RuleContext<'a, 'w> {
    pub workspace: &'w Workspace,
    pub index: &'a WorkspaceIndex<'w>,
    code: &'static str,
    severity: Severity,
    diagnostics: &'a mut Vec<Diagnostic>,
}

impl<'a, 'w> RuleContext<'a, 'w> {
    pub(crate) fn new(
        workspace: &'w Workspace,
        index: &'a WorkspaceIndex<'w>,
        rule: &Rule,
        severity: Severity,
        diagnostics: &'a mut Vec<Diagnostic>,
    ) -> Self {
        RuleContext {
            workspace,
            index,
            code: rule.code,
            severity,
            diagnostics,
        }
    }

    /// Report at a block-relative `location` inside the entry owning `header`.
    pub fn report<S: Into<String>>(&mut self, header: &EntryHeader, location: &Location, message: S) {
        self.report_with(header, location, message, None);
    }

    pub fn report_with<S: Into<String>>(
        &mut self,
        header: &EntryHeader,
        location: &Location,
        message: S,
        data: Option<serde_json::Value>,
    ) {
        self.diagnostics.push(Diagnostic {
            code: self.code.to_string(),
            severity: self.severity,
            message: message.into(),
            file: header.file.clone(),
            location: header.to_file(location),
            data,
            owner: Some(DiagnosticOwner {
                identity: header.identity(),
                entry_location: header.file_location(),
            }),
        });
    }
}

pub type Hook = for<'a, 'w> fn(&mut RuleContext<'a, 'w>);
pub type InstanceVisitor = for<'a, 'w> fn(&mut RuleContext<'a, 'w>, &'w InstanceEntry);
pub type SchemaVisitor = for<'a, 'w> fn(&mut RuleContext<'a, 'w>, &'w SchemaEntry);
pub type SynthesisVisitor = for<'a, 'w> fn(&mut RuleContext<'a, 'w>, &'w SynthesisEntry);
pub type ActualizeVisitor = for<'a, 'w> fn(&mut RuleContext<'a, 'w>, &'w ActualizeEntry);

/// The callbacks a rule implements. Unset callbacks are skipped by the driver.
#[derive(Clone, Copy)]
pub struct RuleVisitor {
    pub before_check: Option<Hook>,
    pub visit_instance: Option<InstanceVisitor>,
    pub visit_schema: Option<SchemaVisitor>,
    pub visit_synthesis: Option<SynthesisVisitor>,
    pub visit_actualize: Option<ActualizeVisitor>,
    pub after_check: Option<Hook>,
}

impl RuleVisitor {
    pub const EMPTY: RuleVisitor = RuleVisitor {
        before_check: None,
        visit_instance: None,
        visit_schema: None,
        visit_synthesis: None,
        visit_actualize: None,
        after_check: None,
    };

    /// Entry kinds this visitor wants to see.
    pub fn kinds(&self) -> EnumSet<EntryKind> {
        let mut kinds = EnumSet::empty();
        if self.visit_instance.is_some() {
            kinds |= EntryKind::Instance;
        }
        if self.visit_schema.is_some() {
            kinds |= EntryKind::Schema;
        }
        if self.visit_synthesis.is_some() {
            kinds |= EntryKind::Synthesis;
        }
        if self.visit_actualize.is_some() {
            kinds |= EntryKind::Actualize;
        }
        kinds
    }
}

#[derive(Clone, Copy)]
pub struct Rule {
    pub code: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub default_severity: Severity,
    pub dependencies: RuleDependencies,
    pub visitor: RuleVisitor,
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("code", &self.code)
            .field("default_severity", &self.default_severity)
            .field("dependencies", &self.dependencies)
            .finish()
    }
}
