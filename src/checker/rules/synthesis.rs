//! Synthesis definitions and their actualize checkpoints.

use serde_json::json;

use crate::{
    ast::{ActualizeEntry, Entry, SynthesisEntry},
    change_tracker::ChangeMarker,
    checker::{
        diagnostic::Severity,
        rule::{Rule, RuleContext, RuleDependencies, RuleVisitor},
    },
};

pub const SYNTHESIS_MISSING_SOURCES: Rule = Rule {
    code: "synthesis-missing-sources",
    name: "Synthesis without sources",
    description: "define-synthesis needs a `sources:` metadata value with at least one query",
    default_severity: Severity::Error,
    dependencies: RuleDependencies::entry(),
    visitor: RuleVisitor {
        visit_synthesis: Some(check_missing_sources),
        ..RuleVisitor::EMPTY
    },
};

fn check_missing_sources(ctx: &mut RuleContext<'_, '_>, entry: &SynthesisEntry) {
    if entry.sources.is_empty() {
        ctx.report(
            &entry.header,
            &entry.header.header_location,
            format!("Synthesis '{}' has no source queries", entry.title),
        );
    }
}

pub const SYNTHESIS_MISSING_PROMPT: Rule = Rule {
    code: "synthesis-missing-prompt",
    name: "Synthesis without prompt",
    description: "define-synthesis should carry its instructions under a `# Prompt` heading",
    default_severity: Severity::Warning,
    dependencies: RuleDependencies::entry(),
    visitor: RuleVisitor {
        visit_synthesis: Some(check_missing_prompt),
        ..RuleVisitor::EMPTY
    },
};

fn check_missing_prompt(ctx: &mut RuleContext<'_, '_>, entry: &SynthesisEntry) {
    if entry.prompt.is_none() {
        ctx.report(
            &entry.header,
            &entry.header.header_location,
            format!("Synthesis '{}' has no `# Prompt` section", entry.title),
        );
    }
}

pub const SYNTHESIS_UNKNOWN_QUERY_ENTITY: Rule = Rule {
    code: "synthesis-unknown-query-entity",
    name: "Unknown entity in source query",
    description: "Source queries should select an entity defined with define-entity",
    default_severity: Severity::Warning,
    dependencies: RuleDependencies::entry().with_schemas(),
    visitor: RuleVisitor {
        visit_synthesis: Some(check_query_entities),
        ..RuleVisitor::EMPTY
    },
};

fn check_query_entities(ctx: &mut RuleContext<'_, '_>, entry: &SynthesisEntry) {
    let Some(sources) = crate::ast::metadata_value(&entry.metadata, "sources") else {
        return;
    };
    let registry = ctx.workspace.schema_registry();
    let unknown: Vec<&str> = entry
        .sources
        .iter()
        .filter(|q| !registry.has(&q.entity))
        .map(|q| q.entity.as_str())
        .collect();
    for entity in unknown {
        ctx.report_with(
            &entry.header,
            &sources.value.location,
            format!("Source query selects unknown entity '{entity}'"),
            Some(json!({ "entity": entity })),
        );
    }
}

pub const ACTUALIZE_UNRESOLVED_TARGET: Rule = Rule {
    code: "actualize-unresolved-target",
    name: "Unresolved actualize target",
    description: "actualize-synthesis must target the ^link-id of a define-synthesis entry",
    default_severity: Severity::Error,
    dependencies: RuleDependencies::entry().with_links(),
    visitor: RuleVisitor {
        visit_actualize: Some(check_actualize_target),
        ..RuleVisitor::EMPTY
    },
};

fn check_actualize_target(ctx: &mut RuleContext<'_, '_>, entry: &ActualizeEntry) {
    let message = match ctx.workspace.get_link_entry(&entry.target) {
        Some(Entry::Synthesis(_)) => return,
        Some(other) => format!(
            "'{}' refers to {}, not a synthesis",
            entry.target,
            other.summary()
        ),
        None => format!("Unresolved synthesis '{}'", entry.target),
    };
    ctx.report_with(
        &entry.header,
        &entry.target_location,
        message,
        Some(json!({ "link_id": entry.target.as_str() })),
    );
}

pub const ACTUALIZE_MISSING_UPDATED: Rule = Rule {
    code: "actualize-missing-updated",
    name: "Actualize without checkpoint",
    description: "actualize-synthesis must record its checkpoint in `updated:`",
    default_severity: Severity::Error,
    dependencies: RuleDependencies::entry(),
    visitor: RuleVisitor {
        visit_actualize: Some(check_missing_updated),
        ..RuleVisitor::EMPTY
    },
};

fn check_missing_updated(ctx: &mut RuleContext<'_, '_>, entry: &ActualizeEntry) {
    if entry.updated.as_deref().map(str::is_empty).unwrap_or(true) {
        ctx.report(
            &entry.header,
            &entry.header.header_location,
            format!("actualize-synthesis {} has no `updated:` checkpoint", entry.target),
        );
    }
}

pub const INVALID_CHECKPOINT: Rule = Rule {
    code: "invalid-checkpoint",
    name: "Invalid checkpoint",
    description: "`updated:` must be `git:<commit>` or `ts:<ISO-8601 timestamp>`",
    default_severity: Severity::Warning,
    dependencies: RuleDependencies::entry(),
    visitor: RuleVisitor {
        visit_actualize: Some(check_checkpoint),
        ..RuleVisitor::EMPTY
    },
};

fn check_checkpoint(ctx: &mut RuleContext<'_, '_>, entry: &ActualizeEntry) {
    let Some(updated) = entry.updated.as_deref().filter(|u| !u.is_empty()) else {
        return;
    };
    if let Err(err) = updated.parse::<ChangeMarker>() {
        let location = crate::ast::metadata_value(&entry.metadata, "updated")
            .map(|m| m.value.location.clone())
            .unwrap_or_else(|| entry.header.header_location.clone());
        ctx.report_with(
            &entry.header,
            &location,
            err.to_string(),
            Some(json!({ "updated": updated })),
        );
    }
}
