//! Schema-independent checks on metadata values.

use serde_json::json;
use std::collections::HashSet;

use crate::{
    ast::{
        value::date_bound_start, ActualizeEntry, EntryHeader, InstanceEntry, Metadata,
        SynthesisEntry, ValueContent,
    },
    checker::{
        diagnostic::Severity,
        rule::{Rule, RuleContext, RuleDependencies, RuleVisitor},
    },
};

pub const DUPLICATE_METADATA_KEY: Rule = Rule {
    code: "duplicate-metadata-key",
    name: "Duplicate metadata key",
    description: "A metadata key should appear at most once per entry; the last value wins",
    default_severity: Severity::Warning,
    dependencies: RuleDependencies::entry(),
    visitor: RuleVisitor {
        visit_instance: Some(duplicate_keys_in_instance),
        visit_synthesis: Some(duplicate_keys_in_synthesis),
        visit_actualize: Some(duplicate_keys_in_actualize),
        ..RuleVisitor::EMPTY
    },
};

fn duplicate_keys(ctx: &mut RuleContext<'_, '_>, header: &EntryHeader, metadata: &[Metadata]) {
    let mut seen = HashSet::new();
    for m in metadata {
        if !seen.insert(m.key.as_str()) {
            ctx.report_with(
                header,
                &m.key_location,
                format!("Duplicate metadata key '{}'", m.key),
                Some(json!({ "key": m.key })),
            );
        }
    }
}

fn duplicate_keys_in_instance(ctx: &mut RuleContext<'_, '_>, entry: &InstanceEntry) {
    duplicate_keys(ctx, &entry.header, &entry.metadata);
}

fn duplicate_keys_in_synthesis(ctx: &mut RuleContext<'_, '_>, entry: &SynthesisEntry) {
    duplicate_keys(ctx, &entry.header, &entry.metadata);
}

fn duplicate_keys_in_actualize(ctx: &mut RuleContext<'_, '_>, entry: &ActualizeEntry) {
    duplicate_keys(ctx, &entry.header, &entry.metadata);
}

pub const INVALID_DATE_RANGE: Rule = Rule {
    code: "invalid-date-range",
    name: "Invalid date range",
    description: "Date ranges must use real dates and must not end before they start",
    default_severity: Severity::Error,
    dependencies: RuleDependencies::entry(),
    visitor: RuleVisitor {
        visit_instance: Some(date_ranges_in_instance),
        visit_synthesis: Some(date_ranges_in_synthesis),
        visit_actualize: Some(date_ranges_in_actualize),
        ..RuleVisitor::EMPTY
    },
};

fn date_ranges(ctx: &mut RuleContext<'_, '_>, header: &EntryHeader, metadata: &[Metadata]) {
    for m in metadata {
        for scalar in m.value.content.scalars() {
            let ValueContent::DateRange { start, end } = scalar else {
                continue;
            };
            let message = match (date_bound_start(start), date_bound_start(end)) {
                (Some(from), Some(to)) if from > to => {
                    format!("Date range '{start} ~ {end}' ends before it starts")
                }
                (Some(_), Some(_)) => continue,
                _ => format!("Date range '{start} ~ {end}' contains an invalid date"),
            };
            ctx.report_with(
                header,
                &m.value.location,
                message,
                Some(json!({ "start": start, "end": end })),
            );
        }
    }
}

fn date_ranges_in_instance(ctx: &mut RuleContext<'_, '_>, entry: &InstanceEntry) {
    date_ranges(ctx, &entry.header, &entry.metadata);
}

fn date_ranges_in_synthesis(ctx: &mut RuleContext<'_, '_>, entry: &SynthesisEntry) {
    date_ranges(ctx, &entry.header, &entry.metadata);
}

fn date_ranges_in_actualize(ctx: &mut RuleContext<'_, '_>, entry: &ActualizeEntry) {
    date_ranges(ctx, &entry.header, &entry.metadata);
}

pub const UNRESOLVED_LINK: Rule = Rule {
    code: "unresolved-link",
    name: "Unresolved link",
    description: "Links in metadata and source queries should point at a declared ^link-id",
    default_severity: Severity::Warning,
    dependencies: RuleDependencies::entry().with_links(),
    visitor: RuleVisitor {
        visit_instance: Some(unresolved_in_instance),
        visit_synthesis: Some(unresolved_in_synthesis),
        visit_actualize: Some(unresolved_in_actualize),
        ..RuleVisitor::EMPTY
    },
};

fn unresolved_links(ctx: &mut RuleContext<'_, '_>, header: &EntryHeader, metadata: &[Metadata]) {
    for m in metadata {
        for link in m.value.links() {
            if ctx.workspace.link_index().is_defined(link) {
                continue;
            }
            ctx.report_with(
                header,
                &m.value.location,
                format!("Unresolved link '{link}'"),
                Some(json!({ "link_id": link.as_str() })),
            );
        }
    }
}

fn unresolved_in_instance(ctx: &mut RuleContext<'_, '_>, entry: &InstanceEntry) {
    unresolved_links(ctx, &entry.header, &entry.metadata);
}

fn unresolved_in_synthesis(ctx: &mut RuleContext<'_, '_>, entry: &SynthesisEntry) {
    unresolved_links(ctx, &entry.header, &entry.metadata);
}

// the target itself is covered by actualize-unresolved-target
fn unresolved_in_actualize(ctx: &mut RuleContext<'_, '_>, entry: &ActualizeEntry) {
    unresolved_links(ctx, &entry.header, &entry.metadata);
}
