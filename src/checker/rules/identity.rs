//! Identity collisions: timestamps within a file, link ids across files.

use serde_json::json;

use crate::{
    ast::{ActualizeEntry, Entry, EntryHeader, InstanceEntry, SchemaEntry, SynthesisEntry},
    checker::{
        diagnostic::Severity,
        rule::{Rule, RuleContext, RuleDependencies, RuleVisitor},
    },
};

pub const DUPLICATE_TIMESTAMP: Rule = Rule {
    code: "duplicate-timestamp",
    name: "Duplicate timestamp",
    description: "Entries without a ^link-id are identified by timestamp, which should be unique per file",
    default_severity: Severity::Warning,
    dependencies: RuleDependencies::document(),
    visitor: RuleVisitor {
        visit_instance: Some(timestamp_in_instance),
        visit_schema: Some(timestamp_in_schema),
        visit_synthesis: Some(timestamp_in_synthesis),
        visit_actualize: Some(timestamp_in_actualize),
        ..RuleVisitor::EMPTY
    },
};

fn duplicate_timestamp(ctx: &mut RuleContext<'_, '_>, header: &EntryHeader) {
    let key = (header.file.as_str(), header.timestamp.raw());
    let Some(first) = ctx
        .index
        .by_file_timestamp
        .get(&key)
        .filter(|entries| entries.len() > 1)
        .and_then(|entries| entries.first())
    else {
        return;
    };
    if std::ptr::eq(first.header(), header) {
        return;
    }
    let first_line = first.file_location().start.line + 1;
    ctx.report_with(
        header,
        &header.header_location,
        format!(
            "Timestamp {} is already used on line {} of this file",
            header.timestamp, first_line
        ),
        Some(json!({ "timestamp": header.timestamp.raw(), "first_line": first_line })),
    );
}

fn timestamp_in_instance(ctx: &mut RuleContext<'_, '_>, entry: &InstanceEntry) {
    duplicate_timestamp(ctx, &entry.header);
}

fn timestamp_in_schema(ctx: &mut RuleContext<'_, '_>, entry: &SchemaEntry) {
    duplicate_timestamp(ctx, &entry.header);
}

fn timestamp_in_synthesis(ctx: &mut RuleContext<'_, '_>, entry: &SynthesisEntry) {
    duplicate_timestamp(ctx, &entry.header);
}

fn timestamp_in_actualize(ctx: &mut RuleContext<'_, '_>, entry: &ActualizeEntry) {
    duplicate_timestamp(ctx, &entry.header);
}

pub const DUPLICATE_LINK_ID: Rule = Rule {
    code: "duplicate-link-id",
    name: "Duplicate link id",
    description: "A ^link-id must be declared by exactly one entry in the workspace",
    default_severity: Severity::Error,
    dependencies: RuleDependencies::workspace().with_links(),
    visitor: RuleVisitor {
        after_check: Some(check_duplicate_links),
        ..RuleVisitor::EMPTY
    },
};

fn check_duplicate_links(ctx: &mut RuleContext<'_, '_>) {
    let index = ctx.index;
    let mut duplicated: Vec<(&crate::ast::LinkId, &Vec<&Entry>)> = index
        .definitions_by_link
        .iter()
        .filter(|(_, entries)| entries.len() > 1)
        .map(|(link, entries)| (*link, entries))
        .collect();
    duplicated.sort_by(|a, b| a.0.cmp(b.0));
    for (link_id, entries) in duplicated {
        // file names only: positions in other files go stale without re-running this rule
        let mut declared_in: Vec<&str> = entries.iter().map(|e| e.file()).collect();
        declared_in.dedup();
        for entry in entries {
            let header = entry.header();
            ctx.report_with(
                header,
                &header.header_location,
                format!(
                    "Link id '{}' is declared {} times (in {})",
                    link_id,
                    entries.len(),
                    declared_in.join(", ")
                ),
                Some(json!({ "link_id": link_id.as_str(), "declared_in": declared_in })),
            );
        }
    }
}
