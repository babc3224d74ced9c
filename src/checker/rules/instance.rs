//! Instance entries checked against the resolved schema of their entity.

use serde_json::json;

use crate::{
    ast::{value::date_bound_start, InstanceDirective, InstanceEntry, ValueContent},
    checker::{
        diagnostic::Severity,
        rule::{Rule, RuleContext, RuleDependencies, RuleVisitor},
    },
};

pub const UNKNOWN_ENTITY: Rule = Rule {
    code: "unknown-entity",
    name: "Unknown entity",
    description: "Instance entries must use an entity defined with define-entity",
    default_severity: Severity::Error,
    dependencies: RuleDependencies::entry().with_schemas(),
    visitor: RuleVisitor {
        visit_instance: Some(check_unknown_entity),
        ..RuleVisitor::EMPTY
    },
};

fn check_unknown_entity(ctx: &mut RuleContext<'_, '_>, entry: &InstanceEntry) {
    if ctx.workspace.schema_registry().has(&entry.entity) {
        return;
    }
    ctx.report_with(
        &entry.header,
        &entry.entity_location,
        format!("Unknown entity '{}'", entry.entity),
        Some(json!({ "entity": entry.entity })),
    );
}

pub const UNKNOWN_FIELD: Rule = Rule {
    code: "unknown-field",
    name: "Unknown field",
    description: "Metadata keys should be declared by the entity schema",
    default_severity: Severity::Warning,
    dependencies: RuleDependencies::entry().with_schemas(),
    visitor: RuleVisitor {
        visit_instance: Some(check_unknown_field),
        ..RuleVisitor::EMPTY
    },
};

fn check_unknown_field(ctx: &mut RuleContext<'_, '_>, entry: &InstanceEntry) {
    let Some(schema) = ctx.workspace.schema_registry().get(&entry.entity) else {
        return;
    };
    let unknown: Vec<_> = entry
        .metadata
        .iter()
        .filter(|m| schema.field(&m.key).is_none())
        .collect();
    for metadata in unknown {
        ctx.report_with(
            &entry.header,
            &metadata.key_location,
            format!(
                "Field '{}' is not defined for entity '{}'",
                metadata.key, entry.entity
            ),
            Some(json!({ "entity": entry.entity, "field": metadata.key })),
        );
    }
}

pub const MISSING_REQUIRED_FIELD: Rule = Rule {
    code: "missing-required-field",
    name: "Missing required field",
    description: "create entries must set every required field that has no default",
    default_severity: Severity::Error,
    dependencies: RuleDependencies::entry().with_schemas(),
    visitor: RuleVisitor {
        visit_instance: Some(check_missing_required_field),
        ..RuleVisitor::EMPTY
    },
};

fn check_missing_required_field(ctx: &mut RuleContext<'_, '_>, entry: &InstanceEntry) {
    if entry.directive != InstanceDirective::Create {
        return;
    }
    let Some(schema) = ctx.workspace.schema_registry().get(&entry.entity) else {
        return;
    };
    let missing: Vec<&str> = schema
        .fields
        .iter()
        .filter(|f| f.is_required() && entry.get(&f.name).is_none())
        .map(|f| f.name.as_str())
        .collect();
    for field in missing {
        ctx.report_with(
            &entry.header,
            &entry.header.header_location,
            format!("Missing required field '{field}'"),
            Some(json!({ "entity": entry.entity, "field": field })),
        );
    }
}

pub const INVALID_FIELD_TYPE: Rule = Rule {
    code: "invalid-field-type",
    name: "Invalid field type",
    description: "Metadata values must match the type declared by the schema",
    default_severity: Severity::Error,
    dependencies: RuleDependencies::entry().with_schemas(),
    visitor: RuleVisitor {
        visit_instance: Some(check_invalid_field_type),
        ..RuleVisitor::EMPTY
    },
};

fn has_impossible_date(value: &ValueContent) -> bool {
    value.scalars().into_iter().any(|scalar| match scalar {
        ValueContent::Datetime(text) => date_bound_start(text).is_none(),
        _ => false,
    })
}

fn check_invalid_field_type(ctx: &mut RuleContext<'_, '_>, entry: &InstanceEntry) {
    let Some(schema) = ctx.workspace.schema_registry().get(&entry.entity) else {
        return;
    };
    let mut findings = vec![];
    for metadata in &entry.metadata {
        let Some(Ok(type_expr)) = schema.field(&metadata.key).map(|f| &f.type_expr) else {
            continue;
        };
        let content = &metadata.value.content;
        if !type_expr.accepts(content) || has_impossible_date(content) {
            findings.push((metadata, type_expr.to_string()));
        }
    }
    for (metadata, expected) in findings {
        ctx.report_with(
            &entry.header,
            &metadata.value.location,
            format!(
                "Value '{}' for field '{}' does not match type {}",
                metadata.value.raw, metadata.key, expected
            ),
            Some(json!({ "field": metadata.key, "expected": expected })),
        );
    }
}

pub const MISSING_REQUIRED_SECTION: Rule = Rule {
    code: "missing-required-section",
    name: "Missing required section",
    description: "create entries must contain every non-optional section of the schema",
    default_severity: Severity::Error,
    dependencies: RuleDependencies::entry().with_schemas(),
    visitor: RuleVisitor {
        visit_instance: Some(check_missing_required_section),
        ..RuleVisitor::EMPTY
    },
};

fn check_missing_required_section(ctx: &mut RuleContext<'_, '_>, entry: &InstanceEntry) {
    if entry.directive != InstanceDirective::Create {
        return;
    }
    let Some(schema) = ctx.workspace.schema_registry().get(&entry.entity) else {
        return;
    };
    let missing: Vec<&str> = schema
        .sections
        .iter()
        .filter(|s| {
            !s.optional
                && !entry
                    .sections
                    .iter()
                    .any(|have| have.eq_ignore_ascii_case(&s.name))
        })
        .map(|s| s.name.as_str())
        .collect();
    for section in missing {
        ctx.report_with(
            &entry.header,
            &entry.header.header_location,
            format!("Missing required section '{section}'"),
            Some(json!({ "entity": entry.entity, "section": section })),
        );
    }
}

pub const UNKNOWN_SECTION: Rule = Rule {
    code: "unknown-section",
    name: "Unknown section",
    description: "Content headings should be sections declared by the schema",
    default_severity: Severity::Warning,
    dependencies: RuleDependencies::entry().with_schemas(),
    visitor: RuleVisitor {
        visit_instance: Some(check_unknown_section),
        ..RuleVisitor::EMPTY
    },
};

fn check_unknown_section(ctx: &mut RuleContext<'_, '_>, entry: &InstanceEntry) {
    let Some(schema) = ctx.workspace.schema_registry().get(&entry.entity) else {
        return;
    };
    // schemas without a `# Sections` block leave content free-form
    if schema.sections.is_empty() {
        return;
    }
    let unknown: Vec<&String> = entry
        .sections
        .iter()
        .filter(|name| schema.section(name).is_none())
        .collect();
    for section in unknown {
        ctx.report_with(
            &entry.header,
            &entry.header.header_location,
            format!(
                "Section '{}' is not defined for entity '{}'",
                section, entry.entity
            ),
            Some(json!({ "entity": entry.entity, "section": section })),
        );
    }
}
