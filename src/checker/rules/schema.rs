//! Schema entries: per-entry validity and cross-file fold consistency.

use serde_json::json;
use std::collections::{BTreeSet, HashSet};

use crate::{
    ast::SchemaEntry,
    checker::{
        diagnostic::Severity,
        rule::{Rule, RuleContext, RuleDependencies, RuleVisitor},
    },
};

pub const DUPLICATE_FIELD_IN_SCHEMA: Rule = Rule {
    code: "duplicate-field-in-schema",
    name: "Duplicate field in schema",
    description: "A schema entry must not declare the same field or section twice",
    default_severity: Severity::Error,
    dependencies: RuleDependencies::entry(),
    visitor: RuleVisitor {
        visit_schema: Some(check_duplicate_fields),
        ..RuleVisitor::EMPTY
    },
};

fn check_duplicate_fields(ctx: &mut RuleContext<'_, '_>, entry: &SchemaEntry) {
    let mut fields = HashSet::new();
    for field in &entry.fields {
        if !fields.insert(field.name.as_str()) {
            ctx.report_with(
                &entry.header,
                &field.location,
                format!("Field '{}' is declared more than once", field.name),
                Some(json!({ "entity": entry.entity, "field": field.name })),
            );
        }
    }
    let mut sections = HashSet::new();
    for section in &entry.sections {
        if !sections.insert(section.name.to_ascii_lowercase()) {
            ctx.report_with(
                &entry.header,
                &section.location,
                format!("Section '{}' is declared more than once", section.name),
                Some(json!({ "entity": entry.entity, "section": section.name })),
            );
        }
    }
}

pub const INVALID_TYPE_EXPRESSION: Rule = Rule {
    code: "invalid-type-expression",
    name: "Invalid type expression",
    description: "Field types must be string, datetime, daterange, link, number, literals, unions or arrays of those",
    default_severity: Severity::Error,
    dependencies: RuleDependencies::entry(),
    visitor: RuleVisitor {
        visit_schema: Some(check_type_expressions),
        ..RuleVisitor::EMPTY
    },
};

fn check_type_expressions(ctx: &mut RuleContext<'_, '_>, entry: &SchemaEntry) {
    for field in &entry.fields {
        if let Err(invalid) = &field.type_expr {
            ctx.report_with(
                &entry.header,
                &field.location,
                format!("Field '{}' has an {}", field.name, invalid),
                Some(json!({ "field": field.name, "type": invalid.text })),
            );
        }
    }
}

pub const INVALID_DEFAULT_VALUE: Rule = Rule {
    code: "invalid-default-value",
    name: "Invalid default value",
    description: "A field's default value must match the field's type",
    default_severity: Severity::Error,
    dependencies: RuleDependencies::entry(),
    visitor: RuleVisitor {
        visit_schema: Some(check_default_values),
        ..RuleVisitor::EMPTY
    },
};

fn check_default_values(ctx: &mut RuleContext<'_, '_>, entry: &SchemaEntry) {
    for field in &entry.fields {
        let (Ok(type_expr), Some(default)) = (&field.type_expr, &field.default) else {
            continue;
        };
        if !type_expr.accepts(&default.content) {
            ctx.report_with(
                &entry.header,
                &field.location,
                format!(
                    "Default value {} for field '{}' does not match type {}",
                    default.raw, field.name, type_expr
                ),
                Some(json!({ "field": field.name, "expected": type_expr.to_string() })),
            );
        }
    }
}

pub const DUPLICATE_ENTITY_DEFINITION: Rule = Rule {
    code: "duplicate-entity-definition",
    name: "Duplicate entity definition",
    description: "An entity should be defined once; later defines replace earlier ones",
    default_severity: Severity::Error,
    dependencies: RuleDependencies::workspace().with_schemas(),
    visitor: RuleVisitor {
        visit_schema: Some(check_duplicate_entity),
        ..RuleVisitor::EMPTY
    },
};

fn check_duplicate_entity(ctx: &mut RuleContext<'_, '_>, entry: &SchemaEntry) {
    if !entry.is_define() {
        return;
    }
    let defines: Vec<&SchemaEntry> = ctx
        .index
        .schemas_for(&entry.entity)
        .iter()
        .copied()
        .filter(|s| s.is_define())
        .collect();
    let Some(first) = defines.first() else {
        return;
    };
    if defines.len() < 2 || std::ptr::eq(*first, entry) {
        return;
    }
    ctx.report_with(
        &entry.header,
        &entry.entity_location,
        format!(
            "Entity '{}' is already defined in {} at {}",
            entry.entity, first.header.file, first.header.timestamp
        ),
        Some(json!({
            "entity": entry.entity,
            "first_file": first.header.file,
            "first_timestamp": first.header.timestamp.raw(),
        })),
    );
}

pub const ALTER_UNDEFINED_ENTITY: Rule = Rule {
    code: "alter-undefined-entity",
    name: "Alter of undefined entity",
    description: "alter-entity needs a define-entity for the same entity somewhere in the workspace",
    default_severity: Severity::Error,
    dependencies: RuleDependencies::workspace().with_schemas(),
    visitor: RuleVisitor {
        visit_schema: Some(check_alter_undefined),
        ..RuleVisitor::EMPTY
    },
};

fn check_alter_undefined(ctx: &mut RuleContext<'_, '_>, entry: &SchemaEntry) {
    if entry.is_define() || ctx.index.first_define(&entry.entity).is_some() {
        return;
    }
    ctx.report_with(
        &entry.header,
        &entry.entity_location,
        format!("Cannot alter undefined entity '{}'", entry.entity),
        Some(json!({ "entity": entry.entity })),
    );
}

pub const ALTER_BEFORE_DEFINE: Rule = Rule {
    code: "alter-before-define",
    name: "Alter before define",
    description: "alter-entity entries timestamped before the entity's define-entity are ignored",
    default_severity: Severity::Error,
    dependencies: RuleDependencies::workspace().with_schemas(),
    visitor: RuleVisitor {
        visit_schema: Some(check_alter_before_define),
        ..RuleVisitor::EMPTY
    },
};

fn check_alter_before_define(ctx: &mut RuleContext<'_, '_>, entry: &SchemaEntry) {
    if entry.is_define() {
        return;
    }
    let schemas = ctx.index.schemas_for(&entry.entity);
    let Some(first_define) = ctx.index.first_define(&entry.entity) else {
        return;
    };
    let Some(position) = schemas.iter().position(|s| std::ptr::eq(*s, entry)) else {
        return;
    };
    if position > first_define {
        return;
    }
    let define = schemas[first_define];
    ctx.report_with(
        &entry.header,
        &entry.header.header_location,
        format!(
            "alter-entity at {} precedes the definition of '{}' at {}",
            entry.header.timestamp, entry.entity, define.header.timestamp
        ),
        Some(json!({
            "entity": entry.entity,
            "define_timestamp": define.header.timestamp.raw(),
        })),
    );
}

pub const REMOVE_UNDEFINED_FIELD: Rule = Rule {
    code: "remove-undefined-field",
    name: "Remove undefined field",
    description: "alter-entity should only remove fields and sections the entity has at that point",
    default_severity: Severity::Warning,
    dependencies: RuleDependencies::workspace().with_schemas(),
    visitor: RuleVisitor {
        visit_schema: Some(check_remove_undefined),
        ..RuleVisitor::EMPTY
    },
};

fn check_remove_undefined(ctx: &mut RuleContext<'_, '_>, entry: &SchemaEntry) {
    if entry.is_define() || (entry.removed_fields.is_empty() && entry.removed_sections.is_empty())
    {
        return;
    }
    let schemas = ctx.index.schemas_for(&entry.entity);
    let Some(first_define) = ctx.index.first_define(&entry.entity) else {
        return;
    };
    let Some(position) = schemas.iter().position(|s| std::ptr::eq(*s, entry)) else {
        return;
    };
    if position < first_define {
        return;
    }

    // replay the fold up to and including this entry's additions
    let mut fields: BTreeSet<&str> = BTreeSet::new();
    let mut sections: BTreeSet<String> = BTreeSet::new();
    for schema in &schemas[first_define..=position] {
        if schema.is_define() {
            fields.clear();
            sections.clear();
        }
        fields.extend(schema.fields.iter().map(|f| f.name.as_str()));
        sections.extend(schema.sections.iter().map(|s| s.name.to_ascii_lowercase()));
        if std::ptr::eq(*schema, entry) {
            break;
        }
        for removal in &schema.removed_fields {
            fields.remove(removal.name.as_str());
        }
        for removal in &schema.removed_sections {
            sections.remove(&removal.name.to_ascii_lowercase());
        }
    }

    for removal in &entry.removed_fields {
        if !fields.contains(removal.name.as_str()) {
            ctx.report_with(
                &entry.header,
                &removal.location,
                format!(
                    "Cannot remove field '{}': entity '{}' has no such field",
                    removal.name, entry.entity
                ),
                Some(json!({ "entity": entry.entity, "field": removal.name })),
            );
        }
    }
    for removal in &entry.removed_sections {
        if !sections.contains(&removal.name.to_ascii_lowercase()) {
            ctx.report_with(
                &entry.header,
                &removal.location,
                format!(
                    "Cannot remove section '{}': entity '{}' has no such section",
                    removal.name, entry.entity
                ),
                Some(json!({ "entity": entry.entity, "section": removal.name })),
            );
        }
    }
}
