//! Diagnostic types reported by the checker.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{
    ast::{EntryIdentity, SyntaxError},
    source_map::{Location, Position},
};

/// Rule severity. `Off` disables a rule entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    #[serde(alias = "warn")]
    Warning,
    Info,
    #[serde(alias = "none")]
    Off,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
            Severity::Off => "off",
        }
    }

    pub fn is_enabled(&self) -> bool {
        *self != Severity::Off
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A finding against a file. `location` is file-absolute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: String,
    pub severity: Severity,
    pub message: String,
    pub file: String,
    pub location: Location,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Entry the finding was reported against. Unset for syntax errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<DiagnosticOwner>,
}

/// The owning entry of a rule finding, as it was when the finding was reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticOwner {
    pub identity: EntryIdentity,
    /// File-absolute span of the whole entry.
    pub entry_location: Location,
}

impl Diagnostic {
    /// Syntax errors are always reported as errors, whatever the rule configuration.
    pub fn from_syntax_error(file: &str, error: &SyntaxError) -> Self {
        Diagnostic {
            code: error.code.diagnostic_code(),
            severity: Severity::Error,
            message: error.message.clone(),
            file: file.to_string(),
            location: error.file_location(),
            data: Some(serde_json::json!({ "code": error.code.as_str() })),
            owner: None,
        }
    }

    /// This finding shifted along with its owning entry, which now spans `entry_location`.
    /// `None` when the finding has no owner or would land before the start of the file.
    pub fn moved_to(&self, entry_location: &Location) -> Option<Diagnostic> {
        let owner = self.owner.as_ref()?;
        let lines =
            i64::from(entry_location.start.line) - i64::from(owner.entry_location.start.line);
        let bytes = entry_location.start_index as i64 - owner.entry_location.start_index as i64;
        let position = |p: Position| -> Option<Position> {
            Some(Position {
                line: u32::try_from(i64::from(p.line) + lines).ok()?,
                column: p.column,
            })
        };
        let index = |i: usize| usize::try_from(i as i64 + bytes).ok();

        let mut moved = self.clone();
        moved.location = Location {
            start_index: index(self.location.start_index)?,
            end_index: index(self.location.end_index)?,
            start: position(self.location.start)?,
            end: position(self.location.end)?,
        };
        moved.owner = Some(DiagnosticOwner {
            identity: owner.identity.clone(),
            entry_location: entry_location.clone(),
        });
        Some(moved)
    }

    pub fn is_syntax(&self) -> bool {
        self.code.starts_with("syntax-")
    }

    fn sort_key(&self) -> (&str, usize, usize, &str) {
        (
            self.file.as_str(),
            self.location.start_index,
            self.location.end_index,
            self.code.as_str(),
        )
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {} [{}] {}",
            self.file,
            self.location.start.line + 1,
            self.location.start.column + 1,
            self.severity,
            self.code,
            self.message
        )
    }
}

/// Order diagnostics by file, position, then code.
pub fn sort_diagnostics(diagnostics: &mut [Diagnostic]) {
    diagnostics.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_aliases() {
        let parsed: Vec<Severity> =
            serde_json::from_str(r#"["error", "warn", "warning", "info", "none", "off"]"#).unwrap();
        assert_eq!(
            parsed,
            vec![
                Severity::Error,
                Severity::Warning,
                Severity::Warning,
                Severity::Info,
                Severity::Off,
                Severity::Off
            ]
        );
        assert!(!Severity::Off.is_enabled());
    }

    #[test]
    fn test_display_is_one_based() {
        let diagnostic = Diagnostic {
            code: "unknown-entity".into(),
            severity: Severity::Error,
            message: "Unknown entity 'x'".into(),
            file: "a.thalo".into(),
            location: Location::default(),
            data: None,
            owner: None,
        };
        assert_eq!(
            diagnostic.to_string(),
            "a.thalo:1:1: error [unknown-entity] Unknown entity 'x'"
        );
    }

    #[test]
    fn test_moved_to_follows_owner() {
        let entry_at = |line: u32, index: usize| Location {
            start_index: index,
            end_index: index + 40,
            start: Position::new(line, 0),
            end: Position::new(line + 3, 0),
        };
        let diagnostic = Diagnostic {
            code: "unknown-field".into(),
            severity: Severity::Warning,
            message: "Unknown field 'bogus'".into(),
            file: "a.thalo".into(),
            location: Location {
                start_index: 32,
                end_index: 37,
                start: Position::new(1, 2),
                end: Position::new(1, 7),
            },
            data: None,
            owner: Some(DiagnosticOwner {
                identity: EntryIdentity::Timestamp("2026-01-02T00:00Z".into()),
                entry_location: entry_at(0, 0),
            }),
        };

        let moved = diagnostic.moved_to(&entry_at(4, 60)).unwrap();
        assert_eq!(moved.location.start, Position::new(5, 2));
        assert_eq!(moved.location.end, Position::new(5, 7));
        assert_eq!(moved.location.start_index, 92);
        assert_eq!(moved.owner.unwrap().entry_location, entry_at(4, 60));

        let unowned = Diagnostic {
            owner: None,
            ..diagnostic
        };
        assert!(unowned.moved_to(&entry_at(4, 60)).is_none());
    }
}
