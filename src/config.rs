use crate::{
    checker::{rules::find_rule, Severity},
    error::ThaloError,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::{
    fs::{read_to_string, write},
    path::{Path, PathBuf},
};

/// Conventional name of the workspace configuration file.
pub const CONFIG_FILE_NAME: &str = "thalo.toml";

/// A rule override: either a bare severity (`unknown-field = "off"`) or a table
/// (`unknown-field = { severity = "info" }`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleConfig {
    Severity(Severity),
    Full { severity: Severity },
}

impl RuleConfig {
    pub fn severity(&self) -> Severity {
        match self {
            RuleConfig::Severity(severity) | RuleConfig::Full { severity } => *severity,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackerMode {
    /// Git when the workspace root is inside a repository, timestamps otherwise.
    #[default]
    Auto,
    Git,
    Timestamp,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangeTrackerConfig {
    pub mode: TrackerMode,
    /// A `.git-blame-ignore-revs` style file. When set, git tracking blames entry lines instead
    /// of diffing snapshots.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blame_ignore_revs: Option<PathBuf>,
    /// Accept uncommitted changes in tracked files.
    pub force: bool,
}

/// Contents of `thalo.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckerConfig {
    pub rules: BTreeMap<String, RuleConfig>,
    pub change_tracker: ChangeTrackerConfig,
}

impl CheckerConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ThaloError> {
        let config: CheckerConfig = toml::from_str(content)?;
        config.warn_unknown_rules();
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ThaloError> {
        Ok(toml::to_string(self)?)
    }

    /// Effective severity for `code`, falling back to `default` when not overridden.
    pub fn severity_for(&self, code: &str, default: Severity) -> Severity {
        self.rules
            .get(code)
            .map(RuleConfig::severity)
            .unwrap_or(default)
    }

    pub fn set_severity<S: Into<String>>(&mut self, code: S, severity: Severity) {
        self.rules.insert(code.into(), RuleConfig::Severity(severity));
    }

    fn warn_unknown_rules(&self) {
        for code in self.rules.keys() {
            if find_rule(code).is_none() {
                tracing::warn!("[CheckerConfig] ignoring configuration for unknown rule '{code}'");
            }
        }
    }
}

/// Reads and writes a [`CheckerConfig`] at a fixed path.
#[derive(Debug, Serialize, Deserialize)]
pub struct TomlConfigProvider {
    path: PathBuf,
}

impl TomlConfigProvider {
    pub fn new(path: PathBuf) -> Self {
        TomlConfigProvider { path }
    }

    /// Provider for `thalo.toml` directly under `root`.
    pub fn for_workspace<P: AsRef<Path>>(root: P) -> Self {
        TomlConfigProvider::new(root.as_ref().join(CONFIG_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<CheckerConfig, ThaloError> {
        tracing::debug!("Attempting to read checker config from: {:?}", &self.path);
        if !self.path.exists() {
            tracing::debug!("Config file not found, using default configuration.");
            return Ok(CheckerConfig::default());
        }
        let content = read_to_string(&self.path)?;
        CheckerConfig::from_toml_str(&content)
    }

    pub fn save(&self, config: &CheckerConfig) -> Result<(), ThaloError> {
        tracing::debug!("Attempting to write checker config to: {:?}", &self.path);
        write(&self.path, config.to_toml_string()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_overrides() {
        let config = CheckerConfig::from_toml_str(
            r#"
[rules]
unknown-field = "off"
unresolved-link = "warn"
duplicate-timestamp = { severity = "error" }
"#,
        )
        .unwrap();
        assert_eq!(
            config.severity_for("unknown-field", Severity::Warning),
            Severity::Off
        );
        assert_eq!(
            config.severity_for("unresolved-link", Severity::Error),
            Severity::Warning
        );
        assert_eq!(
            config.severity_for("duplicate-timestamp", Severity::Warning),
            Severity::Error
        );
        assert_eq!(
            config.severity_for("unknown-entity", Severity::Error),
            Severity::Error
        );
        assert_eq!(config.change_tracker, ChangeTrackerConfig::default());
    }

    #[test]
    fn test_change_tracker_table() {
        let config = CheckerConfig::from_toml_str(
            r#"
[change_tracker]
mode = "timestamp"
blame_ignore_revs = ".git-blame-ignore-revs"
force = true
"#,
        )
        .unwrap();
        assert_eq!(config.change_tracker.mode, TrackerMode::Timestamp);
        assert_eq!(
            config.change_tracker.blame_ignore_revs,
            Some(PathBuf::from(".git-blame-ignore-revs"))
        );
        assert!(config.change_tracker.force);
    }

    #[test]
    fn test_invalid_severity_is_config_error() {
        let err = CheckerConfig::from_toml_str("[rules]\nunknown-field = \"loud\"\n").unwrap_err();
        assert!(matches!(err, ThaloError::Config(_)));
    }

    #[test]
    fn test_provider_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let provider = TomlConfigProvider::for_workspace(dir.path());
        assert_eq!(provider.load().unwrap(), CheckerConfig::default());

        let mut config = CheckerConfig::default();
        config.set_severity("unknown-section", Severity::Info);
        config.change_tracker.mode = TrackerMode::Git;
        provider.save(&config).unwrap();
        assert_eq!(provider.load().unwrap(), config);
    }
}
