//! Which entries changed since a synthesis was last actualized.
//!
//! A checkpoint ([`ChangeMarker`]) is persisted in the `updated:` field of an
//! `actualize-synthesis` entry. Two strategies interpret it: [`GitChangeTracker`] compares the
//! workspace against a commit, [`TimestampChangeTracker`] compares entry timestamps against an
//! instant. [`tracker_for`] picks one for a workspace root.

pub mod git;
pub mod timestamp;
pub mod vcs;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fmt,
    path::Path,
    str::FromStr,
};

pub use git::GitChangeTracker;
pub use timestamp::TimestampChangeTracker;
pub use vcs::{FileChange, GitCli, VersionControl};

use crate::{
    ast::{Entry, EntryIdentity, Timestamp},
    config::{ChangeTrackerConfig, TrackerMode},
    model::Workspace,
    query::Query,
    ThaloError,
};

/// A persisted checkpoint: `git:<commit>` or `ts:<ISO-8601 timestamp>`.
///
/// Commit hashes are normalized to lowercase when parsed, so `git:ABCD` reads back and displays as
/// `git:abcd`; git resolves either spelling to the same object. Timestamp text is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ChangeMarker {
    Git(String),
    Timestamp(String),
}

impl ChangeMarker {
    pub fn is_git(&self) -> bool {
        matches!(self, ChangeMarker::Git(_))
    }

    pub fn commit(&self) -> Option<&str> {
        match self {
            ChangeMarker::Git(commit) => Some(commit),
            ChangeMarker::Timestamp(_) => None,
        }
    }

    /// Instant of a `ts:` marker.
    pub fn instant(&self) -> Option<DateTime<FixedOffset>> {
        match self {
            ChangeMarker::Timestamp(raw) => Timestamp::parse(raw).ok().map(|t| t.instant()),
            ChangeMarker::Git(_) => None,
        }
    }
}

impl FromStr for ChangeMarker {
    type Err = ThaloError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let invalid = || ThaloError::InvalidMarker(text.to_string());
        if let Some(commit) = text.strip_prefix("git:") {
            if commit.len() < 4 || !commit.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(invalid());
            }
            return Ok(ChangeMarker::Git(commit.to_ascii_lowercase()));
        }
        if let Some(raw) = text.strip_prefix("ts:") {
            Timestamp::parse(raw).map_err(|_| invalid())?;
            return Ok(ChangeMarker::Timestamp(raw.to_string()));
        }
        Err(invalid())
    }
}

impl fmt::Display for ChangeMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeMarker::Git(commit) => write!(f, "git:{commit}"),
            ChangeMarker::Timestamp(raw) => write!(f, "ts:{raw}"),
        }
    }
}

impl TryFrom<String> for ChangeMarker {
    type Error = ThaloError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ChangeMarker> for String {
    fn from(marker: ChangeMarker) -> String {
        marker.to_string()
    }
}

/// Result of [`ChangeTracker::changed_entries`].
#[derive(Debug, Clone)]
pub struct ChangedEntries<'w> {
    /// Matching entries that are new or structurally changed since the marker, in workspace
    /// order. Deleted entries are never reported.
    pub entries: Vec<&'w Entry>,
    /// Checkpoint to persist once the caller has consumed `entries`.
    pub current_marker: ChangeMarker,
}

pub trait ChangeTracker {
    /// "Now", as a checkpoint.
    fn current_marker(&self) -> Result<ChangeMarker, ThaloError>;

    /// Entries matching any of `queries` that changed since `marker`. A missing marker, or one
    /// this tracker cannot interpret, selects every matching entry.
    fn changed_entries<'w>(
        &self,
        workspace: &'w Workspace,
        queries: &[Query],
        marker: Option<&ChangeMarker>,
    ) -> Result<ChangedEntries<'w>, ThaloError>;
}

/// Remove repeated (file, identity) pairs, keeping the first occurrence.
pub(crate) fn dedup_entries<'w>(entries: Vec<&'w Entry>) -> Vec<&'w Entry> {
    let mut seen: HashSet<(&'w str, EntryIdentity)> = HashSet::new();
    entries
        .into_iter()
        .filter(|entry| seen.insert((entry.file(), entry.identity())))
        .collect()
}

/// The change tracker configured for the workspace rooted at `root`. `Auto` prefers git when
/// `root` is inside a repository.
pub fn tracker_for<P: AsRef<Path>>(
    root: P,
    config: &ChangeTrackerConfig,
) -> Result<Box<dyn ChangeTracker>, ThaloError> {
    let root = root.as_ref();
    let git = |vcs: GitCli| -> Box<dyn ChangeTracker> {
        let mut tracker = GitChangeTracker::new(vcs).with_force(config.force);
        if let Some(path) = &config.blame_ignore_revs {
            tracker = tracker.with_blame_ignore_revs(root.join(path));
        }
        Box::new(tracker)
    };
    match config.mode {
        TrackerMode::Git => Ok(git(GitCli::open(root)?)),
        TrackerMode::Timestamp => Ok(Box::new(TimestampChangeTracker::new())),
        TrackerMode::Auto => match GitCli::open(root) {
            Ok(vcs) => {
                tracing::debug!("[tracker_for] {:?} is inside a git repository", root);
                Ok(git(vcs))
            }
            Err(e) => {
                tracing::debug!("[tracker_for] falling back to timestamps: {e}");
                Ok(Box::new(TimestampChangeTracker::new()))
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_parse_and_display() {
        let git: ChangeMarker = "git:4F2A9c".parse().unwrap();
        assert_eq!(git, ChangeMarker::Git("4f2a9c".to_string()));
        assert_eq!(git.to_string(), "git:4f2a9c");
        assert_eq!(git.commit(), Some("4f2a9c"));
        // normalized text parses back to the same marker
        assert_eq!(git.to_string().parse::<ChangeMarker>().unwrap(), git);
        assert_ne!(git.to_string(), "git:4F2A9c");

        let ts: ChangeMarker = "ts:2026-01-05T10:00:00Z".parse().unwrap();
        assert_eq!(ts.to_string(), "ts:2026-01-05T10:00:00Z");
        assert!(ts.instant().is_some());
        assert!(!ts.is_git());
    }

    #[test]
    fn test_marker_rejects_garbage() {
        for text in ["", "4f2a", "git:", "git:xyz1", "ts:yesterday", "svn:12"] {
            let err = text.parse::<ChangeMarker>().unwrap_err();
            assert!(matches!(err, ThaloError::InvalidMarker(_)), "{text}");
        }
    }

    #[test]
    fn test_marker_serde_as_string() {
        let marker = ChangeMarker::Git("abcdef".to_string());
        let json = serde_json::to_string(&marker).unwrap();
        assert_eq!(json, "\"git:abcdef\"");
        let back: ChangeMarker = serde_json::from_str(&json).unwrap();
        assert_eq!(back, marker);
        assert!(serde_json::from_str::<ChangeMarker>("\"nope\"").is_err());
    }

    #[test]
    fn test_tracker_for_plain_directory() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = tracker_for(dir.path(), &ChangeTrackerConfig::default()).unwrap();
        let marker = tracker.current_marker().unwrap();
        // a temp dir is normally outside any repository
        if !marker.is_git() {
            assert!(marker.instant().is_some());
        }
        let timestamp = ChangeTrackerConfig {
            mode: TrackerMode::Timestamp,
            ..Default::default()
        };
        let marker = tracker_for(dir.path(), &timestamp)
            .unwrap()
            .current_marker()
            .unwrap();
        assert!(!marker.is_git());
    }
}
