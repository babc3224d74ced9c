use chrono::{DateTime, SecondsFormat, Utc};

use super::{dedup_entries, ChangeMarker, ChangeTracker, ChangedEntries};
use crate::{model::Workspace, query::Query, ThaloError};

/// Tracks changes by entry timestamp: an entry changed when it is dated after the checkpoint.
/// Edits to older entries go unnoticed.
#[derive(Debug, Clone, Default)]
pub struct TimestampChangeTracker {
    now: Option<DateTime<Utc>>,
}

impl TimestampChangeTracker {
    pub fn new() -> Self {
        TimestampChangeTracker::default()
    }

    /// A tracker whose clock is frozen at `now`.
    pub fn at(now: DateTime<Utc>) -> Self {
        TimestampChangeTracker { now: Some(now) }
    }
}

impl ChangeTracker for TimestampChangeTracker {
    fn current_marker(&self) -> Result<ChangeMarker, ThaloError> {
        let now = self.now.unwrap_or_else(Utc::now);
        Ok(ChangeMarker::Timestamp(
            now.to_rfc3339_opts(SecondsFormat::Secs, true),
        ))
    }

    fn changed_entries<'w>(
        &self,
        workspace: &'w Workspace,
        queries: &[Query],
        marker: Option<&ChangeMarker>,
    ) -> Result<ChangedEntries<'w>, ThaloError> {
        let matching = workspace.query(queries);
        let current_marker = self.current_marker()?;
        let entries = match marker.and_then(ChangeMarker::instant) {
            Some(since) => matching
                .into_iter()
                .filter(|entry| entry.timestamp().instant() > since)
                .collect(),
            None => {
                tracing::debug!(
                    "[TimestampChangeTracker::changed_entries] no usable checkpoint, returning all {} entries",
                    matching.len()
                );
                matching
            }
        };
        Ok(ChangedEntries {
            entries: dedup_entries(entries),
            current_marker,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DocumentOptions;
    use chrono::TimeZone;

    fn workspace() -> Workspace {
        let mut ws = Workspace::new();
        ws.add_document(
            "2026-01-01T00:00Z create lore \"Old\"\n\n2026-01-03T09:30+01:00 create lore \"New\"\n\n2026-01-02T00:00Z create journal \"Other\"\n",
            DocumentOptions::new("a.thalo"),
        );
        ws
    }

    fn titles(changed: &ChangedEntries) -> Vec<String> {
        changed.entries.iter().map(|e| e.title().to_string()).collect()
    }

    #[test]
    fn test_strictly_later_than_marker() {
        let ws = workspace();
        let tracker = TimestampChangeTracker::at(Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap());
        let queries = vec!["lore".parse().unwrap()];

        let marker: ChangeMarker = "ts:2026-01-02T00:00:00Z".parse().unwrap();
        let changed = tracker.changed_entries(&ws, &queries, Some(&marker)).unwrap();
        assert_eq!(titles(&changed), vec!["New"]);
        assert_eq!(changed.current_marker.to_string(), "ts:2026-02-01T00:00:00Z");

        let marker: ChangeMarker = "ts:2026-01-03T08:30Z".parse().unwrap();
        let changed = tracker.changed_entries(&ws, &queries, Some(&marker)).unwrap();
        assert!(changed.entries.is_empty());
    }

    #[test]
    fn test_missing_or_foreign_marker_returns_everything() {
        let ws = workspace();
        let tracker = TimestampChangeTracker::new();
        let queries = vec!["lore".parse().unwrap()];
        let git = ChangeMarker::Git("abcd".to_string());
        for marker in [None, Some(&git)] {
            let changed = tracker.changed_entries(&ws, &queries, marker).unwrap();
            assert_eq!(titles(&changed), vec!["Old", "New"]);
        }
        assert!(tracker.current_marker().unwrap().instant().is_some());
    }
}
