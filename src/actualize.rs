//! Planning an `actualize-synthesis` run: what changed since the last one, and what to append
//! once the host has regenerated the synthesis.

use std::fmt::Write;

use crate::{
    ast::{Entry, LinkId, SynthesisEntry},
    change_tracker::{ChangeMarker, ChangeTracker},
    model::Workspace,
    ThaloError,
};

#[derive(Debug, Clone)]
pub struct ActualizePlan<'w> {
    pub synthesis: &'w SynthesisEntry,
    pub prompt: Option<&'w str>,
    /// Checkpoint of the latest `actualize-synthesis` for this synthesis, if any parses.
    pub previous_marker: Option<ChangeMarker>,
    /// Checkpoint to record after a successful run.
    pub next_marker: ChangeMarker,
    pub changed_entries: Vec<&'w Entry>,
}

impl<'w> ActualizePlan<'w> {
    pub fn is_up_to_date(&self) -> bool {
        self.changed_entries.is_empty()
    }

    /// Source text of every changed entry, in workspace order, separated by blank lines.
    pub fn render_changed_entries(&self, workspace: &Workspace) -> String {
        self.changed_entries
            .iter()
            .filter_map(|entry| {
                let document = workspace.get_document(entry.file())?;
                Some(document.entry_text(entry).trim_end().to_string())
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// The entry to append after the run, stamped with `timestamp`.
    pub fn render_actualize_entry(&self, timestamp: &str) -> Result<String, ThaloError> {
        let mut out = String::new();
        writeln!(
            out,
            "{} actualize-synthesis {}",
            timestamp, self.synthesis.link_id
        )?;
        writeln!(out, "  updated: {}", self.next_marker)?;
        Ok(out)
    }
}

/// Plan an actualize run for the synthesis declared as `^synthesis_id`.
#[tracing::instrument(skip_all, fields(synthesis = %synthesis_id))]
pub fn plan_actualize<'w>(
    workspace: &'w Workspace,
    tracker: &dyn ChangeTracker,
    synthesis_id: &LinkId,
) -> Result<ActualizePlan<'w>, ThaloError> {
    let synthesis = match workspace.get_link_entry(synthesis_id) {
        Some(Entry::Synthesis(synthesis)) => synthesis,
        Some(other) => {
            return Err(ThaloError::NotFound(format!(
                "{} is {}, not a synthesis",
                synthesis_id,
                other.summary()
            )))
        }
        None => {
            return Err(ThaloError::NotFound(format!(
                "no synthesis declares {synthesis_id}"
            )))
        }
    };

    let latest = workspace
        .all_actualize_entries()
        .filter(|actualize| &actualize.target == synthesis_id)
        .max_by(|a, b| a.header.timestamp.cmp(&b.header.timestamp));
    let previous_marker = latest
        .and_then(|actualize| actualize.updated.as_deref())
        .and_then(|updated| match updated.parse::<ChangeMarker>() {
            Ok(marker) => Some(marker),
            Err(e) => {
                tracing::warn!("[plan_actualize] ignoring checkpoint: {e}");
                None
            }
        });

    let changed = tracker.changed_entries(workspace, &synthesis.sources, previous_marker.as_ref())?;
    tracing::debug!(
        "[plan_actualize] {} changed entries since {:?}",
        changed.entries.len(),
        previous_marker
    );
    Ok(ActualizePlan {
        synthesis,
        prompt: synthesis.prompt.as_deref(),
        previous_marker,
        next_marker: changed.current_marker,
        changed_entries: changed.entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{change_tracker::TimestampChangeTracker, model::DocumentOptions};
    use chrono::{TimeZone, Utc};

    const SOURCE: &str = "2026-01-01T00:00Z create lore \"First\" #career\n  type: fact\n\n2026-01-05T00:00Z create lore \"Second\" #career\n  type: fact\n\n2026-01-06T00:00Z define-synthesis \"Career\" ^career\n  sources: lore where #career\n\n  # Prompt\n  Summarize.\n\n2026-01-03T00:00Z actualize-synthesis ^career\n  updated: ts:2026-01-03T00:00Z\n";

    fn workspace() -> Workspace {
        let mut ws = Workspace::new();
        ws.add_document(SOURCE, DocumentOptions::new("a.thalo"));
        ws
    }

    #[test]
    fn test_plan_uses_latest_checkpoint() {
        let ws = workspace();
        let tracker = TimestampChangeTracker::at(Utc.with_ymd_and_hms(2026, 1, 10, 12, 0, 0).unwrap());
        let plan = plan_actualize(&ws, &tracker, &LinkId::new("career")).unwrap();
        assert_eq!(plan.prompt, Some("Summarize."));
        assert_eq!(
            plan.previous_marker,
            Some("ts:2026-01-03T00:00Z".parse().unwrap())
        );
        let titles: Vec<&str> = plan.changed_entries.iter().map(|e| e.title()).collect();
        assert_eq!(titles, vec!["Second"]);
        assert!(!plan.is_up_to_date());
        assert!(plan
            .render_changed_entries(&ws)
            .starts_with("2026-01-05T00:00Z create lore \"Second\""));
        assert_eq!(
            plan.render_actualize_entry("2026-01-10T12:00Z").unwrap(),
            "2026-01-10T12:00Z actualize-synthesis ^career\n  updated: ts:2026-01-10T12:00:00Z\n"
        );
    }

    #[test]
    fn test_unknown_synthesis() {
        let ws = workspace();
        let tracker = TimestampChangeTracker::new();
        let err = plan_actualize(&ws, &tracker, &LinkId::new("nope")).unwrap_err();
        assert!(matches!(err, ThaloError::NotFound(_)));
    }
}
