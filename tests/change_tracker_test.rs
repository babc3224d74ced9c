//! Change tracking against a real git repository and against entry timestamps.

mod common;

use chrono::{TimeZone, Utc};
use common::{commit_all, git_available, init_repo, write_files, LORE_SCHEMA};
use tempfile::TempDir;
use test_log::test;
use thalo_core::{
    actualize::plan_actualize,
    ast::LinkId,
    change_tracker::{ChangeMarker, ChangeTracker, GitChangeTracker, GitCli, TimestampChangeTracker},
    model::Workspace,
    query::Query,
    ThaloError,
};

const CAREER: &str = r#"2026-01-03T00:00Z define-synthesis "Career" ^career
  sources: lore where #career

  # Prompt
  Summarize my career.
"#;

fn lore(timestamp: &str, title: &str, link: &str, text: &str) -> String {
    format!(
        "{timestamp} create lore \"{title}\" ^{link} #career\n  type: \"fact\"\n\n  # Content\n  {text}\n"
    )
}

fn load(root: &std::path::Path) -> Workspace {
    let mut ws = Workspace::new();
    ws.load_directory(root).unwrap();
    ws
}

fn link_ids(entries: &[&thalo_core::ast::Entry]) -> Vec<String> {
    entries
        .iter()
        .filter_map(|e| e.link_id().map(|id| id.to_string()))
        .collect()
}

#[test]
fn test_git_tracker_reports_entries_added_since_checkpoint() {
    if !git_available() {
        eprintln!("git not available, skipping");
        return;
    }
    let temp = TempDir::new().unwrap();
    let first = lore("2026-01-05T00:00Z", "First job", "one", "Started.");
    let root = write_files(
        &temp,
        &[
            ("schema.thalo", LORE_SCHEMA),
            ("synthesis.thalo", CAREER),
            ("career.thalo", first.as_str()),
        ],
    );
    // the repository top level is the parent of the workspace root
    let commit_a = init_repo(temp.path());

    let tracker = GitChangeTracker::new(GitCli::open(&root).unwrap());
    let queries: Vec<Query> = vec!["lore where #career".parse().unwrap()];
    let marker_a = ChangeMarker::Git(commit_a.clone());
    assert_eq!(tracker.current_marker().unwrap(), marker_a);

    let ws = load(&root);
    let unchanged = tracker.changed_entries(&ws, &queries, Some(&marker_a)).unwrap();
    assert!(unchanged.entries.is_empty());

    let second = lore("2026-02-01T00:00Z", "Second job", "x", "Moved on.");
    std::fs::write(root.join("career.thalo"), format!("{first}\n{second}")).unwrap();
    let commit_b = commit_all(temp.path(), "add ^x");

    let ws = load(&root);
    let changed = tracker.changed_entries(&ws, &queries, Some(&marker_a)).unwrap();
    assert_eq!(link_ids(&changed.entries), vec!["^x"]);
    assert_eq!(changed.current_marker, ChangeMarker::Git(commit_b));

    let again = tracker
        .changed_entries(&ws, &queries, Some(&changed.current_marker))
        .unwrap();
    assert!(again.entries.is_empty());

    // without a checkpoint everything matching is reported
    let all = tracker.changed_entries(&ws, &queries, None).unwrap();
    assert_eq!(link_ids(&all.entries), vec!["^one", "^x"]);
}

#[test]
fn test_git_tracker_refuses_uncommitted_sources() {
    if !git_available() {
        eprintln!("git not available, skipping");
        return;
    }
    let temp = TempDir::new().unwrap();
    let first = lore("2026-01-05T00:00Z", "First job", "one", "Started.");
    let root = write_files(&temp, &[("schema.thalo", LORE_SCHEMA), ("career.thalo", first.as_str())]);
    let commit = init_repo(temp.path());

    let edited = lore("2026-01-05T00:00Z", "First job", "one", "Started, then left.");
    std::fs::write(root.join("career.thalo"), edited).unwrap();
    let ws = load(&root);
    let queries: Vec<Query> = vec!["lore".parse().unwrap()];
    let marker = ChangeMarker::Git(commit);

    let strict = GitChangeTracker::new(GitCli::open(&root).unwrap());
    match strict.changed_entries(&ws, &queries, Some(&marker)) {
        Err(ThaloError::UncommittedChanges { files }) => {
            assert_eq!(files, vec!["career.thalo".to_string()])
        }
        other => panic!("expected uncommitted changes, got {other:?}"),
    }

    let forced = GitChangeTracker::new(GitCli::open(&root).unwrap()).with_force(true);
    let changed = forced.changed_entries(&ws, &queries, Some(&marker)).unwrap();
    assert_eq!(link_ids(&changed.entries), vec!["^one"]);
}

#[test]
fn test_actualize_plan_with_timestamp_tracker() {
    let temp = TempDir::new().unwrap();
    let synthesis = format!(
        "{CAREER}\n2026-01-20T00:00Z actualize-synthesis ^career\n  updated: ts:2026-01-20T00:00Z\n"
    );
    let career = format!(
        "{}\n{}",
        lore("2026-01-05T00:00Z", "First job", "one", "Started."),
        lore("2026-02-01T00:00Z", "Second job", "x", "Moved on.")
    );
    let root = write_files(
        &temp,
        &[
            ("schema.thalo", LORE_SCHEMA),
            ("synthesis.thalo", synthesis.as_str()),
            ("career.thalo", career.as_str()),
        ],
    );
    let ws = load(&root);
    let tracker = TimestampChangeTracker::at(Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap());

    let plan = plan_actualize(&ws, &tracker, &LinkId::new("career")).unwrap();
    assert_eq!(plan.prompt, Some("Summarize my career."));
    assert_eq!(
        plan.previous_marker,
        Some(ChangeMarker::Timestamp("2026-01-20T00:00Z".to_string()))
    );
    assert_eq!(link_ids(&plan.changed_entries), vec!["^x"]);
    assert_eq!(
        plan.next_marker,
        ChangeMarker::Timestamp("2026-03-01T00:00:00Z".to_string())
    );
}
