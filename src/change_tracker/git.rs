use std::{
    collections::{BTreeMap, HashMap, HashSet},
    path::PathBuf,
};

use super::{dedup_entries, vcs::FileChange, ChangeMarker, ChangeTracker, ChangedEntries, VersionControl};
use crate::{
    ast::{Entry, EntryIdentity},
    model::{DocumentOptions, Workspace},
    query::Query,
    ThaloError,
};

/// Tracks changes against commits. Entries are compared by structural identity and
/// fingerprint, so reformatting an entry does not count as changing it.
#[derive(Debug, Clone)]
pub struct GitChangeTracker<V> {
    vcs: V,
    blame_ignore_revs: Option<PathBuf>,
    force: bool,
}

impl<V: VersionControl> GitChangeTracker<V> {
    pub fn new(vcs: V) -> Self {
        GitChangeTracker {
            vcs,
            blame_ignore_revs: None,
            force: false,
        }
    }

    /// Accept uncommitted changes in tracked files instead of failing.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Use line blame, skipping the revisions listed in `path`, instead of snapshot diffs.
    pub fn with_blame_ignore_revs(mut self, path: PathBuf) -> Self {
        self.blame_ignore_revs = Some(path);
        self
    }

    pub fn vcs(&self) -> &V {
        &self.vcs
    }

    /// Entries of `file` that are absent at `base` or whose fingerprint differs there.
    fn diff_snapshot<'w>(
        &self,
        workspace: &Workspace,
        base: &str,
        change: &FileChange,
        entries: &[&'w Entry],
    ) -> Result<Vec<&'w Entry>, ThaloError> {
        let Some(old_source) = self.vcs.file_at(base, change.base_path())? else {
            tracing::trace!(
                "[GitChangeTracker::diff_snapshot] {} is new since {}",
                change.path,
                base
            );
            return Ok(entries.to_vec());
        };
        let old = workspace.extract_entries(&old_source, &DocumentOptions::new(change.path.as_str()));
        let mut before: HashMap<EntryIdentity, HashSet<&str>> = HashMap::new();
        for entry in &old.entries {
            before
                .entry(entry.identity())
                .or_default()
                .insert(entry.fingerprint());
        }
        Ok(entries
            .iter()
            .copied()
            .filter(|entry| {
                before
                    .get(&entry.identity())
                    .map(|prints| !prints.contains(entry.fingerprint()))
                    .unwrap_or(true)
            })
            .collect())
    }

    /// Entries of `file` with at least one line last touched by a commit the marker does not
    /// contain.
    fn blame<'w>(
        &self,
        base: &str,
        file: &str,
        entries: &[&'w Entry],
        ancestry: &mut HashMap<String, bool>,
    ) -> Result<Vec<&'w Entry>, ThaloError> {
        let mut changed = vec![];
        for entry in entries {
            let location = entry.file_location();
            let mut end = location.end.line;
            // a span ending at column 0 stops before that line
            if location.end.column == 0 && end > location.start.line {
                end -= 1;
            }
            let commits = self.vcs.blame_lines(
                file,
                location.start.line as usize + 1,
                end as usize + 1,
                self.blame_ignore_revs.as_deref(),
            )?;
            let mut is_new = false;
            for commit in commits {
                let contained = match ancestry.get(&commit) {
                    Some(known) => *known,
                    None => {
                        let known = self.vcs.is_ancestor(&commit, base).unwrap_or(false);
                        ancestry.insert(commit, known);
                        known
                    }
                };
                if !contained {
                    is_new = true;
                    break;
                }
            }
            if is_new {
                changed.push(*entry);
            }
        }
        Ok(changed)
    }
}

impl<V: VersionControl> ChangeTracker for GitChangeTracker<V> {
    fn current_marker(&self) -> Result<ChangeMarker, ThaloError> {
        Ok(ChangeMarker::Git(self.vcs.current_commit()?))
    }

    #[tracing::instrument(skip_all)]
    fn changed_entries<'w>(
        &self,
        workspace: &'w Workspace,
        queries: &[Query],
        marker: Option<&ChangeMarker>,
    ) -> Result<ChangedEntries<'w>, ThaloError> {
        let matching = workspace.query(queries);
        let mut by_file: BTreeMap<&str, Vec<&'w Entry>> = BTreeMap::new();
        for entry in &matching {
            by_file.entry(entry.file()).or_default().push(*entry);
        }
        let files: Vec<&str> = by_file.keys().copied().collect();

        let dirty = self.vcs.uncommitted_files(&files)?;
        if !dirty.is_empty() && !self.force {
            return Err(ThaloError::UncommittedChanges { files: dirty });
        }
        let current_marker = self.current_marker()?;

        let base = match marker {
            Some(ChangeMarker::Git(commit)) if self.vcs.commit_exists(commit)? => commit.as_str(),
            other => {
                tracing::debug!(
                    "[GitChangeTracker::changed_entries] no usable checkpoint ({:?}), returning all {} entries",
                    other,
                    matching.len()
                );
                return Ok(ChangedEntries {
                    entries: dedup_entries(matching),
                    current_marker,
                });
            }
        };

        let mut changes: BTreeMap<String, FileChange> = self
            .vcs
            .changed_files_since(base)?
            .into_iter()
            .filter(|change| !change.deleted)
            .map(|change| (change.path.clone(), change))
            .collect();
        for path in dirty {
            changes
                .entry(path.clone())
                .or_insert_with(|| FileChange::modified(path));
        }

        let mut changed: HashSet<(&str, EntryIdentity)> = HashSet::new();
        let mut ancestry = HashMap::new();
        for (file, entries) in &by_file {
            let Some(change) = changes.get(*file) else {
                continue;
            };
            let found = if self.blame_ignore_revs.is_some() {
                self.blame(base, file, entries, &mut ancestry)?
            } else {
                self.diff_snapshot(workspace, base, change, entries)?
            };
            changed.extend(found.into_iter().map(|e| (e.file(), e.identity())));
        }

        let entries: Vec<&'w Entry> = matching
            .iter()
            .copied()
            .filter(|e| changed.contains(&(e.file(), e.identity())))
            .collect();
        tracing::debug!(
            "[GitChangeTracker::changed_entries] {} of {} matching entries changed since {}",
            entries.len(),
            matching.len(),
            base
        );
        Ok(ChangedEntries {
            entries: dedup_entries(entries),
            current_marker,
        })
    }
}
