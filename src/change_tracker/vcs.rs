use std::{
    path::{Path, PathBuf},
    process::{Command, Output},
};

use crate::ThaloError;

/// A file reported by [`VersionControl::changed_files_since`]. Paths are relative to the
/// workspace root, `/`-separated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: String,
    /// Path at the base commit when the file was renamed or copied.
    pub previous_path: Option<String>,
    pub deleted: bool,
}

impl FileChange {
    pub fn modified<S: Into<String>>(path: S) -> Self {
        FileChange {
            path: path.into(),
            previous_path: None,
            deleted: false,
        }
    }

    /// Where the content lived at the base commit.
    pub fn base_path(&self) -> &str {
        self.previous_path.as_deref().unwrap_or(&self.path)
    }
}

/// Read-only repository queries needed for change tracking.
pub trait VersionControl {
    fn current_commit(&self) -> Result<String, ThaloError>;

    fn commit_exists(&self, commit: &str) -> Result<bool, ThaloError>;

    /// Files that differ between `commit` and the working tree, with renames detected.
    fn changed_files_since(&self, commit: &str) -> Result<Vec<FileChange>, ThaloError>;

    /// Content of `path` at `commit`, or `None` when the file did not exist there.
    fn file_at(&self, commit: &str, path: &str) -> Result<Option<String>, ThaloError>;

    /// The subset of `paths` that are modified, staged or untracked.
    fn uncommitted_files(&self, paths: &[&str]) -> Result<Vec<String>, ThaloError>;

    /// The commit that last touched each line of `path` in `start..=end` (1-based).
    fn blame_lines(
        &self,
        path: &str,
        start: usize,
        end: usize,
        ignore_revs: Option<&Path>,
    ) -> Result<Vec<String>, ThaloError>;

    fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool, ThaloError>;
}

/// [`VersionControl`] backed by the `git` executable.
#[derive(Debug, Clone)]
pub struct GitCli {
    root: PathBuf,
    /// `root` relative to the repository top level, with a trailing `/` unless empty.
    prefix: String,
}

impl GitCli {
    /// Open the repository containing `root`. Fails when `root` is not inside a work tree or
    /// `git` is not installed.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self, ThaloError> {
        let root = root.as_ref().to_path_buf();
        let output = run(&root, &["rev-parse", "--show-prefix"])?;
        let prefix = expect_success(&output, "rev-parse --show-prefix")?
            .trim()
            .to_string();
        tracing::debug!("[GitCli::open] {:?} (prefix {:?})", root, prefix);
        Ok(GitCli { root, prefix })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn git(&self, args: &[&str]) -> Result<Output, ThaloError> {
        run(&self.root, args)
    }

    fn git_ok(&self, args: &[&str]) -> Result<String, ThaloError> {
        let output = self.git(args)?;
        expect_success(&output, &args.join(" "))
    }

    /// Repository-relative path to workspace-relative, if it lies under the workspace root.
    fn relative(&self, repo_path: &str) -> Option<String> {
        repo_path
            .strip_prefix(self.prefix.as_str())
            .map(str::to_string)
    }
}

fn run(root: &Path, args: &[&str]) -> Result<Output, ThaloError> {
    tracing::trace!("[GitCli] git {}", args.join(" "));
    Command::new("git")
        .args(args)
        .current_dir(root)
        .output()
        .map_err(|e| ThaloError::Vcs(format!("failed to run git: {e}")))
}

fn expect_success(output: &Output, what: &str) -> Result<String, ThaloError> {
    if !output.status.success() {
        return Err(ThaloError::Vcs(format!(
            "git {what} failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8(output.stdout.clone())?)
}

fn is_commit_hash(token: &str) -> bool {
    (token.len() == 40 || token.len() == 64) && token.chars().all(|c| c.is_ascii_hexdigit())
}

impl VersionControl for GitCli {
    fn current_commit(&self) -> Result<String, ThaloError> {
        Ok(self.git_ok(&["rev-parse", "HEAD"])?.trim().to_string())
    }

    fn commit_exists(&self, commit: &str) -> Result<bool, ThaloError> {
        let spec = format!("{commit}^{{commit}}");
        Ok(self.git(&["cat-file", "-e", &spec])?.status.success())
    }

    fn changed_files_since(&self, commit: &str) -> Result<Vec<FileChange>, ThaloError> {
        let out = self.git_ok(&["diff", "--name-status", "-M", "-z", commit, "--", "."])?;
        let mut tokens = out.split('\0').filter(|t| !t.is_empty());
        let mut changes = vec![];
        while let Some(status) = tokens.next() {
            let kind = status.chars().next().unwrap_or(' ');
            let change = if kind == 'R' || kind == 'C' {
                let (Some(from), Some(to)) = (tokens.next(), tokens.next()) else {
                    break;
                };
                self.relative(to).map(|path| FileChange {
                    path,
                    previous_path: self.relative(from),
                    deleted: false,
                })
            } else {
                let Some(path) = tokens.next() else {
                    break;
                };
                self.relative(path).map(|path| FileChange {
                    path,
                    previous_path: None,
                    deleted: kind == 'D',
                })
            };
            changes.extend(change);
        }
        tracing::debug!(
            "[GitCli::changed_files_since] {} files changed since {}",
            changes.len(),
            commit
        );
        Ok(changes)
    }

    fn file_at(&self, commit: &str, path: &str) -> Result<Option<String>, ThaloError> {
        let object = format!("{commit}:{}{path}", self.prefix);
        let output = self.git(&["show", &object])?;
        if !output.status.success() {
            return Ok(None);
        }
        Ok(Some(String::from_utf8(output.stdout)?))
    }

    fn uncommitted_files(&self, paths: &[&str]) -> Result<Vec<String>, ThaloError> {
        if paths.is_empty() {
            return Ok(vec![]);
        }
        let mut args = vec!["status", "--porcelain=v1", "-z", "--untracked-files=all", "--"];
        args.extend_from_slice(paths);
        let out = self.git_ok(&args)?;
        let mut tokens = out.split('\0').filter(|t| !t.is_empty());
        let mut files = vec![];
        while let Some(record) = tokens.next() {
            let (status, path) = record.split_at(record.len().min(3));
            if status.starts_with('R') || status.starts_with('C') {
                // the original path follows as its own record
                tokens.next();
            }
            files.extend(self.relative(path));
        }
        files.sort();
        files.dedup();
        Ok(files)
    }

    fn blame_lines(
        &self,
        path: &str,
        start: usize,
        end: usize,
        ignore_revs: Option<&Path>,
    ) -> Result<Vec<String>, ThaloError> {
        let range = format!("{start},{end}");
        let ignore = ignore_revs.map(|p| p.to_string_lossy().into_owned());
        let mut args = vec!["blame", "--porcelain", "-L", range.as_str()];
        if let Some(ignore) = &ignore {
            args.push("--ignore-revs-file");
            args.push(ignore.as_str());
        }
        args.push("--");
        args.push(path);
        let out = self.git_ok(&args)?;
        Ok(out
            .lines()
            .filter_map(|line| line.split(' ').next().filter(|t| is_commit_hash(t)))
            .map(str::to_string)
            .collect())
    }

    fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool, ThaloError> {
        let output = self.git(&["merge-base", "--is-ancestor", ancestor, descendant])?;
        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(ThaloError::Vcs(format!(
                "git merge-base --is-ancestor {ancestor} {descendant} failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ))),
        }
    }
}
