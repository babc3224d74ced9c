//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use std::{
    path::{Path, PathBuf},
    process::Command,
};
use tempfile::TempDir;

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times; later calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// A lore schema with one required field, one optional link field and a Content section.
#[allow(dead_code)]
pub const LORE_SCHEMA: &str = r#"2026-01-01T00:00Z define-entity lore "Lore"
  # Metadata
  type: "fact" | "insight"
  subject?: link
  # Sections
  Content
"#;

/// Write `files` (relative path, contents) below `<temp_dir>/kb` and return that directory.
#[allow(dead_code)]
pub fn write_files(temp_dir: &TempDir, files: &[(&str, &str)]) -> PathBuf {
    let root = temp_dir.path().join("kb");
    std::fs::create_dir_all(&root).unwrap();
    for (path, contents) in files {
        let path = root.join(path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, contents).unwrap();
    }
    root
}

/// Whether a usable `git` binary is on the path.
#[allow(dead_code)]
pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

/// Run git in `dir`, panicking on failure. Returns trimmed stdout.
#[allow(dead_code)]
pub fn git(dir: &Path, args: &[&str]) -> String {
    let out = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_NAME", "Test")
        .env("GIT_AUTHOR_EMAIL", "test@example.com")
        .env("GIT_COMMITTER_NAME", "Test")
        .env("GIT_COMMITTER_EMAIL", "test@example.com")
        .output()
        .unwrap();
    assert!(
        out.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8_lossy(&out.stdout).trim().to_string()
}

/// Initialize a repository at `dir` with a single commit of everything in it.
#[allow(dead_code)]
pub fn init_repo(dir: &Path) -> String {
    git(dir, &["init", "-q"]);
    git(dir, &["config", "commit.gpgsign", "false"]);
    commit_all(dir, "initial")
}

/// Stage and commit everything under `dir`, returning the new HEAD.
#[allow(dead_code)]
pub fn commit_all(dir: &Path, message: &str) -> String {
    git(dir, &["add", "-A"]);
    git(dir, &["commit", "-q", "-m", message]);
    git(dir, &["rev-parse", "HEAD"])
}
