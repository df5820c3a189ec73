//! Git lookups used to fill in a release's commit when the caller omits it.

use std::path::Path;
use std::process::Command;

use crate::domain::{PipelineError, Result};

fn rev_parse(repo_dir: &Path, rev: &str) -> Result<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--verify", "--quiet"])
        .arg(format!("{rev}^{{commit}}"))
        .current_dir(repo_dir)
        .output()
        .map_err(|e| PipelineError::Upstream(format!("failed to run git: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PipelineError::Upstream(format!(
            "git rev-parse {rev} failed: {}",
            stderr.trim()
        )));
    }

    let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if sha.is_empty() {
        return Err(PipelineError::Upstream(format!(
            "git rev-parse {rev} returned empty output"
        )));
    }
    Ok(sha)
}

/// HEAD commit SHA of the repository containing `repo_dir`.
pub fn capture_head_sha(repo_dir: &Path) -> Result<String> {
    rev_parse(repo_dir, "HEAD")
}

/// Commit a tag points at, falling back to HEAD when the tag does not
/// exist locally yet.
pub fn resolve_commit_for_tag(repo_dir: &Path, tag: &str) -> Result<String> {
    rev_parse(repo_dir, tag).or_else(|_| capture_head_sha(repo_dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command as StdCommand;

    fn git_available() -> bool {
        StdCommand::new("git")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn run_git(repo_dir: &Path, args: &[&str]) {
        let output = StdCommand::new("git")
            .args(args)
            .current_dir(repo_dir)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    fn make_git_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        run_git(dir.path(), &["init", "--quiet"]);
        run_git(dir.path(), &["config", "user.name", "release-bot"]);
        run_git(dir.path(), &["config", "user.email", "release-bot@example.com"]);
        run_git(dir.path(), &["config", "commit.gpgsign", "false"]);
        run_git(dir.path(), &["config", "tag.gpgsign", "false"]);
        run_git(dir.path(), &["commit", "--allow-empty", "-m", "initial"]);
        dir
    }

    #[test]
    fn head_sha_is_40_hex_chars() {
        if !git_available() {
            return;
        }
        let repo = make_git_repo();
        let sha = capture_head_sha(repo.path()).unwrap();
        assert_eq!(sha.len(), 40, "SHA should be 40 hex chars, got: {sha}");
        assert!(sha.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn tag_resolves_to_tagged_commit() {
        if !git_available() {
            return;
        }
        let repo = make_git_repo();
        run_git(repo.path(), &["tag", "-a", "v1.0.0-rc.1", "-m", "rc"]);
        let tagged = capture_head_sha(repo.path()).unwrap();
        run_git(repo.path(), &["commit", "--allow-empty", "-m", "next"]);

        assert_eq!(resolve_commit_for_tag(repo.path(), "v1.0.0-rc.1").unwrap(), tagged);
        assert_ne!(capture_head_sha(repo.path()).unwrap(), tagged);
    }

    #[test]
    fn unknown_tag_falls_back_to_head() {
        if !git_available() {
            return;
        }
        let repo = make_git_repo();
        let head = capture_head_sha(repo.path()).unwrap();
        assert_eq!(resolve_commit_for_tag(repo.path(), "v9.9.9").unwrap(), head);
    }

    #[test]
    fn fails_outside_repo() {
        let dir = tempfile::tempdir().unwrap();
        let err = capture_head_sha(dir.path()).unwrap_err();
        assert_eq!(err.kind(), "upstream");
    }
}
