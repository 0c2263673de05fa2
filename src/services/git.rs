//! Git Operations
//!
//! Thin wrapper around the git CLI for the version-control tools.
//! Commands run non-interactively in the project root.

use std::collections::BTreeSet;
use std::path::Path;

use tokio::process::Command;

use crate::utils::error::{AppError, AppResult};

/// Result of a git command execution
#[derive(Debug)]
pub struct GitResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl GitResult {
    /// Check if the command was successful and return stdout or error
    pub fn into_result(self) -> AppResult<String> {
        if self.success {
            Ok(self.stdout)
        } else {
            Err(AppError::command(format!(
                "Git command failed (exit {}): {}",
                self.exit_code,
                self.stderr.trim()
            )))
        }
    }
}

/// Safe git operations wrapper
#[derive(Debug, Default)]
pub struct GitService;

impl GitService {
    /// Create a new GitService instance
    pub fn new() -> Self {
        Self
    }

    /// Execute a git command in the specified directory
    pub async fn execute(&self, cwd: &Path, args: &[&str]) -> AppResult<GitResult> {
        let output = Command::new("git")
            .args(args)
            .current_dir(cwd)
            // Disable interactive prompts to avoid hanging automation flows.
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("GCM_INTERACTIVE", "never")
            .output()
            .await
            .map_err(|e| AppError::command(format!("Failed to execute git: {}", e)))?;

        Ok(GitResult {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    /// Working-tree status (`git status`).
    pub async fn status(&self, repo_path: &Path) -> AppResult<String> {
        self.execute(repo_path, &["status"]).await?.into_result()
    }

    /// Full unstaged diff, or a placeholder when the tree is clean.
    pub async fn diff(&self, repo_path: &Path) -> AppResult<String> {
        let output = self.execute(repo_path, &["diff"]).await?.into_result()?;
        if output.trim().is_empty() {
            Ok("No changes detected.".to_string())
        } else {
            Ok(output)
        }
    }

    /// All changed files: tracked changes against HEAD plus untracked
    /// files not covered by ignore rules, deduplicated, sorted.
    pub async fn changed_files(&self, repo_path: &Path) -> AppResult<Vec<String>> {
        // HEAD does not exist before the first commit; everything is
        // untracked then, so an empty tracked set is correct.
        let head_diff = self
            .execute(repo_path, &["diff", "--name-only", "HEAD"])
            .await?;
        let tracked = if head_diff.success {
            head_diff.stdout
        } else {
            String::new()
        };
        let untracked = self
            .execute(repo_path, &["ls-files", "--others", "--exclude-standard"])
            .await?
            .into_result()?;

        let mut files = BTreeSet::new();
        for line in tracked.lines().chain(untracked.lines()) {
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                files.insert(trimmed.to_string());
            }
        }
        Ok(files.into_iter().collect())
    }

    /// Diff for a single file against HEAD.
    ///
    /// Falls back to the staged diff for newly staged files; untracked
    /// files (where `git diff HEAD` fails) get a marker line instead of
    /// an error so per-file review flows keep going.
    pub async fn file_diff(&self, repo_path: &Path, path: &str) -> AppResult<String> {
        let head = self
            .execute(repo_path, &["diff", "HEAD", "--", path])
            .await?;
        if !head.success {
            return Ok("(New untracked file) - Entire content is new.".to_string());
        }
        if !head.stdout.trim().is_empty() {
            return Ok(head.stdout);
        }

        let cached = self
            .execute(repo_path, &["diff", "--cached", "--", path])
            .await?
            .into_result()?;
        if cached.trim().is_empty() {
            Ok("(No diff - File might be unchanged or new/untracked)".to_string())
        } else {
            Ok(cached)
        }
    }
}
