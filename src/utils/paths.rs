//! Path Resolution Utilities
//!
//! Resolves tool-supplied paths against the configured project root and
//! enforces the project boundary: no path-taking tool may read or write
//! outside the root, regardless of `..` segments or absolute inputs.

use std::path::{Component, Path, PathBuf};

use crate::utils::error::{AppError, AppResult};

/// Lexically normalize a path: drop `.` segments and resolve `..` against
/// preceding components. Does not touch the filesystem, so it works for
/// paths that do not exist yet.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(Component::ParentDir);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Resolve `input` against `root` and verify the result stays inside `root`.
///
/// Relative inputs are joined onto the root; absolute inputs are accepted
/// only when they already point inside it. Returns the normalized absolute
/// path on success.
pub fn resolve_in_root(root: &Path, input: &str) -> AppResult<PathBuf> {
    let candidate = if Path::new(input).is_absolute() {
        PathBuf::from(input)
    } else {
        root.join(input)
    };

    let resolved = normalize(&candidate);
    let root = normalize(root);

    if resolved.starts_with(&root) {
        Ok(resolved)
    } else {
        Err(AppError::access_denied(format!(
            "Path '{}' is outside the project root",
            input
        )))
    }
}

/// Render `path` relative to `root` for display, falling back to the
/// full path when it is not underneath the root.
pub fn display_relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .to_string()
}
