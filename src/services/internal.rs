//! Internal Tool Handlers
//!
//! The built-in pseudo-provider: project-tree rendering, directory
//! listing, file reads, version-control queries, and bounded shell
//! execution. Each handler validates its own arguments and resolves
//! path arguments against the project root. The `list` catalog tool is
//! declared here but dispatched by the registry, which also aggregates
//! external providers.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::process::Command;

use crate::services::git::GitService;
use crate::services::types::{CatalogEntry, DirEntryInfo, ToolPayload};
use crate::utils::error::{AppError, AppResult};
use crate::utils::paths::{display_relative, resolve_in_root};

/// Server id of the built-in pseudo-provider.
pub const INTERNAL_SERVER: &str = "internal";

/// Directory names pruned from tree renders.
const TREE_IGNORED: &[&str] = &[
    "node_modules",
    ".git",
    "dist",
    ".DS_Store",
    "coverage",
    "build",
    ".next",
    "target",
];

/// Shell commands refused outright.
const BLOCKED_COMMANDS: &[&str] = &[
    "rm -rf /",
    "rm -rf /*",
    "rm -rf ~",
    "rm -rf ~/",
    "> /dev/sda",
    "dd if=/dev/zero",
    "mkfs.",
    ":(){ :|:& };:",
    "chmod -R 777 /",
    "chown -R",
];

/// Default shell timeout in milliseconds
const DEFAULT_TIMEOUT_MS: u64 = 120_000;
/// Maximum shell timeout in milliseconds (10 minutes)
const MAX_TIMEOUT_MS: u64 = 600_000;
/// Shell output cap in bytes
const MAX_OUTPUT_LEN: usize = 30_000;

/// Default recursion depth for tree renders
const DEFAULT_TREE_DEPTH: u64 = 3;

/// Declared argument of an internal tool.
pub struct ToolArgSpec {
    pub name: &'static str,
    pub arg_type: &'static str,
    pub required: bool,
    pub description: &'static str,
}

/// Catalog definition of one internal tool.
pub struct InternalToolDef {
    pub name: &'static str,
    pub description: &'static str,
    pub args: &'static [ToolArgSpec],
}

/// The static internal tool table, in catalog order.
pub const INTERNAL_TOOLS: &[InternalToolDef] = &[
    InternalToolDef {
        name: "list",
        description: "List available tools. Args: server (string, optional)",
        args: &[ToolArgSpec {
            name: "server",
            arg_type: "string",
            required: false,
            description: "Filter tools by server name (e.g. 'git', 'fs')",
        }],
    },
    InternalToolDef {
        name: "get_tree",
        description: "Get project structure tree. Args: root (string, relative path), depth (number, default 3)",
        args: &[
            ToolArgSpec {
                name: "root",
                arg_type: "string",
                required: false,
                description: "Relative path to start tree from (e.g. 'src/components')",
            },
            ToolArgSpec {
                name: "depth",
                arg_type: "number",
                required: false,
                description: "Recursion depth (default 3)",
            },
        ],
    },
    InternalToolDef {
        name: "list_directory",
        description: "List files in directory (Internal)",
        args: &[ToolArgSpec {
            name: "path",
            arg_type: "string",
            required: false,
            description: "Relative path from project root",
        }],
    },
    InternalToolDef {
        name: "read_file",
        description: "Read file content (Internal)",
        args: &[ToolArgSpec {
            name: "path",
            arg_type: "string",
            required: true,
            description: "Relative path from project root",
        }],
    },
    InternalToolDef {
        name: "git_diff",
        description: "Show uncommitted changes (git diff)",
        args: &[],
    },
    InternalToolDef {
        name: "git_status",
        description: "Show working tree status (git status)",
        args: &[],
    },
    InternalToolDef {
        name: "git_changed_files",
        description: "List files that have changed (modified/added) relative to HEAD",
        args: &[],
    },
    InternalToolDef {
        name: "get_file_diff",
        description: "Get git diff for a specific file (shows old vs new code)",
        args: &[ToolArgSpec {
            name: "path",
            arg_type: "string",
            required: true,
            description: "Relative path to file",
        }],
    },
    InternalToolDef {
        name: "run_command",
        description: "Execute a shell command in the project root. Dangerous commands are blocked; output is size-capped.",
        args: &[
            ToolArgSpec {
                name: "command",
                arg_type: "string",
                required: true,
                description: "The command to execute",
            },
            ToolArgSpec {
                name: "timeout",
                arg_type: "number",
                required: false,
                description: "Timeout in milliseconds (default: 120000, max: 600000)",
            },
            ToolArgSpec {
                name: "working_dir",
                arg_type: "string",
                required: false,
                description: "Working directory, relative to the project root",
            },
        ],
    },
];

/// Build the JSON Schema for an internal tool's arguments.
fn input_schema(def: &InternalToolDef) -> Value {
    let mut properties = serde_json::Map::new();
    let mut required = Vec::new();
    for arg in def.args {
        properties.insert(
            arg.name.to_string(),
            json!({"type": arg.arg_type, "description": arg.description}),
        );
        if arg.required {
            required.push(Value::String(arg.name.to_string()));
        }
    }
    if required.is_empty() {
        json!({"type": "object", "properties": properties})
    } else {
        json!({"type": "object", "properties": properties, "required": required})
    }
}

/// The internal pseudo-provider.
pub struct InternalTools {
    root: PathBuf,
    git: GitService,
}

impl InternalTools {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            git: GitService::new(),
        }
    }

    /// The configured project root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Catalog entries for the internal tools.
    pub fn catalog(&self, detailed: bool) -> Vec<CatalogEntry> {
        INTERNAL_TOOLS
            .iter()
            .map(|def| CatalogEntry {
                server: INTERNAL_SERVER.to_string(),
                name: def.name.to_string(),
                description: def.description.to_string(),
                input_schema: detailed.then(|| input_schema(def)),
            })
            .collect()
    }

    /// Dispatch one internal tool call.
    ///
    /// `list` is not handled here; the registry owns catalog aggregation.
    pub async fn invoke(&self, tool: &str, args: &Value) -> AppResult<ToolPayload> {
        match tool {
            "get_tree" => self.get_tree(args),
            "list_directory" => self.list_directory(args),
            "read_file" => self.read_file(args).await,
            "git_diff" => Ok(ToolPayload::Text(self.git.diff(&self.root).await?)),
            "git_status" => Ok(ToolPayload::Text(self.git.status(&self.root).await?)),
            "git_changed_files" => Ok(ToolPayload::Listing(
                self.git.changed_files(&self.root).await?,
            )),
            "get_file_diff" => self.get_file_diff(args).await,
            "run_command" => self.run_command(args).await,
            other => Err(AppError::not_found(format!(
                "Unknown internal tool: {}",
                other
            ))),
        }
    }

    fn get_tree(&self, args: &Value) -> AppResult<ToolPayload> {
        let relative_root = args
            .get("root")
            .and_then(|v| v.as_str())
            .unwrap_or(".");
        let depth = number_arg(args, "depth").unwrap_or(DEFAULT_TREE_DEPTH);

        let target = resolve_in_root(&self.root, relative_root)?;
        let header = if relative_root == "." {
            "Project Root".to_string()
        } else {
            format!("{}/", relative_root)
        };
        let mut out = format!("{}\n", header);
        render_tree(&target, 0, depth, &mut out);
        Ok(ToolPayload::Text(out))
    }

    fn list_directory(&self, args: &Value) -> AppResult<ToolPayload> {
        let path = args.get("path").and_then(|v| v.as_str()).unwrap_or(".");
        let target = resolve_in_root(&self.root, path)?;

        let entries = match std::fs::read_dir(&target) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|entry| {
                    let is_directory = entry
                        .file_type()
                        .map(|t| t.is_dir())
                        .unwrap_or(false);
                    DirEntryInfo {
                        name: entry.file_name().to_string_lossy().to_string(),
                        is_directory,
                        path: display_relative(&self.root, &entry.path()),
                    }
                })
                .collect(),
            Err(e) => vec![DirEntryInfo {
                name: format!("Error: {}", e),
                is_directory: false,
                path: String::new(),
            }],
        };
        Ok(ToolPayload::EntryList(entries))
    }

    async fn read_file(&self, args: &Value) -> AppResult<ToolPayload> {
        let path = required_str(args, "path")?;
        let target = resolve_in_root(&self.root, path)?;
        let content = tokio::fs::read_to_string(&target).await.map_err(|e| {
            AppError::command(format!("Failed to read '{}': {}", path, e))
        })?;
        Ok(ToolPayload::Text(content))
    }

    async fn get_file_diff(&self, args: &Value) -> AppResult<ToolPayload> {
        let path = required_str(args, "path")?;
        // Boundary check only; git resolves the path itself.
        resolve_in_root(&self.root, path)?;
        Ok(ToolPayload::Text(self.git.file_diff(&self.root, path).await?))
    }

    async fn run_command(&self, args: &Value) -> AppResult<ToolPayload> {
        let command = required_str(args, "command")?;

        for blocked in BLOCKED_COMMANDS {
            if command.contains(blocked) {
                return Err(AppError::validation(format!(
                    "Command blocked for safety: contains '{}'",
                    blocked
                )));
            }
        }

        let timeout_ms = number_arg(args, "timeout")
            .unwrap_or(DEFAULT_TIMEOUT_MS)
            .min(MAX_TIMEOUT_MS);

        let working_dir = match args.get("working_dir").and_then(|v| v.as_str()) {
            Some(dir) => resolve_in_root(&self.root, dir)?,
            None => self.root.clone(),
        };

        #[cfg(windows)]
        let (shell, shell_arg) = ("cmd", "/C");
        #[cfg(not(windows))]
        let (shell, shell_arg) = ("sh", "-c");

        let mut child = Command::new(shell)
            .arg(shell_arg)
            .arg(command)
            .current_dir(&working_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| AppError::command(format!("Failed to spawn command: {}", e)))?;

        // Readers must drain the pipes while the child runs; a child
        // producing more than the OS pipe buffer would otherwise block
        // on write and never exit.
        let stdout_task = tokio::spawn(read_all(child.stdout.take()));
        let stderr_task = tokio::spawn(read_all(child.stderr.take()));

        let status = tokio::select! {
            status = child.wait() => status
                .map_err(|e| AppError::command(format!("Failed to execute command: {}", e)))?,
            _ = tokio::time::sleep(Duration::from_millis(timeout_ms)) => {
                let _ = child.kill().await;
                return Err(AppError::command(format!(
                    "Command timed out after {} ms",
                    timeout_ms
                )));
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();
        let stdout = String::from_utf8_lossy(&stdout);
        let stderr = String::from_utf8_lossy(&stderr);

        let mut text = String::new();
        if !stdout.is_empty() {
            text.push_str(&stdout);
        }
        if !stderr.is_empty() {
            if !text.is_empty() {
                text.push_str("\n\n--- stderr ---\n");
            }
            text.push_str(&stderr);
        }
        if text.len() > MAX_OUTPUT_LEN {
            // The byte cap may land inside a multibyte character.
            let mut cut = MAX_OUTPUT_LEN;
            while !text.is_char_boundary(cut) {
                cut -= 1;
            }
            text.truncate(cut);
            text.push_str("\n\n... (output truncated)");
        }

        if status.success() {
            Ok(ToolPayload::Text(if text.is_empty() {
                "Command completed successfully with no output".to_string()
            } else {
                text
            }))
        } else {
            Err(AppError::command(format!(
                "Command failed with exit code {}\n{}",
                status.code().unwrap_or(-1),
                text
            )))
        }
    }
}

async fn read_all(handle: Option<impl tokio::io::AsyncRead + Unpin>) -> Vec<u8> {
    use tokio::io::AsyncReadExt;
    let mut buf = Vec::new();
    if let Some(mut stream) = handle {
        let _ = stream.read_to_end(&mut buf).await;
    }
    buf
}

fn required_str<'a>(args: &'a Value, key: &str) -> AppResult<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::validation(format!("Missing required argument: {}", key)))
}

/// Numeric argument, tolerating string-encoded numbers.
fn number_arg(args: &Value, key: &str) -> Option<u64> {
    match args.get(key) {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Depth-limited directory render, directories first, ignored names pruned.
fn render_tree(dir: &Path, depth: u64, max_depth: u64, out: &mut String) {
    if depth >= max_depth {
        return;
    }
    let indent = "  ".repeat(depth as usize);
    let prefix = if depth == 0 { "" } else { "├── " };

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => {
            out.push_str(&format!("{}Error reading directory\n", indent));
            return;
        }
    };

    let mut items: Vec<(String, bool, PathBuf)> = entries
        .filter_map(|e| e.ok())
        .map(|entry| {
            let name = entry.file_name().to_string_lossy().to_string();
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            (name, is_dir, entry.path())
        })
        .filter(|(name, _, _)| !TREE_IGNORED.contains(&name.as_str()))
        .collect();

    items.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    for (name, is_dir, path) in items {
        if is_dir {
            out.push_str(&format!("{}{}{}/\n", indent, prefix, name));
            render_tree(&path, depth + 1, max_depth, out);
        } else {
            out.push_str(&format!("{}{}{}\n", indent, prefix, name));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn project() -> (TempDir, InternalTools) {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/lib.rs"), "pub fn a() {}\n").unwrap();
        fs::write(dir.path().join("README.md"), "# readme\n").unwrap();
        fs::create_dir(dir.path().join("node_modules")).unwrap();
        let tools = InternalTools::new(dir.path());
        (dir, tools)
    }

    #[test]
    fn test_catalog_schemas_only_when_detailed() {
        let (_dir, tools) = project();
        let summary = tools.catalog(false);
        assert!(summary.iter().all(|e| e.input_schema.is_none()));
        assert!(summary.iter().all(|e| e.server == "internal"));

        let detailed = tools.catalog(true);
        let read = detailed.iter().find(|e| e.name == "read_file").unwrap();
        let schema = read.input_schema.as_ref().unwrap();
        assert_eq!(schema["required"][0], "path");
    }

    #[tokio::test]
    async fn test_get_tree_renders_and_prunes() {
        let (_dir, tools) = project();
        let payload = tools.invoke("get_tree", &serde_json::json!({})).await.unwrap();
        let text = payload.as_text().unwrap();
        assert!(text.starts_with("Project Root\n"));
        assert!(text.contains("src/"));
        assert!(text.contains("├── lib.rs"));
        assert!(!text.contains("node_modules"));
    }

    #[tokio::test]
    async fn test_get_tree_depth_limit() {
        let (_dir, tools) = project();
        let payload = tools
            .invoke("get_tree", &serde_json::json!({"depth": 1}))
            .await
            .unwrap();
        let text = payload.as_text().unwrap();
        assert!(text.contains("src/"));
        assert!(!text.contains("lib.rs"));
    }

    #[tokio::test]
    async fn test_get_tree_subdirectory_header() {
        let (_dir, tools) = project();
        let payload = tools
            .invoke("get_tree", &serde_json::json!({"root": "src"}))
            .await
            .unwrap();
        assert!(payload.as_text().unwrap().starts_with("src/\n"));
    }

    #[tokio::test]
    async fn test_list_directory_entries() {
        let (_dir, tools) = project();
        let payload = tools
            .invoke("list_directory", &serde_json::json!({}))
            .await
            .unwrap();
        let ToolPayload::EntryList(entries) = payload else {
            panic!("expected entry list");
        };
        let src = entries.iter().find(|e| e.name == "src").unwrap();
        assert!(src.is_directory);
        assert_eq!(src.path, "src");
        let readme = entries.iter().find(|e| e.name == "README.md").unwrap();
        assert!(!readme.is_directory);
    }

    #[tokio::test]
    async fn test_read_file() {
        let (_dir, tools) = project();
        let payload = tools
            .invoke("read_file", &serde_json::json!({"path": "src/lib.rs"}))
            .await
            .unwrap();
        assert_eq!(payload.as_text().unwrap(), "pub fn a() {}\n");
    }

    #[tokio::test]
    async fn test_read_file_requires_path() {
        let (_dir, tools) = project();
        let err = tools
            .invoke("read_file", &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_path_escape_denied() {
        let (_dir, tools) = project();
        let err = tools
            .invoke("read_file", &serde_json::json!({"path": "../outside.txt"}))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AccessDenied(_)));
    }

    #[tokio::test]
    async fn test_run_command_echo() {
        let (_dir, tools) = project();
        let payload = tools
            .invoke("run_command", &serde_json::json!({"command": "echo hello"}))
            .await
            .unwrap();
        assert!(payload.as_text().unwrap().contains("hello"));
    }

    #[tokio::test]
    async fn test_run_command_blocked() {
        let (_dir, tools) = project();
        let err = tools
            .invoke("run_command", &serde_json::json!({"command": "rm -rf /"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("blocked"));
    }

    #[tokio::test]
    async fn test_run_command_caps_output_on_char_boundary() {
        let (_dir, tools) = project();
        // 1 + 30000 bytes of output; the cap lands inside a snowman.
        let command = r#"python3 -c "import sys; sys.stdout.write('a' + '☃' * 10000)""#;
        let payload = tools
            .invoke("run_command", &serde_json::json!({"command": command}))
            .await
            .unwrap();
        let text = payload.as_text().unwrap();
        assert!(text.ends_with("... (output truncated)"));
        assert!(text.len() <= MAX_OUTPUT_LEN + 30);
        assert!(text.starts_with('a'));
    }

    #[tokio::test]
    async fn test_run_command_drains_output_larger_than_pipe_buffer() {
        let (_dir, tools) = project();
        let command = r#"python3 -c "import sys; sys.stdout.write('x' * 200000)""#;
        let payload = tools
            .invoke(
                "run_command",
                &serde_json::json!({"command": command, "timeout": 5000}),
            )
            .await
            .unwrap();
        assert!(payload.as_text().unwrap().contains("... (output truncated)"));
    }

    #[tokio::test]
    async fn test_run_command_failure_reports_exit_code() {
        let (_dir, tools) = project();
        let err = tools
            .invoke("run_command", &serde_json::json!({"command": "exit 3"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exit code 3"));
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let (_dir, tools) = project();
        let err = tools
            .invoke("no_such_tool", &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
