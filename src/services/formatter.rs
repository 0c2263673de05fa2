//! Result Formatter
//!
//! Turns a normalized tool payload, plus the producing tool and its
//! arguments, into one canonical text block. Dispatch is an exhaustive
//! match over the payload variants; the producing tool only influences
//! the fence tag and header of plain-text payloads. Formatting is
//! deterministic: identical inputs always yield identical text.

use serde_json::Value;

use crate::services::types::{CatalogEntry, DirEntryInfo, ToolPayload};

/// Fence language tag inferred from a file path's extension.
pub fn language_for_path(path: &str) -> &'static str {
    let ext = path.rsplit('.').next().unwrap_or("");
    match ext {
        "ts" | "tsx" => "typescript",
        "js" | "jsx" => "javascript",
        "json" => "json",
        "html" => "html",
        "css" => "css",
        "md" => "markdown",
        "py" => "python",
        "go" => "go",
        "rs" => "rust",
        "java" => "java",
        "c" => "c",
        "cpp" => "cpp",
        "sh" => "bash",
        "yaml" | "yml" => "yaml",
        _ => "",
    }
}

/// Format one tool result into its canonical text block.
pub fn format_result(tool: &str, args: &Value, payload: &ToolPayload) -> String {
    match payload {
        ToolPayload::Listing(items) => format_listing(items),
        ToolPayload::Catalog(entries) => format_catalog(entries),
        ToolPayload::EntryList(entries) => format_entry_list(args, entries),
        ToolPayload::Structured(value) => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }
        ToolPayload::Text(text) => format_text(tool, args, text),
    }
}

fn format_listing(items: &[String]) -> String {
    if items.is_empty() {
        return "AVAILABLE ITEMS\n(none)".to_string();
    }
    let lines: Vec<String> = items.iter().map(|item| format!("- {}", item)).collect();
    format!("AVAILABLE ITEMS\n{}", lines.join("\n"))
}

/// Grouped-by-server tool catalog. Detailed mode (schemas present)
/// renders each tool's argument names, types, and required markers.
fn format_catalog(entries: &[CatalogEntry]) -> String {
    let detailed = entries.iter().any(|e| e.input_schema.is_some());

    // Group by server, preserving first-appearance order.
    let mut groups: Vec<(&str, Vec<&CatalogEntry>)> = Vec::new();
    for entry in entries {
        match groups.iter().position(|(server, _)| *server == entry.server) {
            Some(index) => groups[index].1.push(entry),
            None => groups.push((&entry.server, vec![entry])),
        }
    }

    let mut lines: Vec<String> = Vec::new();
    lines.push(
        if detailed {
            "MCP TOOLS DETAILS (Full Schema)\n"
        } else {
            "MCP TOOLS SUMMARY (Names Only)\n"
        }
        .to_string(),
    );
    if !detailed {
        lines.push("Tip: List a single server to see full schemas.\n".to_string());
    }

    for (server, tools) in groups {
        lines.push(format!("SERVER: {}", server));
        for tool in tools {
            lines.push(format!("  ├─ {}", tool.name));
            if !tool.description.is_empty() {
                lines.push(format!(
                    "  │    Desc: {}",
                    tool.description.replace('\n', " ")
                ));
            }
            if let Some(schema) = &tool.input_schema {
                lines.extend(format_schema_args(schema));
            }
            lines.push("  │".to_string());
        }
        lines.push(String::new());
    }
    lines.join("\n")
}

fn format_schema_args(schema: &Value) -> Vec<String> {
    let Some(props) = schema.get("properties").and_then(|v| v.as_object()) else {
        return Vec::new();
    };
    if props.is_empty() {
        return Vec::new();
    }
    let required: Vec<&str> = schema
        .get("required")
        .and_then(|v| v.as_array())
        .map(|items| items.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();

    let mut lines = vec!["  │    Args:".to_string()];
    for (key, prop) in props {
        let mut line = format!("  │      └─ {}", key);
        if required.contains(&key.as_str()) {
            line.push('*');
        }
        if let Some(arg_type) = prop.get("type").and_then(|v| v.as_str()) {
            line.push_str(&format!(" ({})", arg_type));
        }
        if let Some(desc) = prop.get("description").and_then(|v| v.as_str()) {
            line.push_str(&format!(": {}", desc));
        }
        lines.push(line);
    }
    lines
}

/// Directories (slash-suffixed) first, then files, inside a text fence
/// headed by the listed path.
fn format_entry_list(args: &Value, entries: &[DirEntryInfo]) -> String {
    let mut lines: Vec<String> = Vec::new();
    for entry in entries.iter().filter(|e| e.is_directory) {
        lines.push(format!("{}/", entry.name));
    }
    for entry in entries.iter().filter(|e| !e.is_directory) {
        lines.push(entry.name.clone());
    }

    let path = args.get("path").and_then(|v| v.as_str()).unwrap_or(".");
    format!("fold: {}\n```text\n{}\n```", path, lines.join("\n"))
}

fn format_text(tool: &str, args: &Value, text: &str) -> String {
    match tool {
        "read_file" => {
            if let Some(path) = args.get("path").and_then(|v| v.as_str()) {
                let lang = language_for_path(path);
                return format!("file: {}\n```{}\n{}\n```", path, lang, text);
            }
            text.to_string()
        }
        "get_tree" => {
            let root = args.get("root").and_then(|v| v.as_str()).unwrap_or(".");
            format!("fold: {}\n```text\n{}\n```", root, text)
        }
        "git_status" => format!("```text\n{}\n```", text),
        "git_diff" | "get_file_diff" => {
            let header = args
                .get("path")
                .and_then(|v| v.as_str())
                .map(|path| format!("file: {} (diff)\n", path))
                .unwrap_or_default();
            format!("{}```diff\n{}\n```", header, text)
        }
        _ => text.to_string(),
    }
}
