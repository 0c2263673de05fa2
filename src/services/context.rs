//! Context Macros
//!
//! Prebuilt multi-tool flows that assemble a large context block in one
//! shot: a project onboarding context (tool catalog plus structure
//! tree) and a code-review packet (per-file diff plus full content for
//! every changed file). Sub-requests are independent reads, so they run
//! concurrently; these flows share no state with batch execution.

use futures_util::future::join_all;
use serde_json::json;

use crate::services::formatter::language_for_path;
use crate::services::router::Router;
use crate::services::types::ToolPayload;
use crate::utils::error::{AppError, AppResult};

/// Build the onboarding context: protocol text, the full tool catalog,
/// and a depth-3 project tree.
pub async fn generate_context(router: &Router, protocol_prompt: &str) -> AppResult<String> {
    let (list_result, tree_result) = tokio::join!(
        router.invoke("internal", "list", json!({})),
        router.invoke("internal", "get_tree", json!({"root": ".", "depth": 3})),
    );

    let tools_section = match list_result? {
        ToolPayload::Catalog(entries) => {
            let lines: Vec<String> = entries
                .iter()
                .map(|t| format!("- `mcp:{}:{}`: {}", t.server, t.name, t.description))
                .collect();
            format!("## Available Tools\n{}", lines.join("\n"))
        }
        _ => String::new(),
    };

    let tree = tree_result?;
    let tree_section = format!(
        "## Project Structure\n```\n{}\n```",
        tree.as_text().unwrap_or_default()
    );

    Ok([
        "# System Context Initialization",
        "",
        "## Protocol & Instructions",
        protocol_prompt,
        "",
        &tools_section,
        "",
        &tree_section,
        "",
        "Ready.",
    ]
    .join("\n"))
}

/// Build the review packet: for every changed file, its diff against
/// HEAD and its full current content. File reads run concurrently; a
/// file that fails to read contributes a placeholder section instead of
/// failing the whole packet.
pub async fn generate_review(router: &Router, review_prompt: &str) -> AppResult<String> {
    let files = match router.invoke("internal", "git_changed_files", json!({})).await? {
        ToolPayload::Listing(files) => files,
        _ => Vec::new(),
    };
    if files.is_empty() {
        return Err(AppError::not_found("No modified files found."));
    }

    tracing::info!("[Context] Gathering diff & content for {} files", files.len());

    let reports = join_all(files.iter().map(|path| file_report(router, path))).await;

    let mut out = vec![
        "# Code Review Request".to_string(),
        String::new(),
        review_prompt.to_string(),
        String::new(),
        "## File Analysis".to_string(),
    ];
    out.extend(reports);
    Ok(out.join("\n"))
}

async fn file_report(router: &Router, path: &str) -> String {
    let (diff_result, content_result) = tokio::join!(
        router.invoke("internal", "get_file_diff", json!({"path": path})),
        router.invoke("internal", "read_file", json!({"path": path})),
    );

    let diff = diff_result
        .ok()
        .and_then(|p| p.as_text().map(String::from))
        .unwrap_or_else(|| "(No diff info)".to_string());
    let content = content_result
        .ok()
        .and_then(|p| p.as_text().map(String::from))
        .unwrap_or_else(|| "(Error reading content)".to_string());

    [
        format!("\n=== FILE REPORT: {} ===", path),
        "\n[PART 1: CHANGES (Git Diff)]".to_string(),
        format!("file: {} (diff)", path),
        "```diff".to_string(),
        diff,
        "```".to_string(),
        "\n[PART 2: FULL CURRENT CONTENT]".to_string(),
        format!("file: {}", path),
        format!("```{}", language_for_path(path)),
        content,
        "```".to_string(),
    ]
    .join("\n")
}
