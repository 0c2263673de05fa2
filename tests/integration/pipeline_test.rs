//! Pipeline Integration Tests
//!
//! Drives the whole path from free-form text to a finished report: the
//! scanner stages commands, the engine routes them through the internal
//! tools in a real temporary project, and the formatted report lands in
//! the sink.

use std::fs;
use std::sync::Arc;

use tempfile::TempDir;

use mcp_sidecar::services::context::{generate_context, generate_review};
use mcp_sidecar::services::git::GitService;
use mcp_sidecar::services::internal::InternalTools;
use mcp_sidecar::{
    BatchState, BufferSink, Engine, Router, ToolRegistry,
};

fn project_fixture() -> (TempDir, Engine, Arc<BufferSink>) {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("src")).unwrap();
    fs::write(dir.path().join("src/main.ts"), "const a = 1;").unwrap();
    fs::write(dir.path().join("notes.md"), "# notes\n").unwrap();

    let registry = ToolRegistry::new(InternalTools::new(dir.path()));
    let sink = Arc::new(BufferSink::new());
    let engine = Engine::new(Router::new(Arc::new(registry)), sink.clone());
    (dir, engine, sink)
}

async fn git_fixture() -> (TempDir, Engine, Arc<BufferSink>) {
    let (dir, engine, sink) = project_fixture();
    let git = GitService::new();
    git.execute(dir.path(), &["init"]).await.unwrap();
    git.execute(dir.path(), &["config", "user.email", "test@test.local"])
        .await
        .unwrap();
    git.execute(dir.path(), &["config", "user.name", "Test"])
        .await
        .unwrap();
    git.execute(dir.path(), &["add", "."]).await.unwrap();
    git.execute(dir.path(), &["commit", "-m", "initial"])
        .await
        .unwrap();
    (dir, engine, sink)
}

#[tokio::test]
async fn test_single_command_from_text() {
    let (_dir, engine, sink) = project_fixture();

    let response = engine
        .execute_text(r#"please run mcp:internal:read_file({"path": "src/main.ts"}) for me"#)
        .await;

    assert!(response.success, "error: {:?}", response.error);
    let text = response.data.unwrap();
    assert_eq!(text, "file: src/main.ts\n```typescript\nconst a = 1;\n```");
    assert_eq!(sink.written().as_deref(), Some(text.as_str()));
}

#[tokio::test]
async fn test_batch_over_internal_tools() {
    let (_dir, engine, sink) = project_fixture();

    let staged = engine.load_batch(
        "mcp:internal:get_tree({depth: 2})\n\
         mcp:internal:list_directory({path: \"src\"})\n\
         mcp:internal:read_file({path: \"notes.md\"})",
    );
    assert_eq!(staged, 3);

    let result = engine.run_batch().await.unwrap();
    assert_eq!(result.state, BatchState::Completed);
    assert_eq!(result.report.matches("### [CMD]").count(), 3);
    assert!(result.report.contains("main.ts"));
    assert!(result.report.contains("# notes"));

    // Batch cleared and report written.
    assert!(engine.batch().is_none());
    assert_eq!(sink.written().unwrap(), result.report);
}

#[tokio::test]
async fn test_batch_fail_fast_on_missing_file() {
    let (_dir, engine, sink) = project_fixture();

    engine.load_batch(
        "mcp:internal:read_file({path: \"notes.md\"})\n\
         mcp:internal:read_file({path: \"missing.txt\"})\n\
         mcp:internal:get_tree()",
    );

    let result = engine.run_batch().await.unwrap();
    assert_eq!(result.state, BatchState::Failed);
    assert_eq!(result.failed_index, Some(1));
    assert_eq!(result.report.matches("### [CMD]").count(), 1);
    assert_eq!(result.report.matches("### [CMD FAILED]").count(), 1);

    // Batch retained for editing; partial report written by default.
    let batch = engine.batch().unwrap();
    assert_eq!(batch.commands.len(), 3);
    assert_eq!(sink.written().unwrap(), result.report);

    // Removing the offender and re-running completes.
    engine.remove_command(1).unwrap();
    let rerun = engine.run_batch().await.unwrap();
    assert_eq!(rerun.state, BatchState::Completed);
    assert!(engine.batch().is_none());
}

#[tokio::test]
async fn test_path_traversal_is_rejected() {
    let (_dir, engine, sink) = project_fixture();

    let response = engine
        .execute_text(r#"mcp:internal:read_file({"path": "../../etc/passwd"})"#)
        .await;

    assert!(!response.success);
    assert!(response.error.unwrap().contains("Access denied"));
    assert!(sink.written().is_none());
}

#[tokio::test]
async fn test_unknown_server_reported() {
    let (_dir, engine, _sink) = project_fixture();
    let response = engine.execute_text("mcp:ghost:anything()").await;
    assert!(!response.success);
    assert!(response.error.unwrap().contains("Server 'ghost' not active"));
}

#[tokio::test]
async fn test_tool_catalog_command() {
    let (_dir, engine, _sink) = project_fixture();

    let response = engine
        .execute_text("mcp:internal:list({server: \"internal\"})")
        .await;
    assert!(response.success);
    let text = response.data.unwrap();
    assert!(text.starts_with("MCP TOOLS DETAILS"));
    assert!(text.contains("SERVER: internal"));
    assert!(text.contains("run_command"));
}

#[tokio::test]
async fn test_git_tools_in_batch() {
    let (dir, engine, _sink) = git_fixture().await;
    fs::write(dir.path().join("src/main.ts"), "const a = 2;").unwrap();

    engine.load_batch("mcp:internal:git_status() mcp:internal:git_diff()");
    let result = engine.run_batch().await.unwrap();
    assert_eq!(result.state, BatchState::Completed);
    assert!(result.report.contains("```text"));
    assert!(result.report.contains("```diff"));
    assert!(result.report.contains("main.ts"));
}

#[tokio::test]
async fn test_context_macro_end_to_end() {
    let (_dir, engine, _sink) = project_fixture();

    let context = generate_context(engine.router(), "Use the tools below.")
        .await
        .unwrap();
    assert!(context.contains("## Available Tools"));
    assert!(context.contains("- `mcp:internal:read_file`"));
    assert!(context.contains("## Project Structure"));
    assert!(context.contains("src/"));
}

#[tokio::test]
async fn test_review_macro_end_to_end() {
    let (dir, engine, _sink) = git_fixture().await;
    fs::write(dir.path().join("src/main.ts"), "const a = 42;").unwrap();

    let review = generate_review(engine.router(), "Review these changes:")
        .await
        .unwrap();
    assert!(review.contains("=== FILE REPORT: src/main.ts ==="));
    assert!(review.contains("+const a = 42;"));
    assert!(review.contains("```typescript"));
}
