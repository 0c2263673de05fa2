//! External Provider Integration Tests
//!
//! Runs the engine against a scripted stdio MCP server (a small python
//! process speaking newline-delimited JSON-RPC) to cover provider
//! discovery, mixed internal/external batches, and provider-side
//! failures halting a batch.

use std::fs;
use std::sync::Arc;

use tempfile::TempDir;

use mcp_sidecar::services::internal::InternalTools;
use mcp_sidecar::services::mcp_client::{McpClient, McpServerConfig, McpTransportConfig};
use mcp_sidecar::{BatchState, BufferSink, Engine, Router, ToolRegistry};

const MOCK_SERVER: &str = r#"
import sys, json

def respond(request_id, result):
    response = {"jsonrpc": "2.0", "id": request_id, "result": result}
    sys.stdout.write(json.dumps(response) + "\n")
    sys.stdout.flush()

for line in sys.stdin:
    line = line.strip()
    if not line:
        continue
    try:
        msg = json.loads(line)
    except:
        continue

    method = msg.get("method", "")
    msg_id = msg.get("id")

    if method == "initialize":
        respond(msg_id, {
            "protocolVersion": "2024-11-05",
            "capabilities": {"tools": {}},
            "serverInfo": {"name": "mock", "version": "0.1.0"}
        })
    elif method == "notifications/initialized":
        pass
    elif method == "tools/list":
        respond(msg_id, {
            "tools": [
                {
                    "name": "echo",
                    "description": "Echoes the input",
                    "inputSchema": {
                        "type": "object",
                        "properties": {"message": {"type": "string"}},
                        "required": ["message"]
                    }
                },
                {
                    "name": "fail",
                    "description": "Always reports an error",
                    "inputSchema": {"type": "object"}
                }
            ]
        })
    elif method == "tools/call":
        params = msg.get("params", {})
        if params.get("name") == "echo":
            message = params.get("arguments", {}).get("message", "")
            respond(msg_id, {"content": [{"type": "text", "text": message}]})
        else:
            respond(msg_id, {
                "isError": True,
                "content": [{"type": "text", "text": "intentional failure"}]
            })
"#;

async fn engine_with_mock_server() -> (TempDir, Engine, Arc<BufferSink>) {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("hello.txt"), "hello from disk").unwrap();

    let script_path = dir.path().join("mock_mcp_server.py");
    fs::write(&script_path, MOCK_SERVER).unwrap();

    let config = McpServerConfig {
        name: "mock".to_string(),
        transport: McpTransportConfig::Stdio {
            command: "python3".to_string(),
            args: vec![script_path.to_string_lossy().to_string()],
            env: Default::default(),
        },
    };
    let client = McpClient::connect(&config).await.unwrap();

    let mut registry = ToolRegistry::new(InternalTools::new(dir.path()));
    registry.register(Arc::new(client));

    let sink = Arc::new(BufferSink::new());
    let engine = Engine::new(Router::new(Arc::new(registry)), sink.clone());
    (dir, engine, sink)
}

#[tokio::test]
async fn test_provider_tools_in_catalog() {
    let (_dir, engine, _sink) = engine_with_mock_server().await;

    let response = engine.execute_text("mcp:internal:list()").await;
    assert!(response.success, "error: {:?}", response.error);
    let text = response.data.unwrap();
    assert!(text.contains("SERVER: mock"));
    assert!(text.contains("echo"));
    assert!(text.contains("SERVER: internal"));
}

#[tokio::test]
async fn test_provider_call_from_command_text() {
    let (_dir, engine, sink) = engine_with_mock_server().await;

    let response = engine
        .execute_text(r#"mcp:mock:echo({"message": "round trip"})"#)
        .await;
    assert!(response.success);
    assert_eq!(response.data.as_deref(), Some("round trip"));
    assert_eq!(sink.written().as_deref(), Some("round trip"));
}

#[tokio::test]
async fn test_mixed_internal_and_provider_batch() {
    let (_dir, engine, _sink) = engine_with_mock_server().await;

    engine.load_batch(
        "mcp:internal:read_file({path: \"hello.txt\"})\n\
         mcp:mock:echo({message: \"from provider\"})",
    );
    let result = engine.run_batch().await.unwrap();
    assert_eq!(result.state, BatchState::Completed);
    assert!(result.report.contains("hello from disk"));
    assert!(result.report.contains("from provider"));
}

#[tokio::test]
async fn test_provider_error_flag_halts_batch() {
    let (_dir, engine, _sink) = engine_with_mock_server().await;

    engine.load_batch("mcp:mock:fail() mcp:mock:echo({message: \"never runs\"})");
    let result = engine.run_batch().await.unwrap();
    assert_eq!(result.state, BatchState::Failed);
    assert_eq!(result.failed_index, Some(0));
    assert!(result.report.contains("intentional failure"));
    assert!(!result.report.contains("never runs\n"));

    // The batch stays editable after the provider failure.
    assert_eq!(engine.batch().unwrap().commands.len(), 2);
}
