//! MCP Client
//!
//! JSON-RPC 2.0 client for external MCP (Model Context Protocol) tool
//! servers. Supports stdio (newline-delimited JSON to a child process)
//! and HTTP transports. Tool results arrive as content-block lists; the
//! text blocks are joined and a set `isError` flag is surfaced as a
//! provider error, never as ordinary output.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::services::types::ProviderToolInfo;
use crate::utils::error::{AppError, AppResult};

/// Wire protocol revision sent in the initialize handshake.
const PROTOCOL_VERSION: &str = "2024-11-05";

/// How long to wait for a single response before giving up.
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for connecting to an MCP server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Server id used in commands (`mcp:<name>:<tool>`)
    pub name: String,
    /// Transport type
    pub transport: McpTransportConfig,
}

/// Transport-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum McpTransportConfig {
    /// Stdio transport: spawn a child process
    #[serde(rename = "stdio")]
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    /// HTTP transport: connect to a remote server
    #[serde(rename = "http")]
    Http {
        base_url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
}

/// Information about a connected MCP server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerInfo {
    /// Server name
    pub name: String,
    /// Protocol version
    pub protocol_version: String,
    /// Server capabilities
    pub capabilities: Value,
    /// Server-provided metadata
    pub server_info: Value,
}

/// JSON-RPC 2.0 request
#[derive(Debug, Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    id: u64,
    method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

/// JSON-RPC 2.0 response
#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[allow(dead_code)]
    jsonrpc: String,
    #[allow(dead_code)]
    id: Option<u64>,
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error
#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
    #[allow(dead_code)]
    data: Option<Value>,
}

struct StdioTransport {
    process: Child,
    stdin: tokio::process::ChildStdin,
    stdout_reader: BufReader<tokio::process::ChildStdout>,
}

struct HttpTransport {
    base_url: String,
    client: reqwest::Client,
    headers: HashMap<String, String>,
}

enum ActiveTransport {
    Stdio(StdioTransport),
    Http(HttpTransport),
}

/// Client for one connected MCP server
pub struct McpClient {
    name: String,
    transport: Mutex<ActiveTransport>,
    server_info: McpServerInfo,
    request_id: AtomicU64,
}

impl McpClient {
    /// Connect and perform the MCP initialization handshake:
    /// `initialize` request, capability exchange, then the
    /// `notifications/initialized` notification.
    pub async fn connect(config: &McpServerConfig) -> AppResult<Self> {
        let transport = match &config.transport {
            McpTransportConfig::Stdio { command, args, env } => {
                ActiveTransport::Stdio(Self::spawn_stdio(&config.name, command, args, env)?)
            }
            McpTransportConfig::Http { base_url, headers } => {
                let client = reqwest::Client::builder()
                    .timeout(RESPONSE_TIMEOUT)
                    .build()
                    .map_err(|e| {
                        AppError::command(format!("Failed to create HTTP client: {}", e))
                    })?;
                ActiveTransport::Http(HttpTransport {
                    base_url: base_url.trim_end_matches('/').to_string(),
                    client,
                    headers: headers.clone(),
                })
            }
        };

        let mut client = Self {
            name: config.name.clone(),
            transport: Mutex::new(transport),
            server_info: McpServerInfo {
                name: config.name.clone(),
                protocol_version: String::new(),
                capabilities: Value::Null,
                server_info: Value::Null,
            },
            request_id: AtomicU64::new(1),
        };

        client.server_info = client.initialize().await?;
        Ok(client)
    }

    fn spawn_stdio(
        name: &str,
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> AppResult<StdioTransport> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (key, value) in env {
            cmd.env(key, value);
        }

        let mut process = cmd.spawn().map_err(|e| {
            AppError::command(format!(
                "Failed to spawn MCP server '{}' (command: {}): {}",
                name, command, e
            ))
        })?;

        let stdin = process.stdin.take().ok_or_else(|| {
            AppError::command(format!("Failed to capture stdin for MCP server '{}'", name))
        })?;
        let stdout = process.stdout.take().ok_or_else(|| {
            AppError::command(format!(
                "Failed to capture stdout for MCP server '{}'",
                name
            ))
        })?;

        Ok(StdioTransport {
            process,
            stdin,
            stdout_reader: BufReader::new(stdout),
        })
    }

    async fn initialize(&self) -> AppResult<McpServerInfo> {
        let params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "mcp-sidecar",
                "version": env!("CARGO_PKG_VERSION")
            }
        });

        let response = self.send_request("initialize", Some(params)).await?;
        let result = response.result.ok_or_else(|| {
            let detail = response
                .error
                .map(|e| format!("code={}, message={}", e.code, e.message))
                .unwrap_or_else(|| "No result in initialize response".to_string());
            AppError::command(format!(
                "MCP server '{}' initialization failed: {}",
                self.name, detail
            ))
        })?;

        self.send_notification("notifications/initialized").await?;

        Ok(McpServerInfo {
            name: self.name.clone(),
            protocol_version: result
                .get("protocolVersion")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string(),
            capabilities: result
                .get("capabilities")
                .cloned()
                .unwrap_or_else(|| Value::Object(serde_json::Map::new())),
            server_info: result
                .get("serverInfo")
                .cloned()
                .unwrap_or_else(|| Value::Object(serde_json::Map::new())),
        })
    }

    /// Server id this client is registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handshake results from the connected server.
    pub fn server_info(&self) -> &McpServerInfo {
        &self.server_info
    }

    /// List all tools available on the connected server.
    pub async fn list_tools(&self) -> AppResult<Vec<ProviderToolInfo>> {
        let response = self.send_request("tools/list", None).await?;
        let result = response.result.ok_or_else(|| {
            let detail = response
                .error
                .map(|e| format!("code={}, message={}", e.code, e.message))
                .unwrap_or_else(|| "No result in tools/list response".to_string());
            AppError::command(format!("tools/list failed: {}", detail))
        })?;

        let tools = result
            .get("tools")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default()
            .iter()
            .map(|tool| ProviderToolInfo {
                name: tool
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string(),
                description: tool
                    .get("description")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string(),
                input_schema: tool
                    .get("inputSchema")
                    .cloned()
                    .unwrap_or_else(|| serde_json::json!({"type": "object"})),
            })
            .collect();

        Ok(tools)
    }

    /// Call a tool on the connected server.
    ///
    /// Text content blocks are joined with newlines; non-text results
    /// come back as the raw structured value. A set `isError` flag on
    /// the result becomes a provider error carrying the joined text.
    pub async fn call_tool(&self, name: &str, args: Value) -> AppResult<Value> {
        let params = serde_json::json!({
            "name": name,
            "arguments": args,
        });

        let response = self.send_request("tools/call", Some(params)).await?;
        if let Some(error) = response.error {
            return Err(AppError::command(format!(
                "MCP tool '{}' call failed: [{}] {}",
                name, error.code, error.message
            )));
        }

        let result = response.result.unwrap_or(Value::Null);
        let is_error = result
            .get("isError")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let text = result
            .get("content")
            .and_then(|v| v.as_array())
            .map(|blocks| {
                blocks
                    .iter()
                    .filter_map(|block| block.get("text").and_then(|v| v.as_str()))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .filter(|joined| !joined.is_empty());

        if is_error {
            return Err(AppError::provider(
                text.unwrap_or_else(|| format!("Tool '{}' reported an error", name)),
            ));
        }

        match text {
            Some(joined) => Ok(Value::String(joined)),
            None => Ok(result),
        }
    }

    /// Disconnect from the server, killing a stdio child process.
    pub async fn disconnect(&self) -> AppResult<()> {
        let mut transport = self.transport.lock().await;
        if let ActiveTransport::Stdio(ref mut stdio) = *transport {
            let _ = stdio.stdin.shutdown().await;
            let _ = stdio.process.kill().await;
        }
        Ok(())
    }

    async fn send_request(&self, method: &str, params: Option<Value>) -> AppResult<JsonRpcResponse> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: self.request_id.fetch_add(1, Ordering::SeqCst),
            method: method.to_string(),
            params,
        };

        let mut transport = self.transport.lock().await;
        match &mut *transport {
            ActiveTransport::Stdio(ref mut stdio) => {
                let msg = serde_json::to_string(&request)?;
                write_stdio_line(&mut stdio.stdin, &msg).await?;
                read_stdio_response(&mut stdio.stdout_reader).await
            }
            ActiveTransport::Http(ref http) => send_http_request(http, &request).await,
        }
    }

    /// Fire-and-forget notification; failures over HTTP are ignored.
    async fn send_notification(&self, method: &str) -> AppResult<()> {
        let notification = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": {}
        });

        let mut transport = self.transport.lock().await;
        match &mut *transport {
            ActiveTransport::Stdio(ref mut stdio) => {
                let msg = serde_json::to_string(&notification)?;
                write_stdio_line(&mut stdio.stdin, &msg).await
            }
            ActiveTransport::Http(ref http) => {
                let url = format!("{}/jsonrpc", http.base_url);
                let _ = http.client.post(&url).json(&notification).send().await;
                Ok(())
            }
        }
    }
}

async fn write_stdio_line(stdin: &mut tokio::process::ChildStdin, msg: &str) -> AppResult<()> {
    stdin
        .write_all(msg.as_bytes())
        .await
        .map_err(|e| AppError::command(format!("Failed to write to MCP server stdin: {}", e)))?;
    stdin
        .write_all(b"\n")
        .await
        .map_err(|e| AppError::command(format!("Failed to write newline: {}", e)))?;
    stdin
        .flush()
        .await
        .map_err(|e| AppError::command(format!("Failed to flush stdin: {}", e)))?;
    Ok(())
}

/// Read lines until one parses as a JSON-RPC response; servers are
/// allowed to emit log lines on stdout and those are skipped.
async fn read_stdio_response(
    reader: &mut BufReader<tokio::process::ChildStdout>,
) -> AppResult<JsonRpcResponse> {
    let mut line = String::new();
    loop {
        line.clear();
        let bytes_read = tokio::time::timeout(RESPONSE_TIMEOUT, reader.read_line(&mut line))
            .await
            .map_err(|_| AppError::command("Timeout waiting for MCP server response".to_string()))?
            .map_err(|e| {
                AppError::command(format!("Failed to read from MCP server stdout: {}", e))
            })?;

        if bytes_read == 0 {
            return Err(AppError::command(
                "MCP server closed stdout (process may have crashed)".to_string(),
            ));
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Ok(response) = serde_json::from_str::<JsonRpcResponse>(trimmed) {
            return Ok(response);
        }
    }
}

async fn send_http_request(
    transport: &HttpTransport,
    request: &JsonRpcRequest,
) -> AppResult<JsonRpcResponse> {
    let url = format!("{}/jsonrpc", transport.base_url);

    let mut builder = transport
        .client
        .post(&url)
        .header("Content-Type", "application/json");
    for (key, value) in &transport.headers {
        builder = builder.header(key, value);
    }

    let body = serde_json::to_string(request)?;
    let response = builder
        .body(body)
        .send()
        .await
        .map_err(|e| AppError::command(format!("HTTP request failed: {}", e)))?;

    if !response.status().is_success() {
        return Err(AppError::command(format!(
            "MCP server returned HTTP {}: {}",
            response.status(),
            response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string())
        )));
    }

    let text = response
        .text()
        .await
        .map_err(|e| AppError::command(format!("Failed to read response body: {}", e)))?;

    serde_json::from_str::<JsonRpcResponse>(&text)
        .map_err(|e| AppError::command(format!("Failed to parse JSON-RPC response: {}", e)))
}
