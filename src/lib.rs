//! MCP Sidecar Engine
//!
//! Command interpretation and execution pipeline for an MCP-backed
//! command palette: scans free-form text for `mcp:server:tool(args)`
//! invocations, routes each to the built-in tool set or an external
//! MCP server, executes them singly or as fail-fast batches, and
//! assembles canonical text reports for an output sink.

pub mod config;
pub mod services;
pub mod utils;

pub use config::{load_mcp_config, EngineConfig};
pub use services::{
    scan_commands, BatchFailurePolicy, BatchRunResult, BatchState, BufferSink, Engine,
    InvokeResponse, OutputSink, ParsedCommand, PendingBatch, Router, ToolPayload, ToolProvider,
    ToolRegistry,
};
pub use utils::error::{AppError, AppResult};
