//! Services
//!
//! The command interpretation and execution pipeline: scanner and
//! argument evaluator, tool registry and router, execution engine,
//! result formatter, and the output sinks behind them.

pub mod context;
pub mod engine;
pub mod formatter;
pub mod git;
pub mod internal;
pub mod mcp_client;
pub mod parser;
pub mod registry;
pub mod router;
pub mod sink;
pub mod types;

pub use engine::{BatchFailurePolicy, BatchRunResult, BatchState, Engine, PendingBatch};
pub use parser::{scan_commands, ParsedCommand};
pub use registry::{ToolProvider, ToolRegistry};
pub use router::Router;
pub use sink::{BufferSink, OutputSink};
pub use types::{CatalogEntry, DirEntryInfo, InvokeResponse, ProviderToolInfo, ToolPayload};
