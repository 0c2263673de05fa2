//! Integration Tests Module
//!
//! End-to-end coverage of the command pipeline: text scanning through
//! routing, execution, formatting, and sink output, against both the
//! internal tools and a scripted external MCP server.

// Scan -> route -> execute -> format pipeline tests
mod pipeline_test;

// External MCP provider tests (scripted stdio server)
mod mcp_provider_test;
