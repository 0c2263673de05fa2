//! Shared Engine Types
//!
//! The tool result payload is a closed tagged union rather than a
//! loosely-typed JSON value: the formatter dispatches on the variant
//! with an exhaustive match instead of sniffing array shapes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One entry in the tool catalog produced by the internal `list` tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Server providing the tool ("internal" or a provider id)
    pub server: String,
    /// Tool name
    pub name: String,
    /// Tool description
    #[serde(default)]
    pub description: String,
    /// JSON Schema for the tool's input; present only in detailed listings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
}

/// One filesystem entry produced by the internal `list_directory` tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirEntryInfo {
    /// Entry name (no path components)
    pub name: String,
    /// Whether the entry is a directory
    pub is_directory: bool,
    /// Path relative to the project root, for command back-fill in the UI
    pub path: String,
}

/// Information about a tool exposed by an external provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderToolInfo {
    /// Tool name (as provided by the server)
    pub name: String,
    /// Tool description
    pub description: String,
    /// JSON Schema for the tool's input parameters
    pub input_schema: Value,
}

/// Normalized result payload flowing from the router to the formatter.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolPayload {
    /// Plain text (file content, diffs, tree output, command output)
    Text(String),
    /// A flat list of plain identifiers (server names, changed files)
    Listing(Vec<String>),
    /// Tool catalog entries, grouped by server when formatted
    Catalog(Vec<CatalogEntry>),
    /// Directory entries with type flags
    EntryList(Vec<DirEntryInfo>),
    /// Any other structured value, rendered as indented JSON
    Structured(Value),
}

impl ToolPayload {
    /// Text content when the payload is plain text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ToolPayload::Text(s) => Some(s),
            _ => None,
        }
    }
}

// PartialEq on CatalogEntry/DirEntryInfo is only needed so ToolPayload can
// derive it for assertions in tests.
impl PartialEq for CatalogEntry {
    fn eq(&self, other: &Self) -> bool {
        self.server == other.server
            && self.name == other.name
            && self.description == other.description
            && self.input_schema == other.input_schema
    }
}

impl PartialEq for DirEntryInfo {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.is_directory == other.is_directory
            && self.path == other.path
    }
}

/// UI-facing result of a single invocation.
///
/// `success == false` implies `data` is irrelevant and `error` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokeResponse {
    /// Whether the invocation succeeded
    pub success: bool,
    /// Formatted result text (if successful)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// Error message (if failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InvokeResponse {
    /// Create a successful response
    pub fn ok(data: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data.into()),
            error: None,
        }
    }

    /// Create an error response
    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}
