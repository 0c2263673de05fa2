//! Engine Configuration
//!
//! Project root selection, batch failure policy, and loading of
//! `mcp.config.json`, the per-project list of external MCP servers.
//! `${PROJECT_ROOT}` placeholders in the config file are substituted
//! with the configured root before parsing.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use crate::services::engine::{BatchFailurePolicy, Engine};
use crate::services::internal::InternalTools;
use crate::services::mcp_client::{McpClient, McpServerConfig, McpTransportConfig};
use crate::services::registry::ToolRegistry;
use crate::services::router::Router;
use crate::services::sink::OutputSink;
use crate::utils::error::{AppError, AppResult};

/// File name of the per-project server list.
pub const MCP_CONFIG_FILE: &str = "mcp.config.json";

/// Top-level engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Project boundary for all path-taking tools.
    pub project_root: PathBuf,
    /// What happens to the partial report when a batch fails.
    pub failure_policy: BatchFailurePolicy,
}

impl EngineConfig {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            failure_policy: BatchFailurePolicy::WritePartial,
        }
    }

    pub fn with_failure_policy(mut self, policy: BatchFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Assemble a ready engine: internal tools, every server from
    /// `mcp.config.json` that connects, and the given sink. A server
    /// that fails to connect is logged and skipped so one broken entry
    /// does not take the whole engine down.
    pub async fn build_engine(&self, sink: Arc<dyn OutputSink>) -> AppResult<Engine> {
        let mut registry = ToolRegistry::new(InternalTools::new(&self.project_root));

        for config in load_mcp_config(&self.project_root)? {
            match McpClient::connect(&config).await {
                Ok(client) => {
                    tracing::info!("[Config] Connected MCP server '{}'", config.name);
                    registry.register(Arc::new(client));
                }
                Err(e) => {
                    tracing::error!("[Config] Skipping MCP server '{}': {}", config.name, e);
                }
            }
        }

        let router = Router::new(Arc::new(registry));
        Ok(Engine::new(router, sink).with_policy(self.failure_policy))
    }
}

/// One entry of `mcp.config.json`, keyed by server name.
#[derive(Debug, Deserialize)]
struct RawServerEntry {
    #[serde(default)]
    transport: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: HashMap<String, String>,
}

/// Load and parse `mcp.config.json` from the project root.
///
/// A missing file is not an error; it simply means no external servers.
pub fn load_mcp_config(project_root: &Path) -> AppResult<Vec<McpServerConfig>> {
    let config_path = project_root.join(MCP_CONFIG_FILE);
    let raw = match std::fs::read_to_string(&config_path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(AppError::config(format!(
                "Failed to read {}: {}",
                config_path.display(),
                e
            )));
        }
    };

    let substituted = raw.replace("${PROJECT_ROOT}", &project_root.to_string_lossy());
    let entries: BTreeMap<String, RawServerEntry> =
        serde_json::from_str(&substituted).map_err(|e| {
            AppError::config(format!("Invalid {}: {}", MCP_CONFIG_FILE, e))
        })?;

    entries
        .into_iter()
        .map(|(name, entry)| {
            let transport = if entry.transport.as_deref() == Some("http") {
                let base_url = entry.url.ok_or_else(|| {
                    AppError::config(format!("Server '{}': http transport requires 'url'", name))
                })?;
                McpTransportConfig::Http {
                    base_url,
                    headers: HashMap::new(),
                }
            } else {
                let command = entry.command.ok_or_else(|| {
                    AppError::config(format!("Server '{}': missing 'command'", name))
                })?;
                McpTransportConfig::Stdio {
                    command,
                    args: entry.args,
                    env: entry.env,
                }
            };
            Ok(McpServerConfig { name, transport })
        })
        .collect()
}
