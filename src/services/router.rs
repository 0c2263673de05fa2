//! Tool Router
//!
//! Resolves a (server, tool, args) triple to a normalized payload.
//! Internal tools dispatch through the registry's handler table;
//! anything else goes to a registered external provider. Path
//! arguments for filesystem-like providers are completed against the
//! project root before the call leaves the process.

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use crate::services::internal::INTERNAL_SERVER;
use crate::services::registry::ToolRegistry;
use crate::services::types::ToolPayload;
use crate::utils::error::{AppError, AppResult};
use crate::utils::paths::resolve_in_root;

/// Server id of the filesystem provider whose path arguments get
/// completed and boundary-checked before dispatch.
const FS_SERVER: &str = "fs";

/// Dispatches tool calls against an injected registry.
pub struct Router {
    registry: Arc<ToolRegistry>,
}

impl Router {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Route one tool call.
    pub async fn invoke(&self, server: &str, tool: &str, args: Value) -> AppResult<ToolPayload> {
        tracing::debug!("[Router] dispatch {}:{}", server, tool);

        if server == INTERNAL_SERVER {
            if tool == "list" {
                let filter = args.get("server").and_then(|v| v.as_str());
                return Ok(ToolPayload::Catalog(self.registry.catalog(filter).await?));
            }
            return self.registry.internal().invoke(tool, &args).await;
        }

        let provider = self.registry.provider(server).ok_or_else(|| {
            AppError::not_found(format!("Server '{}' not active", server))
        })?;

        let args = if server == FS_SERVER {
            self.complete_fs_args(tool, args).await?
        } else {
            args
        };

        let result = provider.invoke(tool, args).await?;
        Ok(match result {
            Value::String(text) => ToolPayload::Text(text),
            other => ToolPayload::Structured(other),
        })
    }

    /// Complete a relative `path` argument against the project root and
    /// reject anything that resolves outside it. Writes get their
    /// parent directory pre-created so the provider does not fail on a
    /// missing intermediate directory.
    async fn complete_fs_args(&self, tool: &str, mut args: Value) -> AppResult<Value> {
        let Some(path_arg) = args.get("path").and_then(|v| v.as_str()).map(String::from) else {
            return Ok(args);
        };

        let root = self.registry.internal().root();
        let resolved = resolve_in_root(root, &path_arg)?;

        if tool == "write_file" {
            if let Some(parent) = resolved.parent() {
                if let Err(e) = tokio::fs::create_dir_all(parent).await {
                    // The provider will report the real permission error.
                    tracing::warn!("[Router] Failed to pre-create directory: {}", e);
                }
            }
        }

        args["path"] = Value::String(path_to_string(&resolved));
        Ok(args)
    }
}

fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().to_string()
}
