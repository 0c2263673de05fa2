//! Tool Registry
//!
//! Maps server ids to dispatch targets: the built-in pseudo-provider
//! plus external providers registered at startup. The registry is
//! constructed explicitly and injected wherever dispatch happens, so
//! tests can build isolated instances with mock providers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::services::internal::{InternalTools, INTERNAL_SERVER};
use crate::services::mcp_client::McpClient;
use crate::services::types::{CatalogEntry, ProviderToolInfo};
use crate::utils::error::{AppError, AppResult};

/// Uniform interface over external tool providers.
#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// Server id the provider is addressed by in commands.
    fn name(&self) -> &str;

    /// Enumerate the provider's tools.
    async fn list_tools(&self) -> AppResult<Vec<ProviderToolInfo>>;

    /// Invoke one tool. Text results come back as a JSON string value;
    /// anything else is the provider's raw structured result.
    async fn invoke(&self, tool: &str, args: Value) -> AppResult<Value>;
}

#[async_trait]
impl ToolProvider for McpClient {
    fn name(&self) -> &str {
        McpClient::name(self)
    }

    async fn list_tools(&self) -> AppResult<Vec<ProviderToolInfo>> {
        McpClient::list_tools(self).await
    }

    async fn invoke(&self, tool: &str, args: Value) -> AppResult<Value> {
        self.call_tool(tool, args).await
    }
}

/// Server id to dispatch-target mapping, read-mostly after startup.
pub struct ToolRegistry {
    internal: InternalTools,
    providers: HashMap<String, Arc<dyn ToolProvider>>,
}

impl ToolRegistry {
    pub fn new(internal: InternalTools) -> Self {
        Self {
            internal,
            providers: HashMap::new(),
        }
    }

    /// Register an external provider under its own name.
    pub fn register(&mut self, provider: Arc<dyn ToolProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    /// The built-in pseudo-provider.
    pub fn internal(&self) -> &InternalTools {
        &self.internal
    }

    /// Look up an external provider by server id.
    pub fn provider(&self, name: &str) -> Option<&Arc<dyn ToolProvider>> {
        self.providers.get(name)
    }

    /// Registered external server ids, sorted for stable output.
    pub fn provider_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Build the tool catalog.
    ///
    /// With a server filter the listing is detailed (input schemas
    /// included); without one it is a summary across every provider
    /// plus the internal tools. A provider that fails to enumerate
    /// contributes an error entry instead of aborting the whole
    /// catalog.
    pub async fn catalog(&self, server: Option<&str>) -> AppResult<Vec<CatalogEntry>> {
        match server {
            Some(INTERNAL_SERVER) => Ok(self.internal.catalog(true)),
            Some(name) => {
                let provider = self
                    .provider(name)
                    .ok_or_else(|| AppError::not_found(format!("Server '{}' not found", name)))?;
                let tools = provider.list_tools().await?;
                Ok(tools
                    .into_iter()
                    .map(|tool| CatalogEntry {
                        server: name.to_string(),
                        name: tool.name,
                        description: tool.description,
                        input_schema: Some(tool.input_schema),
                    })
                    .collect())
            }
            None => {
                let mut entries = Vec::new();
                for name in self.provider_names() {
                    let provider = &self.providers[&name];
                    match provider.list_tools().await {
                        Ok(tools) => {
                            entries.extend(tools.into_iter().map(|tool| CatalogEntry {
                                server: name.clone(),
                                name: tool.name,
                                description: tool.description,
                                input_schema: None,
                            }));
                        }
                        Err(e) => entries.push(CatalogEntry {
                            server: name.clone(),
                            name: format!("Error: {}", e),
                            description: String::new(),
                            input_schema: None,
                        }),
                    }
                }
                entries.extend(self.internal.catalog(false));
                Ok(entries)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use serde_json::json;

    /// In-memory provider for registry/router/engine tests.
    pub struct MockProvider {
        pub name: String,
        pub fail_listing: bool,
        pub calls: std::sync::Mutex<Vec<String>>,
    }

    impl MockProvider {
        pub fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                fail_listing: false,
                calls: std::sync::Mutex::new(Vec::new()),
            }
        }

        pub fn call_log(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ToolProvider for MockProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn list_tools(&self) -> AppResult<Vec<ProviderToolInfo>> {
            if self.fail_listing {
                return Err(AppError::command("connection reset"));
            }
            Ok(vec![ProviderToolInfo {
                name: "echo".to_string(),
                description: "Echoes the input".to_string(),
                input_schema: json!({"type": "object"}),
            }])
        }

        async fn invoke(&self, tool: &str, args: Value) -> AppResult<Value> {
            self.calls.lock().unwrap().push(tool.to_string());
            match tool {
                "echo" => Ok(Value::String(
                    args.get("message")
                        .and_then(|v| v.as_str())
                        .unwrap_or("")
                        .to_string(),
                )),
                "structured" => Ok(json!({"ok": true})),
                "explode" => Err(AppError::provider("tool exploded")),
                other => Err(AppError::not_found(format!("Unknown tool: {}", other))),
            }
        }
    }
}
