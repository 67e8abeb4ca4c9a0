//! Process-wide service plugin catalog.
//!
//! Populated once at startup by registering every known plugin, then
//! read-only for the remainder of the process (safe for unsynchronized
//! concurrent reads behind an `Arc`). Duplicate service names, and
//! duplicate tool names, checked structurally rather than by the
//! `<service>_<verb>` convention alone, fail registration fast.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::RegistryError;
use crate::plugins::{all_plugins, ServicePlugin};
use crate::tools::ToolSpec;

/// Append-only catalog of service plugins.
#[derive(Default)]
pub struct ServiceRegistry {
    /// Plugins in registration order.
    plugins: Vec<Arc<dyn ServicePlugin>>,
    /// Service name → index into `plugins`.
    by_name: HashMap<String, usize>,
    /// Tool name → owning service name, built at registration time so tool
    /// routing is a direct lookup instead of a scan over every plugin.
    tool_owners: HashMap<String, String>,
}

impl ServiceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin.
    ///
    /// Fails fast on a duplicate service name or a duplicate tool name;
    /// both are configuration errors surfaced at startup, not runtime
    /// conditions to recover from.
    pub fn register(&mut self, plugin: Arc<dyn ServicePlugin>) -> Result<(), RegistryError> {
        let name = plugin.name().to_string();
        if self.by_name.contains_key(&name) {
            return Err(RegistryError::DuplicatePlugin { name });
        }

        for tool in plugin.tools() {
            if let Some(existing) = self.tool_owners.get(&tool.name) {
                return Err(RegistryError::DuplicateTool {
                    tool: tool.name.clone(),
                    existing: existing.clone(),
                    incoming: name,
                });
            }
        }

        for tool in plugin.tools() {
            self.tool_owners.insert(tool.name.clone(), name.clone());
        }
        self.by_name.insert(name, self.plugins.len());
        self.plugins.push(plugin);
        Ok(())
    }

    /// Look up a plugin by service name. Absence is a normal outcome the
    /// caller handles (service not configured in this deployment).
    pub fn get(&self, name: &str) -> Option<Arc<dyn ServicePlugin>> {
        self.by_name.get(name).map(|&idx| Arc::clone(&self.plugins[idx]))
    }

    /// All registered plugins, in registration order.
    pub fn list_all(&self) -> Vec<Arc<dyn ServicePlugin>> {
        self.plugins.iter().map(Arc::clone).collect()
    }

    /// All registered service names, in registration order.
    pub fn list_names(&self) -> Vec<String> {
        self.plugins.iter().map(|p| p.name().to_string()).collect()
    }

    /// Flatten the tool lists of exactly the named plugins, preserving
    /// per-plugin declared order. Names not present in the registry are
    /// skipped: a connected-service record pointing at a since-removed
    /// plugin must not break enumeration.
    pub fn tools_for(&self, connected_names: &[String]) -> Vec<(Arc<dyn ServicePlugin>, ToolSpec)> {
        let mut out = Vec::new();
        for name in connected_names {
            let Some(plugin) = self.get(name) else {
                log::debug!("tools_for: skipping unknown service '{name}'");
                continue;
            };
            for tool in plugin.tools() {
                out.push((Arc::clone(&plugin), tool.clone()));
            }
        }
        out
    }

    /// Resolve a tool name to its owning plugin and specification.
    pub fn find_tool(&self, tool_name: &str) -> Option<(Arc<dyn ServicePlugin>, ToolSpec)> {
        let service = self.tool_owners.get(tool_name)?;
        let plugin = self.get(service)?;
        let spec = plugin.tools().iter().find(|t| t.name == tool_name)?.clone();
        Some((plugin, spec))
    }
}

/// Build the registry holding the full built-in plugin set.
pub fn default_registry(client: reqwest::Client) -> Result<ServiceRegistry, RegistryError> {
    let mut registry = ServiceRegistry::new();
    for plugin in all_plugins(client) {
        registry.register(plugin)?;
    }
    Ok(registry)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
