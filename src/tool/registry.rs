//! Tool registry with permission-checked invocation.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{RegistryError, RegistryResult};

use super::{AgentIdentity, Tool, ToolArgs, ToolOutput, ToolSignature};

/// Registry of available tools, keyed by unique name.
///
/// Populated once at startup (plugin loading), read-only afterwards, and
/// shared across runs behind an `Arc`.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Fails if a tool with the same name exists; the
    /// registry is left unchanged in that case.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) -> RegistryResult<()> {
        self.register_arc(Arc::new(tool))
    }

    /// Register an already shared tool.
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> RegistryResult<()> {
        let name = tool.signature().name.clone();
        if self.tools.contains_key(&name) {
            return Err(RegistryError::DuplicateTool { name });
        }
        debug!(tool = %name, "registered tool");
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// All registered tool signatures, sorted by name.
    pub fn list(&self) -> Vec<ToolSignature> {
        let mut sigs: Vec<ToolSignature> =
            self.tools.values().map(|t| t.signature().clone()).collect();
        sigs.sort_by(|a, b| a.name.cmp(&b.name));
        sigs
    }

    /// Invoke a tool on behalf of `caller`.
    ///
    /// The permission check runs before the tool is touched: a denied call has
    /// no side effects.
    pub fn invoke(
        &self,
        caller: &AgentIdentity,
        name: &str,
        args: &ToolArgs,
    ) -> RegistryResult<ToolOutput> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| RegistryError::ToolNotFound { name: name.into() })?;

        let missing = tool.signature().permissions.missing_from(&caller.permissions);
        if !missing.is_empty() {
            debug!(tool = name, agent = %caller.name, ?missing, "permission denied");
            return Err(RegistryError::PermissionDenied {
                tool: name.into(),
                agent: caller.name.clone(),
                missing,
            });
        }

        debug!(tool = name, agent = %caller.name, "invoking tool");
        tool.invoke(args).map_err(|source| RegistryError::ToolFailed {
            tool: name.into(),
            source,
        })
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.tools.keys().collect();
        names.sort();
        f.debug_struct("ToolRegistry").field("tools", &names).finish()
    }
}
