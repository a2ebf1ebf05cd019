//! The node contract and the per-run context nodes execute against.

use std::fmt;
use std::sync::Arc;

use crate::error::{NodeError, RegistryResult};
use crate::tool::{AgentIdentity, ToolArgs, ToolOutput, ToolRegistry};

use super::state::{GraphState, ToolCallRecord};

/// A unit of work in a graph.
///
/// Nodes mutate the run state in place. An `Err` does not abort the run: the
/// engine records it and routes to the graph's error handler or terminates.
pub trait Node: Send + Sync {
    fn execute(&self, state: &mut GraphState, ctx: &RunContext) -> Result<(), NodeError>;
}

type NodeFn = dyn Fn(&mut GraphState, &RunContext) -> Result<(), NodeError> + Send + Sync;

/// A node backed by a closure.
pub struct FnNode {
    func: Box<NodeFn>,
}

impl FnNode {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&mut GraphState, &RunContext) -> Result<(), NodeError> + Send + Sync + 'static,
    {
        Self {
            func: Box::new(func),
        }
    }
}

impl Node for FnNode {
    fn execute(&self, state: &mut GraphState, ctx: &RunContext) -> Result<(), NodeError> {
        (self.func)(state, ctx)
    }
}

impl fmt::Debug for FnNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnNode").finish_non_exhaustive()
    }
}

/// Everything a node may reach besides the state: the shared registry and the
/// identity every tool call is made as.
#[derive(Clone)]
pub struct RunContext {
    registry: Arc<ToolRegistry>,
    caller: AgentIdentity,
}

impl RunContext {
    pub fn new(registry: Arc<ToolRegistry>, caller: AgentIdentity) -> Self {
        Self { registry, caller }
    }

    pub fn caller(&self) -> &AgentIdentity {
        &self.caller
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Invoke a tool as the run's caller.
    pub fn invoke(&self, tool: &str, args: &ToolArgs) -> RegistryResult<ToolOutput> {
        self.registry.invoke(&self.caller, tool, args)
    }

    /// Invoke a tool and append the outcome to `state.tool_outputs`.
    pub fn invoke_recorded(
        &self,
        state: &mut GraphState,
        tool: &str,
        args: &ToolArgs,
    ) -> RegistryResult<ToolOutput> {
        let result = self.invoke(tool, args);
        let (ok, summary) = match &result {
            Ok(out) => (true, out.summary.clone()),
            Err(e) => (false, e.to_string()),
        };
        state.tool_outputs.push(ToolCallRecord {
            node: state.current_node().to_string(),
            tool: tool.to_string(),
            ok,
            summary,
        });
        result
    }
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("caller", &self.caller.name)
            .field("tools", &self.registry.len())
            .finish()
    }
}
