//! Tool system: the capability contract every invocable unit satisfies.
//!
//! Tools implement the [`Tool`] trait and are registered in a
//! [`ToolRegistry`], which gates every invocation behind a permission check.
//! Plugins declare tools by name; the plugin loader constructs and registers
//! them (see [`crate::plugin`]).

pub mod permission;
pub mod registry;

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{ToolError, ToolResult};

pub use permission::{AgentIdentity, PermissionChecker, PermissionSet};
pub use registry::ToolRegistry;

/// Description of a tool's interface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSignature {
    /// Unique name of the tool.
    pub name: String,
    /// What this tool does.
    pub description: String,
    /// Permissions a caller must hold to invoke the tool.
    pub permissions: PermissionSet,
    /// Parameters the tool accepts.
    pub parameters: Vec<ToolParam>,
}

impl ToolSignature {
    /// Create a signature with no declared parameters.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        permissions: PermissionSet,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            permissions,
            parameters: Vec::new(),
        }
    }

    /// Add a parameter description.
    pub fn with_param(mut self, param: ToolParam) -> Self {
        self.parameters.push(param);
        self
    }
}

/// A single parameter in a tool's signature.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolParam {
    /// Parameter name.
    pub name: String,
    /// What this parameter controls.
    pub description: String,
    /// Whether this parameter must be provided.
    pub required: bool,
}

impl ToolParam {
    pub fn required(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required: false,
        }
    }
}

/// Arguments to a tool invocation: a string-keyed map of JSON values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArgs {
    values: Map<String, Value>,
}

impl ToolArgs {
    /// Create an empty argument map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an argument.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Get an argument value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Get a string argument, if present and a string.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Value::as_str)
    }

    /// Get a required string argument.
    pub fn require_str(&self, name: &str) -> ToolResult<&str> {
        match self.values.get(name) {
            None | Some(Value::Null) => Err(ToolError::MissingArgument { name: name.into() }),
            Some(Value::String(s)) if s.trim().is_empty() => {
                Err(ToolError::MissingArgument { name: name.into() })
            }
            Some(Value::String(s)) => Ok(s),
            Some(other) => Err(ToolError::InvalidArgument {
                name: name.into(),
                message: format!("expected a string, got {other}"),
            }),
        }
    }

    /// Get a non-negative integer argument, falling back to `default` when absent.
    pub fn get_usize_or(&self, name: &str, default: usize) -> ToolResult<usize> {
        match self.values.get(name) {
            None | Some(Value::Null) => Ok(default),
            Some(v) => v
                .as_u64()
                .map(|n| n as usize)
                .ok_or_else(|| ToolError::InvalidArgument {
                    name: name.into(),
                    message: format!("expected a non-negative integer, got {v}"),
                }),
        }
    }

    /// Number of arguments.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no arguments were passed.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<Map<String, Value>> for ToolArgs {
    fn from(values: Map<String, Value>) -> Self {
        Self { values }
    }
}

/// Output from a tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    /// Structured result.
    pub data: Value,
    /// Human-readable one-line summary.
    pub summary: String,
}

impl ToolOutput {
    /// Create an output from structured data and a summary line.
    pub fn new(data: Value, summary: impl Into<String>) -> Self {
        Self {
            data,
            summary: summary.into(),
        }
    }
}

/// A named, permission-gated unit of invocable functionality.
pub trait Tool: Send + Sync {
    /// Describe this tool's interface.
    fn signature(&self) -> &ToolSignature;

    /// Run the tool. Permission checks have already happened when this is called
    /// through a [`ToolRegistry`].
    fn invoke(&self, args: &ToolArgs) -> ToolResult<ToolOutput>;
}

type ToolFn = dyn Fn(&ToolArgs) -> ToolResult<ToolOutput> + Send + Sync;

/// A tool backed by a closure.
pub struct FnTool {
    signature: ToolSignature,
    func: Box<ToolFn>,
}

impl FnTool {
    pub fn new<F>(signature: ToolSignature, func: F) -> Self
    where
        F: Fn(&ToolArgs) -> ToolResult<ToolOutput> + Send + Sync + 'static,
    {
        Self {
            signature,
            func: Box::new(func),
        }
    }
}

impl Tool for FnTool {
    fn signature(&self) -> &ToolSignature {
        &self.signature
    }

    fn invoke(&self, args: &ToolArgs) -> ToolResult<ToolOutput> {
        (self.func)(args)
    }
}

impl fmt::Debug for FnTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTool")
            .field("name", &self.signature.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_args_builder() {
        let args = ToolArgs::new().with("query", "alpha").with("top_k", 5);
        assert_eq!(args.get_str("query"), Some("alpha"));
        assert_eq!(args.get_usize_or("top_k", 3).unwrap(), 5);
        assert_eq!(args.get_usize_or("missing", 3).unwrap(), 3);
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn require_str_rejects_missing_and_blank() {
        let args = ToolArgs::new().with("blank", "  ").with("num", 1);
        assert!(matches!(
            args.require_str("absent"),
            Err(ToolError::MissingArgument { .. })
        ));
        assert!(matches!(
            args.require_str("blank"),
            Err(ToolError::MissingArgument { .. })
        ));
        assert!(matches!(
            args.require_str("num"),
            Err(ToolError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn negative_top_k_is_invalid() {
        let args = ToolArgs::new().with("top_k", -2);
        assert!(matches!(
            args.get_usize_or("top_k", 3),
            Err(ToolError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn fn_tool_invokes_closure() {
        let tool = FnTool::new(
            ToolSignature::new("echo", "echo back", PermissionSet::new()),
            |args| {
                let text = args.require_str("text")?;
                Ok(ToolOutput::new(Value::from(text), format!("echoed {text}")))
            },
        );
        let out = tool.invoke(&ToolArgs::new().with("text", "hi")).unwrap();
        assert_eq!(out.data, Value::from("hi"));
        assert_eq!(tool.signature().name, "echo");
    }
}
