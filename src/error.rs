//! Rich diagnostic error types for the conduit substrate.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text so operators know what went wrong and
//! whether it is a per-request failure or a configuration fault.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the substrate.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain through to the caller.
#[derive(Debug, Error, Diagnostic)]
pub enum ConduitError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Plugin(#[from] PluginError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Learning(#[from] LearningError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Registry errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum RegistryError {
    #[error("tool not found: \"{name}\"")]
    #[diagnostic(
        code(conduit::registry::tool_not_found),
        help("Check the tool name, or list registered tools with `conduit tools`.")
    )]
    ToolNotFound { name: String },

    #[error("permission denied: agent \"{agent}\" lacks {missing:?} for tool \"{tool}\"")]
    #[diagnostic(
        code(conduit::registry::permission_denied),
        help(
            "Grant the missing permissions to the agent in the `[agents]` section \
             of the configuration, or call the tool from an agent that holds them."
        )
    )]
    PermissionDenied {
        tool: String,
        agent: String,
        missing: Vec<String>,
    },

    #[error("duplicate tool: \"{name}\" is already registered")]
    #[diagnostic(
        code(conduit::registry::duplicate_tool),
        help("Tool names are unique per registry. Rename one of the conflicting tools.")
    )]
    DuplicateTool { name: String },

    #[error("tool \"{tool}\" failed: {source}")]
    #[diagnostic(
        code(conduit::registry::tool_failed),
        help("The tool ran and reported a failure. Check the inner cause for details.")
    )]
    ToolFailed {
        tool: String,
        #[source]
        source: ToolError,
    },
}

/// Convenience alias for registry operations.
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

// ---------------------------------------------------------------------------
// Tool errors
// ---------------------------------------------------------------------------

/// Typed failure returned by a tool's invocation function.
#[derive(Debug, Error, Diagnostic)]
pub enum ToolError {
    #[error("missing required argument: {name}")]
    #[diagnostic(
        code(conduit::tool::missing_argument),
        help("Pass the argument in the invocation's argument map.")
    )]
    MissingArgument { name: String },

    #[error("invalid argument \"{name}\": {message}")]
    #[diagnostic(
        code(conduit::tool::invalid_argument),
        help("Check the argument's type and allowed values.")
    )]
    InvalidArgument { name: String, message: String },

    #[error("{message}")]
    #[diagnostic(code(conduit::tool::failed))]
    Failed { message: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Learning(#[from] LearningError),
}

/// Convenience alias for tool invocations.
pub type ToolResult<T> = std::result::Result<T, ToolError>;

// ---------------------------------------------------------------------------
// Plugin errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum PluginError {
    #[error("invalid plugin manifest {path}: {message}")]
    #[diagnostic(
        code(conduit::plugin::invalid_manifest),
        help(
            "A plugin.json needs `id`, `version`, `entrypoint` and `tools`; every tool \
             needs `name`, `implementing_type` and `permissions`, and tool names must \
             not collide with tools that are already registered."
        )
    )]
    InvalidManifest { path: String, message: String },

    #[error("unknown plugin entrypoint \"{entrypoint}\" in plugin \"{plugin}\"")]
    #[diagnostic(
        code(conduit::plugin::unknown_entrypoint),
        help("Entrypoints resolve through the built-in plugin catalog. Use one of its entrypoints.")
    )]
    UnknownEntrypoint { plugin: String, entrypoint: String },

    #[error("entrypoint \"{entrypoint}\" has no tool type \"{implementing_type}\"")]
    #[diagnostic(
        code(conduit::plugin::unknown_tool_type),
        help("Check the `implementing_type` of the tool declaration against the catalog.")
    )]
    UnknownToolType {
        entrypoint: String,
        implementing_type: String,
    },

    #[error("I/O error reading plugin \"{plugin}\": {source}")]
    #[diagnostic(
        code(conduit::plugin::io),
        help("Check that the plugin directory and its plugin.json are readable.")
    )]
    Io {
        plugin: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Registry(#[from] RegistryError),
}

/// Convenience alias for plugin operations.
pub type PluginResult<T> = std::result::Result<T, PluginError>;

// ---------------------------------------------------------------------------
// Graph errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("invalid graph \"{graph}\": {message}")]
    #[diagnostic(
        code(conduit::graph::invalid),
        help("The graph definition is malformed. Fix the builder calls that define it.")
    )]
    InvalidGraph { graph: String, message: String },

    #[error("routing error in graph \"{graph}\": node \"{from}\" routed to unknown target \"{target}\"")]
    #[diagnostic(
        code(conduit::graph::routing),
        help(
            "A routing function must return one of the candidates declared with \
             `add_conditional_edges`, or the terminal marker."
        )
    )]
    RoutingError {
        graph: String,
        from: String,
        target: String,
    },

    #[error("graph \"{graph}\" exceeded its step limit of {max_steps}")]
    #[diagnostic(
        code(conduit::graph::step_limit),
        help(
            "The run did not reach the terminal marker. Look for an unintended cycle \
             in the edges, or raise `graph.max_steps`."
        )
    )]
    StepLimitExceeded { graph: String, max_steps: usize },
}

/// Convenience alias for graph operations.
pub type GraphResult<T> = std::result::Result<T, GraphError>;

/// Failure of a single node. Recorded in the run state, never fatal to the run.
#[derive(Debug, Error, Diagnostic)]
pub enum NodeError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Tool(#[from] RegistryError),

    #[error("{message}")]
    #[diagnostic(code(conduit::graph::node_failed))]
    Failed { message: String },
}

impl NodeError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Search errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum SearchError {
    #[error("index build failed: {message}")]
    #[diagnostic(
        code(conduit::search::build),
        help(
            "The search index could not be built and cannot serve queries. \
             Check the corpus for duplicate document ids and the BM25 parameters."
        )
    )]
    IndexBuildFailure { message: String },

    #[error("I/O error reading corpus {path}: {source}")]
    #[diagnostic(
        code(conduit::search::io),
        help("Check that the corpus directory exists and is readable.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience alias for search operations.
pub type SearchResult<T> = std::result::Result<T, SearchError>;

// ---------------------------------------------------------------------------
// Learning store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum LearningError {
    #[error("learning store unavailable at {path}: {message}")]
    #[diagnostic(
        code(conduit::learning::unavailable),
        help(
            "The durable store could not be opened. The substrate falls back to an \
             in-memory store; feedback recorded now will not survive a restart."
        )
    )]
    Unavailable { path: String, message: String },

    #[error("redb transaction error: {message}")]
    #[diagnostic(
        code(conduit::learning::redb),
        help(
            "The embedded database encountered a transaction error. \
             This may indicate corruption. Try a fresh learning store path."
        )
    )]
    Redb { message: String },

    #[error("serialization error: {message}")]
    #[diagnostic(
        code(conduit::learning::serde),
        help(
            "Failed to serialize or deserialize a learning record. \
             The stored format may have changed between versions."
        )
    )]
    Serialization { message: String },

    #[error("I/O error: {source}")]
    #[diagnostic(
        code(conduit::learning::io),
        help("Check that the learning store directory exists and is writable.")
    )]
    Io {
        #[source]
        source: std::io::Error,
    },
}

/// Convenience alias for learning store operations.
pub type LearningResult<T> = std::result::Result<T, LearningError>;

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    #[diagnostic(
        code(conduit::config::io),
        help("Check the path passed with `--config`, or remove it to use defaults.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {message}")]
    #[diagnostic(
        code(conduit::config::parse),
        help("The file must be valid TOML matching the documented sections.")
    )]
    Parse { path: String, message: String },
}

/// Convenience alias for config operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Convenience alias for substrate-level operations.
pub type ConduitResult<T> = std::result::Result<T, ConduitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_denied_names_missing_set() {
        let err = RegistryError::PermissionDenied {
            tool: "docs.search".into(),
            agent: "support".into(),
            missing: vec!["docs:read".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("support"));
        assert!(msg.contains("docs:read"));
    }

    #[test]
    fn subsystem_errors_convert_into_top_level() {
        let err: ConduitError = GraphError::StepLimitExceeded {
            graph: "g".into(),
            max_steps: 3,
        }
        .into();
        assert!(matches!(err, ConduitError::Graph(_)));
        assert!(err.to_string().contains("step limit of 3"));
    }
}
