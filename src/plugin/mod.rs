//! Plugin manifests and enablement.
//!
//! A plugin is a directory holding a `plugin.json` manifest that names an
//! entrypoint and declares the tools it contributes. Entrypoints resolve
//! through the closed [`PluginCatalog`]; nothing is loaded dynamically.

pub mod catalog;
pub mod loader;

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PluginError, PluginResult};
use crate::tool::PermissionSet;

pub use catalog::{PluginCatalog, PluginServices, ToolFactory};
pub use loader::{LoadReport, LoadedPlugin, PluginLoader, SkippedPlugin};

/// Manifest file name inside every plugin directory.
pub const MANIFEST_FILE: &str = "plugin.json";

const REQUIRED_MANIFEST_FIELDS: &[&str] = &["entrypoint", "id", "tools", "version"];
const REQUIRED_TOOL_FIELDS: &[&str] = &["implementing_type", "name", "permissions"];
/// Older manifests spell `implementing_type` as `class`.
const IMPLEMENTING_TYPE_ALIAS: &str = "class";

/// A tool contributed by a plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub name: String,
    #[serde(alias = "class")]
    pub implementing_type: String,
    pub permissions: PermissionSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Parsed `plugin.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginManifest {
    pub id: String,
    pub version: String,
    pub entrypoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub tools: Vec<ToolDeclaration>,
}

impl PluginManifest {
    /// Validate and parse manifest JSON. `path` labels errors.
    pub fn parse(json: &str, path: &str) -> PluginResult<Self> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| invalid(path, format!("malformed JSON: {e}")))?;
        Self::from_value(value, path)
    }

    /// Validate and parse an already decoded manifest.
    pub fn from_value(value: Value, path: &str) -> PluginResult<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| invalid(path, "manifest must be a JSON object"))?;

        let missing: Vec<&str> = REQUIRED_MANIFEST_FIELDS
            .iter()
            .copied()
            .filter(|f| !obj.contains_key(*f))
            .collect();
        if !missing.is_empty() {
            return Err(invalid(path, format!("missing fields: {}", missing.join(", "))));
        }

        let tools = obj
            .get("tools")
            .and_then(Value::as_array)
            .ok_or_else(|| invalid(path, "`tools` must be an array"))?;
        for (i, tool) in tools.iter().enumerate() {
            let tool = tool
                .as_object()
                .ok_or_else(|| invalid(path, format!("tools[{i}] must be an object")))?;
            let tool_missing: Vec<&str> = REQUIRED_TOOL_FIELDS
                .iter()
                .copied()
                .filter(|f| {
                    let aliased = *f == "implementing_type"
                        && tool.contains_key(IMPLEMENTING_TYPE_ALIAS);
                    !tool.contains_key(*f) && !aliased
                })
                .collect();
            if !tool_missing.is_empty() {
                return Err(invalid(
                    path,
                    format!("tools[{i}] missing fields: {}", tool_missing.join(", ")),
                ));
            }
        }

        let manifest: PluginManifest =
            serde_json::from_value(value).map_err(|e| invalid(path, e.to_string()))?;
        manifest.check(path)?;
        Ok(manifest)
    }

    fn check(&self, path: &str) -> PluginResult<()> {
        let required = [
            ("id", &self.id),
            ("version", &self.version),
            ("entrypoint", &self.entrypoint),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(invalid(path, format!("`{field}` must not be empty")));
            }
        }
        let mut names = BTreeSet::new();
        for tool in &self.tools {
            if tool.name.trim().is_empty() {
                return Err(invalid(path, "tool names must not be empty"));
            }
            if !names.insert(tool.name.as_str()) {
                return Err(invalid(path, format!("tool \"{}\" is declared twice", tool.name)));
            }
        }
        Ok(())
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }
}

fn invalid(path: &str, message: impl Into<String>) -> PluginError {
    PluginError::InvalidManifest {
        path: path.to_string(),
        message: message.into(),
    }
}

/// Which plugins may load, keyed by plugin id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginEnablement {
    /// Applies to plugins without an explicit entry.
    pub default_enabled: bool,
    /// Per-plugin overrides.
    pub enabled: HashMap<String, bool>,
}

impl PluginEnablement {
    /// Enable exactly the listed plugins.
    pub fn only<S: Into<String>>(ids: impl IntoIterator<Item = S>) -> Self {
        Self {
            default_enabled: false,
            enabled: ids.into_iter().map(|id| (id.into(), true)).collect(),
        }
    }

    pub fn all() -> Self {
        Self {
            default_enabled: true,
            enabled: HashMap::new(),
        }
    }

    pub fn is_enabled(&self, key: &str) -> bool {
        self.enabled.get(key).copied().unwrap_or(self.default_enabled)
    }
}
