//! The closed set of entrypoints a plugin manifest may name.
//!
//! Each entrypoint maps implementing-type names to factories that build a tool
//! from its manifest declaration and the process-wide services.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{PluginError, PluginResult};
use crate::learning::LearningMemory;
use crate::search::SharedIndex;
use crate::tool::Tool;
use crate::tools::{docs, learning};

use super::ToolDeclaration;

/// Shared services tools are built against.
#[derive(Debug, Clone)]
pub struct PluginServices {
    pub index: Arc<SharedIndex>,
    pub learning: Arc<LearningMemory>,
}

/// Builds one tool instance from its declaration.
pub type ToolFactory = fn(&ToolDeclaration, &PluginServices) -> Arc<dyn Tool>;

/// Entrypoint → implementing type → factory.
#[derive(Clone, Default)]
pub struct PluginCatalog {
    entrypoints: BTreeMap<String, BTreeMap<String, ToolFactory>>,
}

impl PluginCatalog {
    /// A catalog with no entrypoints.
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in entrypoints: `docs` and `learning`.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        catalog.register("docs", "DocsSearchTool", docs::DocsSearchTool::factory);
        let learning_tools: [(&str, ToolFactory); 6] = [
            ("ObserveFindingTool", learning::ObserveFindingTool::factory),
            ("RecordFeedbackTool", learning::RecordFeedbackTool::factory),
            ("FindingWeightTool", learning::FindingWeightTool::factory),
            ("SearchFindingsTool", learning::SearchFindingsTool::factory),
            ("FindingStatsTool", learning::FindingStatsTool::factory),
            ("LearningGuidanceTool", learning::LearningGuidanceTool::factory),
        ];
        for (implementing_type, factory) in learning_tools {
            catalog.register("learning", implementing_type, factory);
        }
        catalog
    }

    /// Add (or replace) a factory.
    pub fn register(&mut self, entrypoint: &str, implementing_type: &str, factory: ToolFactory) {
        self.entrypoints
            .entry(entrypoint.to_string())
            .or_default()
            .insert(implementing_type.to_string(), factory);
    }

    pub fn has_entrypoint(&self, entrypoint: &str) -> bool {
        self.entrypoints.contains_key(entrypoint)
    }

    /// Look up the factory for a tool declared by `plugin`.
    pub fn resolve(
        &self,
        plugin: &str,
        entrypoint: &str,
        implementing_type: &str,
    ) -> PluginResult<ToolFactory> {
        let types = self
            .entrypoints
            .get(entrypoint)
            .ok_or_else(|| PluginError::UnknownEntrypoint {
                plugin: plugin.to_string(),
                entrypoint: entrypoint.to_string(),
            })?;
        types
            .get(implementing_type)
            .copied()
            .ok_or_else(|| PluginError::UnknownToolType {
                entrypoint: entrypoint.to_string(),
                implementing_type: implementing_type.to_string(),
            })
    }

    /// Entrypoint names with their implementing types, sorted.
    pub fn describe(&self) -> Vec<(&str, Vec<&str>)> {
        self.entrypoints
            .iter()
            .map(|(ep, types)| (ep.as_str(), types.keys().map(String::as_str).collect()))
            .collect()
    }
}

impl fmt::Debug for PluginCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginCatalog")
            .field("entrypoints", &self.describe())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_resolves_known_types() {
        let catalog = PluginCatalog::builtin();
        assert!(catalog.resolve("p", "docs", "DocsSearchTool").is_ok());
        assert!(catalog.resolve("p", "learning", "RecordFeedbackTool").is_ok());
        assert!(catalog.resolve("p", "learning", "FindingStatsTool").is_ok());
        assert!(catalog.has_entrypoint("learning"));
    }

    #[test]
    fn unknown_entrypoint_and_type() {
        let catalog = PluginCatalog::builtin();
        assert!(matches!(
            catalog.resolve("p", "git", "GitDiffTool"),
            Err(PluginError::UnknownEntrypoint { .. })
        ));
        assert!(matches!(
            catalog.resolve("p", "docs", "Nope"),
            Err(PluginError::UnknownToolType { .. })
        ));
    }
}
