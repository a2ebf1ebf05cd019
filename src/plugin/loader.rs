//! Plugin discovery and registration.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{PluginError, PluginResult};
use crate::tool::{Tool, ToolRegistry};

use super::{
    MANIFEST_FILE, PluginCatalog, PluginEnablement, PluginManifest, PluginServices, invalid,
};

/// A plugin whose tools are now registered.
#[derive(Debug, Clone)]
pub struct LoadedPlugin {
    pub dir: PathBuf,
    pub manifest: PluginManifest,
}

/// A plugin that failed to load. Its tools were not registered.
#[derive(Debug)]
pub struct SkippedPlugin {
    pub dir: PathBuf,
    /// Manifest id if readable, else the directory name.
    pub key: String,
    pub error: PluginError,
}

/// Outcome of one discovery pass.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: Vec<LoadedPlugin>,
    pub skipped: Vec<SkippedPlugin>,
    /// Keys of plugins present on disk but not enabled.
    pub disabled: Vec<String>,
}

impl LoadReport {
    /// Names of every tool registered by this pass.
    pub fn tool_names(&self) -> Vec<&str> {
        self.loaded
            .iter()
            .flat_map(|p| p.manifest.tool_names())
            .collect()
    }
}

/// Discovers plugin directories under a root and registers their tools.
#[derive(Debug)]
pub struct PluginLoader {
    root: PathBuf,
    enablement: PluginEnablement,
    catalog: PluginCatalog,
}

impl PluginLoader {
    pub fn new(
        root: impl Into<PathBuf>,
        enablement: PluginEnablement,
        catalog: PluginCatalog,
    ) -> Self {
        Self {
            root: root.into(),
            enablement,
            catalog,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Candidate plugin directories in name order. Hidden and `_`-prefixed
    /// directories, and directories without a manifest, are ignored.
    pub fn discover(&self) -> PluginResult<Vec<PathBuf>> {
        if !self.root.is_dir() {
            warn!(
                root = %self.root.display(),
                "plugin directory not found, no plugins loaded"
            );
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(&self.root).map_err(|source| PluginError::Io {
            plugin: "<discovery>".into(),
            source,
        })?;

        let mut dirs: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| !n.starts_with('_') && !n.starts_with('.'))
            })
            .filter(|p| p.join(MANIFEST_FILE).is_file())
            .collect();
        dirs.sort();
        Ok(dirs)
    }

    /// Load every enabled plugin into `registry`.
    ///
    /// A failing plugin is skipped and reported; it never affects the others.
    /// Each plugin's tools are registered all together or not at all.
    pub fn load(
        &self,
        registry: &mut ToolRegistry,
        services: &PluginServices,
    ) -> PluginResult<LoadReport> {
        let mut report = LoadReport::default();

        for dir in self.discover()? {
            let dir_name = dir
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("unknown")
                .to_string();
            let manifest_path = dir.join(MANIFEST_FILE);

            let raw = match read_manifest(&manifest_path, &dir_name) {
                Ok(raw) => raw,
                Err(error) => {
                    if self.enablement.is_enabled(&dir_name) {
                        warn!(plugin = %dir_name, %error, "skipping plugin");
                        report.skipped.push(SkippedPlugin { dir, key: dir_name, error });
                    } else {
                        report.disabled.push(dir_name);
                    }
                    continue;
                }
            };

            let key = raw
                .get("id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or(dir_name);
            if !self.enablement.is_enabled(&key) {
                debug!(plugin = %key, "plugin disabled");
                report.disabled.push(key);
                continue;
            }

            match self.load_one(raw, &manifest_path, registry, services) {
                Ok(manifest) => {
                    info!(
                        plugin = %manifest.id,
                        version = %manifest.version,
                        tools = manifest.tools.len(),
                        "loaded plugin"
                    );
                    report.loaded.push(LoadedPlugin { dir, manifest });
                }
                Err(error) => {
                    warn!(plugin = %key, %error, "skipping plugin");
                    report.skipped.push(SkippedPlugin { dir, key, error });
                }
            }
        }

        info!(
            loaded = report.loaded.len(),
            skipped = report.skipped.len(),
            disabled = report.disabled.len(),
            "plugin discovery complete"
        );
        Ok(report)
    }

    fn load_one(
        &self,
        raw: Value,
        manifest_path: &Path,
        registry: &mut ToolRegistry,
        services: &PluginServices,
    ) -> PluginResult<PluginManifest> {
        let manifest = PluginManifest::from_value(raw, &manifest_path.display().to_string())?;

        // Resolve and check everything before touching the registry.
        let mut factories = Vec::with_capacity(manifest.tools.len());
        for decl in &manifest.tools {
            let factory = self
                .catalog
                .resolve(&manifest.id, &manifest.entrypoint, &decl.implementing_type)?;
            if registry.contains(&decl.name) {
                return Err(invalid(
                    &manifest_path.display().to_string(),
                    format!("tool `{}` is already registered", decl.name),
                ));
            }
            factories.push((decl, factory));
        }

        let tools: Vec<Arc<dyn Tool>> = factories
            .into_iter()
            .map(|(decl, factory)| factory(decl, services))
            .collect();
        for tool in tools {
            registry.register_arc(tool)?;
        }
        Ok(manifest)
    }
}

fn read_manifest(path: &Path, plugin: &str) -> PluginResult<Value> {
    let text = std::fs::read_to_string(path).map_err(|source| PluginError::Io {
        plugin: plugin.to_string(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|e| PluginError::InvalidManifest {
        path: path.display().to_string(),
        message: format!("malformed JSON: {e}"),
    })
}
