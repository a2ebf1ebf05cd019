//! Substrate configuration, persisted as TOML.
//!
//! ```toml
//! [plugins]
//! dir = "plugins"
//! default_enabled = false
//! [plugins.enabled]
//! docs_rag = true
//!
//! [agents.assistant]
//! permissions = ["docs:read", "learning:read"]
//!
//! [search]
//! corpus_dirs = ["docs", "README.md"]
//! k1 = 1.5
//! b = 0.75
//!
//! [learning]
//! path = "/var/lib/conduit/learning.redb"
//! floor = 0.25
//!
//! [graph]
//! max_steps = 256
//! ```
//!
//! Every section and field is optional.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::graph::GraphConfig;
use crate::learning::WeightPolicy;
use crate::plugin::PluginEnablement;
use crate::search::Bm25Params;
use crate::tool::PermissionChecker;

/// `[plugins]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginsConfig {
    /// Directory scanned for plugin subdirectories.
    pub dir: PathBuf,
    #[serde(flatten)]
    pub enablement: PluginEnablement,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("plugins"),
            enablement: PluginEnablement::default(),
        }
    }
}

/// `[agents.<name>]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub permissions: Vec<String>,
}

/// `[search]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Files or directories whose `.md`/`.txt` files are indexed.
    pub corpus_dirs: Vec<PathBuf>,
    #[serde(flatten)]
    pub bm25: Bm25Params,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            corpus_dirs: vec![PathBuf::from("README.md"), PathBuf::from("docs")],
            bm25: Bm25Params::default(),
        }
    }
}

/// `[learning]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    /// Durable store file. Defaults to the XDG data directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(flatten)]
    pub policy: WeightPolicy,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubstrateConfig {
    pub plugins: PluginsConfig,
    pub agents: BTreeMap<String, AgentConfig>,
    pub search: SearchConfig,
    pub learning: LearningConfig,
    pub graph: GraphConfig,
}

impl SubstrateConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml_str(&content, &path.display().to_string())
    }

    /// Parse TOML text. `label` names the source in errors.
    pub fn from_toml_str(content: &str, label: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: label.to_string(),
            message: e.to_string(),
        })?;
        config.validate(label)?;
        Ok(config)
    }

    fn validate(&self, label: &str) -> ConfigResult<()> {
        self.learning
            .policy
            .validate()
            .map_err(|message| ConfigError::Parse {
                path: label.to_string(),
                message,
            })?;
        if self.graph.max_steps == 0 {
            return Err(ConfigError::Parse {
                path: label.to_string(),
                message: "graph.max_steps must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// Save to a TOML file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Resolve relative plugin and corpus paths against `base`.
    pub fn rebase(mut self, base: &Path) -> Self {
        let anchor = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        anchor(&mut self.plugins.dir);
        self.search.corpus_dirs.iter_mut().for_each(anchor);
        if let Some(path) = self.learning.path.as_mut() {
            anchor(path);
        }
        self
    }

    /// Per-agent allow-lists.
    pub fn permission_checker(&self) -> PermissionChecker {
        PermissionChecker::from_allow_list(
            self.agents
                .iter()
                .map(|(name, agent)| (name.clone(), agent.permissions.clone())),
        )
    }
}
