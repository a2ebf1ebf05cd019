//! Process bootstrap: wires the learning store, the document index, the
//! plugin-loaded tool registry and the permission checker from one config.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::SubstrateConfig;
use crate::error::{ConduitResult, RegistryResult, SearchResult};
use crate::graph::{Graph, GraphEngine, GraphState, RunContext};
use crate::learning::LearningMemory;
use crate::paths::ConduitPaths;
use crate::plugin::{LoadReport, PluginCatalog, PluginLoader, PluginServices};
use crate::search::SharedIndex;
use crate::search::corpus::load_corpus;
use crate::tool::{AgentIdentity, PermissionChecker, ToolArgs, ToolOutput, ToolRegistry};

/// The assembled runtime. Immutable after bootstrap apart from the index,
/// which may be rebuilt in place.
#[derive(Debug)]
pub struct Substrate {
    config: SubstrateConfig,
    registry: Arc<ToolRegistry>,
    checker: PermissionChecker,
    services: PluginServices,
    report: LoadReport,
    engine: GraphEngine,
}

impl Substrate {
    /// Bootstrap with the built-in plugin catalog.
    pub fn bootstrap(config: SubstrateConfig) -> ConduitResult<Self> {
        Self::with_catalog(config, PluginCatalog::builtin())
    }

    /// Bootstrap in order: learning store, document index, plugins, agents.
    ///
    /// An unusable learning store degrades to memory. A corpus that cannot be
    /// indexed is fatal. Broken plugins are skipped and listed in the report.
    pub fn with_catalog(config: SubstrateConfig, catalog: PluginCatalog) -> ConduitResult<Self> {
        let learning = Arc::new(open_learning(&config));

        let index = Arc::new(SharedIndex::default());
        let documents = load_corpus(&config.search.corpus_dirs)?;
        index.rebuild(documents, config.search.bm25)?;
        info!(chunks = index.len(), "document index ready");

        let services = PluginServices { index, learning };
        let mut registry = ToolRegistry::new();
        let loader = PluginLoader::new(
            config.plugins.dir.clone(),
            config.plugins.enablement.clone(),
            catalog,
        );
        let report = loader.load(&mut registry, &services)?;

        let checker = config.permission_checker();
        let engine = GraphEngine::new(config.graph);
        info!(
            tools = registry.len(),
            agents = checker.agents().len(),
            durable = !services.learning.is_ephemeral(),
            "substrate ready"
        );

        Ok(Self {
            config,
            registry: Arc::new(registry),
            checker,
            services,
            report,
            engine,
        })
    }

    pub fn config(&self) -> &SubstrateConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn checker(&self) -> &PermissionChecker {
        &self.checker
    }

    pub fn index(&self) -> &Arc<SharedIndex> {
        &self.services.index
    }

    pub fn learning(&self) -> &Arc<LearningMemory> {
        &self.services.learning
    }

    pub fn report(&self) -> &LoadReport {
        &self.report
    }

    pub fn engine(&self) -> &GraphEngine {
        &self.engine
    }

    /// Identity of a configured agent. Unknown agents hold no permissions.
    pub fn identity(&self, agent: &str) -> AgentIdentity {
        self.checker.identity(agent)
    }

    /// Context for a graph run made on behalf of `agent`.
    pub fn run_context(&self, agent: &str) -> RunContext {
        RunContext::new(Arc::clone(&self.registry), self.identity(agent))
    }

    /// Invoke one tool directly as `agent`.
    pub fn invoke(&self, agent: &str, tool: &str, args: &ToolArgs) -> RegistryResult<ToolOutput> {
        self.registry.invoke(&self.identity(agent), tool, args)
    }

    /// Run `graph` on `request` as `agent`.
    pub fn run(&self, graph: &Graph, agent: &str, request: &str) -> ConduitResult<GraphState> {
        let ctx = self.run_context(agent);
        Ok(self.engine.run(graph, GraphState::new(request), &ctx)?)
    }

    /// Re-read the corpus and swap the index. On failure the old index stays.
    pub fn reindex(&self) -> SearchResult<usize> {
        let documents = load_corpus(&self.config.search.corpus_dirs)?;
        self.services
            .index
            .rebuild(documents, self.config.search.bm25)?;
        Ok(self.services.index.len())
    }
}

fn open_learning(config: &SubstrateConfig) -> LearningMemory {
    let policy = config.learning.policy;
    let path = config.learning.path.clone().or_else(|| {
        ConduitPaths::resolve()
            .ok()
            .map(|paths| paths.learning_store_file())
    });
    match path {
        Some(path) => LearningMemory::open(&path, policy),
        None => {
            warn!("no learning store path could be resolved, using in-memory store");
            LearningMemory::in_memory(policy)
        }
    }
}
