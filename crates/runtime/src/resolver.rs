//! Graph resolver: from a graph id to a compiled, executable runtime.

use std::sync::Arc;

use serde_json::{Map, Value};
use uuid::Uuid;

use strand_domain::identity::{Caller, WorkspaceRole};
use strand_domain::llm::LlmParams;
use strand_domain::Result;
use strand_graphs::GraphStore;

use crate::checkpoint::CheckpointStore;
use crate::graph::{AgentGraphRuntime, CompiledGraph};
use crate::llm::LlmClientFactory;
use crate::runtime::GraphRuntime;
use crate::tool::ToolRegistry;

/// A runtime ready to execute plus the context seeded from the graph's
/// declared variables.
pub struct ResolvedRun {
    pub runtime: Arc<dyn GraphRuntime>,
    pub graph_id: Option<Uuid>,
    pub context: Map<String, Value>,
}

impl std::fmt::Debug for ResolvedRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedRun")
            .field("graph_id", &self.graph_id)
            .field("context", &self.context)
            .finish()
    }
}

pub struct GraphResolver {
    graphs: Arc<GraphStore>,
    checkpoints: Arc<dyn CheckpointStore>,
    tools: Arc<ToolRegistry>,
    llm_factory: Arc<dyn LlmClientFactory>,
}

impl GraphResolver {
    pub fn new(
        graphs: Arc<GraphStore>,
        checkpoints: Arc<dyn CheckpointStore>,
        tools: Arc<ToolRegistry>,
        llm_factory: Arc<dyn LlmClientFactory>,
    ) -> Self {
        Self {
            graphs,
            checkpoints,
            tools,
            llm_factory,
        }
    }

    /// Resolve a runtime for a turn.
    ///
    /// Without a graph id the built-in default single-node agent is used,
    /// configured from the resolved LLM params. With one, the caller's
    /// access is checked (viewer or better), the stored nodes and edges are
    /// compiled, and the graph's context variables seed the run context.
    pub fn resolve(
        &self,
        graph_id: Option<Uuid>,
        caller: &Caller,
        llm_params: &LlmParams,
    ) -> Result<ResolvedRun> {
        let llm = self.llm_factory.client(llm_params)?;

        let Some(graph_id) = graph_id else {
            let runtime = AgentGraphRuntime::new(
                CompiledGraph::default_agent(),
                llm,
                self.tools.clone(),
                self.checkpoints.clone(),
            );
            return Ok(ResolvedRun {
                runtime: Arc::new(runtime),
                graph_id: None,
                context: Map::new(),
            });
        };

        let graph = self.graphs.require(graph_id)?;
        graph.ensure_access(caller, WorkspaceRole::Viewer)?;

        let (nodes, edges) = self.graphs.nodes_and_edges(graph_id);
        let compiled = CompiledGraph::compile(&nodes, &edges)?;
        tracing::debug!(
            graph_id = %graph_id,
            nodes = nodes.len(),
            edges = edges.len(),
            "graph compiled"
        );

        let runtime =
            AgentGraphRuntime::new(compiled, llm, self.tools.clone(), self.checkpoints.clone());
        Ok(ResolvedRun {
            runtime: Arc::new(runtime),
            graph_id: Some(graph_id),
            context: graph.context_values(),
        })
    }
}
