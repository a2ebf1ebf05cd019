//! The run loop: drive a graph from its entry to [`END`].

use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn};

use crate::error::{GraphError, GraphResult};

use super::node::RunContext;
use super::state::{GraphState, NodeFailure};
use super::{END, Edge, Graph};

/// Engine limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Node executions allowed per run before it is aborted.
    pub max_steps: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self { max_steps: 256 }
    }
}

/// Executes graphs. Stateless apart from its limits; one engine serves any
/// number of graphs and concurrent runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphEngine {
    config: GraphConfig,
}

impl GraphEngine {
    pub fn new(config: GraphConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> GraphConfig {
        self.config
    }

    /// Run `graph` to completion over `state`.
    ///
    /// Node failures are recorded in `state.errors` and never abort the run.
    /// A routing answer outside the declared candidates, or exceeding
    /// `max_steps`, aborts with an error.
    pub fn run(
        &self,
        graph: &Graph,
        mut state: GraphState,
        ctx: &RunContext,
    ) -> GraphResult<GraphState> {
        let span = info_span!(
            "graph_run",
            graph = %graph.name(),
            agent = %ctx.caller().name
        );
        let _enter = span.enter();

        let mut current = graph.entry().to_string();
        let mut steps = 0usize;

        while current != END {
            if steps == self.config.max_steps {
                warn!(max_steps = self.config.max_steps, "step limit exceeded");
                return Err(GraphError::StepLimitExceeded {
                    graph: graph.name().to_string(),
                    max_steps: self.config.max_steps,
                });
            }
            steps += 1;

            // Validated at build time: every edge target is a node or END.
            let Some(node) = graph.node(&current) else {
                return Err(GraphError::RoutingError {
                    graph: graph.name().to_string(),
                    from: state.current_node().to_string(),
                    target: current,
                });
            };

            state.history.push(current.clone());
            debug!(node = %current, step = steps, "executing node");

            current = match node.execute(&mut state, ctx) {
                Ok(()) => self.next_after(graph, &current, &state)?,
                Err(e) => {
                    warn!(node = %current, error = %e, "node failed");
                    state.errors.push(NodeFailure {
                        node: current.clone(),
                        message: e.to_string(),
                    });
                    match graph.error_handler() {
                        Some(handler) if handler != current => handler.to_string(),
                        _ => END.to_string(),
                    }
                }
            };
        }

        state.history.push(END.to_string());
        info!(steps, errors = state.errors.len(), "graph run complete");
        Ok(state)
    }

    fn next_after(&self, graph: &Graph, from: &str, state: &GraphState) -> GraphResult<String> {
        match graph.edge(from) {
            None => Ok(END.to_string()),
            Some(Edge::Static(to)) => Ok(to.clone()),
            Some(Edge::Conditional { candidates, route }) => {
                let target = route(state);
                if target == END || candidates.contains(&target) {
                    debug!(from, to = %target, "routed");
                    Ok(target)
                } else {
                    Err(GraphError::RoutingError {
                        graph: graph.name().to_string(),
                        from: from.to_string(),
                        target,
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::NodeError;
    use crate::graph::{FnNode, RoutePlan, route_next};
    use crate::tool::{AgentIdentity, PermissionSet, ToolRegistry};

    fn ctx() -> RunContext {
        RunContext::new(
            Arc::new(ToolRegistry::new()),
            AgentIdentity::new("test", PermissionSet::new()),
        )
    }

    fn noop() -> FnNode {
        FnNode::new(|_, _| Ok(()))
    }

    fn counting(counter: Arc<AtomicUsize>) -> FnNode {
        FnNode::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn planned_route_is_followed_deterministically() {
        let graph = Graph::builder("plan")
            .add_node("A", noop())
            .add_node(
                "B",
                FnNode::new(|state, _| {
                    state.route = Some(RoutePlan::new(vec!["C".into()]));
                    Ok(())
                }),
            )
            .add_node("C", noop())
            .add_node("D", noop())
            .set_entry("A")
            .add_edge("A", "B")
            .add_conditional_edges("B", ["C", "D"], route_next)
            .add_edge("C", END)
            .add_edge("D", END)
            .build()
            .unwrap();

        let engine = GraphEngine::default();
        for _ in 0..3 {
            let state = engine.run(&graph, GraphState::new("q"), &ctx()).unwrap();
            assert_eq!(state.history, vec!["A", "B", "C", END]);
        }
    }

    #[test]
    fn routing_outside_candidates_is_fatal() {
        let after = Arc::new(AtomicUsize::new(0));
        let graph = Graph::builder("bad")
            .add_node("A", noop())
            .add_node("B", counting(after.clone()))
            .set_entry("A")
            .add_conditional_edges("A", ["B"], |_| "Z".to_string())
            .add_edge("B", END)
            .build()
            .unwrap();

        let err = GraphEngine::default()
            .run(&graph, GraphState::new("q"), &ctx())
            .unwrap_err();
        match err {
            GraphError::RoutingError { from, target, .. } => {
                assert_eq!(from, "A");
                assert_eq!(target, "Z");
            }
            other => panic!("unexpected: {other}"),
        }
        assert_eq!(after.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn node_failure_routes_to_error_handler() {
        let graph = Graph::builder("errors")
            .add_node("work", FnNode::new(|_, _| Err(NodeError::failed("boom"))))
            .add_node("never", noop())
            .add_node(
                "recover",
                FnNode::new(|state, _| {
                    state.final_output = Some(format!("{} error(s)", state.errors.len()));
                    Ok(())
                }),
            )
            .set_entry("work")
            .add_edge("work", "never")
            .add_edge("never", END)
            .add_edge("recover", END)
            .set_error_handler("recover")
            .build()
            .unwrap();

        let state = GraphEngine::default()
            .run(&graph, GraphState::new("q"), &ctx())
            .unwrap();
        assert_eq!(state.history, vec!["work", "recover", END]);
        assert_eq!(state.errors.len(), 1);
        assert_eq!(state.errors[0].node, "work");
        assert_eq!(state.errors[0].message, "boom");
        assert_eq!(state.final_output.as_deref(), Some("1 error(s)"));
    }

    #[test]
    fn failing_error_handler_terminates() {
        let graph = Graph::builder("handler-fails")
            .add_node("work", FnNode::new(|_, _| Err(NodeError::failed("first"))))
            .add_node("recover", FnNode::new(|_, _| Err(NodeError::failed("second"))))
            .set_entry("work")
            .set_error_handler("recover")
            .build()
            .unwrap();
        let state = GraphEngine::default()
            .run(&graph, GraphState::new("q"), &ctx())
            .unwrap();
        assert_eq!(state.history, vec!["work", "recover", END]);
        assert_eq!(state.errors.len(), 2);
    }

    #[test]
    fn failure_without_handler_ends_run() {
        let graph = Graph::builder("no-handler")
            .add_node("work", FnNode::new(|_, _| Err(NodeError::failed("x"))))
            .add_node("next", noop())
            .set_entry("work")
            .add_edge("work", "next")
            .build()
            .unwrap();
        let state = GraphEngine::default()
            .run(&graph, GraphState::new("q"), &ctx())
            .unwrap();
        assert_eq!(state.history, vec!["work", END]);
    }

    #[test]
    fn cycle_hits_step_limit() {
        let graph = Graph::builder("loop")
            .add_node("ping", noop())
            .add_node("pong", noop())
            .set_entry("ping")
            .add_edge("ping", "pong")
            .add_edge("pong", "ping")
            .build()
            .unwrap();
        let engine = GraphEngine::new(GraphConfig { max_steps: 10 });
        assert!(matches!(
            engine.run(&graph, GraphState::new("q"), &ctx()),
            Err(GraphError::StepLimitExceeded { max_steps: 10, .. })
        ));
    }

    #[test]
    fn node_without_edge_terminates() {
        let graph = Graph::builder("single")
            .add_node("only", noop())
            .set_entry("only")
            .build()
            .unwrap();
        let state = GraphEngine::default()
            .run(&graph, GraphState::new("q"), &ctx())
            .unwrap();
        assert_eq!(state.history, vec!["only", END]);
    }
}
