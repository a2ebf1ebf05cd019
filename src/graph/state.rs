//! Per-run state threaded through every node of a graph.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::learning::LearningRecord;

use super::intent::IntentMatch;

/// Ordered list of node names the router planned for this request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoutePlan {
    pub steps: Vec<String>,
}

impl RoutePlan {
    pub fn new(steps: Vec<String>) -> Self {
        Self { steps }
    }

    pub fn contains(&self, step: &str) -> bool {
        self.steps.iter().any(|s| s == step)
    }
}

/// A document chunk pulled in by a retrieval node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedDoc {
    pub id: String,
    pub source: String,
    pub text: String,
    /// Ranking score; re-ranking nodes may rewrite it.
    pub score: f64,
    /// Learning multiplier applied to the score, 1.0 if none.
    pub weight: f64,
}

/// One tool call made during the run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCallRecord {
    pub node: String,
    pub tool: String,
    pub ok: bool,
    pub summary: String,
}

/// A node that failed; the run carried on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeFailure {
    pub node: String,
    pub message: String,
}

/// Mutable record of one graph run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GraphState {
    /// The request that started the run.
    pub request: String,
    pub intent: Option<IntentMatch>,
    pub route: Option<RoutePlan>,
    pub retrieved: Vec<RetrievedDoc>,
    pub tool_outputs: Vec<ToolCallRecord>,
    pub scores: BTreeMap<String, f64>,
    pub findings: Vec<LearningRecord>,
    /// Visited nodes in order. Ends with the terminal marker after a run.
    pub history: Vec<String>,
    pub errors: Vec<NodeFailure>,
    pub final_output: Option<String>,
}

impl GraphState {
    pub fn new(request: impl Into<String>) -> Self {
        Self {
            request: request.into(),
            ..Self::default()
        }
    }

    pub fn visited(&self, node: &str) -> bool {
        self.history.iter().any(|h| h == node)
    }

    /// The node currently executing (the last history entry).
    pub fn current_node(&self) -> &str {
        self.history.last().map(String::as_str).unwrap_or("")
    }
}
