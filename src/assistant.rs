//! The project assistant: an intent-routed graph that answers questions from
//! the documentation index and the findings history.
//!
//! ```text
//! intent_router ──► docs_retrieve ──► feedback_rank ──┐
//!        │                                            ├──► compose ──► END
//!        └────────► findings_lookup ──────────────────┘
//! ```
//!
//! Every hop after the router follows the planned route. `compose` is also
//! the error handler, so a failing step still yields an answer.

use std::collections::HashSet;

use serde_json::Value;

use crate::error::{ConduitResult, GraphResult, NodeError};
use crate::graph::{
    FnNode, Graph, GraphState, IntentCategory, IntentClassifier, IntentRouterNode, Node,
    RetrievedDoc, RunContext, route_next,
};
use crate::learning::{Fingerprint, LearningRecord};
use crate::search::tokenize;
use crate::substrate::Substrate;
use crate::tool::ToolArgs;

/// Node names.
pub const INTENT_ROUTER: &str = "intent_router";
pub const DOCS_RETRIEVE: &str = "docs_retrieve";
pub const FEEDBACK_RANK: &str = "feedback_rank";
pub const FINDINGS_LOOKUP: &str = "findings_lookup";
pub const COMPOSE: &str = "compose";

/// Category under which documentation chunks collect reader feedback. The
/// chunk id is the finding description.
pub const DOC_FEEDBACK_CATEGORY: &str = "docs";

const FINDINGS_KEYWORDS: &[(&str, f64)] = &[
    ("finding", 2.0),
    ("findings", 2.0),
    ("feedback", 2.0),
    ("review", 1.5),
    ("reviews", 1.5),
    ("rejected", 1.5),
    ("accepted", 1.5),
    ("confirmed", 1.5),
    ("history", 1.5),
    ("learned", 1.5),
    ("positive", 1.0),
    ("false", 1.0),
];

const KNOWLEDGE_KEYWORDS: &[(&str, f64)] = &[
    ("architecture", 2.0),
    ("docs", 1.5),
    ("documentation", 1.5),
    ("design", 1.5),
    ("explain", 1.5),
    ("overview", 1.5),
    ("structure", 1.5),
    ("how", 1.0),
    ("what", 1.0),
    ("module", 1.0),
    ("component", 1.0),
    ("plugin", 1.0),
    ("pattern", 1.0),
    ("pipeline", 1.0),
    ("graph", 1.0),
    ("workflow", 1.0),
];

/// Tool names the assistant calls and how much it asks for.
#[derive(Debug, Clone, PartialEq)]
pub struct AssistantTools {
    pub docs_search: String,
    pub finding_weight: String,
    pub findings_search: String,
    pub top_k: usize,
    pub findings_limit: usize,
}

impl Default for AssistantTools {
    fn default() -> Self {
        Self {
            docs_search: "docs.search_project_docs".into(),
            finding_weight: "learning.weight".into(),
            findings_search: "learning.search".into(),
            top_k: 5,
            findings_limit: 10,
        }
    }
}

/// The classifier behind the router: `knowledge` (the fallback) and
/// `findings`.
pub fn classifier() -> IntentClassifier {
    IntentClassifier::new(
        vec![
            IntentCategory::new("knowledge")
                .keywords(KNOWLEDGE_KEYWORDS.iter().copied())
                .route([DOCS_RETRIEVE, FEEDBACK_RANK]),
            IntentCategory::new("findings")
                .keywords(FINDINGS_KEYWORDS.iter().copied())
                .route([FINDINGS_LOOKUP]),
        ],
        "knowledge",
    )
}

/// A built assistant graph.
#[derive(Debug)]
pub struct Assistant {
    graph: Graph,
}

impl Assistant {
    pub fn new(tools: AssistantTools) -> GraphResult<Self> {
        let router = IntentRouterNode::new(classifier(), [COMPOSE]);
        let candidates = router.candidates();

        let graph = Graph::builder("assistant")
            .add_node(INTENT_ROUTER, router)
            .add_node(
                DOCS_RETRIEVE,
                DocsRetrieveNode {
                    tool: tools.docs_search,
                    top_k: tools.top_k,
                },
            )
            .add_node(
                FEEDBACK_RANK,
                FeedbackRankNode {
                    tool: tools.finding_weight,
                },
            )
            .add_node(
                FINDINGS_LOOKUP,
                FindingsLookupNode {
                    tool: tools.findings_search,
                    limit: tools.findings_limit,
                },
            )
            .add_node(COMPOSE, FnNode::new(compose))
            .set_entry(INTENT_ROUTER)
            .add_conditional_edges(INTENT_ROUTER, candidates.clone(), route_next)
            .add_conditional_edges(DOCS_RETRIEVE, candidates.clone(), route_next)
            .add_conditional_edges(FEEDBACK_RANK, candidates.clone(), route_next)
            .add_conditional_edges(FINDINGS_LOOKUP, candidates, route_next)
            .add_edge(COMPOSE, crate::graph::END)
            .set_error_handler(COMPOSE)
            .build()?;
        Ok(Self { graph })
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Answer `question` on behalf of `agent`.
    pub fn ask(
        &self,
        substrate: &Substrate,
        agent: &str,
        question: &str,
    ) -> ConduitResult<GraphState> {
        substrate.run(&self.graph, agent, question)
    }
}

struct DocsRetrieveNode {
    tool: String,
    top_k: usize,
}

impl Node for DocsRetrieveNode {
    fn execute(&self, state: &mut GraphState, ctx: &RunContext) -> Result<(), NodeError> {
        let args = ToolArgs::new()
            .with("query", state.request.clone())
            .with("top_k", self.top_k);
        let out = ctx.invoke_recorded(state, &self.tool, &args)?;
        let hits = out
            .data
            .as_array()
            .ok_or_else(|| NodeError::failed(format!("{} returned no hit list", self.tool)))?;
        state.retrieved = hits.iter().filter_map(doc_from_hit).collect();
        Ok(())
    }
}

fn doc_from_hit(hit: &Value) -> Option<RetrievedDoc> {
    Some(RetrievedDoc {
        id: hit.get("id")?.as_str()?.to_string(),
        source: hit.get("source")?.as_str()?.to_string(),
        text: hit.get("text")?.as_str()?.to_string(),
        score: hit.get("score")?.as_f64()?,
        weight: 1.0,
    })
}

/// Scales each retrieved chunk by its learned weight, then re-sorts.
struct FeedbackRankNode {
    tool: String,
}

impl Node for FeedbackRankNode {
    fn execute(&self, state: &mut GraphState, ctx: &RunContext) -> Result<(), NodeError> {
        let mut adjusted = 0usize;
        for i in 0..state.retrieved.len() {
            let fingerprint = Fingerprint::compute(DOC_FEEDBACK_CATEGORY, &state.retrieved[i].id);
            let args = ToolArgs::new().with("fingerprint", fingerprint.as_str());
            let weight = ctx
                .invoke(&self.tool, &args)?
                .data
                .get("weight")
                .and_then(Value::as_f64)
                .unwrap_or(1.0);
            let doc = &mut state.retrieved[i];
            if weight != 1.0 {
                adjusted += 1;
            }
            doc.weight = weight;
            doc.score *= weight;
        }
        state
            .retrieved
            .sort_by(|a, b| b.score.total_cmp(&a.score));
        state.scores.insert("rank.adjusted".into(), adjusted as f64);
        Ok(())
    }
}

/// Searches the findings history for each content word of the request.
struct FindingsLookupNode {
    tool: String,
    limit: usize,
}

impl FindingsLookupNode {
    fn keywords(request: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        tokenize(request)
            .into_iter()
            .filter(|w| w.chars().count() > 3)
            .filter(|w| !FINDINGS_KEYWORDS.iter().any(|(k, _)| k == w))
            .filter(|w| seen.insert(w.clone()))
            .collect()
    }
}

impl Node for FindingsLookupNode {
    fn execute(&self, state: &mut GraphState, ctx: &RunContext) -> Result<(), NodeError> {
        let mut keywords = Self::keywords(&state.request);
        if keywords.is_empty() {
            keywords.push(String::new());
        }

        let mut seen: HashSet<Fingerprint> = state
            .findings
            .iter()
            .map(|r| r.fingerprint.clone())
            .collect();
        for keyword in keywords {
            let args = ToolArgs::new()
                .with("keyword", keyword)
                .with("limit", self.limit);
            let out = ctx.invoke_recorded(state, &self.tool, &args)?;
            let records: Vec<LearningRecord> =
                serde_json::from_value(out.data).map_err(|e| {
                    NodeError::failed(format!("{} returned malformed records: {e}", self.tool))
                })?;
            for record in records {
                if state.findings.len() >= self.limit {
                    break;
                }
                if seen.insert(record.fingerprint.clone()) {
                    state.findings.push(record);
                }
            }
        }
        Ok(())
    }
}

fn compose(state: &mut GraphState, _ctx: &RunContext) -> Result<(), NodeError> {
    let mut out = String::new();
    if let Some(intent) = &state.intent {
        let categories: Vec<&str> = intent.categories().collect();
        out.push_str(&format!("intent: {}\n", categories.join(" + ")));
    }

    if !state.retrieved.is_empty() {
        out.push_str("\ndocumentation:\n");
        for (n, doc) in state.retrieved.iter().enumerate() {
            out.push_str(&format!(
                "[{}] {} (score {:.3}, weight {:.2})\n",
                n + 1,
                doc.id,
                doc.score,
                doc.weight
            ));
            out.push_str(&format!("    {}\n", excerpt(&doc.text, 200)));
        }
    }

    if !state.findings.is_empty() {
        out.push_str("\nfindings:\n");
        for record in &state.findings {
            out.push_str(&format!(
                "- [{}] {} (accepted {}, rejected {}, confirmed {}, fixed {})\n",
                record.category,
                excerpt(&record.description, 120),
                record.accepted,
                record.rejected,
                record.confirmed,
                record.fixed
            ));
        }
    }

    if state.retrieved.is_empty() && state.findings.is_empty() {
        out.push_str("\nno matching documentation or findings\n");
    }

    if !state.errors.is_empty() {
        out.push_str("\nerrors:\n");
        for failure in &state.errors {
            out.push_str(&format!("- {}: {}\n", failure.node, failure.message));
        }
    }

    state.final_output = Some(out.trim_end().to_string());
    Ok(())
}

/// First `max` characters of `text` on one line.
fn excerpt(text: &str, max: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max {
        flat
    } else {
        let cut: String = flat.chars().take(max).collect();
        format!("{cut}...")
    }
}
