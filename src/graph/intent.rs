//! Intent routing: keyword-scored category selection for conditional edges.
//!
//! The classifier scores request words against weighted keyword sets. The
//! router node turns the winning categories into a [`RoutePlan`], and
//! [`route_next`] walks that plan as a conditional-edge routing function.

use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use crate::error::NodeError;
use crate::search::tokenize;

use super::END;
use super::node::{Node, RunContext};
use super::state::{GraphState, RoutePlan};

/// A routable category: weighted keywords and the nodes that serve it.
#[derive(Debug, Clone, PartialEq)]
pub struct IntentCategory {
    pub name: String,
    pub keywords: HashMap<String, f64>,
    /// Nodes to visit, in order, when this category is selected.
    pub route: Vec<String>,
}

impl IntentCategory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keywords: HashMap::new(),
            route: Vec::new(),
        }
    }

    pub fn keyword(mut self, word: impl Into<String>, weight: f64) -> Self {
        self.keywords.insert(word.into().to_lowercase(), weight);
        self
    }

    pub fn keywords<'a>(mut self, words: impl IntoIterator<Item = (&'a str, f64)>) -> Self {
        for (word, weight) in words {
            self.keywords.insert(word.to_lowercase(), weight);
        }
        self
    }

    pub fn route<S: Into<String>>(mut self, steps: impl IntoIterator<Item = S>) -> Self {
        self.route = steps.into_iter().map(Into::into).collect();
        self
    }

    fn score(&self, words: &[String]) -> f64 {
        words.iter().filter_map(|w| self.keywords.get(w)).sum()
    }
}

/// The classification of one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntentMatch {
    /// Best-scoring category, or the fallback.
    pub category: String,
    /// Every qualifying category with its score, in priority order.
    pub scores: Vec<(String, f64)>,
    /// More than one category qualified.
    pub combined: bool,
    /// Nothing qualified; `category` is the fallback.
    pub fallback: bool,
}

impl IntentMatch {
    /// Qualifying category names, in priority order.
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.scores.iter().map(|(name, _)| name.as_str())
    }
}

/// Weighted keyword classifier over a fixed, ordered set of categories.
///
/// Declaration order is priority order: it breaks score ties and orders
/// combined route plans.
#[derive(Debug, Clone)]
pub struct IntentClassifier {
    categories: Vec<IntentCategory>,
    min_score: f64,
    fallback: String,
}

impl IntentClassifier {
    pub const DEFAULT_MIN_SCORE: f64 = 2.0;

    /// `fallback` must name one of `categories` for its route to be used.
    pub fn new(categories: Vec<IntentCategory>, fallback: impl Into<String>) -> Self {
        Self {
            categories,
            min_score: Self::DEFAULT_MIN_SCORE,
            fallback: fallback.into(),
        }
    }

    pub fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn categories(&self) -> &[IntentCategory] {
        &self.categories
    }

    /// Every node any category can route to, without duplicates.
    pub fn route_targets(&self) -> Vec<String> {
        let mut targets: Vec<String> = Vec::new();
        for step in self.categories.iter().flat_map(|c| c.route.iter()) {
            if !targets.contains(step) {
                targets.push(step.clone());
            }
        }
        targets
    }

    pub fn classify(&self, text: &str) -> IntentMatch {
        let words = tokenize(text);
        let scores: Vec<(String, f64)> = self
            .categories
            .iter()
            .map(|c| (c.name.clone(), c.score(&words)))
            .filter(|(_, score)| *score >= self.min_score)
            .collect();

        // First maximum wins, so ties go to the earlier category.
        let best = scores
            .iter()
            .fold(None::<&(String, f64)>, |best, cand| match best {
                Some(b) if b.1 >= cand.1 => Some(b),
                _ => Some(cand),
            })
            .map(|(name, _)| name.clone());

        match best {
            Some(category) => IntentMatch {
                category,
                combined: scores.len() > 1,
                fallback: false,
                scores,
            },
            None => IntentMatch {
                category: self.fallback.clone(),
                scores: Vec::new(),
                combined: false,
                fallback: true,
            },
        }
    }

    /// Route plan for a match: the routes of every qualifying category in
    /// priority order (or the fallback's), de-duplicated, then `trailing`.
    pub fn plan(&self, intent: &IntentMatch, trailing: &[String]) -> RoutePlan {
        let selected: Vec<&str> = if intent.fallback {
            vec![intent.category.as_str()]
        } else {
            intent.categories().collect()
        };

        let mut steps: Vec<String> = Vec::new();
        let routes = self
            .categories
            .iter()
            .filter(|c| selected.contains(&c.name.as_str()))
            .flat_map(|c| c.route.iter())
            .chain(trailing.iter());
        for step in routes {
            if !steps.contains(step) {
                steps.push(step.clone());
            }
        }
        RoutePlan::new(steps)
    }
}

/// Graph node that classifies `state.request` and writes `state.intent` and
/// `state.route`.
#[derive(Debug, Clone)]
pub struct IntentRouterNode {
    classifier: IntentClassifier,
    trailing: Vec<String>,
}

impl IntentRouterNode {
    /// `trailing` steps run after the category routes, whatever the intent.
    pub fn new<S: Into<String>>(
        classifier: IntentClassifier,
        trailing: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            classifier,
            trailing: trailing.into_iter().map(Into::into).collect(),
        }
    }

    pub fn classifier(&self) -> &IntentClassifier {
        &self.classifier
    }

    /// Every node this router may send a run to.
    pub fn candidates(&self) -> Vec<String> {
        let mut targets = self.classifier.route_targets();
        for step in &self.trailing {
            if !targets.contains(step) {
                targets.push(step.clone());
            }
        }
        targets
    }
}

impl Node for IntentRouterNode {
    fn execute(&self, state: &mut GraphState, _ctx: &RunContext) -> Result<(), NodeError> {
        let intent = self.classifier.classify(&state.request);
        let plan = self.classifier.plan(&intent, &self.trailing);
        debug!(
            category = %intent.category,
            combined = intent.combined,
            steps = ?plan.steps,
            "intent routed"
        );
        for (name, score) in &intent.scores {
            state.scores.insert(format!("intent.{name}"), *score);
        }
        state.intent = Some(intent);
        state.route = Some(plan);
        Ok(())
    }
}

/// Routing function: the first planned step not yet visited, else [`END`].
pub fn route_next(state: &GraphState) -> String {
    state
        .route
        .as_ref()
        .and_then(|plan| plan.steps.iter().find(|step| !state.visited(step)))
        .cloned()
        .unwrap_or_else(|| END.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> IntentClassifier {
        IntentClassifier::new(
            vec![
                IntentCategory::new("knowledge")
                    .keywords([("architecture", 2.0), ("docs", 1.5), ("explain", 1.5)])
                    .route(["docs_retrieve"]),
                IntentCategory::new("findings")
                    .keywords([("finding", 2.0), ("findings", 2.0), ("review", 1.5)])
                    .route(["findings_lookup"]),
                IntentCategory::new("status")
                    .keywords([("status", 3.0), ("architecture", 2.0)])
                    .route(["status_fetch", "docs_retrieve"]),
            ],
            "knowledge",
        )
    }

    #[test]
    fn single_category_wins() {
        let m = classifier().classify("Explain the docs, please");
        assert_eq!(m.category, "knowledge");
        assert!(!m.combined && !m.fallback);
        assert_eq!(m.scores, vec![("knowledge".to_string(), 3.0)]);
    }

    #[test]
    fn below_threshold_falls_back() {
        let c = classifier();
        let m = c.classify("hello there, review");
        assert!(m.fallback);
        assert_eq!(m.category, "knowledge");
        let plan = c.plan(&m, &["compose".to_string()]);
        assert_eq!(plan.steps, vec!["docs_retrieve", "compose"]);
    }

    #[test]
    fn ties_go_to_declaration_order() {
        // "architecture" scores 2.0 for both knowledge and status.
        let m = classifier().classify("architecture");
        assert_eq!(m.category, "knowledge");
        assert!(m.combined);
    }

    #[test]
    fn combined_plan_concatenates_in_priority_order() {
        let c = classifier();
        let m = c.classify("status of the review findings");
        assert!(m.combined);
        assert_eq!(m.category, "findings");
        let plan = c.plan(&m, &["compose".to_string()]);
        assert_eq!(plan.steps, vec!["findings_lookup", "status_fetch", "docs_retrieve", "compose"]);
    }

    #[test]
    fn route_next_skips_visited_steps() {
        let mut state = GraphState::new("q");
        assert_eq!(route_next(&state), END);
        state.route = Some(RoutePlan::new(vec!["a".into(), "b".into()]));
        assert_eq!(route_next(&state), "a");
        state.history.push("a".into());
        assert_eq!(route_next(&state), "b");
        state.history.push("b".into());
        assert_eq!(route_next(&state), END);
    }

    #[test]
    fn router_candidates_cover_all_routes() {
        let node = IntentRouterNode::new(classifier(), ["compose"]);
        assert_eq!(
            node.candidates(),
            vec!["docs_retrieve", "findings_lookup", "status_fetch", "compose"]
        );
    }
}
