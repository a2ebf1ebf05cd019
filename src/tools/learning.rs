//! Tools over the learning memory: observe findings, label them, read weights
//! and guidance.

use std::sync::Arc;

use serde_json::json;

use crate::error::{ToolError, ToolResult};
use crate::learning::{FindingQuery, Fingerprint, LearningMemory, Outcome};
use crate::plugin::{PluginServices, ToolDeclaration};
use crate::tool::{Tool, ToolArgs, ToolOutput, ToolParam, ToolSignature};

use super::declared_signature;

const DEFAULT_SEARCH_LIMIT: usize = 10;
const DEFAULT_GUIDANCE_THRESHOLD: usize = 2;

macro_rules! learning_tool {
    ($(#[$doc:meta])* $name:ident, $description:expr, [$($param:expr),* $(,)?]) => {
        $(#[$doc])*
        pub struct $name {
            signature: ToolSignature,
            memory: Arc<LearningMemory>,
        }

        impl $name {
            pub fn new(signature: ToolSignature, memory: Arc<LearningMemory>) -> Self {
                Self { signature, memory }
            }

            pub fn factory(decl: &ToolDeclaration, services: &PluginServices) -> Arc<dyn Tool> {
                let signature = declared_signature(decl, $description, vec![$($param),*]);
                Arc::new(Self::new(signature, Arc::clone(&services.learning)))
            }
        }
    };
}

learning_tool!(
    /// Register a finding and return its fingerprint.
    ObserveFindingTool,
    "Record that a finding was surfaced and return its fingerprint.",
    [
        ToolParam::required("category", "Finding category, e.g. security or style"),
        ToolParam::required("description", "Finding text"),
    ]
);

learning_tool!(
    /// Label a finding with a reviewer outcome.
    RecordFeedbackTool,
    "Record reviewer feedback (accepted, rejected, confirmed, fixed, ignored) for a finding.",
    [
        ToolParam::required("fingerprint", "Finding fingerprint"),
        ToolParam::required("outcome", "accepted, rejected, confirmed, fixed or ignored"),
    ]
);

learning_tool!(
    /// Read the weight multiplier for a finding.
    FindingWeightTool,
    "Return the learned weight multiplier for a finding (1.0 when unseen).",
    [ToolParam::required("fingerprint", "Finding fingerprint")]
);

learning_tool!(
    /// Keyword search over recorded findings.
    SearchFindingsTool,
    "Search past findings by keyword, category and outcome, most recent first.",
    [
        ToolParam::optional("keyword", "Case-insensitive substring; empty matches all"),
        ToolParam::optional("category", "Only findings in this category"),
        ToolParam::optional("outcome", "Only findings labelled with this outcome"),
        ToolParam::optional("limit", "Maximum findings to return (default 10)"),
    ]
);

learning_tool!(
    /// Label counts across recorded findings.
    FindingStatsTool,
    "Count findings and their labels by outcome, overall and per category.",
    [ToolParam::optional("category", "Only count findings in this category")]
);

learning_tool!(
    /// Deprioritize and boost lists derived from history.
    LearningGuidanceTool,
    "Summarize which findings were historically rejected or confirmed.",
    [
        ToolParam::optional("min_rejected", "Rejections that deprioritize a finding (default 2)"),
        ToolParam::optional("min_confirmed", "Positive labels that boost a finding (default 2)"),
    ]
);

impl Tool for ObserveFindingTool {
    fn signature(&self) -> &ToolSignature {
        &self.signature
    }

    fn invoke(&self, args: &ToolArgs) -> ToolResult<ToolOutput> {
        let category = args.require_str("category")?;
        let description = args.require_str("description")?;
        let fingerprint = self.memory.observe(category, description)?;
        let weight = self.memory.get_weight(&fingerprint)?;
        Ok(ToolOutput::new(
            json!({ "fingerprint": fingerprint, "weight": weight }),
            format!("observed {category} finding {fingerprint}"),
        ))
    }
}

impl Tool for RecordFeedbackTool {
    fn signature(&self) -> &ToolSignature {
        &self.signature
    }

    fn invoke(&self, args: &ToolArgs) -> ToolResult<ToolOutput> {
        let fingerprint = Fingerprint::from(args.require_str("fingerprint")?);
        let outcome = parse_outcome(args.require_str("outcome")?)?;
        let record = self.memory.record_feedback(&fingerprint, outcome)?;
        let weight = record.weight(self.memory.policy());
        Ok(ToolOutput::new(
            json!({ "record": record, "weight": weight }),
            format!("recorded {outcome} for {fingerprint} (weight {weight:.2})"),
        ))
    }
}

impl Tool for FindingWeightTool {
    fn signature(&self) -> &ToolSignature {
        &self.signature
    }

    fn invoke(&self, args: &ToolArgs) -> ToolResult<ToolOutput> {
        let fingerprint = Fingerprint::from(args.require_str("fingerprint")?);
        let weight = self.memory.get_weight(&fingerprint)?;
        Ok(ToolOutput::new(
            json!({ "fingerprint": fingerprint, "weight": weight }),
            format!("weight {weight:.2}"),
        ))
    }
}

impl Tool for SearchFindingsTool {
    fn signature(&self) -> &ToolSignature {
        &self.signature
    }

    fn invoke(&self, args: &ToolArgs) -> ToolResult<ToolOutput> {
        let keyword = args.get_str("keyword").unwrap_or("");
        let limit = args.get_usize_or("limit", DEFAULT_SEARCH_LIMIT)?;
        let mut query = FindingQuery::keyword(keyword);
        if let Some(category) = args.get_str("category").filter(|c| !c.trim().is_empty()) {
            query = query.with_category(category);
        }
        if let Some(outcome) = args.get_str("outcome").filter(|o| !o.trim().is_empty()) {
            query = query.with_outcome(parse_outcome(outcome)?);
        }
        let mut records = self.memory.query(&query)?;
        records.truncate(limit);
        let summary = format!("{} finding(s) matching \"{keyword}\"", records.len());
        Ok(ToolOutput::new(json!(records), summary))
    }
}

impl Tool for FindingStatsTool {
    fn signature(&self) -> &ToolSignature {
        &self.signature
    }

    fn invoke(&self, args: &ToolArgs) -> ToolResult<ToolOutput> {
        let category = args.get_str("category").filter(|c| !c.trim().is_empty());
        let stats = self.memory.stats(category)?;
        let summary = stats.summary();
        Ok(ToolOutput::new(json!(stats), summary))
    }
}

impl Tool for LearningGuidanceTool {
    fn signature(&self) -> &ToolSignature {
        &self.signature
    }

    fn invoke(&self, args: &ToolArgs) -> ToolResult<ToolOutput> {
        let min_rejected = args.get_usize_or("min_rejected", DEFAULT_GUIDANCE_THRESHOLD)?;
        let min_confirmed = args.get_usize_or("min_confirmed", DEFAULT_GUIDANCE_THRESHOLD)?;
        let guidance = self
            .memory
            .guidance(min_rejected as u64, min_confirmed as u64)?;
        let summary = guidance.summary();
        Ok(ToolOutput::new(json!(guidance), summary))
    }
}

fn parse_outcome(raw: &str) -> ToolResult<Outcome> {
    raw.parse().map_err(|message| ToolError::InvalidArgument {
        name: "outcome".into(),
        message,
    })
}
