//! Documentation search over the shared BM25 index.

use std::sync::Arc;

use serde_json::json;

use crate::error::ToolResult;
use crate::plugin::{PluginServices, ToolDeclaration};
use crate::search::SharedIndex;
use crate::tool::{Tool, ToolArgs, ToolOutput, ToolParam, ToolSignature};

use super::declared_signature;

/// Results returned when the caller does not pass `top_k`.
pub const DEFAULT_TOP_K: usize = 3;

/// Keyword search over project documentation chunks.
pub struct DocsSearchTool {
    signature: ToolSignature,
    index: Arc<SharedIndex>,
}

impl DocsSearchTool {
    pub fn new(signature: ToolSignature, index: Arc<SharedIndex>) -> Self {
        Self { signature, index }
    }

    pub fn factory(decl: &ToolDeclaration, services: &PluginServices) -> Arc<dyn Tool> {
        let signature = declared_signature(
            decl,
            "Search project docs using BM25 keyword matching. Returns the top-k relevant chunks.",
            vec![
                ToolParam::required("query", "Keywords to search for"),
                ToolParam::optional("top_k", "Number of chunks to return (default 3)"),
            ],
        );
        Arc::new(Self::new(signature, Arc::clone(&services.index)))
    }
}

impl Tool for DocsSearchTool {
    fn signature(&self) -> &ToolSignature {
        &self.signature
    }

    fn invoke(&self, args: &ToolArgs) -> ToolResult<ToolOutput> {
        let query = args.require_str("query")?;
        let top_k = args.get_usize_or("top_k", DEFAULT_TOP_K)?;
        let hits = self.index.search(query, top_k);
        let summary = format!("{} chunk(s) for \"{query}\"", hits.len());
        let data = json!(hits);
        Ok(ToolOutput::new(data, summary))
    }
}
