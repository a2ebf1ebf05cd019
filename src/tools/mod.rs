//! Built-in tools that the plugin catalog can construct.
//!
//! The manifest owns each tool's name and permissions; the tool type owns the
//! behavior, the parameter list and a fallback description.

pub mod docs;
pub mod learning;

use crate::plugin::ToolDeclaration;
use crate::tool::{ToolParam, ToolSignature};

/// Signature for a tool built from a manifest declaration.
pub(crate) fn declared_signature(
    decl: &ToolDeclaration,
    default_description: &str,
    params: Vec<ToolParam>,
) -> ToolSignature {
    let description = decl
        .description
        .clone()
        .unwrap_or_else(|| default_description.to_string());
    params.into_iter().fold(
        ToolSignature::new(decl.name.clone(), description, decl.permissions.clone()),
        ToolSignature::with_param,
    )
}
