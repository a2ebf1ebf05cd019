// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # conduit
//!
//! An agent-execution substrate: tools behind per-agent permissions, tools
//! loaded from plugin manifests, graph-orchestrated runs with intent routing,
//! BM25 keyword search and a feedback store that learns which findings matter.
//!
//! ## Architecture
//!
//! - **Tools** (`tool`): signatures, permission sets and the checked registry
//! - **Plugins** (`plugin`): manifest discovery, enablement and the entrypoint catalog
//! - **Graphs** (`graph`): nodes, static and conditional edges, the run engine and intent router
//! - **Search** (`search`): tokenizer, BM25 index and the corpus loader
//! - **Learning** (`learning`): fingerprints, outcome counters and weights over redb
//! - **Built-in tools** (`tools`): docs search and learning tools exposed via plugins
//! - **Assistant** (`assistant`): the bundled question-answering graph
//!
//! ## Library usage
//!
//! ```no_run
//! use conduit::assistant::{Assistant, AssistantTools};
//! use conduit::config::SubstrateConfig;
//! use conduit::substrate::Substrate;
//!
//! let config = SubstrateConfig::load("conduit.toml".as_ref()).unwrap();
//! let substrate = Substrate::bootstrap(config).unwrap();
//! let assistant = Assistant::new(AssistantTools::default()).unwrap();
//! let state = assistant.ask(&substrate, "assistant", "explain the plugin layout").unwrap();
//! println!("{}", state.final_output.unwrap_or_default());
//! ```

pub mod assistant;
pub mod config;
pub mod error;
pub mod graph;
pub mod learning;
pub mod paths;
pub mod plugin;
pub mod search;
pub mod substrate;
pub mod tool;
pub mod tools;
