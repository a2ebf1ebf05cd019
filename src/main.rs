//! conduit CLI: permissioned tools, plugins, graph runs and feedback learning.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use conduit::assistant::{Assistant, AssistantTools, DOC_FEEDBACK_CATEGORY};
use conduit::config::SubstrateConfig;
use conduit::paths::ConduitPaths;
use conduit::substrate::Substrate;
use conduit::tool::{ToolArgs, ToolOutput};

#[derive(Parser)]
#[command(name = "conduit", version, about = "Agent execution substrate")]
struct Cli {
    /// Config file. Defaults to ./conduit.toml, then the XDG config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Agent identity tool calls are made as.
    #[arg(long, global = true, default_value = "operator")]
    agent: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered tools and the plugin load report.
    Tools,

    /// Invoke a tool with JSON object arguments.
    Invoke {
        /// Tool name, e.g. docs.search_project_docs.
        tool: String,
        /// Arguments as a JSON object.
        #[arg(default_value = "{}")]
        args: String,
    },

    /// Search the documentation index.
    Search {
        query: String,
        #[arg(long, default_value = "5")]
        top_k: usize,
    },

    /// Ask the assistant a question.
    Ask {
        question: String,
        /// Print the visited nodes and tool calls.
        #[arg(long)]
        trace: bool,
    },

    /// Record that a finding was surfaced and print its fingerprint.
    Observe { category: String, description: String },

    /// Label a finding: accepted, rejected, confirmed, fixed or ignored.
    Feedback {
        fingerprint: String,
        outcome: String,
    },

    /// Label a documentation chunk by id, e.g. "docs/arch.md#2".
    Rate { doc_id: String, outcome: String },

    /// Show the learned weight of a finding.
    Weight { fingerprint: String },

    /// Search past findings.
    Findings {
        #[arg(default_value = "")]
        keyword: String,
        /// Only findings in this category.
        #[arg(long)]
        category: Option<String>,
        /// Only findings labelled with this outcome.
        #[arg(long)]
        outcome: Option<String>,
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Count findings and labels by outcome.
    Stats {
        #[arg(long)]
        category: Option<String>,
    },

    /// Show which findings history says to deprioritize or boost.
    Guidance {
        #[arg(long, default_value = "2")]
        min_rejected: usize,
        #[arg(long, default_value = "2")]
        min_confirmed: usize,
    },

    /// Write the effective config to the XDG config file.
    Init,
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    if let Commands::Init = cli.command {
        let paths = ConduitPaths::resolve()?;
        paths.ensure_dirs()?;
        let path = paths.config_file();
        config.save(&path)?;
        println!("Wrote {}", path.display());
        return Ok(());
    }

    let substrate = Substrate::bootstrap(config)?;
    let tools = AssistantTools::default();
    let agent = cli.agent.as_str();

    match cli.command {
        Commands::Init => {}

        Commands::Tools => {
            let registry = substrate.registry();
            println!("Tools ({}):", registry.len());
            for sig in registry.list() {
                let perms: Vec<&str> = sig.permissions.iter().collect();
                println!("  {} [{}]", sig.name, perms.join(", "));
                println!("    {}", sig.description);
            }
            let report = substrate.report();
            for plugin in &report.loaded {
                println!("loaded   {} {}", plugin.manifest.id, plugin.manifest.version);
            }
            for skipped in &report.skipped {
                println!("skipped  {}: {}", skipped.key, skipped.error);
            }
            for key in &report.disabled {
                println!("disabled {key}");
            }
        }

        Commands::Invoke { tool, args } => {
            let value: serde_json::Value = serde_json::from_str(&args).into_diagnostic()?;
            let serde_json::Value::Object(map) = value else {
                miette::bail!("tool arguments must be a JSON object");
            };
            let out = substrate.invoke(agent, &tool, &ToolArgs::from(map))?;
            print_output(&out)?;
        }

        Commands::Search { query, top_k } => {
            let args = ToolArgs::new().with("query", query).with("top_k", top_k);
            let out = substrate.invoke(agent, &tools.docs_search, &args)?;
            println!("{}", out.summary);
            for (i, hit) in out.data.as_array().into_iter().flatten().enumerate() {
                println!(
                    "  {}. {} (score {:.4})",
                    i + 1,
                    hit["id"].as_str().unwrap_or("?"),
                    hit["score"].as_f64().unwrap_or(0.0)
                );
            }
        }

        Commands::Ask { question, trace } => {
            let assistant = Assistant::new(tools)?;
            let state = assistant.ask(&substrate, agent, &question)?;
            println!("{}", state.final_output.as_deref().unwrap_or(""));
            if trace {
                println!("\nroute: {}", state.history.join(" -> "));
                for call in &state.tool_outputs {
                    let status = if call.ok { "ok" } else { "failed" };
                    println!("  {} {} [{status}] {}", call.node, call.tool, call.summary);
                }
            }
        }

        Commands::Observe {
            category,
            description,
        } => {
            let args = ToolArgs::new()
                .with("category", category)
                .with("description", description);
            print_output(&substrate.invoke(agent, "learning.observe", &args)?)?;
        }

        Commands::Feedback {
            fingerprint,
            outcome,
        } => {
            let args = ToolArgs::new()
                .with("fingerprint", fingerprint)
                .with("outcome", outcome);
            print_output(&substrate.invoke(agent, "learning.record_feedback", &args)?)?;
        }

        Commands::Rate { doc_id, outcome } => {
            let observed = substrate.invoke(
                agent,
                "learning.observe",
                &ToolArgs::new()
                    .with("category", DOC_FEEDBACK_CATEGORY)
                    .with("description", doc_id),
            )?;
            let fingerprint = observed.data["fingerprint"].clone();
            let args = ToolArgs::new()
                .with("fingerprint", fingerprint)
                .with("outcome", outcome);
            print_output(&substrate.invoke(agent, "learning.record_feedback", &args)?)?;
        }

        Commands::Weight { fingerprint } => {
            let args = ToolArgs::new().with("fingerprint", fingerprint);
            print_output(&substrate.invoke(agent, &tools.finding_weight, &args)?)?;
        }

        Commands::Findings {
            keyword,
            category,
            outcome,
            limit,
        } => {
            let mut args = ToolArgs::new().with("keyword", keyword).with("limit", limit);
            if let Some(category) = category {
                args = args.with("category", category);
            }
            if let Some(outcome) = outcome {
                args = args.with("outcome", outcome);
            }
            print_output(&substrate.invoke(agent, &tools.findings_search, &args)?)?;
        }

        Commands::Stats { category } => {
            let mut args = ToolArgs::new();
            if let Some(category) = category {
                args = args.with("category", category);
            }
            print_output(&substrate.invoke(agent, "learning.stats", &args)?)?;
        }

        Commands::Guidance {
            min_rejected,
            min_confirmed,
        } => {
            let args = ToolArgs::new()
                .with("min_rejected", min_rejected)
                .with("min_confirmed", min_confirmed);
            print_output(&substrate.invoke(agent, "learning.guidance", &args)?)?;
        }
    }

    Ok(())
}

/// `--config`, else `./conduit.toml`, else the XDG config file, else defaults.
/// Relative paths in a file resolve against the file's directory.
fn load_config(explicit: Option<&Path>) -> Result<SubstrateConfig> {
    let candidate = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => [
            Some(PathBuf::from("conduit.toml")),
            ConduitPaths::resolve().ok().map(|p| p.config_file()),
        ]
        .into_iter()
        .flatten()
        .find(|p| p.is_file()),
    };
    let Some(path) = candidate else {
        return Ok(SubstrateConfig::default());
    };
    let config = SubstrateConfig::load(&path)?;
    let base = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    Ok(config.rebase(&base))
}

fn print_output(out: &ToolOutput) -> Result<()> {
    println!("{}", out.summary);
    println!("{}", serde_json::to_string_pretty(&out.data).into_diagnostic()?);
    Ok(())
}
