use clap::{Parser, Subcommand};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use piper_compiler::catalog;
use piper_compiler::compile::{self, PipelineSpec, verify};
use piper_compiler::graph::Graph;
use piper_compiler::store::{SlotStore, Snapshot};
use piper_compiler::types::{self, TypeDescriptor};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

pub type Result<T> = anyhow::Result<T>;

#[derive(Parser)]
#[command(name = "piper")]
#[command(about = "Compile pipeline editor graphs into pipeline documents", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a graph and compile it into a pipeline document.
    Compile {
        #[arg(long)]
        graph: PathBuf,

        /// Write here instead of stdout.
        #[arg(short = 'o', long)]
        out: Option<PathBuf>,

        #[arg(long)]
        pretty: bool,
    },

    /// Validate a graph and re-check the types of every wire.
    Check {
        #[arg(long)]
        graph: PathBuf,
    },

    /// List the addressable sub-paths of a type.
    Paths {
        /// Type descriptor as JSON.
        #[arg(long = "type")]
        ty: String,
    },

    /// Render a type, cut at a depth or fitted to a width.
    Render {
        #[arg(long = "type")]
        ty: String,

        #[arg(long, conflicts_with = "budget")]
        depth: Option<usize>,

        #[arg(long)]
        budget: Option<usize>,
    },

    /// List the node templates of the function catalog.
    Catalog {
        /// Catalog JSON; the built-in catalog is used when absent or unreadable.
        #[arg(long, env = "PIPER_CATALOG")]
        file: Option<PathBuf>,
    },

    /// Save, restore and delete named graph snapshots.
    Slot {
        #[arg(long, env = "PIPER_SLOTS_DIR", default_value = ".piper")]
        dir: PathBuf,

        #[command(subcommand)]
        action: SlotAction,
    },

    /// Static checks of a pipeline document.
    Verify {
        #[arg(long)]
        spec: PathBuf,
    },
}

#[derive(Subcommand)]
enum SlotAction {
    Save {
        name: String,

        /// Graph or snapshot JSON.
        #[arg(long)]
        graph: PathBuf,
    },
    Restore {
        name: String,

        #[arg(short = 'o', long)]
        out: Option<PathBuf>,
    },
    Delete {
        name: String,
    },
    List,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing()?;

    match cli.cmd {
        Commands::Compile { graph, out, pretty } => {
            let g: Graph = read_json(&graph)?;
            g.validate()
                .with_context(|| format!("invalid graph {}", graph.display()))?;
            let spec = compile::compile(&g)
                .with_context(|| format!("compiling {}", graph.display()))?;
            info!(stages = spec.stages.len(), "compiled pipeline");
            emit(&spec, out.as_deref(), pretty)?;
        }

        Commands::Check { graph } => {
            let g: Graph = read_json(&graph)?;
            g.validate()
                .with_context(|| format!("invalid graph {}", graph.display()))?;
            let rejected: Vec<String> = g
                .edges
                .iter()
                .filter(|e| !g.is_valid_connection(e))
                .map(|e| format!("{} -> {}", e.source_handle, e.target_handle))
                .collect();
            if !rejected.is_empty() {
                bail!(
                    "{} wire(s) rejected by the type check:\n  {}",
                    rejected.len(),
                    rejected.join("\n  ")
                );
            }
            println!("ok: {} nodes, {} wires", g.nodes.len(), g.edges.len());
        }

        Commands::Paths { ty } => {
            let ty = parse_type(&ty)?;
            for (path, sub) in types::enumerate(&ty) {
                println!("{path}\t{sub}");
            }
        }

        Commands::Render { ty, depth, budget } => {
            let ty = parse_type(&ty)?;
            let text = match (depth, budget) {
                (Some(depth), _) => types::render_depth(&ty, depth),
                (None, Some(budget)) => types::render_fit(&ty, budget),
                (None, None) => types::render(&ty),
            };
            println!("{text}");
        }

        Commands::Catalog { file } => {
            let records = catalog::load_catalog(file.as_deref())?;
            for template in catalog::templates(&records)? {
                println!("{}\t{}", template.label, template.signature());
            }
        }

        Commands::Slot { dir, action } => {
            let store = SlotStore::open(dir)?;
            info!(dir = %store.dir().display(), "slot store");
            match action {
                SlotAction::Save { name, graph } => {
                    let snapshot: Snapshot = read_json(&graph)?;
                    store.save(&name, &snapshot)?;
                }
                SlotAction::Restore { name, out } => {
                    let snapshot = store.restore(&name)?;
                    emit(&snapshot, out.as_deref(), true)?;
                }
                SlotAction::Delete { name } => store.delete(&name)?,
                SlotAction::List => {
                    for name in store.list()? {
                        println!("{name}");
                    }
                }
            }
        }

        Commands::Verify { spec } => {
            let doc: PipelineSpec = read_json(&spec)?;
            verify::verify(&doc).with_context(|| format!("verifying {}", spec.display()))?;
            println!("ok: {} top-level stages", doc.stages.len());
        }
    }

    Ok(())
}

/// Logs go to stderr; stdout carries documents.
fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn parse_type(text: &str) -> Result<TypeDescriptor> {
    serde_json::from_str(text).with_context(|| format!("parsing type descriptor {text}"))
}

fn emit<T: Serialize>(value: &T, out: Option<&Path>, pretty: bool) -> Result<()> {
    let mut text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    text.push('\n');
    match out {
        Some(path) => {
            fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), "wrote document");
        }
        None => std::io::stdout().write_all(text.as_bytes())?,
    }
    Ok(())
}
