use anyhow::Context;
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use buildscope::wire::WireGraph;

#[derive(Parser)]
#[command(name = "buildscope")]
#[command(version)]
#[command(about = "Build dependency graph inspector", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect a wire-format build graph file
    Inspect {
        /// Path to the encoded graph (JSON)
        path: PathBuf,
    },
    /// Show version information
    Version,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::Inspect { path }) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let graph = WireGraph::from_json(&content)?.decode()?;

            println!(
                "{} units, {} references",
                graph.node_count(),
                graph.reference_count()
            );

            println!("roots:");
            for id in graph.roots() {
                println!("  {}", graph.unit(id));
            }

            match graph.toposorted() {
                Ok(order) => {
                    println!("build order:");
                    for id in order {
                        println!("  {}", graph.unit(id));
                    }
                }
                Err(err) => println!("no build order: {}", err),
            }
        }
        Some(Commands::Version) => {
            println!("buildscope v{}", env!("CARGO_PKG_VERSION"));
        }
        None => {
            println!("BuildScope - Build Dependency Graph Inspector");
            println!("Run 'buildscope inspect <graph.json>' to inspect an encoded graph");
            println!("Run 'buildscope --help' for more information");
        }
    }

    Ok(())
}
