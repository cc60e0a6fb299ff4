//! CLI entry point for the flowtrace call-flow tracer.
//!
//! Writes results as JSON to stdout; logs go to stderr.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::{fmt, EnvFilter};

use flowtrace_core::TraceConfig;
use flowtrace_daemon::replay::replay_file;
use flowtrace_daemon::TracePipeline;
use flowtrace_merge::{MergedSnapshot, StatsExtractor};

#[derive(Parser)]
#[command(name = "flowtrace")]
#[command(about = "Runtime call-flow tracer: builds and merges per-session call graphs")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file prefix (default: flowtrace).
    #[arg(short, long, default_value = "flowtrace", global = true)]
    config: String,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a JSON-lines event recording and print the merged statistics.
    Replay {
        /// File with one serialized call event per line.
        #[arg(long)]
        input: PathBuf,
        /// Write the merged graph snapshot here (overrides config).
        #[arg(long)]
        snapshot: Option<PathBuf>,
        /// Number of top edges and paths to report.
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    /// Print statistics for a saved merged graph snapshot.
    Stats {
        #[arg(long)]
        snapshot: PathBuf,
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .json()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Replay {
            input,
            snapshot,
            top,
        } => {
            let mut config = TraceConfig::load(&cli.config)?;
            if let Some(path) = snapshot {
                config.snapshot_path = Some(path.display().to_string());
            }

            let pipeline = TracePipeline::resume(config)?;
            let merger = pipeline.merger();
            let summary = replay_file(&pipeline, &input).await?;
            let report = pipeline.shutdown().await?;
            let stats = StatsExtractor::new(&merger.snapshot()).report(top);

            let output = json!({
                "replay": summary,
                "pipeline": report,
                "stats": stats,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::Stats { snapshot, top } => {
            let loaded = MergedSnapshot::load(&snapshot)?;
            let stats = StatsExtractor::new(&loaded.graph).report(top);
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    Ok(())
}
