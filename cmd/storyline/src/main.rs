//! Storyline CLI - groups embedded content items into topic clusters.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{AgeCommand, IngestCommand, RecountCommand, RepairCommand, RunCommand, StatsCommand};

/// Storyline CLI - online topic clustering for embedded content items.
///
/// Items are loaded with `ingest`, clustered with `run`, and the cluster
/// set is kept consistent with `recount`, `repair` and `age`, which `run`
/// also performs around every clustering pass.
///
/// Configuration is read from ~/.storyline/config.yaml.
#[derive(Parser)]
#[command(name = "storyline")]
#[command(about = "Online topic clustering for embedded content items")]
#[command(version)]
pub struct Cli {
    /// Config file (default is ~/.storyline/config.yaml)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Cluster database (default is ~/.storyline/data/clusters.redb)
    #[arg(long, global = true)]
    pub db: Option<String>,

    /// Output as JSON (for piping)
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose output
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full clustering pipeline once
    Run(RunCommand),
    /// Reconcile stored member counts with actual assignments
    Recount(RecountCommand),
    /// Recompute null or all-zero centroids
    Repair(RepairCommand),
    /// Mark clusters not updated recently as OLD
    Age(AgeCommand),
    /// Load item embeddings from JSON lines
    Ingest(IngestCommand),
    /// Show cluster and item counts
    Stats(StatsCommand),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging; RUST_LOG wins over -v.
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Commands::Run(cmd) => cmd.run(&cli),
        Commands::Recount(cmd) => cmd.run(&cli),
        Commands::Repair(cmd) => cmd.run(&cli),
        Commands::Age(cmd) => cmd.run(&cli),
        Commands::Ingest(cmd) => cmd.run(&cli),
        Commands::Stats(cmd) => cmd.run(&cli),
    }
}
