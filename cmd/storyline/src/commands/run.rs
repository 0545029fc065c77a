//! The clustering pipeline command.

use clap::Args;
use serde::Serialize;
use storyline_clusterstore::Discrepancies;
use storyline_engine::{PendingSet, Pipeline, PipelineReport};

use super::{acquire_lock, get_config, open_store, output_result, print_success};
use crate::Cli;

/// Age, repair, cluster and recount under the run lock.
#[derive(Args)]
pub struct RunCommand {
    /// Similarity needed to join a cluster (overrides config file)
    #[arg(long)]
    similarity_threshold: Option<f32>,
    /// Similarity needed to merge two clusters (overrides config file)
    #[arg(long)]
    merge_threshold: Option<f32>,
    /// Maximum unclustered items per run (overrides config file)
    #[arg(long)]
    fetch_limit: Option<usize>,
    /// Lock file (overrides config file)
    #[arg(long)]
    lock: Option<String>,
}

#[derive(Serialize)]
struct RunSummary {
    aged: usize,
    repaired: Vec<String>,
    processed: usize,
    joined: usize,
    created: usize,
    staged: usize,
    skipped: usize,
    merged: usize,
    assigned: usize,
    pending: Vec<i64>,
    discrepancies: Discrepancies,
    elapsed_ms: u64,
}

impl From<PipelineReport> for RunSummary {
    fn from(r: PipelineReport) -> Self {
        Self {
            aged: r.aged,
            repaired: r.repaired,
            processed: r.run.processed,
            joined: r.run.joined,
            created: r.run.created,
            staged: r.run.staged,
            skipped: r.run.skipped,
            merged: r.run.merged,
            assigned: r.run.assigned,
            pending: r.run.pending.ids(),
            discrepancies: r.discrepancies,
            elapsed_ms: r.run.elapsed.as_millis() as u64,
        }
    }
}

impl RunCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let mut cfg = get_config(cli)?;
        if let Some(t) = self.similarity_threshold {
            cfg.similarity_threshold = t;
        }
        if let Some(t) = self.merge_threshold {
            cfg.merge_threshold = t;
        }
        if let Some(n) = self.fetch_limit {
            cfg.fetch_limit = n;
        }
        if let Some(lock) = &self.lock {
            cfg.lock_path = Some(lock.into());
        }
        cfg.validate()?;

        let Some(_guard) = acquire_lock(&cfg)? else {
            return Ok(());
        };
        let store = open_store(&cfg)?;
        let report = Pipeline::new(&store, cfg).run_phases(PendingSet::new())?;

        let summary = RunSummary::from(report);
        print_success(&format!(
            "processed {} items: {} joined, {} created, {} staged",
            summary.processed, summary.joined, summary.created, summary.staged
        ));
        output_result(&summary, cli.json)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use clap::Parser;
    use storyline_kv::RedbStore;

    use crate::Commands;

    use super::*;

    fn run_cli(dir: &Path, lock: &Path) -> anyhow::Result<()> {
        let config = dir.join("config.yaml");
        let db = dir.join("clusters.redb");
        let cli = Cli::parse_from([
            "storyline",
            "--config",
            config.to_str().unwrap(),
            "--db",
            db.to_str().unwrap(),
            "run",
            "--lock",
            lock.to_str().unwrap(),
        ]);
        let Commands::Run(cmd) = &cli.command else {
            panic!("expected the run command");
        };
        cmd.run(&cli)
    }

    #[test]
    fn test_run_exits_quietly_while_another_run_holds_db_and_lock() {
        let dir = tempfile::tempdir().unwrap();
        let lock = dir.path().join("storyline.lock");
        let _held = RedbStore::open(dir.path().join("clusters.redb")).unwrap();
        std::fs::write(&lock, "4242\n").unwrap();

        run_cli(dir.path(), &lock).unwrap();
        assert_eq!(std::fs::read_to_string(&lock).unwrap(), "4242\n");
    }

    #[test]
    fn test_run_releases_lock_and_db() {
        let dir = tempfile::tempdir().unwrap();
        let lock = dir.path().join("storyline.lock");

        run_cli(dir.path(), &lock).unwrap();
        assert!(!lock.exists());
        RedbStore::open(dir.path().join("clusters.redb")).unwrap();
    }
}
