//! Standalone consistency maintenance commands.

use std::collections::HashMap;

use chrono::Utc;
use clap::Args;
use storyline_clusterstore::{ClusterStore, plan_recount};
use storyline_engine::Repairer;

use super::{acquire_lock, get_config, open_store, output_result, print_success};
use crate::Cli;

/// Reconcile stored member counts with actual assignments.
#[derive(Args)]
pub struct RecountCommand {
    /// Report discrepancies without fixing them
    #[arg(long)]
    check: bool,
}

impl RecountCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let cfg = get_config(cli)?;
        let Some(_guard) = acquire_lock(&cfg)? else {
            return Ok(());
        };
        let store = open_store(&cfg)?;

        if self.check {
            let stored: HashMap<String, u64> = store
                .list_clusters()?
                .into_iter()
                .map(|c| (c.cluster_id, c.member_count))
                .collect();
            let plan = plan_recount(&stored, &store.cluster_assignments()?);
            print_success(&format!("{} clusters need fixing", plan.discrepancies.len()));
            return output_result(&plan.discrepancies, cli.json);
        }

        let discrepancies = Repairer::new(&store).try_recalculate_member_counts()?;
        print_success(&format!("fixed {} clusters", discrepancies.len()));
        output_result(&discrepancies, cli.json)
    }
}

/// Recompute null or all-zero centroids from member embeddings.
#[derive(Args)]
pub struct RepairCommand {}

impl RepairCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let cfg = get_config(cli)?;
        let Some(_guard) = acquire_lock(&cfg)? else {
            return Ok(());
        };
        let store = open_store(&cfg)?;

        let repaired = Repairer::new(&store).try_repair_zero_centroid_clusters()?;
        print_success(&format!("repaired {} centroids", repaired.len()));
        output_result(&repaired, cli.json)
    }
}

/// Mark clusters not updated recently as OLD.
#[derive(Args)]
pub struct AgeCommand {
    /// Staleness window in days (overrides config file)
    #[arg(long)]
    days: Option<i64>,
}

impl AgeCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let mut cfg = get_config(cli)?;
        if let Some(days) = self.days {
            cfg.stale_after_days = days;
        }
        cfg.validate()?;
        let Some(_guard) = acquire_lock(&cfg)? else {
            return Ok(());
        };
        let store = open_store(&cfg)?;

        let aged = Repairer::new(&store).try_age_stale_clusters_at(Utc::now(), cfg.stale_window())?;
        print_success(&format!("marked {aged} clusters OLD"));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use storyline_kv::RedbStore;

    use crate::Commands;

    use super::*;

    #[test]
    fn test_maintenance_exits_quietly_while_another_run_holds_db_and_lock() {
        let dir = tempfile::tempdir().unwrap();
        let lock = dir.path().join("storyline.lock");
        let db = dir.path().join("clusters.redb");
        let config = dir.path().join("config.yaml");
        std::fs::write(&config, format!("lock_path: {}\n", lock.display())).unwrap();
        let _held = RedbStore::open(&db).unwrap();
        std::fs::write(&lock, "4242\n").unwrap();

        let cases: [&[&str]; 4] = [
            &["recount"],
            &["recount", "--check"],
            &["repair"],
            &["age", "--days", "1"],
        ];
        for args in cases {
            let mut argv = vec![
                "storyline",
                "--config",
                config.to_str().unwrap(),
                "--db",
                db.to_str().unwrap(),
            ];
            argv.extend_from_slice(args);
            let cli = Cli::parse_from(argv);
            let result = match &cli.command {
                Commands::Recount(cmd) => cmd.run(&cli),
                Commands::Repair(cmd) => cmd.run(&cli),
                Commands::Age(cmd) => cmd.run(&cli),
                _ => unreachable!(),
            };
            assert!(result.is_ok(), "{args:?}: {result:?}");
        }
        assert_eq!(std::fs::read_to_string(&lock).unwrap(), "4242\n");
    }
}
