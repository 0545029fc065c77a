use clap::Args;
use storyline_clusterstore::ClusterStore;

use super::{acquire_lock, get_config, open_store, output_result};
use crate::Cli;

/// Show cluster and item counts.
#[derive(Args)]
pub struct StatsCommand {}

impl StatsCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let cfg = get_config(cli)?;
        let Some(_guard) = acquire_lock(&cfg)? else {
            return Ok(());
        };
        let store = open_store(&cfg)?;
        output_result(&store.stats()?, cli.json)
    }
}
