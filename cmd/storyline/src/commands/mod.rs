//! CLI commands module.

mod ingest;
mod maintain;
mod run;
mod stats;
mod util;

pub use ingest::IngestCommand;
pub use maintain::{AgeCommand, RecountCommand, RepairCommand};
pub use run::RunCommand;
pub use stats::StatsCommand;

pub(crate) use util::*;
