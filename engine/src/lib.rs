//! Online incremental clustering of item embeddings into topic clusters.
//!
//! Each run pulls the unclustered items and the current clusters, then
//! feeds items one at a time through [`ClusterManager::process_item`]:
//! join the best cluster above the similarity threshold, else pair with the
//! best staged item to found a new cluster, else stage the item. Similar
//! clusters are merged afterwards and [`Repairer`] restores the count and
//! centroid invariants.
//!
//! # Design
//!
//! The per-item loop is greedy and order dependent: the same batch fed in a
//! different order can cluster differently. Staged items live in an explicit
//! [`PendingSet`] handed into and back out of every [`Driver::run`]; nothing
//! is kept in globals. At most one run may mutate a cluster set at a time,
//! which [`Pipeline`] enforces with a [`FileLock`].

mod config;
mod driver;
mod error;
mod lock;
mod manager;
mod pending;
mod pipeline;
mod repair;
mod retry;

pub use config::{DEFAULT_BASE_DIR, DEFAULT_CONFIG_FILE, EngineConfig};
pub use driver::{Driver, RunReport};
pub use error::EngineError;
pub use lock::{FileLock, LockGuard};
pub use manager::{ClusterManager, ClusterMatch, Decision, PendingMatch};
pub use pending::PendingSet;
pub use pipeline::{Outcome, Pipeline, PipelineReport};
pub use repair::Repairer;
pub use retry::{Backoff, retry};
