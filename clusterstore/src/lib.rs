//! Persistence gateway for topic clusters and item assignments.
//!
//! [`ClusterStore`] is the boundary the engine talks to. [`KvClusterStore`]
//! implements it over any [`storyline_kv::KVStore`], including a bulk
//! recount whose changes land in one atomic write batch.

mod error;
pub mod keys;
mod kv_store;
mod recount;
mod store;
mod types;

pub use error::StoreError;
pub use kv_store::{DEFAULT_CENTROID_WIDTH, KvClusterStore};
pub use recount::{RecountPlan, plan_recount};
pub use store::ClusterStore;
pub use types::{
    ClusterState, ClusterStatus, CountChange, Discrepancies, Item, ProcedureResult, StoreStats,
    StoredCluster,
};
