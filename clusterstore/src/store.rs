use chrono::{DateTime, Utc};
use tracing::warn;

use crate::error::StoreError;
use crate::types::{ClusterState, Item, ProcedureResult, StoreStats, StoredCluster};

/// Durable storage of clusters and item→cluster assignments.
///
/// Every operation is a single call against the backend; none retries
/// internally. Callers decide whether a failure degrades or aborts.
pub trait ClusterStore: Send + Sync {
    /// Items with no cluster assignment, newest first, at most `limit`.
    /// Items whose embedding is missing or malformed are skipped and logged.
    fn fetch_unclustered_items(&self, limit: usize) -> Result<Vec<Item>, StoreError>;

    /// Every stored cluster. Unparseable centroids come back as `None`.
    fn list_clusters(&self) -> Result<Vec<StoredCluster>, StoreError>;

    /// Persists a new cluster with status NEW and returns its id.
    /// The centroid is normalized to the store's persisted width.
    fn create_cluster(&self, centroid: &[f32], member_count: u64) -> Result<String, StoreError>;

    /// Overwrites centroid and count, marking the cluster UPDATED.
    fn update_cluster(
        &self,
        cluster_id: &str,
        centroid: &[f32],
        member_count: u64,
    ) -> Result<(), StoreError>;

    /// Writes all `(item_id, cluster_id)` pairs in one bulk operation.
    fn batch_assign(&self, assignments: &[(i64, String)]) -> Result<(), StoreError>;

    /// Every `(item_id, cluster_id)` pair with a non-null assignment.
    fn cluster_assignments(&self) -> Result<Vec<(i64, String)>, StoreError>;

    /// Members of a cluster with their embeddings; malformed ones are skipped.
    fn items_in_cluster(&self, cluster_id: &str) -> Result<Vec<Item>, StoreError>;

    /// Ids of the members of a cluster.
    fn item_ids_in_cluster(&self, cluster_id: &str) -> Result<Vec<i64>, StoreError>;

    /// Upserts member counts. Unknown ids get a record with no centroid.
    fn set_member_counts(&self, counts: &[(String, u64)]) -> Result<(), StoreError>;

    /// Clears the assignment of the given items.
    fn unassign_items(&self, item_ids: &[i64]) -> Result<(), StoreError>;

    /// Deletes cluster records. Item assignments are left alone.
    fn delete_clusters(&self, cluster_ids: &[String]) -> Result<(), StoreError>;

    /// Sets status OLD without touching counts, centroids or `updated_at`.
    fn mark_old(&self, cluster_ids: &[String]) -> Result<(), StoreError>;

    /// Inserts or replaces an item's embedding, keeping any assignment.
    fn put_item(
        &self,
        item_id: i64,
        embedding: &[f32],
        created_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    fn stats(&self) -> Result<StoreStats, StoreError>;

    /// Bulk member-count recount performed by the backend itself. Its
    /// changes are applied as one atomic write batch.
    fn recount_procedure(&self) -> Result<ProcedureResult, StoreError> {
        Err(StoreError::Unsupported("recount_procedure"))
    }

    /// Clusters usable for matching: those with a parseable, non-empty
    /// centroid. Others are skipped and logged.
    fn fetch_existing_clusters(&self) -> Result<Vec<ClusterState>, StoreError> {
        let clusters = self
            .list_clusters()?
            .into_iter()
            .filter_map(|c| match c.centroid {
                Some(centroid) if !centroid.is_empty() => Some(ClusterState {
                    id: c.cluster_id,
                    centroid,
                    count: c.member_count,
                }),
                _ => {
                    warn!(cluster_id = %c.cluster_id, "skipping cluster with null or invalid centroid");
                    None
                }
            })
            .collect();
        Ok(clusters)
    }
}
