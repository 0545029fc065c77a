use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use storyline_kv::{KVStore, Op};
use storyline_vecmath::{WidthFix, format_embedding, normalize_width, parse_embedding};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::StoreError;
use crate::keys::{CLUSTER_PREFIX, ITEM_PREFIX, cluster_key, item_key, vector_key};
use crate::recount::plan_recount;
use crate::store::ClusterStore;
use crate::types::{ClusterStatus, Item, ProcedureResult, StoreStats, StoredCluster};

/// Width every persisted centroid is normalized to.
pub const DEFAULT_CENTROID_WIDTH: usize = 768;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ClusterRecord {
    pub cluster_id: String,
    /// Text form, as the vector column stores it. `None` is a null centroid.
    pub centroid: Option<String>,
    pub member_count: u64,
    pub status: ClusterStatus,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ItemRecord {
    pub id: i64,
    pub cluster_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    rmp_serde::to_vec_named(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    rmp_serde::from_slice(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// [`ClusterStore`] over a transactional KV backend.
///
/// Items live in two joined tables (assignment record and embedding text)
/// the way an article table joins its vector table.
pub struct KvClusterStore<S> {
    kv: S,
    centroid_width: usize,
    procedure: bool,
}

impl<S: KVStore> KvClusterStore<S> {
    pub fn new(kv: S) -> Self {
        Self {
            kv,
            centroid_width: DEFAULT_CENTROID_WIDTH,
            procedure: true,
        }
    }

    /// Sets the persisted centroid width (default 768).
    pub fn with_centroid_width(mut self, width: usize) -> Self {
        self.centroid_width = width;
        self
    }

    /// Enables or disables the bulk recount procedure. When disabled,
    /// [`ClusterStore::recount_procedure`] reports `Unsupported`.
    pub fn with_procedure(mut self, enabled: bool) -> Self {
        self.procedure = enabled;
        self
    }

    pub fn kv(&self) -> &S {
        &self.kv
    }

    fn cluster_records(&self) -> Result<Vec<ClusterRecord>, StoreError> {
        let mut records = Vec::new();
        for (key, bytes) in self.kv.scan(CLUSTER_PREFIX)? {
            match decode::<ClusterRecord>(&bytes) {
                Ok(r) => records.push(r),
                Err(e) => warn!(%key, error = %e, "skipping undecodable cluster record"),
            }
        }
        Ok(records)
    }

    fn cluster_record(&self, cluster_id: &str) -> Result<Option<ClusterRecord>, StoreError> {
        self.kv
            .get(&cluster_key(cluster_id))?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn item_records(&self) -> Result<Vec<ItemRecord>, StoreError> {
        let mut records = Vec::new();
        for (key, bytes) in self.kv.scan(ITEM_PREFIX)? {
            match decode::<ItemRecord>(&bytes) {
                Ok(r) => records.push(r),
                Err(e) => warn!(%key, error = %e, "skipping undecodable item record"),
            }
        }
        Ok(records)
    }

    fn item_record(&self, item_id: i64) -> Result<Option<ItemRecord>, StoreError> {
        self.kv
            .get(&item_key(item_id))?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    /// Loads and parses an item's embedding; `None` if missing or malformed.
    fn embedding(&self, item_id: i64) -> Result<Option<Vec<f32>>, StoreError> {
        let Some(bytes) = self.kv.get(&vector_key(item_id))? else {
            warn!(item_id, "item has no embedding, skipping");
            return Ok(None);
        };
        let text = String::from_utf8_lossy(&bytes);
        match parse_embedding(&text) {
            Ok(v) if !v.is_empty() => Ok(Some(v)),
            Ok(_) => {
                warn!(item_id, "item has an empty embedding, skipping");
                Ok(None)
            }
            Err(e) => {
                warn!(item_id, error = %e, "skipping item with invalid embedding");
                Ok(None)
            }
        }
    }

    fn persisted_centroid(&self, centroid: &[f32], cluster: &str) -> String {
        let (normalized, fix) = normalize_width(centroid, self.centroid_width);
        match fix {
            WidthFix::Exact => {}
            WidthFix::Reconciled => info!(
                cluster,
                from = centroid.len(),
                to = normalized.len(),
                "normalized centroid dimensions"
            ),
            WidthFix::Strided(step) => warn!(
                cluster,
                from = centroid.len(),
                to = normalized.len(),
                step,
                "could not reconcile centroid, downsampled with fixed step"
            ),
            WidthFix::Unfit => warn!(
                cluster,
                len = centroid.len(),
                width = self.centroid_width,
                "centroid narrower than persisted width, storing as-is"
            ),
        }
        format_embedding(&normalized)
    }
}

impl<S: KVStore> ClusterStore for KvClusterStore<S> {
    fn fetch_unclustered_items(&self, limit: usize) -> Result<Vec<Item>, StoreError> {
        let mut records: Vec<ItemRecord> = self
            .item_records()?
            .into_iter()
            .filter(|r| r.cluster_id.is_none())
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        records.truncate(limit);

        let mut items = Vec::with_capacity(records.len());
        for r in records {
            if let Some(embedding) = self.embedding(r.id)? {
                items.push(Item {
                    id: r.id,
                    embedding,
                });
            }
        }
        info!(count = items.len(), "fetched unclustered items");
        Ok(items)
    }

    fn list_clusters(&self) -> Result<Vec<StoredCluster>, StoreError> {
        let clusters = self
            .cluster_records()?
            .into_iter()
            .map(|r| {
                let centroid = r.centroid.as_deref().and_then(|text| match parse_embedding(text) {
                    Ok(v) => Some(v),
                    Err(e) => {
                        warn!(cluster_id = %r.cluster_id, error = %e, "unparseable centroid");
                        None
                    }
                });
                StoredCluster {
                    cluster_id: r.cluster_id,
                    centroid,
                    member_count: r.member_count,
                    status: r.status,
                    updated_at: r.updated_at,
                }
            })
            .collect();
        Ok(clusters)
    }

    fn create_cluster(&self, centroid: &[f32], member_count: u64) -> Result<String, StoreError> {
        let cluster_id = Uuid::new_v4().to_string();
        let record = ClusterRecord {
            centroid: Some(self.persisted_centroid(centroid, &cluster_id)),
            cluster_id: cluster_id.clone(),
            member_count,
            status: ClusterStatus::New,
            updated_at: Utc::now(),
        };
        self.kv.put(&cluster_key(&cluster_id), &encode(&record)?)?;
        info!(%cluster_id, member_count, "created cluster");
        Ok(cluster_id)
    }

    fn update_cluster(
        &self,
        cluster_id: &str,
        centroid: &[f32],
        member_count: u64,
    ) -> Result<(), StoreError> {
        let mut record = self
            .cluster_record(cluster_id)?
            .ok_or_else(|| StoreError::NotFound(format!("cluster {cluster_id}")))?;
        record.centroid = Some(self.persisted_centroid(centroid, cluster_id));
        record.member_count = member_count;
        record.status = ClusterStatus::Updated;
        record.updated_at = Utc::now();
        self.kv.put(&cluster_key(cluster_id), &encode(&record)?)?;
        debug!(cluster_id, member_count, "updated cluster");
        Ok(())
    }

    fn batch_assign(&self, assignments: &[(i64, String)]) -> Result<(), StoreError> {
        if assignments.is_empty() {
            return Ok(());
        }
        let mut ops = Vec::with_capacity(assignments.len());
        for (item_id, cluster_id) in assignments {
            let mut record = self
                .item_record(*item_id)?
                .ok_or_else(|| StoreError::NotFound(format!("item {item_id}")))?;
            record.cluster_id = Some(cluster_id.clone());
            ops.push(Op::put(item_key(*item_id), encode(&record)?));
        }
        self.kv.apply(&ops)?;
        debug!(count = assignments.len(), "batch assigned items");
        Ok(())
    }

    fn cluster_assignments(&self) -> Result<Vec<(i64, String)>, StoreError> {
        Ok(self
            .item_records()?
            .into_iter()
            .filter_map(|r| r.cluster_id.map(|cid| (r.id, cid)))
            .collect())
    }

    fn items_in_cluster(&self, cluster_id: &str) -> Result<Vec<Item>, StoreError> {
        let mut items = Vec::new();
        for id in self.item_ids_in_cluster(cluster_id)? {
            if let Some(embedding) = self.embedding(id)? {
                items.push(Item { id, embedding });
            }
        }
        Ok(items)
    }

    fn item_ids_in_cluster(&self, cluster_id: &str) -> Result<Vec<i64>, StoreError> {
        Ok(self
            .item_records()?
            .into_iter()
            .filter(|r| r.cluster_id.as_deref() == Some(cluster_id))
            .map(|r| r.id)
            .collect())
    }

    fn set_member_counts(&self, counts: &[(String, u64)]) -> Result<(), StoreError> {
        let mut ops = Vec::with_capacity(counts.len());
        for (cluster_id, count) in counts {
            let record = match self.cluster_record(cluster_id)? {
                Some(mut r) => {
                    r.member_count = *count;
                    r
                }
                None => ClusterRecord {
                    cluster_id: cluster_id.clone(),
                    centroid: None,
                    member_count: *count,
                    status: ClusterStatus::New,
                    updated_at: Utc::now(),
                },
            };
            ops.push(Op::put(cluster_key(cluster_id), encode(&record)?));
        }
        self.kv.apply(&ops)?;
        Ok(())
    }

    fn unassign_items(&self, item_ids: &[i64]) -> Result<(), StoreError> {
        let mut ops = Vec::new();
        for id in item_ids {
            if let Some(mut record) = self.item_record(*id)? {
                if record.cluster_id.take().is_some() {
                    ops.push(Op::put(item_key(*id), encode(&record)?));
                }
            }
        }
        self.kv.apply(&ops)?;
        Ok(())
    }

    fn delete_clusters(&self, cluster_ids: &[String]) -> Result<(), StoreError> {
        let ops: Vec<Op> = cluster_ids
            .iter()
            .map(|cid| Op::delete(cluster_key(cid)))
            .collect();
        self.kv.apply(&ops)?;
        Ok(())
    }

    fn mark_old(&self, cluster_ids: &[String]) -> Result<(), StoreError> {
        let mut ops = Vec::new();
        for cid in cluster_ids {
            if let Some(mut record) = self.cluster_record(cid)? {
                record.status = ClusterStatus::Old;
                ops.push(Op::put(cluster_key(cid), encode(&record)?));
            }
        }
        self.kv.apply(&ops)?;
        Ok(())
    }

    fn put_item(
        &self,
        item_id: i64,
        embedding: &[f32],
        created_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let cluster_id = self.item_record(item_id)?.and_then(|r| r.cluster_id);
        let record = ItemRecord {
            id: item_id,
            cluster_id,
            created_at,
        };
        self.kv.apply(&[
            Op::put(item_key(item_id), encode(&record)?),
            Op::put(vector_key(item_id), format_embedding(embedding)),
        ])?;
        Ok(())
    }

    fn stats(&self) -> Result<StoreStats, StoreError> {
        let mut stats = StoreStats::default();
        for r in self.cluster_records()? {
            stats.clusters += 1;
            match r.status {
                ClusterStatus::New => stats.new += 1,
                ClusterStatus::Updated => stats.updated += 1,
                ClusterStatus::Old => stats.old += 1,
            }
        }
        for r in self.item_records()? {
            stats.items += 1;
            if r.cluster_id.is_some() {
                stats.assigned += 1;
            } else {
                stats.unassigned += 1;
            }
        }
        Ok(stats)
    }

    fn recount_procedure(&self) -> Result<ProcedureResult, StoreError> {
        if !self.procedure {
            return Err(StoreError::Unsupported("recount_procedure"));
        }

        // Reads are not part of the batch; concurrent writers are kept out
        // by the run lock, not by the store.
        let clusters: HashMap<String, ClusterRecord> = self
            .cluster_records()?
            .into_iter()
            .map(|r| (r.cluster_id.clone(), r))
            .collect();
        let items: HashMap<i64, ItemRecord> =
            self.item_records()?.into_iter().map(|r| (r.id, r)).collect();

        let stored: HashMap<String, u64> = clusters
            .iter()
            .map(|(cid, r)| (cid.clone(), r.member_count))
            .collect();
        let assignments: Vec<(i64, String)> = items
            .values()
            .filter_map(|r| r.cluster_id.clone().map(|cid| (r.id, cid)))
            .collect();
        let plan = plan_recount(&stored, &assignments);

        let mut ops = Vec::new();
        for (cid, count) in &plan.updates {
            let record = match clusters.get(cid) {
                Some(r) => ClusterRecord {
                    member_count: *count,
                    ..r.clone()
                },
                None => ClusterRecord {
                    cluster_id: cid.clone(),
                    centroid: None,
                    member_count: *count,
                    status: ClusterStatus::New,
                    updated_at: Utc::now(),
                },
            };
            ops.push(Op::put(cluster_key(cid), encode(&record)?));
        }
        for item_id in plan.unassigned_items() {
            if let Some(r) = items.get(&item_id) {
                let record = ItemRecord {
                    cluster_id: None,
                    ..r.clone()
                };
                ops.push(Op::put(item_key(item_id), encode(&record)?));
            }
        }
        for cid in plan.deleted_clusters() {
            ops.push(Op::delete(cluster_key(&cid)));
        }
        self.kv.apply(&ops)?;

        let result = ProcedureResult {
            message: format!(
                "recalculated {} clusters: {} updated, {} deleted, {} items unassigned",
                stored.len(),
                plan.updates.len(),
                plan.singles.len() + plan.empties.len(),
                plan.singles.len()
            ),
            updated_clusters: plan.updates.iter().map(|(cid, _)| cid.clone()).collect(),
            deleted_clusters: plan.deleted_clusters(),
            unassigned_items: plan.unassigned_items(),
            discrepancies: plan.discrepancies,
        };
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use storyline_kv::{MemoryStore, RedbStore};

    use super::*;
    use crate::types::CountChange;

    fn store() -> KvClusterStore<MemoryStore> {
        KvClusterStore::new(MemoryStore::new()).with_centroid_width(4)
    }

    fn seed(s: &KvClusterStore<MemoryStore>, id: i64, emb: &[f32]) {
        s.put_item(id, emb, Utc::now() + Duration::seconds(id)).unwrap();
    }

    #[test]
    fn test_unclustered_items_newest_first_and_limited() {
        let s = store();
        seed(&s, 1, &[1.0, 0.0, 0.0, 0.0]);
        seed(&s, 2, &[0.0, 1.0, 0.0, 0.0]);
        seed(&s, 3, &[0.0, 0.0, 1.0, 0.0]);

        let items = s.fetch_unclustered_items(2).unwrap();
        let ids: Vec<i64> = items.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![3, 2]);
    }

    #[test]
    fn test_malformed_embedding_is_skipped() {
        let s = store();
        seed(&s, 1, &[1.0, 0.0, 0.0, 0.0]);
        seed(&s, 2, &[0.0, 1.0, 0.0, 0.0]);
        s.kv().put(&vector_key(2), b"[0.1, oops").unwrap();

        let items = s.fetch_unclustered_items(10).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, 1);
    }

    #[test]
    fn test_assigned_items_are_not_fetched() {
        let s = store();
        seed(&s, 1, &[1.0, 0.0, 0.0, 0.0]);
        seed(&s, 2, &[1.0, 0.0, 0.0, 0.0]);
        let cid = s.create_cluster(&[1.0, 0.0, 0.0, 0.0], 2).unwrap();
        s.batch_assign(&[(1, cid.clone())]).unwrap();

        let items = s.fetch_unclustered_items(10).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, 2);
        assert_eq!(s.item_ids_in_cluster(&cid).unwrap(), vec![1]);
    }

    #[test]
    fn test_batch_assign_is_all_or_nothing() {
        let s = store();
        seed(&s, 1, &[1.0, 0.0, 0.0, 0.0]);
        let err = s
            .batch_assign(&[(1, "c".to_string()), (99, "c".to_string())])
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert!(s.cluster_assignments().unwrap().is_empty());
    }

    #[test]
    fn test_create_and_update_normalize_width() {
        let s = store();
        let wide: Vec<f32> = (0..8).map(|i| i as f32).collect();
        let cid = s.create_cluster(&wide, 2).unwrap();

        let clusters = s.list_clusters().unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].centroid, Some(vec![0.0, 2.0, 4.0, 6.0]));
        assert_eq!(clusters[0].status, ClusterStatus::New);

        s.update_cluster(&cid, &[1.0, 1.0, 1.0, 1.0], 3).unwrap();
        let clusters = s.list_clusters().unwrap();
        assert_eq!(clusters[0].member_count, 3);
        assert_eq!(clusters[0].status, ClusterStatus::Updated);

        assert!(matches!(
            s.update_cluster("missing", &[1.0; 4], 3),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_fetch_existing_skips_bad_centroids() {
        let s = store();
        let good = s.create_cluster(&[1.0, 0.0, 0.0, 0.0], 2).unwrap();
        s.set_member_counts(&[("nullcentroid".to_string(), 2)]).unwrap();
        let broken = ClusterRecord {
            cluster_id: "broken".into(),
            centroid: Some("[1.0, abc]".into()),
            member_count: 2,
            status: ClusterStatus::New,
            updated_at: Utc::now(),
        };
        s.kv()
            .put(&cluster_key("broken"), &encode(&broken).unwrap())
            .unwrap();

        let clusters = s.fetch_existing_clusters().unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].id, good);
        assert_eq!(s.list_clusters().unwrap().len(), 3);
    }

    #[test]
    fn test_mark_old_keeps_counts_and_timestamp() {
        let s = store();
        let cid = s.create_cluster(&[1.0, 0.0, 0.0, 0.0], 4).unwrap();
        let before = s.list_clusters().unwrap().remove(0);
        s.mark_old(&[cid]).unwrap();
        let after = s.list_clusters().unwrap().remove(0);
        assert_eq!(after.status, ClusterStatus::Old);
        assert_eq!(after.member_count, 4);
        assert_eq!(after.updated_at, before.updated_at);
        assert_eq!(after.centroid, before.centroid);
    }

    #[test]
    fn test_put_item_keeps_assignment() {
        let s = store();
        seed(&s, 1, &[1.0, 0.0, 0.0, 0.0]);
        s.batch_assign(&[(1, "c".to_string())]).unwrap();
        seed(&s, 1, &[0.0, 1.0, 0.0, 0.0]);
        assert_eq!(s.cluster_assignments().unwrap(), vec![(1, "c".to_string())]);
        assert_eq!(
            s.items_in_cluster("c").unwrap()[0].embedding,
            vec![0.0, 1.0, 0.0, 0.0]
        );
    }

    #[test]
    fn test_recount_procedure_fixes_everything_atomically() {
        let s = store();
        for id in 1..=4 {
            seed(&s, id, &[1.0, 0.0, 0.0, 0.0]);
        }
        let drifted = s.create_cluster(&[1.0, 0.0, 0.0, 0.0], 5).unwrap();
        let single = s.create_cluster(&[1.0, 0.0, 0.0, 0.0], 2).unwrap();
        let empty = s.create_cluster(&[1.0, 0.0, 0.0, 0.0], 2).unwrap();
        s.batch_assign(&[
            (1, drifted.clone()),
            (2, drifted.clone()),
            (3, single.clone()),
        ])
        .unwrap();

        let result = s.recount_procedure().unwrap();
        assert_eq!(result.updated_clusters, vec![drifted.clone()]);
        assert_eq!(result.unassigned_items, vec![3]);
        assert_eq!(result.deleted_clusters.len(), 2);
        assert!(result.deleted_clusters.contains(&single));
        assert!(result.deleted_clusters.contains(&empty));
        assert_eq!(result.discrepancies[&drifted], CountChange { old: 5, new: 2 });

        let clusters = s.list_clusters().unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].member_count, 2);
        assert_eq!(s.fetch_unclustered_items(10).unwrap().len(), 2);

        let again = s.recount_procedure().unwrap();
        assert!(again.discrepancies.is_empty());
    }

    #[test]
    fn test_recount_procedure_can_be_disabled() {
        let s = store().with_procedure(false);
        assert!(matches!(
            s.recount_procedure(),
            Err(StoreError::Unsupported(_))
        ));
    }

    #[test]
    fn test_offline_backend_reports_unavailable() {
        let s = store();
        s.kv().set_offline(true);
        assert!(matches!(
            s.fetch_unclustered_items(10),
            Err(StoreError::Unavailable(_))
        ));
        assert!(s.create_cluster(&[1.0; 4], 2).is_err());
    }

    #[test]
    fn test_redb_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clusters.redb");
        let cid = {
            let s = KvClusterStore::new(RedbStore::open(&path).unwrap()).with_centroid_width(2);
            s.put_item(1, &[1.0, 0.0], Utc::now()).unwrap();
            s.put_item(2, &[0.9, 0.1], Utc::now()).unwrap();
            let cid = s.create_cluster(&[0.95, 0.05], 2).unwrap();
            s.batch_assign(&[(1, cid.clone()), (2, cid.clone())]).unwrap();
            cid
        };
        let s = KvClusterStore::new(RedbStore::open(&path).unwrap());
        let stats = s.stats().unwrap();
        assert_eq!(stats.clusters, 1);
        assert_eq!(stats.assigned, 2);
        assert_eq!(s.item_ids_in_cluster(&cid).unwrap(), vec![1, 2]);
    }
}
