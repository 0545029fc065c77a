//! The in-memory matcher.
//!
//! [`ClusterManager`] holds the working copy of every usable cluster plus
//! the staged items, and writes each decision through to the store as it
//! is made. Assignments are not written here; the caller collects them from
//! the returned [`Decision`]s and batch-writes them.

use storyline_clusterstore::{ClusterState, ClusterStore};
use storyline_vecmath::{cosine_similarity, mean, weighted_mean};
use tracing::{debug, error, info, warn};

use crate::config::check_thresholds;
use crate::{EngineError, PendingSet};

/// The best cluster for a vector, with the cluster's state at match time.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterMatch {
    pub cluster_id: String,
    pub centroid: Vec<f32>,
    pub count: u64,
    pub score: f32,
}

/// The best staged item for a vector.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMatch {
    pub item_id: i64,
    pub embedding: Vec<f32>,
    pub score: f32,
}

/// What happened to one item.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Joined an existing cluster.
    Joined { cluster_id: String, score: f32 },
    /// Founded a new cluster together with a staged item.
    Created { cluster_id: String, partner: i64 },
    /// Staged for a later pairing.
    Staged,
    /// Dropped from this run after a failure; it stays unassigned.
    Skipped,
}

pub struct ClusterManager<'a> {
    store: &'a dyn ClusterStore,
    similarity_threshold: f32,
    merge_threshold: f32,
    clusters: Vec<ClusterState>,
    pending: PendingSet,
}

impl<'a> ClusterManager<'a> {
    /// Fails with `InvalidConfig` unless both thresholds are in (0, 1] and
    /// `merge_threshold >= similarity_threshold`.
    pub fn new(
        store: &'a dyn ClusterStore,
        similarity_threshold: f32,
        merge_threshold: f32,
    ) -> Result<Self, EngineError> {
        check_thresholds(similarity_threshold, merge_threshold)?;
        Ok(Self {
            store,
            similarity_threshold,
            merge_threshold,
            clusters: Vec::new(),
            pending: PendingSet::new(),
        })
    }

    pub fn with_clusters(mut self, clusters: Vec<ClusterState>) -> Self {
        self.clusters = clusters;
        self
    }

    pub fn with_pending(mut self, pending: PendingSet) -> Self {
        self.pending = pending;
        self
    }

    pub fn clusters(&self) -> &[ClusterState] {
        &self.clusters
    }

    pub fn pending(&self) -> &PendingSet {
        &self.pending
    }

    pub fn into_pending(self) -> PendingSet {
        self.pending
    }

    /// Finds the cluster whose centroid is most similar to `v`, if that
    /// similarity is strictly above the threshold. Every cluster is scored;
    /// ties keep the first. Clusters of an incompatible width are skipped.
    pub fn find_best_cluster_match(&self, v: &[f32]) -> Option<ClusterMatch> {
        let mut best: Option<(usize, f32)> = None;
        for (i, cluster) in self.clusters.iter().enumerate() {
            let score = match cosine_similarity(v, &cluster.centroid) {
                Ok(s) => s,
                Err(e) => {
                    warn!(cluster_id = %cluster.id, error = %e, "skipping incompatible cluster");
                    continue;
                }
            };
            if score > self.similarity_threshold && best.is_none_or(|(_, s)| score > s) {
                best = Some((i, score));
            }
        }
        best.map(|(i, score)| {
            let c = &self.clusters[i];
            ClusterMatch {
                cluster_id: c.id.clone(),
                centroid: c.centroid.clone(),
                count: c.count,
                score,
            }
        })
    }

    /// Finds the staged item most similar to `v`, strictly above the
    /// threshold. Ties keep the earliest staged item.
    pub fn find_best_pending_match(&self, v: &[f32]) -> Option<PendingMatch> {
        let mut best: Option<(i64, &[f32], f32)> = None;
        for (item_id, embedding) in self.pending.iter() {
            let score = match cosine_similarity(v, embedding) {
                Ok(s) => s,
                Err(e) => {
                    debug!(item_id, error = %e, "skipping incompatible pending item");
                    continue;
                }
            };
            if score > self.similarity_threshold && best.is_none_or(|(_, _, s)| score > s) {
                best = Some((item_id, embedding, score));
            }
        }
        best.map(|(item_id, embedding, score)| PendingMatch {
            item_id,
            embedding: embedding.to_vec(),
            score,
        })
    }

    /// Folds `v` into a cluster: the centroid becomes the running mean and
    /// the count grows by one. Persists, then refreshes the working copy.
    pub fn update_cluster(
        &mut self,
        cluster_id: &str,
        old_centroid: &[f32],
        old_count: u64,
        v: &[f32],
    ) -> Result<(Vec<f32>, u64), EngineError> {
        if old_count < 2 {
            return Err(EngineError::InvariantViolation(format!(
                "cluster {cluster_id} has {old_count} members, a cluster needs at least 2"
            )));
        }
        let centroid = weighted_mean(old_centroid, old_count, v, 1)?;
        let count = old_count + 1;
        self.store.update_cluster(cluster_id, &centroid, count)?;

        if let Some(c) = self.clusters.iter_mut().find(|c| c.id == cluster_id) {
            c.centroid = centroid.clone();
            c.count = count;
        }
        Ok((centroid, count))
    }

    /// Founds a cluster from the given vectors; the centroid is their mean.
    pub fn create_cluster(&mut self, vectors: &[&[f32]]) -> Result<ClusterState, EngineError> {
        if vectors.is_empty() {
            return Err(EngineError::InvariantViolation(
                "cannot create a cluster from no vectors".into(),
            ));
        }
        let centroid = mean(vectors)?;
        let count = vectors.len() as u64;
        let id = self.store.create_cluster(&centroid, count)?;

        let state = ClusterState { id, centroid, count };
        self.clusters.push(state.clone());
        Ok(state)
    }

    pub fn add_to_pending(&mut self, item_id: i64, v: Vec<f32>) {
        self.pending.insert(item_id, v);
    }

    pub fn remove_from_pending(&mut self, item_id: i64) {
        self.pending.remove(item_id);
    }

    /// Runs the per-item decision: join the best cluster, else pair with
    /// the best staged item, else stage.
    ///
    /// A store failure while joining skips the item; one while founding
    /// stages it and leaves the partner staged. Both stay unassigned.
    pub fn process_item(&mut self, item_id: i64, v: &[f32]) -> Result<Decision, EngineError> {
        // An item is never its own partner.
        self.remove_from_pending(item_id);

        if let Some(m) = self.find_best_cluster_match(v) {
            return match self.update_cluster(&m.cluster_id, &m.centroid, m.count, v) {
                Ok((_, count)) => {
                    debug!(item_id, cluster_id = %m.cluster_id, score = m.score, count, "joined cluster");
                    Ok(Decision::Joined {
                        cluster_id: m.cluster_id,
                        score: m.score,
                    })
                }
                Err(EngineError::Store(e)) => {
                    error!(item_id, cluster_id = %m.cluster_id, error = %e, "cluster update failed, skipping item");
                    Ok(Decision::Skipped)
                }
                Err(e) => Err(e),
            };
        }

        if let Some(p) = self.find_best_pending_match(v) {
            return match self.create_cluster(&[p.embedding.as_slice(), v]) {
                Ok(state) => {
                    self.remove_from_pending(p.item_id);
                    debug!(item_id, partner = p.item_id, cluster_id = %state.id, score = p.score, "created cluster");
                    Ok(Decision::Created {
                        cluster_id: state.id,
                        partner: p.item_id,
                    })
                }
                Err(EngineError::Store(e)) => {
                    error!(item_id, partner = p.item_id, error = %e, "cluster creation failed, staging item");
                    self.add_to_pending(item_id, v.to_vec());
                    Ok(Decision::Staged)
                }
                Err(e) => Err(e),
            };
        }

        self.add_to_pending(item_id, v.to_vec());
        Ok(Decision::Staged)
    }

    /// Merges the first pair of clusters whose centroids are more similar
    /// than the merge threshold. Returns whether a merge happened.
    ///
    /// The cluster with more members survives, the first one on a tie. The
    /// other cluster's members are reassigned to it first. The survivor then
    /// takes the count-weighted mean centroid and the summed count, and the
    /// other cluster is deleted last.
    ///
    /// A failed write reports no merge and leaves the in-memory clusters
    /// untouched. If reassignment fails nothing has been written. If the
    /// survivor update fails the members have already moved: both stored
    /// centroids stay as they were and the next recount corrects the counts
    /// and dissolves the emptied cluster.
    pub fn check_and_merge_similar_clusters(&mut self) -> Result<bool, EngineError> {
        for i in 0..self.clusters.len() {
            for j in (i + 1)..self.clusters.len() {
                let sim = match cosine_similarity(&self.clusters[i].centroid, &self.clusters[j].centroid) {
                    Ok(s) => s,
                    Err(_) => continue,
                };
                if sim > self.merge_threshold {
                    return self.merge_pair(i, j, sim);
                }
            }
        }
        Ok(false)
    }

    fn merge_pair(&mut self, i: usize, j: usize, sim: f32) -> Result<bool, EngineError> {
        let (keep, absorb) = if self.clusters[i].count >= self.clusters[j].count {
            (i, j)
        } else {
            (j, i)
        };
        let survivor = &self.clusters[keep];
        let absorbed = &self.clusters[absorb];
        let total = survivor.count + absorbed.count;
        let centroid = weighted_mean(&survivor.centroid, survivor.count, &absorbed.centroid, absorbed.count)?;
        let survivor_id = survivor.id.clone();
        let absorbed_id = absorbed.id.clone();

        let moved = self.store.item_ids_in_cluster(&absorbed_id).and_then(|ids| {
            let reassign: Vec<(i64, String)> = ids.into_iter().map(|id| (id, survivor_id.clone())).collect();
            self.store.batch_assign(&reassign).map(|_| reassign.len())
        });
        let moved = match moved {
            Ok(n) => n,
            Err(e) => {
                error!(survivor = %survivor_id, absorbed = %absorbed_id, error = %e, "merge failed reassigning items");
                return Ok(false);
            }
        };

        if let Err(e) = self.store.update_cluster(&survivor_id, &centroid, total) {
            error!(survivor = %survivor_id, absorbed = %absorbed_id, moved, error = %e, "merge failed updating survivor");
            return Ok(false);
        }

        if let Err(e) = self.store.delete_clusters(std::slice::from_ref(&absorbed_id)) {
            warn!(absorbed = %absorbed_id, error = %e, "absorbed cluster not deleted, recount will remove it");
        }

        self.clusters[keep].centroid = centroid;
        self.clusters[keep].count = total;
        self.clusters.remove(absorb);

        info!(survivor = %survivor_id, absorbed = %absorbed_id, similarity = sim, members = total, moved, "merged clusters");
        Ok(true)
    }

    /// Repeats merge passes until one finds nothing, at most `max_passes`
    /// times. Returns the number of merges.
    pub fn merge_until_stable(&mut self, max_passes: usize) -> Result<usize, EngineError> {
        let mut merges = 0;
        while merges < max_passes {
            if !self.check_and_merge_similar_clusters()? {
                return Ok(merges);
            }
            merges += 1;
        }
        if merges > 0 {
            warn!(max_passes, "reached max merge passes");
        }
        Ok(merges)
    }
}
