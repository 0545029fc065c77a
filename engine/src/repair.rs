//! Consistency repair passes.
//!
//! Each pass has a `try_` form that surfaces store errors, for callers that
//! retry, and a plain form that logs the error and returns an empty result.
//! All passes are idempotent: running one again on a repaired store changes
//! nothing.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use storyline_clusterstore::{ClusterStatus, ClusterStore, Discrepancies, StoreError, plan_recount};
use storyline_vecmath::{is_zero, mean};
use tracing::{debug, error, info, warn};

use crate::EngineError;

pub struct Repairer<'a> {
    store: &'a dyn ClusterStore,
}

impl<'a> Repairer<'a> {
    pub fn new(store: &'a dyn ClusterStore) -> Self {
        Self { store }
    }

    /// Makes every stored member count equal its number of assigned items.
    ///
    /// Clusters left with one member are dissolved (item unassigned, cluster
    /// deleted); clusters with none are deleted. The backend's atomic
    /// procedure is tried first, then a client-side sequence of steps.
    /// Returns the clusters whose count was wrong.
    pub fn try_recalculate_member_counts(&self) -> Result<Discrepancies, EngineError> {
        match self.store.recount_procedure() {
            Ok(result) => {
                info!(
                    updated = result.updated_clusters.len(),
                    deleted = result.deleted_clusters.len(),
                    unassigned = result.unassigned_items.len(),
                    "recount procedure: {}",
                    result.message
                );
                log_discrepancies(&result.discrepancies);
                return Ok(result.discrepancies);
            }
            Err(StoreError::Unsupported(_)) => {
                debug!("recount procedure not available, recounting client side");
            }
            Err(e) => {
                warn!(error = %e, "recount procedure failed, recounting client side");
            }
        }
        self.recount_client_side()
    }

    fn recount_client_side(&self) -> Result<Discrepancies, EngineError> {
        let stored: HashMap<String, u64> = self
            .store
            .list_clusters()?
            .into_iter()
            .map(|c| (c.cluster_id, c.member_count))
            .collect();
        let assignments = self.store.cluster_assignments()?;
        let plan = plan_recount(&stored, &assignments);

        if plan.is_empty() {
            info!(clusters = stored.len(), "all member counts are correct");
            return Ok(plan.discrepancies);
        }

        // Steps run independently; the first failure is reported after the
        // rest have had their chance.
        let mut failure: Option<StoreError> = None;
        let mut step = |name: &str, result: Result<(), StoreError>| {
            if let Err(e) = result {
                error!(step = name, error = %e, "recount step failed");
                failure.get_or_insert(e);
            }
        };

        if !plan.updates.is_empty() {
            step("update counts", self.store.set_member_counts(&plan.updates));
        }
        let unassigned = plan.unassigned_items();
        if !unassigned.is_empty() {
            step("unassign singles", self.store.unassign_items(&unassigned));
        }
        let deleted = plan.deleted_clusters();
        if !deleted.is_empty() {
            step("delete degenerate clusters", self.store.delete_clusters(&deleted));
        }

        if let Some(e) = failure {
            return Err(e.into());
        }
        info!(
            updated = plan.updates.len(),
            deleted = deleted.len(),
            unassigned = unassigned.len(),
            "recount applied"
        );
        log_discrepancies(&plan.discrepancies);
        Ok(plan.discrepancies)
    }

    pub fn recalculate_member_counts(&self) -> Discrepancies {
        self.try_recalculate_member_counts().unwrap_or_else(|e| {
            error!(error = %e, "member count recount failed");
            Discrepancies::new()
        })
    }

    /// Recomputes null or all-zero centroids as the mean of the cluster's
    /// member embeddings, setting the count to the number of embeddings
    /// used. Clusters without usable members are left for the recount.
    /// Returns the ids of the repaired clusters.
    pub fn try_repair_zero_centroid_clusters(&self) -> Result<Vec<String>, EngineError> {
        let broken: Vec<String> = self
            .store
            .list_clusters()?
            .into_iter()
            .filter(|c| c.centroid.as_deref().is_none_or(is_zero))
            .map(|c| c.cluster_id)
            .collect();

        if broken.is_empty() {
            info!("no zero centroid clusters found");
            return Ok(Vec::new());
        }
        info!(count = broken.len(), "found clusters with zero centroids");

        let mut fixed = Vec::new();
        for cluster_id in broken {
            let items = self.store.items_in_cluster(&cluster_id)?;
            if items.is_empty() {
                warn!(%cluster_id, "no usable member embeddings, cannot repair centroid");
                continue;
            }
            let embeddings: Vec<&[f32]> = items.iter().map(|i| i.embedding.as_slice()).collect();
            let centroid = match mean(&embeddings) {
                Ok(c) => c,
                Err(e) => {
                    warn!(%cluster_id, error = %e, "member embeddings unusable, cannot repair centroid");
                    continue;
                }
            };
            self.store
                .update_cluster(&cluster_id, &centroid, embeddings.len() as u64)?;
            info!(%cluster_id, members = embeddings.len(), "repaired centroid");
            fixed.push(cluster_id);
        }
        Ok(fixed)
    }

    pub fn repair_zero_centroid_clusters(&self) -> Vec<String> {
        self.try_repair_zero_centroid_clusters().unwrap_or_else(|e| {
            error!(error = %e, "zero centroid repair failed");
            Vec::new()
        })
    }

    /// Marks clusters not updated since `now - window` as OLD. Returns how
    /// many were marked.
    pub fn try_age_stale_clusters_at(
        &self,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<usize, EngineError> {
        let cutoff = now - window;
        let stale: Vec<String> = self
            .store
            .list_clusters()?
            .into_iter()
            .filter(|c| c.status != ClusterStatus::Old && c.updated_at < cutoff)
            .map(|c| c.cluster_id)
            .collect();

        if stale.is_empty() {
            info!(%cutoff, "no stale clusters");
            return Ok(0);
        }
        self.store.mark_old(&stale)?;
        info!(count = stale.len(), %cutoff, "marked stale clusters OLD");
        Ok(stale.len())
    }

    pub fn age_stale_clusters(&self, window: Duration) -> usize {
        self.age_stale_clusters_at(Utc::now(), window)
    }

    pub fn age_stale_clusters_at(&self, now: DateTime<Utc>, window: Duration) -> usize {
        self.try_age_stale_clusters_at(now, window).unwrap_or_else(|e| {
            error!(error = %e, "aging stale clusters failed");
            0
        })
    }
}

fn log_discrepancies(discrepancies: &Discrepancies) {
    for (cluster_id, change) in discrepancies {
        info!(%cluster_id, old = change.old, new = change.new, "member count corrected");
    }
}
