use std::collections::HashSet;
use std::time::{Duration, Instant};

use storyline_clusterstore::ClusterStore;
use tracing::{error, info, warn};

use crate::{ClusterManager, Decision, EngineConfig, EngineError, PendingSet};

/// Totals for one clustering run, plus the staged items to carry into the
/// next one.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub processed: usize,
    pub joined: usize,
    pub created: usize,
    pub staged: usize,
    pub skipped: usize,
    pub merged: usize,
    pub assigned: usize,
    pub pending: PendingSet,
    pub elapsed: Duration,
}

/// One clustering run over the current unclustered items.
pub struct Driver<'a> {
    store: &'a dyn ClusterStore,
    config: &'a EngineConfig,
}

impl<'a> Driver<'a> {
    pub fn new(store: &'a dyn ClusterStore, config: &'a EngineConfig) -> Self {
        Self { store, config }
    }

    /// Fetches items and clusters, decides every item, writes the new
    /// assignments in one batch, then merges similar clusters.
    ///
    /// A fetch failure degrades to an empty batch. A per-item failure skips
    /// that item. A failed assignment write fails the run; the run can be
    /// repeated since nothing was assigned.
    pub fn run(&self, pending: PendingSet) -> Result<RunReport, EngineError> {
        self.config.validate()?;
        let start = Instant::now();

        let items = self
            .store
            .fetch_unclustered_items(self.config.fetch_limit)
            .unwrap_or_else(|e| {
                error!(error = %e, "failed to fetch unclustered items");
                Vec::new()
            });
        let clusters = self.store.fetch_existing_clusters().unwrap_or_else(|e| {
            error!(error = %e, "failed to fetch clusters");
            Vec::new()
        });
        let (clusters, degenerate): (Vec<_>, Vec<_>) =
            clusters.into_iter().partition(|c| c.count >= 2);
        for c in &degenerate {
            warn!(cluster_id = %c.id, count = c.count, "ignoring cluster with fewer than 2 members");
        }
        info!(items = items.len(), clusters = clusters.len(), pending = pending.len(), "starting clustering run");

        // Items fetched again are decided afresh rather than from the
        // carried-over copy.
        let fetched: HashSet<i64> = items.iter().map(|i| i.id).collect();
        let mut pending = pending;
        pending.retain(|id| !fetched.contains(&id));

        let mut manager = ClusterManager::new(
            self.store,
            self.config.similarity_threshold,
            self.config.merge_threshold,
        )?
        .with_clusters(clusters)
        .with_pending(pending);

        let mut report = RunReport::default();
        let mut assignments: Vec<(i64, String)> = Vec::new();
        for item in &items {
            report.processed += 1;
            let decision = match manager.process_item(item.id, &item.embedding) {
                Ok(d) => d,
                Err(e @ EngineError::InvariantViolation(_)) => return Err(e),
                Err(e) => {
                    warn!(item_id = item.id, error = %e, "skipping item");
                    Decision::Skipped
                }
            };
            match decision {
                Decision::Joined { cluster_id, .. } => {
                    report.joined += 1;
                    assignments.push((item.id, cluster_id));
                }
                Decision::Created { cluster_id, partner } => {
                    report.created += 1;
                    assignments.push((partner, cluster_id.clone()));
                    assignments.push((item.id, cluster_id));
                }
                Decision::Staged => report.staged += 1,
                Decision::Skipped => report.skipped += 1,
            }
        }

        // Assignments land before merging so merge reassignment sees them.
        if !assignments.is_empty() {
            self.store.batch_assign(&assignments)?;
            info!(count = assignments.len(), "assigned items");
        }
        report.assigned = assignments.len();

        report.merged = manager.merge_until_stable(self.config.max_merge_passes)?;
        report.pending = manager.into_pending();
        report.elapsed = start.elapsed();

        info!(
            processed = report.processed,
            joined = report.joined,
            created = report.created,
            staged = report.staged,
            skipped = report.skipped,
            merged = report.merged,
            pending = report.pending.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "clustering run finished"
        );
        Ok(report)
    }
}
