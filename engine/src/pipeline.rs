use std::time::Duration;

use chrono::Utc;
use storyline_clusterstore::{ClusterStore, Discrepancies};
use tracing::{error, info};

use crate::{Backoff, Driver, EngineConfig, EngineError, FileLock, PendingSet, Repairer, RunReport, retry};

const CLUSTERING_BACKOFF_STEP: Duration = Duration::from_secs(5);

/// How a pipeline invocation ended.
#[derive(Debug)]
pub enum Outcome {
    /// Another run holds the lock; nothing was done.
    Locked,
    Completed(PipelineReport),
}

#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub aged: usize,
    pub repaired: Vec<String>,
    pub run: RunReport,
    pub discrepancies: Discrepancies,
}

/// The full maintenance sequence under the cross-process lock: age stale
/// clusters, repair zero centroids, cluster, then recount.
///
/// Every phase is retried. Only the clustering phase is fatal once its
/// retries are exhausted; the others log and the pipeline moves on.
pub struct Pipeline<'a> {
    store: &'a dyn ClusterStore,
    config: EngineConfig,
    sleep: Box<dyn Fn(Duration) + 'a>,
}

impl<'a> Pipeline<'a> {
    pub fn new(store: &'a dyn ClusterStore, config: EngineConfig) -> Self {
        Self {
            store,
            config,
            sleep: Box::new(std::thread::sleep),
        }
    }

    /// Replaces the sleep used between retries.
    pub fn with_sleeper(mut self, sleep: impl Fn(Duration) + 'a) -> Self {
        self.sleep = Box::new(sleep);
        self
    }

    /// Takes the run lock, runs every phase and releases the lock whether
    /// or not the phases succeeded.
    pub fn run(&self, pending: PendingSet) -> Result<Outcome, EngineError> {
        self.config.validate()?;
        let lock = FileLock::new(self.config.lock_path());
        let Some(guard) = lock.acquire()? else {
            info!(path = %lock.path().display(), "another clustering run is in progress, exiting");
            return Ok(Outcome::Locked);
        };

        info!("starting clustering pipeline");
        let result = self.run_phases(pending);
        match &result {
            Ok(report) => info!(
                aged = report.aged,
                repaired = report.repaired.len(),
                recounted = report.discrepancies.len(),
                "clustering pipeline finished"
            ),
            Err(e) => error!(error = %e, "clustering pipeline failed"),
        }
        guard.release();
        result.map(Outcome::Completed)
    }

    /// Runs the phases without touching the lock. The caller must already
    /// hold it, e.g. when the store itself can only be opened under the lock.
    pub fn run_phases(&self, pending: PendingSet) -> Result<PipelineReport, EngineError> {
        self.config.validate()?;
        let attempts = self.config.max_retries;
        let sleep = self.sleep.as_ref();
        let repairer = Repairer::new(self.store);

        let aged = retry("age stale clusters", attempts, Backoff::Exponential, sleep, || {
            repairer.try_age_stale_clusters_at(Utc::now(), self.config.stale_window())
        })
        .unwrap_or(0);

        let repaired = retry("repair zero centroids", attempts, Backoff::Exponential, sleep, || {
            repairer.try_repair_zero_centroid_clusters()
        })
        .unwrap_or_default();

        let driver = Driver::new(self.store, &self.config);
        let run = retry(
            "clustering",
            attempts,
            Backoff::Linear(CLUSTERING_BACKOFF_STEP),
            sleep,
            || driver.run(pending.clone()),
        )?;

        let discrepancies = retry("verify member counts", attempts, Backoff::Exponential, sleep, || {
            repairer.try_recalculate_member_counts()
        })
        .unwrap_or_default();

        Ok(PipelineReport {
            aged,
            repaired,
            run,
            discrepancies,
        })
    }
}
