//! Sync cycle scheduler.
//!
//! Drives the synchronizer over every remote bundle, once immediately at
//! startup and then on a fixed interval, until cancelled. The loop is an
//! explicit state machine; cancellation is observed while waiting between
//! cycles and before a new cycle starts, but a cycle already in progress
//! always runs to completion so the atomic-publish discipline is never
//! interrupted mid-swap.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::bundle::Synchronizer;
use super::{unpack, SyncError, SyncOutcome};
use crate::metrics::{MetricsRegistry, SyncLabels, SyncOutcomeLabel};
use crate::storage::{ObjectStore, RemoteBundle};

enum SchedulerState {
    /// Waiting out the interval between cycles.
    Idle,
    /// Enumerating the remote bucket.
    Listing,
    /// Working through the bundles of one cycle.
    SyncingEach {
        bundles: Vec<RemoteBundle>,
        started: Instant,
    },
    /// Shutdown observed; no further cycles.
    Cancelled,
}

pub struct SyncScheduler {
    site_dir: PathBuf,
    store: Arc<dyn ObjectStore>,
    synchronizer: Synchronizer,
    interval: Duration,
    metrics: MetricsRegistry,
    shutdown: CancellationToken,
}

impl SyncScheduler {
    pub fn new(
        site_dir: impl Into<PathBuf>,
        store: Arc<dyn ObjectStore>,
        interval: Duration,
        metrics: MetricsRegistry,
        shutdown: CancellationToken,
    ) -> Self {
        let site_dir = site_dir.into();
        Self {
            synchronizer: Synchronizer::new(&site_dir, Arc::clone(&store)),
            site_dir,
            store,
            interval,
            metrics,
            shutdown,
        }
    }

    /// Run until the shutdown token fires. Individual cycle failures are
    /// logged and retried on the next tick; this function only returns on
    /// cancellation.
    pub async fn run(self) {
        info!(
            interval_secs = self.interval.as_secs(),
            "bundle sync scheduler started"
        );
        unpack::prune_stage(&self.site_dir);

        // First cycle starts immediately so the mirror is populated before
        // traffic arrives. Best effort: serving does not wait for it.
        let mut state = SchedulerState::Listing;
        loop {
            state = match state {
                SchedulerState::Idle => self.wait().await,
                SchedulerState::Listing => self.list().await,
                SchedulerState::SyncingEach { bundles, started } => {
                    self.sync_each(bundles, started).await
                }
                SchedulerState::Cancelled => break,
            };
        }
        info!("bundle sync scheduler stopped");
    }

    async fn wait(&self) -> SchedulerState {
        tokio::select! {
            () = self.shutdown.cancelled() => SchedulerState::Cancelled,
            () = tokio::time::sleep(self.interval) => SchedulerState::Listing,
        }
    }

    async fn list(&self) -> SchedulerState {
        if self.shutdown.is_cancelled() {
            return SchedulerState::Cancelled;
        }

        let started = Instant::now();
        match self.store.list().await {
            Ok(objects) => {
                let bundles: Vec<RemoteBundle> = objects
                    .into_iter()
                    .filter(RemoteBundle::is_site_archive)
                    .collect();
                debug!(count = bundles.len(), "listed site bundles");
                SchedulerState::SyncingEach { bundles, started }
            }
            Err(e) => {
                error!(error = %SyncError::Listing(e), "cycle aborted");
                SchedulerState::Idle
            }
        }
    }

    async fn sync_each(&self, bundles: Vec<RemoteBundle>, started: Instant) -> SchedulerState {
        let (mut updated, mut skipped, mut failed) = (0usize, 0usize, 0usize);

        for bundle in &bundles {
            let outcome = self.synchronizer.sync(bundle).await;
            self.metrics
                .metrics
                .sync_bundles_total
                .get_or_create(&SyncLabels {
                    outcome: outcome_label(&outcome),
                })
                .inc();

            match &outcome {
                SyncOutcome::Updated => {
                    updated += 1;
                    info!(bundle = %bundle.name, etag = %bundle.etag, "bundle updated");
                }
                SyncOutcome::Skipped => skipped += 1,
                SyncOutcome::Failed(e @ SyncError::PathTraversal { .. }) => {
                    failed += 1;
                    error!(bundle = %bundle.name, error = %e, "unsafe archive rejected");
                }
                SyncOutcome::Failed(e) => {
                    failed += 1;
                    warn!(bundle = %bundle.name, error = %e, "bundle sync failed");
                }
            }
        }

        self.metrics.metrics.sync_cycles_total.inc();
        self.metrics
            .metrics
            .sync_cycle_duration_seconds
            .observe(started.elapsed().as_secs_f64());
        info!(updated, skipped, failed, "sync cycle complete");

        SchedulerState::Idle
    }
}

fn outcome_label(outcome: &SyncOutcome) -> SyncOutcomeLabel {
    match outcome {
        SyncOutcome::Updated => SyncOutcomeLabel::Updated,
        SyncOutcome::Skipped => SyncOutcomeLabel::Skipped,
        SyncOutcome::Failed(_) => SyncOutcomeLabel::Failed,
    }
}
