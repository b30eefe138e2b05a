use std::sync::Arc;

use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

// ---------------------------------------------------------------------------
// Label types
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct SyncLabels {
    pub outcome: SyncOutcomeLabel,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum SyncOutcomeLabel {
    Updated,
    Skipped,
    Failed,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RequestLabels {
    pub outcome: RequestOutcome,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum RequestOutcome {
    Hit,
    Miss,
    Landing,
}

// ---------------------------------------------------------------------------
// Metrics struct
// ---------------------------------------------------------------------------

/// Central container for every Prometheus metric exposed by the server.
pub struct Metrics {
    // -- sync --
    pub sync_cycles_total: Counter,
    pub sync_cycle_duration_seconds: Histogram,
    pub sync_bundles_total: Family<SyncLabels, Counter>,

    // -- serving --
    pub requests_total: Family<RequestLabels, Counter>,
    pub bytes_served_total: Counter,
}

impl Metrics {
    /// Create a new [`Metrics`] instance and register every metric with the
    /// supplied `registry`.
    pub fn new(registry: &mut Registry) -> Self {
        let sync_cycles_total = Counter::default();
        registry.register(
            "sitemirror_sync_cycles_total",
            "Completed bundle sync cycles",
            sync_cycles_total.clone(),
        );

        let sync_cycle_duration_seconds = Histogram::new(exponential_buckets(0.1, 2.0, 12));
        registry.register(
            "sitemirror_sync_cycle_duration_seconds",
            "Bundle sync cycle latency in seconds",
            sync_cycle_duration_seconds.clone(),
        );

        let sync_bundles_total = Family::<SyncLabels, Counter>::default();
        registry.register(
            "sitemirror_sync_bundles_total",
            "Per-bundle sync results by outcome",
            sync_bundles_total.clone(),
        );

        let requests_total = Family::<RequestLabels, Counter>::default();
        registry.register(
            "sitemirror_requests_total",
            "Content requests by outcome",
            requests_total.clone(),
        );

        let bytes_served_total = Counter::default();
        registry.register(
            "sitemirror_bytes_served_total",
            "Total static file bytes served",
            bytes_served_total.clone(),
        );

        Self {
            sync_cycles_total,
            sync_cycle_duration_seconds,
            sync_bundles_total,
            requests_total,
            bytes_served_total,
        }
    }
}

// ---------------------------------------------------------------------------
// Shared handle
// ---------------------------------------------------------------------------

/// Thread-safe wrapper for the metrics registry, used in [`crate::AppState`].
#[derive(Clone)]
pub struct MetricsRegistry {
    pub registry: Arc<Registry>,
    pub metrics: Arc<Metrics>,
}

impl MetricsRegistry {
    /// Build a fresh registry and pre-register all server metrics.
    pub fn new() -> Self {
        let mut registry = Registry::default();
        let metrics = Metrics::new(&mut registry);
        Self {
            registry: Arc::new(registry),
            metrics: Arc::new(metrics),
        }
    }
}
