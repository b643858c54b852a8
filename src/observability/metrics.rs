//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `remote_mesh_reconciliations_total` - Total number of reconciliations
//! - `remote_mesh_reconciliation_errors_total` - Reconciliation errors by reason
//! - `remote_mesh_reconciliation_duration_seconds` - Duration of reconciliation operations
//! - `remote_mesh_requeues_total` - Requeues by reason
//! - `remote_mesh_status_conflicts_total` - Status writes that hit a version conflict
//! - `remote_mesh_teardowns_total` - Completed teardowns
//! - `remote_mesh_teardowns_deferred_total` - Teardowns deferred behind an active reconciliation
//! - `remote_mesh_discovered_endpoints` - IPs advertised per remote cluster in the last pass
//! - `remote_mesh_remote_clusters` - Cached remote cluster handles

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "remote_mesh_reconciliations_total",
        "Total number of reconciliations",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "remote_mesh_reconciliation_errors_total",
            "Total number of reconciliation errors by reason",
        ),
        &["reason"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "remote_mesh_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "remote_mesh_requeues_total",
            "Total number of requeues by reason",
        ),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

static STATUS_CONFLICTS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "remote_mesh_status_conflicts_total",
        "Total number of status writes that hit a version conflict",
    )
    .expect("Failed to create STATUS_CONFLICTS_TOTAL metric - this should never happen")
});

static TEARDOWNS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "remote_mesh_teardowns_total",
        "Total number of completed teardowns",
    )
    .expect("Failed to create TEARDOWNS_TOTAL metric - this should never happen")
});

static TEARDOWNS_DEFERRED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "remote_mesh_teardowns_deferred_total",
        "Total number of teardowns deferred behind an active reconciliation",
    )
    .expect("Failed to create TEARDOWNS_DEFERRED_TOTAL metric - this should never happen")
});

static DISCOVERED_ENDPOINTS: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    IntGaugeVec::new(
        prometheus::Opts::new(
            "remote_mesh_discovered_endpoints",
            "Number of IPs advertised to a remote cluster in the last pass",
        ),
        &["remote"],
    )
    .expect("Failed to create DISCOVERED_ENDPOINTS metric - this should never happen")
});

static REMOTE_CLUSTERS: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "remote_mesh_remote_clusters",
        "Current number of cached remote cluster handles",
    )
    .expect("Failed to create REMOTE_CLUSTERS metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STATUS_CONFLICTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(TEARDOWNS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(TEARDOWNS_DEFERRED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DISCOVERED_ENDPOINTS.clone()))?;
    REGISTRY.register(Box::new(REMOTE_CLUSTERS.clone()))?;

    Ok(())
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors(reason: &str) {
    RECONCILIATION_ERRORS_TOTAL.with_label_values(&[reason]).inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn increment_requeues(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

pub fn increment_status_conflicts() {
    STATUS_CONFLICTS_TOTAL.inc();
}

pub fn increment_teardowns() {
    TEARDOWNS_TOTAL.inc();
}

pub fn increment_teardowns_deferred() {
    TEARDOWNS_DEFERRED_TOTAL.inc();
}

pub fn set_discovered_endpoints(remote: &str, count: usize) {
    let count = i64::try_from(count).unwrap_or(i64::MAX);
    DISCOVERED_ENDPOINTS.with_label_values(&[remote]).set(count);
}

/// Drop the per-remote series once its RemoteConfig is gone
pub fn forget_remote(remote: &str) {
    let _ = DISCOVERED_ENDPOINTS.remove_label_values(&[remote]);
}

pub fn set_remote_clusters(count: usize) {
    REMOTE_CLUSTERS.set(i64::try_from(count).unwrap_or(i64::MAX));
}

/// Render every registered metric in the Prometheus text format
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn gather_text() -> Result<String> {
    use prometheus::Encoder;

    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_reconciliations() {
        let before = RECONCILIATIONS_TOTAL.get();
        increment_reconciliations();
        assert_eq!(RECONCILIATIONS_TOTAL.get(), before + 1u64);
    }

    #[test]
    fn test_errors_are_labelled_by_reason() {
        let before = RECONCILIATION_ERRORS_TOTAL
            .with_label_values(&["ingress-setup-pending"])
            .get();
        increment_reconciliation_errors("ingress-setup-pending");
        let after = RECONCILIATION_ERRORS_TOTAL
            .with_label_values(&["ingress-setup-pending"])
            .get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_discovered_endpoints_gauge() {
        set_discovered_endpoints("istio-system/metrics-test", 3);
        assert_eq!(
            DISCOVERED_ENDPOINTS
                .with_label_values(&["istio-system/metrics-test"])
                .get(),
            3
        );
        forget_remote("istio-system/metrics-test");
    }

    #[test]
    fn test_observe_reconciliation_duration() {
        observe_reconciliation_duration(0.25);
        // Just verify it doesn't panic
    }
}
