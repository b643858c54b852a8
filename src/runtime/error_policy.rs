//! # Error Policy
//!
//! Error handling and backoff logic for the controller watch loop.
//! This module handles reconciliation errors and watch stream errors.

use crate::controller::reconciler::{BackoffState, ReconcileError, Reconciler, RequeuePolicy};
use crate::controller::registry::ClusterKey;
use crate::crd::RemoteConfig;
use crate::observability;
use kube_runtime::controller::{self, Action};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Instrument};

/// Map a failed attempt to a requeue.
///
/// Transient conditions retry after the fixed delay, an unsupported primary
/// version waits for the next change, and everything else backs off per
/// resource on a Fibonacci schedule.
pub fn handle_reconciliation_error(
    obj: Arc<RemoteConfig>,
    error: &ReconcileError,
    ctx: Arc<Reconciler>,
) -> Action {
    let key = ClusterKey::of(&obj);

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.name = %key.name,
        resource.namespace = %key.namespace,
        error = %error
    );
    let _error_guard = error_span.enter();

    observability::metrics::increment_reconciliation_errors(error.reason());

    match error.requeue_policy() {
        RequeuePolicy::FixedDelay => {
            let delay = ctx.config.fixed_retry_delay();
            warn!(remote = %key, delay_secs = delay.as_secs(), "transient failure: {error}");
            observability::metrics::increment_requeues(error.reason());
            Action::requeue(delay)
        }
        RequeuePolicy::NoRequeue => {
            error!(remote = %key, "reconciliation stopped until the resource changes: {error}");
            Action::await_change()
        }
        RequeuePolicy::Backoff => {
            error!(remote = %key, "reconciliation error: {error}");
            let (delay, error_count) = next_backoff(&ctx, &key);
            let next_trigger_time = chrono::Utc::now()
                + chrono::Duration::seconds(i64::try_from(delay.as_secs()).unwrap_or(i64::MAX));
            info!(
                remote = %key,
                error_count,
                "retrying with Fibonacci backoff in {}s, next attempt at {}",
                delay.as_secs(),
                next_trigger_time.to_rfc3339()
            );
            observability::metrics::increment_requeues("error-backoff");
            Action::requeue(delay)
        }
    }
}

/// Advance the backoff for `key` and return the delay and the error count
fn next_backoff(ctx: &Reconciler, key: &ClusterKey) -> (Duration, u32) {
    match ctx.backoff_states.lock() {
        Ok(mut states) => {
            let state = states.entry(key.to_string()).or_insert_with(|| {
                BackoffState::new(ctx.config.backoff_min_minutes, ctx.config.backoff_max_minutes)
            });
            state.increment_error();
            (state.backoff.next_backoff(), state.error_count)
        }
        Err(e) => {
            warn!("Failed to lock backoff_states: {}, using default backoff", e);
            (Duration::from_secs(60), 0)
        }
    }
}

/// Watch stream failure classes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorKind {
    /// 401: credentials or RBAC revoked
    Unauthorized,
    /// 410: resource version expired
    Expired,
    /// 429: API server throttling or storage reinitializing
    Throttled,
    /// 404: watched kind or object missing
    NotFound,
    Other,
}

impl WatchErrorKind {
    #[must_use]
    pub fn classify(error_string: &str) -> Self {
        // 404 first, a plain-text 404 body shows up as a WatchFailed serde error
        let is_not_found = error_string.contains("ObjectNotFound")
            || error_string.contains("404")
            || error_string.contains("not found");
        if (error_string.contains("401") || error_string.contains("Unauthorized")) && !is_not_found {
            WatchErrorKind::Unauthorized
        } else if error_string.contains("410")
            || error_string.contains("too old resource version")
            || error_string.contains("Expired")
            || error_string.contains("Gone")
        {
            WatchErrorKind::Expired
        } else if error_string.contains("429")
            || error_string.contains("storage is (re)initializing")
            || error_string.contains("TooManyRequests")
        {
            WatchErrorKind::Throttled
        } else if is_not_found {
            WatchErrorKind::NotFound
        } else {
            WatchErrorKind::Other
        }
    }
}

/// Whether a controller stream error came from the watchers or the queue.
///
/// A failed reconcile attempt is already requeued by
/// [`handle_reconciliation_error`] and never delays the stream.
#[must_use]
pub fn is_stream_error<R, Q>(err: &controller::Error<R, Q>) -> bool
where
    R: std::error::Error + 'static,
    Q: std::error::Error + 'static,
{
    !matches!(err, controller::Error::ReconcilerFailed(..))
}

/// Handle watch stream errors with appropriate classification and backoff
///
/// Returns `None` to drop the error item from the stream or `Some(())` to
/// pass it through. Sleeps pause polling of the whole controller stream.
pub async fn handle_watch_stream_error(
    error_string: &str,
    backoff: &AtomicU64,
    max_backoff_ms: u64,
    watch_restart_delay: Duration,
) -> Option<()> {
    let error_span = tracing::span!(
        tracing::Level::WARN,
        "controller.watch.error",
        error = %error_string
    );
    classify_and_wait(error_string, backoff, max_backoff_ms, watch_restart_delay)
        .instrument(error_span)
        .await
}

async fn classify_and_wait(
    error_string: &str,
    backoff: &AtomicU64,
    max_backoff_ms: u64,
    watch_restart_delay: Duration,
) -> Option<()> {
    match WatchErrorKind::classify(error_string) {
        WatchErrorKind::Unauthorized => {
            error!("Watch authentication failed (401 Unauthorized) - RBAC may have been revoked or token expired");
            error!("   Verify the controller ServiceAccount can still list and watch remoteconfigs, primaryconfigs, pods and services");
            warn!(
                "Waiting {}s before retrying watch (RBAC may need time to propagate)...",
                watch_restart_delay.as_secs()
            );
            tokio::time::sleep(watch_restart_delay).await;
            None
        }
        WatchErrorKind::Expired => {
            warn!(error_type = "410", "watch.error.resource_version_expired");
            None
        }
        WatchErrorKind::Throttled => {
            let current_backoff = backoff.load(Ordering::Relaxed);
            warn!(
                "API server storage reinitializing (429), backing off for {}ms before restart...",
                current_backoff
            );
            tokio::time::sleep(Duration::from_millis(current_backoff)).await;
            backoff.store(
                current_backoff.saturating_mul(2).min(max_backoff_ms),
                Ordering::Relaxed,
            );
            None
        }
        WatchErrorKind::NotFound => {
            warn!(
                "Resource not found (404) - normal for deleted objects, check the CRDs are installed if it persists. Error: {}",
                error_string
            );
            Some(())
        }
        WatchErrorKind::Other => {
            error!("Controller stream error: {}", error_string);
            tokio::time::sleep(watch_restart_delay).await;
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_watch_errors() {
        assert_eq!(
            WatchErrorKind::classify("ApiError: Unauthorized (401)"),
            WatchErrorKind::Unauthorized
        );
        assert_eq!(
            WatchErrorKind::classify("WatchFailed: invalid type: integer `404`, expected Unauthorized"),
            WatchErrorKind::NotFound
        );
        assert_eq!(
            WatchErrorKind::classify("too old resource version: 123 (456)"),
            WatchErrorKind::Expired
        );
        assert_eq!(
            WatchErrorKind::classify("storage is (re)initializing"),
            WatchErrorKind::Throttled
        );
        assert_eq!(WatchErrorKind::classify("connection reset"), WatchErrorKind::Other);
    }

    #[tokio::test]
    async fn test_throttled_watch_doubles_backoff_up_to_max() {
        let backoff = AtomicU64::new(1);
        let outcome = handle_watch_stream_error("429 TooManyRequests", &backoff, 3, Duration::ZERO).await;
        assert!(outcome.is_none());
        assert_eq!(backoff.load(Ordering::Relaxed), 2);

        handle_watch_stream_error("429 TooManyRequests", &backoff, 3, Duration::ZERO).await;
        assert_eq!(backoff.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn test_not_found_keeps_stream() {
        let backoff = AtomicU64::new(1);
        assert!(
            handle_watch_stream_error("ObjectNotFound", &backoff, 10, Duration::ZERO)
                .await
                .is_some()
        );
    }

    #[test]
    fn test_failed_reconcile_is_not_a_stream_error() {
        use kube_runtime::reflector::ObjectRef;
        use kube_runtime::watcher;

        let obj_ref = ObjectRef::<RemoteConfig>::new("cluster-b")
            .within("istio-system")
            .erase();
        let failed: controller::Error<ReconcileError, watcher::Error> =
            controller::Error::ReconcilerFailed(
                ReconcileError::Failed(anyhow::anyhow!("remote cluster unreachable")),
                obj_ref.clone(),
            );
        assert!(!is_stream_error(&failed));

        let missing: controller::Error<ReconcileError, watcher::Error> =
            controller::Error::ObjectNotFound(obj_ref);
        assert!(is_stream_error(&missing));
    }
}
