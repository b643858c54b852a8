//! # Status Updates
//!
//! Persists RemoteConfig lifecycle phases. A version conflict on write is
//! retried exactly once against a freshly fetched object; a second conflict
//! is returned to the caller.

use crate::controller::reconciler::error::ReconcileError;
use crate::controller::store::{Store, StoreError};
use crate::crd::{Phase, RemoteConfig, RemoteConfigStatus};
use crate::observability;
use kube::ResourceExt;
use tracing::{debug, info};

/// Move `config` to `phase` and persist it.
///
/// On success `config` carries the stored version token and status. The
/// in-memory spec is kept as is.
pub async fn update_phase(
    store: &dyn Store,
    config: &mut RemoteConfig,
    phase: Phase,
    message: &str,
) -> Result<(), ReconcileError> {
    let current = config.phase();
    if !current.can_transition(phase) {
        return Err(ReconcileError::InvalidTransition {
            from: current,
            to: phase,
        });
    }

    let status = RemoteConfigStatus {
        phase: Some(phase),
        error_message: (!message.is_empty()).then(|| message.to_string()),
    };
    config.status = Some(status.clone());

    let stored = match store.replace_remote_status(config).await {
        Ok(stored) => stored,
        Err(err) if err.is_conflict() => {
            debug!(
                remote = %config.name_any(),
                phase = %phase,
                "status write conflicted, retrying against fresh object"
            );
            observability::metrics::increment_status_conflicts();
            retry_on_fresh(store, config, status).await?
        }
        Err(err) => return Err(err.into()),
    };

    config.metadata = stored.metadata;
    config.status = stored.status;
    info!(remote = %config.name_any(), phase = %phase, "remoteconfig status updated");
    Ok(())
}

async fn retry_on_fresh(
    store: &dyn Store,
    config: &RemoteConfig,
    status: RemoteConfigStatus,
) -> Result<RemoteConfig, ReconcileError> {
    let namespace = config.namespace().unwrap_or_default();
    let name = config.name_any();
    let mut fresh = store
        .get_remote(&namespace, &name)
        .await?
        .ok_or(StoreError::NotFound {
            kind: "RemoteConfig",
            namespace,
            name,
        })?;

    fresh.status = Some(status);
    // a second conflict surfaces as VersionConflict via From<StoreError>
    Ok(store.replace_remote_status(&fresh).await?)
}
