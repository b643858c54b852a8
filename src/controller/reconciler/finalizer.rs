//! # Finalizer Lifecycle Guard
//!
//! A RemoteConfig is `Protected` while it carries the controller's
//! finalizer. Protection is added before any work starts and released only
//! after every teardown step has succeeded.
//!
//! Teardown walks guard -> cleanup -> release:
//!
//! 1. **guard**: nothing to do when unprotected; defer while an attempt is
//!    still in flight (`Reconciling` with no recorded error)
//! 2. **cleanup**: remove the remote configuration through the cached
//!    handle, then clear the kubeconfig secret's in-use label
//! 3. **release**: drop the finalizer and persist

use crate::controller::reconciler::error::ReconcileError;
use crate::controller::reconciler::labels;
use crate::controller::reconciler::types::Reconciler;
use crate::controller::registry::ClusterKey;
use crate::crd::{Phase, RemoteConfig};
use crate::observability;
use anyhow::Context;
use kube::ResourceExt;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protection {
    Unprotected,
    Protected,
}

impl Protection {
    #[must_use]
    pub fn of(config: &RemoteConfig, finalizer: &str) -> Self {
        if config.finalizers().iter().any(|f| f == finalizer) {
            Protection::Protected
        } else {
            Protection::Unprotected
        }
    }
}

/// Add the finalizer. Returns whether the object changed.
pub fn protect(config: &mut RemoteConfig, finalizer: &str) -> bool {
    if Protection::of(config, finalizer) == Protection::Protected {
        return false;
    }
    config.finalizers_mut().push(finalizer.to_string());
    true
}

/// Remove the finalizer. Returns whether the object changed.
pub fn release(config: &mut RemoteConfig, finalizer: &str) -> bool {
    let finalizers = config.finalizers_mut();
    let before = finalizers.len();
    finalizers.retain(|f| f != finalizer);
    finalizers.len() != before
}

/// What a teardown pass did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    /// The finalizer was already gone
    Unprotected,
    /// An attempt is still in flight; the finalizer stays
    Deferred,
    /// Cleanup finished and the finalizer was removed
    Released,
}

/// An in-flight attempt has `Reconciling` and no error recorded
#[must_use]
pub fn must_defer(config: &RemoteConfig) -> bool {
    config.phase() == Phase::Reconciling && config.error_message().is_empty()
}

/// Tear down the remote side of a RemoteConfig marked for deletion.
///
/// # Errors
///
/// Any cleanup failure; the finalizer is kept so the next event retries.
pub async fn teardown(
    ctx: &Reconciler,
    mut config: RemoteConfig,
) -> Result<Teardown, ReconcileError> {
    let finalizer = &ctx.config.finalizer;
    if Protection::of(&config, finalizer) == Protection::Unprotected {
        return Ok(Teardown::Unprotected);
    }
    if must_defer(&config) {
        info!(remote = %config.name_any(), "cannot remove remote mesh config while reconciling");
        observability::metrics::increment_teardowns_deferred();
        return Ok(Teardown::Deferred);
    }

    let key = ClusterKey::of(&config);
    info!(remote = %key, "removing remote mesh config");
    match ctx.registry.get(&key) {
        Some(cluster) => cluster.remove_config().await.map_err(|e| {
            ReconcileError::Failed(
                anyhow::Error::new(e).context("could not remove remote mesh config"),
            )
        })?,
        None => info!(remote = %key, "no cached remote cluster handle, skipping remote cleanup"),
    }

    match labels::label_secret(
        ctx.store.as_ref(),
        &key.namespace,
        &key.name,
        &ctx.config.secret_in_use_label,
        None,
    )
    .await
    {
        Ok(()) => {}
        // a missing kubeconfig secret has no label left to clear
        Err(err) if err.is_not_found() => {
            warn!(remote = %key, "kubeconfig secret not found while clearing in-use label");
        }
        Err(err) => {
            return Err(ReconcileError::Failed(
                anyhow::Error::new(err).context("could not clear kubeconfig secret label"),
            ))
        }
    }

    if release(&mut config, finalizer) {
        ctx.store
            .replace_remote(&config)
            .await
            .context("could not remove finalizer from remoteconfig")?;
    }

    if ctx.registry.remove(&key).is_some() {
        observability::metrics::set_remote_clusters(ctx.registry.len());
    }
    observability::metrics::forget_remote(&key.to_string());
    observability::metrics::increment_teardowns();
    info!(remote = %key, "remote mesh config removed");
    Ok(Teardown::Released)
}
