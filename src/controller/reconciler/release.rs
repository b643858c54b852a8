//! # Release
//!
//! Hands every RemoteConfig back to its users: each one is marked
//! `Unmanaged` and loses the controller's finalizer, so it can be deleted
//! after the controller has been uninstalled.

use crate::controller::reconciler::error::ReconcileError;
use crate::controller::reconciler::{finalizer, status};
use crate::controller::store::Store;
use crate::crd::Phase;
use anyhow::Context;
use kube::ResourceExt;
use tracing::info;

/// Release all RemoteConfigs. Returns how many were released.
///
/// # Errors
///
/// Stops at the first RemoteConfig that cannot be updated.
pub async fn release_all(store: &dyn Store, finalizer_name: &str) -> Result<usize, ReconcileError> {
    let remotes = store
        .list_remotes()
        .await
        .context("could not list RemoteConfig resources")?;

    let mut released = 0;
    for mut remote in remotes {
        let name = remote.name_any();
        status::update_phase(store, &mut remote, Phase::Unmanaged, "").await?;
        if finalizer::release(&mut remote, finalizer_name) {
            store
                .replace_remote(&remote)
                .await
                .with_context(|| format!("could not remove finalizer from RemoteConfig {name}"))?;
        }
        info!(remote = %name, "remoteconfig released");
        released += 1;
    }
    Ok(released)
}
