//! # Release Command
//!
//! Hands RemoteConfigs back to the user before the controller is removed.

use anyhow::{Context, Result};
use kube::Client;
use remote_mesh_controller::constants;
use remote_mesh_controller::controller::reconciler::release_all;
use remote_mesh_controller::controller::store::KubeStore;

/// Mark every RemoteConfig `Unmanaged` and drop the controller finalizer
pub async fn release_command(
    client: Client,
    namespace: Option<String>,
    finalizer: Option<String>,
) -> Result<()> {
    let finalizer = finalizer.unwrap_or_else(|| constants::DEFAULT_FINALIZER.to_string());
    let store = KubeStore::new(client, namespace);

    let released = release_all(&store, &finalizer)
        .await
        .context("Failed to release RemoteConfig resources")?;

    println!("Released {released} RemoteConfig resource(s) from finalizer '{finalizer}'");
    Ok(())
}
