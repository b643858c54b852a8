//! # List Command
//!
//! Command to list RemoteConfig resources.

use anyhow::{Context, Result};
use kube::{api::Api, Client};
use remote_mesh_controller::crd::RemoteConfig;

/// List RemoteConfig resources with their phase
pub async fn list_command(client: Client, namespace: Option<String>) -> Result<()> {
    let api: Api<RemoteConfig> = if let Some(ns) = &namespace {
        println!("Listing RemoteConfig resources in namespace '{ns}'...");
        Api::namespaced(client, ns)
    } else {
        println!("Listing RemoteConfig resources in all namespaces...");
        Api::all(client)
    };

    let configs = api
        .list(&kube::api::ListParams::default())
        .await
        .context("Failed to list RemoteConfig resources")?;

    if configs.items.is_empty() {
        println!("No RemoteConfig resources found.");
        return Ok(());
    }

    println!(
        "\n{:<30} {:<20} {:<18} {:<10} ERROR",
        "NAME", "NAMESPACE", "PHASE", "SERVICES"
    );
    println!("{}", "-".repeat(92));

    for config in configs.items {
        let name = config.metadata.name.as_deref().unwrap_or("<unknown>");
        let ns = config.metadata.namespace.as_deref().unwrap_or("<unknown>");
        let phase = config.phase().to_string();
        let services = config.spec.enabled_services.len();
        let error = config.error_message();
        println!("{name:<30} {ns:<20} {phase:<18} {services:<10} {error}");
    }

    Ok(())
}
