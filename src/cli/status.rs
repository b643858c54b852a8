//! # Status Command
//!
//! Command to show detailed status of a RemoteConfig resource.

use anyhow::{Context, Result};
use kube::{api::Api, Client};
use remote_mesh_controller::constants;
use remote_mesh_controller::crd::RemoteConfig;

/// Show detailed status of a RemoteConfig resource
pub async fn status_command(client: Client, name: String, namespace: Option<String>) -> Result<()> {
    let ns = namespace
        .as_deref()
        .unwrap_or(constants::REMOTE_MESH_NAMESPACE);

    println!("Status for RemoteConfig '{ns}/{name}'");
    println!();

    let api: Api<RemoteConfig> = Api::namespaced(client, ns);
    let config = api
        .get(&name)
        .await
        .with_context(|| format!("Failed to get RemoteConfig '{ns}/{name}'"))?;

    println!("Resource Information:");
    if let Some(uid) = &config.metadata.uid {
        println!("  UID: {uid}");
    }
    if let Some(generation) = config.metadata.generation {
        println!("  Generation: {generation}");
    }
    if config.metadata.deletion_timestamp.is_some() {
        println!("  Deletion requested: yes");
    }
    let finalizers = config.metadata.finalizers.clone().unwrap_or_default();
    if !finalizers.is_empty() {
        println!("  Finalizers: {}", finalizers.join(", "));
    }

    println!();
    println!("Status:");
    println!("  Phase: {}", config.phase());
    let error = config.error_message();
    if !error.is_empty() {
        println!("  Error: {error}");
    }

    println!();
    println!("Enabled services:");
    if config.spec.enabled_services.is_empty() {
        println!("  (none)");
    }
    for entry in &config.spec.enabled_services {
        let ports: Vec<String> = entry.ports.iter().map(|p| p.port.to_string()).collect();
        println!("  - {}", entry.name);
        println!("      Ports: {}", if ports.is_empty() { "-".to_string() } else { ports.join(", ") });
        if let Some(selector) = entry.selector_override() {
            println!("      Label selector: {selector}");
        }
        println!(
            "      Pod IPs: {}",
            if entry.pod_ips.is_empty() { "-".to_string() } else { entry.pod_ips.join(", ") }
        );
    }

    Ok(())
}
