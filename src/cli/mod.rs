//! # RMCTL CLI
//!
//! Command-line interface for the Remote Mesh Controller.
//!
//! ## Usage
//!
//! ```bash
//! # List RemoteConfig resources and their phase
//! rmctl list
//!
//! # Show status of a RemoteConfig
//! rmctl status cluster-b --namespace istio-system
//!
//! # Drop the controller's finalizers before uninstalling it
//! rmctl release-finalizers
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kube::Client;

mod list;
mod release;
mod status;

/// Remote Mesh Controller CLI
#[derive(Parser)]
#[command(name = "rmctl")]
#[command(
    about = "Remote Mesh Controller CLI",
    long_about = None,
    after_help = "\
Examples:
  rmctl list
  rmctl status cluster-b --namespace istio-system
  rmctl release-finalizers --namespace istio-system
"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Kubernetes namespace (defaults to all namespaces for list commands)
    #[arg(short, long, global = true)]
    namespace: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List RemoteConfig resources
    List,
    /// Show status of a RemoteConfig resource
    Status {
        /// Name of the RemoteConfig resource
        #[arg(value_name = "NAME")]
        name: String,
    },
    /// Mark every RemoteConfig unmanaged and remove the controller finalizer
    ///
    /// Run before uninstalling the controller so RemoteConfigs can be deleted
    /// without it.
    #[command(name = "release-finalizers")]
    ReleaseFinalizers {
        /// Finalizer to remove (defaults to the controller's)
        #[arg(long)]
        finalizer: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider already installed");
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rmctl=info,remote_mesh_controller=warn".into()),
        )
        .init();

    let cli = Cli::parse();

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client. Ensure kubeconfig is configured.")?;

    match cli.command {
        Commands::List => list::list_command(client, cli.namespace).await,
        Commands::Status { name } => status::status_command(client, name, cli.namespace).await,
        Commands::ReleaseFinalizers { finalizer } => {
            release::release_command(client, cli.namespace, finalizer).await
        }
    }
}
