//! # Initialization
//!
//! Controller initialization: rustls setup, tracing, metrics, server
//! startup, and Kubernetes client setup.

use crate::config::ControllerConfig;
use crate::controller::dns::SystemResolver;
use crate::controller::reconciler::Reconciler;
use crate::controller::registry::ClusterRegistry;
use crate::controller::remote_cluster::KubeClusterConnector;
use crate::controller::server::{start_server, ServerState};
use crate::controller::store::KubeStore;
use crate::observability;
use anyhow::{Context, Result};
use kube::Client;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Everything the watch loop needs
pub struct InitializationResult {
    pub client: Client,
    pub reconciler: Arc<Reconciler>,
    /// Readiness flag shared with the probe server
    pub server_state: Arc<ServerState>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("server_ready", &self.server_state.is_ready.load(Ordering::Relaxed))
            .field("reconciler", &self.reconciler)
            .finish_non_exhaustive()
    }
}

/// Install the tracing subscriber.
///
/// `RUST_LOG` wins over the default `remote_mesh_controller=info` filter.
/// `log_format` selects JSON lines (`json`) or human readable text.
pub fn init_tracing(log_format: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "remote_mesh_controller=info".into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if log_format == "json" {
        builder.json().with_current_span(true).try_init()
    } else {
        builder.try_init()
    };
    if let Err(e) = result {
        // already installed, e.g. by a test harness
        eprintln!("tracing subscriber already initialized: {e}");
    }
}

/// Initialize the controller runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - HTTP server startup
/// - Kubernetes client creation
/// - Reconciler setup
pub async fn initialize() -> Result<InitializationResult> {
    // Must run before any client opens a TLS connection
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        debug!("rustls crypto provider already installed");
    }

    let config = ControllerConfig::from_env();
    init_tracing(&config.log_format);

    info!("Starting Remote Mesh Controller");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    let server_state_clone = Arc::clone(&server_state);
    let server_port = config.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let store = KubeStore::new(client.clone(), config.watch_namespace.clone());
    let reconciler = Arc::new(Reconciler::new(
        Arc::new(store),
        Arc::new(ClusterRegistry::new()),
        Arc::new(KubeClusterConnector),
        Arc::new(SystemResolver),
        config,
    ));
    info!(config = ?reconciler.config, "Controller initialized, starting watch loop...");

    server_state.is_ready.store(true, Ordering::Relaxed);

    Ok(InitializationResult {
        client,
        reconciler,
        server_state,
    })
}
