//! # Watch Loop
//!
//! Controller watch loop over RemoteConfig resources.
//!
//! Besides the RemoteConfigs themselves the controller watches:
//! - PrimaryConfig objects, mapped to the RemoteConfigs they own
//! - mesh workload pods, which invalidate every RemoteConfig
//! - ingress gateway Services, which invalidate every RemoteConfig
//!
//! Every mapped trigger is marked on the [`TriggerGate`] so the attempt it
//! causes is not skipped as a self-inflicted status event.
//!
//! [`TriggerGate`]: crate::controller::reconciler::TriggerGate

use crate::constants;
use crate::controller::reconciler::{reconcile, remotes_for_event, EventObject, Reconciler};
use crate::controller::server::ServerState;
use crate::crd::{PrimaryConfig, RemoteConfig};
use crate::runtime::error_policy::{
    handle_reconciliation_error, handle_watch_stream_error, is_stream_error,
};
use anyhow::Context;
use futures::StreamExt;
use k8s_openapi::api::core::v1::{Pod, Service};
use kube::api::Api;
use kube::Client;
use kube_runtime::{reflector::ObjectRef, watcher, Controller};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

fn scoped<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>
        + Clone
        + serde::de::DeserializeOwned
        + std::fmt::Debug,
    <K as kube::Resource>::DynamicType: Default,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

/// Mark the server not ready on the first SIGTERM or SIGINT.
///
/// # Errors
///
/// Fails if either signal handler cannot be installed.
pub fn spawn_shutdown_handler(server_state: Arc<ServerState>) -> anyhow::Result<JoinHandle<()>> {
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to setup SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to setup SIGINT handler")?;
    Ok(tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown..."),
            _ = sigint.recv() => info!("Received SIGINT, initiating graceful shutdown..."),
        }
        server_state.is_ready.store(false, Ordering::Relaxed);
        info!("Marked server as not ready, waiting for in-flight reconciliations to complete...");
    }))
}

/// Run the controller watch loop until a shutdown signal arrives.
///
/// The controller stream is restarted after it ends or fails, unless the
/// server was marked not ready by the shutdown handler.
///
/// # Errors
///
/// Fails only if the signal handlers cannot be installed.
pub async fn run_watch_loop(
    client: Client,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
) -> Result<(), anyhow::Error> {
    let config = Arc::clone(&reconciler.config);
    let namespace = config.watch_namespace.as_deref();
    let remotes: Api<RemoteConfig> = scoped(&client, namespace);
    let primaries: Api<PrimaryConfig> = scoped(&client, namespace);
    let pods: Api<Pod> = scoped(&client, namespace);
    let services: Api<Service> = scoped(&client, namespace);

    let pod_selector = config.mesh_label.clone();
    let gateway_selector = format!(
        "{}={}",
        config.mesh_label,
        constants::INGRESS_GATEWAY_LABEL_VALUE
    );

    let backoff_duration_ms = Arc::new(AtomicU64::new(constants::WATCH_BACKOFF_START_MS));

    // Mark not ready on SIGTERM/SIGINT so the loop below stops restarting
    spawn_shutdown_handler(Arc::clone(&server_state))?;

    loop {
        if !server_state.is_ready.load(Ordering::Relaxed) {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let watch_span = tracing::span!(
            tracing::Level::INFO,
            "controller.watch",
            operation = "watch_loop"
        );
        watch_span.in_scope(|| {
            info!(namespace = namespace.unwrap_or("<all>"), "Starting controller watch loop...");
        });

        let controller = Controller::new(remotes.clone(), watcher::Config::default().any_semantic());
        let cache = controller.store();

        let primary_cache = cache.clone();
        let primary_gate = Arc::clone(&reconciler.gate);
        let pod_cache = cache.clone();
        let pod_gate = Arc::clone(&reconciler.gate);
        let gateway_cache = cache;
        let gateway_gate = Arc::clone(&reconciler.gate);

        let backoff = Arc::clone(&backoff_duration_ms);
        let restart_delay = config.watch_restart_delay();

        controller
            .watches(
                primaries.clone(),
                watcher::Config::default(),
                move |primary: PrimaryConfig| {
                    let snapshot = primary_cache.state();
                    let event = EventObject::of(&primary);
                    let refs = remotes_for_event(snapshot.iter().map(|r| &**r), event.as_ref());
                    primary_gate.mark(&refs);
                    refs
                },
            )
            .watches(
                pods.clone(),
                watcher::Config::default().labels(&pod_selector),
                move |_pod: Pod| -> Vec<ObjectRef<RemoteConfig>> {
                    let snapshot = pod_cache.state();
                    let refs = remotes_for_event(snapshot.iter().map(|r| &**r), None);
                    pod_gate.mark(&refs);
                    refs
                },
            )
            .watches(
                services.clone(),
                watcher::Config::default().labels(&gateway_selector),
                move |_gateway: Service| -> Vec<ObjectRef<RemoteConfig>> {
                    let snapshot = gateway_cache.state();
                    let refs = remotes_for_event(snapshot.iter().map(|r| &**r), None);
                    gateway_gate.mark(&refs);
                    refs
                },
            )
            .shutdown_on_signal()
            .run(reconcile, handle_reconciliation_error, Arc::clone(&reconciler))
            .filter_map(move |x| {
                let backoff = Arc::clone(&backoff);
                async move {
                    match &x {
                        Ok(_) => {
                            backoff.store(constants::WATCH_BACKOFF_START_MS, Ordering::Relaxed);
                            debug!("watch.event.success");
                        }
                        // already turned into a requeue by the error policy
                        Err(e) if !is_stream_error(e) => {}
                        Err(e) => {
                            let error_string = format!("{e:?}");
                            return handle_watch_stream_error(
                                &error_string,
                                &backoff,
                                constants::WATCH_BACKOFF_MAX_MS,
                                restart_delay,
                            )
                            .await
                            .map(|()| x);
                        }
                    }
                    Some(x)
                }
            })
            .for_each(|_| futures::future::ready(()))
            .await;

        if !server_state.is_ready.load(Ordering::Relaxed) {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        warn!(
            "Controller watch stream ended, restarting in {} seconds...",
            restart_delay.as_secs()
        );
        tokio::time::sleep(restart_delay).await;
    }

    info!("Controller stopped gracefully");
    Ok(())
}
