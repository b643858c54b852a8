//! # Reconciliation Orchestrator
//!
//! Entry point for one attempt on one RemoteConfig identity.
//!
//! ## Flow
//!
//! 1. Missing object: nothing to do
//! 2. Deletion requested: teardown
//! 3. Finalizer missing: add it and requeue immediately, no other work
//! 4. Fetch the PrimaryConfig singleton; an unsupported version stops here
//!    without an error or a requeue
//! 5. Link the RemoteConfig to the PrimaryConfig, apply defaults
//! 6. Body: status `Reconciling` -> discovery -> certs -> remote apply ->
//!    secret label -> status `Available`
//!
//! A failing body records `ReconcileFailed` before the error is returned.

use crate::controller::reconciler::error::{Directive, ReconcileError};
use crate::controller::reconciler::types::Reconciler;
use crate::controller::reconciler::{certs, discovery, finalizer, labels, primary, status};
use crate::controller::registry::{ClusterKey, RemoteCluster};
use crate::crd::{Phase, PrimaryConfig, RemoteConfig};
use crate::observability;
use anyhow::{anyhow, Context};
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn, Instrument};

/// Controller entry point: run one attempt and translate the outcome.
///
/// # Errors
///
/// Whatever [`reconcile_remote`] returns; the error policy decides the requeue.
pub async fn reconcile(
    obj: Arc<RemoteConfig>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcileError> {
    let key = ClusterKey::of(&obj);
    if !ctx.gate.admit(&obj) {
        debug!(remote = %key, "skipping reconciliation - already reconciled, no new trigger");
        return Ok(Action::await_change());
    }

    let correlation_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!(
        "controller.reconcile",
        trigger = %key,
        correlation_id = %correlation_id,
    );

    observability::metrics::increment_reconciliations();
    let start = Instant::now();
    let result = reconcile_remote(&ctx, &key).instrument(span).await;
    observability::metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());

    match &result {
        Ok(_) => {
            if let Ok(mut states) = ctx.backoff_states.lock() {
                if let Some(state) = states.get_mut(&key.to_string()) {
                    state.reset();
                }
            }
        }
        Err(_) => ctx.gate.forget(&obj),
    }
    result.map(Action::from)
}

/// Run one attempt for the RemoteConfig at `key`.
///
/// # Errors
///
/// See [`ReconcileError`] for the taxonomy. Transient discovery and ingress
/// conditions are not errors; they come back as a delayed requeue.
pub async fn reconcile_remote(
    ctx: &Reconciler,
    key: &ClusterKey,
) -> Result<Directive, ReconcileError> {
    let store = ctx.store.as_ref();
    let Some(mut config) = store.get_remote(&key.namespace, &key.name).await? else {
        debug!(remote = %key, "remoteconfig not found, already deleted");
        ctx.forget(key);
        return Ok(Directive::Done);
    };

    if config.metadata.deletion_timestamp.is_some() {
        let outcome = finalizer::teardown(ctx, config).await?;
        debug!(remote = %key, outcome = ?outcome, "teardown finished");
        if outcome != finalizer::Teardown::Deferred {
            ctx.forget(key);
        }
        return Ok(Directive::Done);
    }

    if finalizer::protect(&mut config, &ctx.config.finalizer) {
        store
            .replace_remote(&config)
            .await
            .context("could not add finalizer to remoteconfig")?;
        // the next pass starts from the object the finalizer update produced
        return Ok(Directive::RequeueNow);
    }

    let primary = primary::fetch_primary(store).await?;
    if !primary.is_version_supported() {
        let err = ReconcileError::UnsupportedPrimaryVersion(primary.spec.version.clone());
        error!(remote = %key, version = %primary.spec.version, error = %err, "skipping remoteconfig");
        observability::metrics::increment_reconciliation_errors(err.reason());
        return Ok(Directive::Done);
    }

    if primary::merge_owner_reference(&mut config, primary::owner_reference(&primary)?) {
        config = store.replace_remote(&config).await?;
    }

    config.apply_defaults();
    match reconcile_body(ctx, &mut config, &primary).await {
        Ok(directive) => Ok(directive),
        Err(err) => {
            // a transient condition whose status write failed gets one more write here
            let err = match err {
                ReconcileError::StatusUpdate { source, .. } => *source,
                other => other,
            };
            let message = err.status_message();
            match status::update_phase(store, &mut config, Phase::ReconcileFailed, &message).await
            {
                Ok(()) => Err(err),
                Err(status_error) => Err(ReconcileError::StatusUpdate {
                    source: Box::new(err),
                    status_error: Box::new(status_error),
                }),
            }
        }
    }
}

async fn reconcile_body(
    ctx: &Reconciler,
    config: &mut RemoteConfig,
    primary: &PrimaryConfig,
) -> Result<Directive, ReconcileError> {
    let store = ctx.store.as_ref();
    let key = ClusterKey::of(config);

    if config.phase() == Phase::Empty {
        status::update_phase(store, config, Phase::Created, "").await?;
    }

    if config.phase() == Phase::Reconciling {
        info!(cluster = %key, "cannot trigger reconcile while already reconciling");
        observability::metrics::increment_requeues("already-reconciling");
        return Ok(Directive::RequeueAfter(ctx.config.fixed_retry_delay()));
    }

    status::update_phase(store, config, Phase::Reconciling, "").await?;
    info!(cluster = %key, "begin reconciling remote mesh");

    let strategy = discovery::Strategy::for_primary(primary);
    let discovered = discovery::discover(
        strategy,
        store,
        ctx.resolver.as_ref(),
        &key.namespace,
        &ctx.config.ingress_gateway_service,
        &config.spec.enabled_services,
    )
    .await;
    match discovered {
        Ok(entries) => config.spec.enabled_services = entries,
        Err(err) => return record_transient(ctx, config, err).await,
    }
    debug!(cluster = %key, strategy = ?strategy, "service endpoints populated");

    certs::populate_sign_cert(store, config, &ctx.config.ca_secret_name).await?;

    let cluster = remote_cluster(ctx, &key).await?;
    if let Err(err) = cluster.reconcile(config, primary).await {
        let err = ReconcileError::from(err);
        if matches!(err, ReconcileError::IngressSetupPending(_)) {
            return record_transient(ctx, config, err).await;
        }
        return Err(err);
    }

    labels::label_secret(
        store,
        &key.namespace,
        &key.name,
        &ctx.config.secret_in_use_label,
        Some("true"),
    )
    .await
    .context("could not label kubeconfig secret as in use")?;

    status::update_phase(store, config, Phase::Available, "").await?;

    let advertised: usize = config
        .spec
        .enabled_services
        .iter()
        .map(|entry| entry.pod_ips.len())
        .sum();
    observability::metrics::set_discovered_endpoints(&key.to_string(), advertised);
    info!(cluster = %key, endpoints = advertised, "remote mesh reconciled");
    ctx.gate.reconciled(config);
    Ok(Directive::Done)
}

/// Record a condition that is expected to clear on its own and schedule a
/// re-check after the fixed delay.
///
/// # Errors
///
/// [`ReconcileError::StatusUpdate`] when `ReconcileFailed` could not be
/// written. The object still reads `Reconciling`, so the failure must reach
/// the caller instead of a quiet requeue.
async fn record_transient(
    ctx: &Reconciler,
    config: &mut RemoteConfig,
    err: ReconcileError,
) -> Result<Directive, ReconcileError> {
    warn!(cluster = %config.name_any(), error = %err, "transient reconciliation failure");
    observability::metrics::increment_reconciliation_errors(err.reason());

    let message = err.status_message();
    if let Err(status_error) =
        status::update_phase(ctx.store.as_ref(), config, Phase::ReconcileFailed, &message).await
    {
        warn!(cluster = %config.name_any(), error = %status_error, "could not record failure in status");
        return Err(ReconcileError::StatusUpdate {
            source: Box::new(err),
            status_error: Box::new(status_error),
        });
    }
    observability::metrics::increment_requeues(err.reason());
    Ok(Directive::RequeueAfter(ctx.config.fixed_retry_delay()))
}

/// Cached handle for `key`, or a new one built from the kubeconfig secret
/// sharing the RemoteConfig's name.
async fn remote_cluster(
    ctx: &Reconciler,
    key: &ClusterKey,
) -> Result<Arc<dyn RemoteCluster>, ReconcileError> {
    if let Some(cluster) = ctx.registry.get(key) {
        return Ok(cluster);
    }

    let secret = ctx
        .store
        .get_secret(&key.namespace, &key.name)
        .await
        .context("could not get remote cluster")?
        .ok_or_else(|| anyhow!("kubeconfig secret {key} not found"))?;
    let kubeconfig = kubeconfig_from_secret(&secret)
        .ok_or_else(|| anyhow!("could not find k8s config in secret {key}"))?;
    info!(cluster = %key, "k8s config found");

    let cluster = ctx
        .connector
        .connect(key.clone(), kubeconfig)
        .await
        .context("could not get remote cluster")?;

    if let Err(err) = ctx.registry.add(Arc::clone(&cluster)) {
        // registered in between, keep the first handle
        debug!(cluster = %key, error = %err, "remote cluster already cached");
        return Ok(ctx.registry.get(key).unwrap_or(cluster));
    }
    observability::metrics::set_remote_clusters(ctx.registry.len());
    Ok(cluster)
}

/// The kubeconfig is the first data entry of the secret
#[must_use]
pub fn kubeconfig_from_secret(secret: &Secret) -> Option<&[u8]> {
    secret
        .data
        .as_ref()?
        .values()
        .next()
        .map(|bytes| bytes.0.as_slice())
}
