//! # Endpoint Discovery
//!
//! Computes which local addresses are advertised to a remote cluster.
//!
//! - **Flat**: every service's ready pods are addressed directly.
//! - **Gateway**: all traffic enters through the ingress gateway, so every
//!   entry gets the gateway's externally visible addresses.
//!
//! The strategy is picked once per attempt from the PrimaryConfig's
//! mesh expansion flag. Each step below is a pure function over objects
//! fetched from the [`Store`]; the async drivers only do the fetching.

use crate::controller::dns::{self, Resolver};
use crate::controller::reconciler::error::ReconcileError;
use crate::controller::store::Store;
use crate::crd::{EnabledServiceEndpoint, EndpointPort, PrimaryConfig};
use anyhow::Context;
use k8s_openapi::api::core::v1::{Pod, Service};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Flat,
    Gateway,
}

impl Strategy {
    #[must_use]
    pub fn for_primary(primary: &PrimaryConfig) -> Self {
        if primary.mesh_expansion() {
            Strategy::Gateway
        } else {
            Strategy::Flat
        }
    }
}

/// First load balancer address published on a Service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayAddress {
    Ip(String),
    Hostname(String),
}

/// Read the externally visible address of a load balancer Service.
///
/// A literal IP wins over a hostname. `None` means the load balancer has
/// not published anything yet.
#[must_use]
pub fn load_balancer_address(service: Option<&Service>) -> Option<GatewayAddress> {
    let ingress = service?
        .status
        .as_ref()?
        .load_balancer
        .as_ref()?
        .ingress
        .as_ref()?
        .first()?;

    if let Some(ip) = ingress.ip.as_deref().filter(|ip| !ip.is_empty()) {
        return Some(GatewayAddress::Ip(ip.to_string()));
    }
    ingress
        .hostname
        .as_deref()
        .filter(|host| !host.is_empty())
        .map(|host| GatewayAddress::Hostname(host.to_string()))
}

/// Render a pod selector as a label equality expression (`k1=v1,k2=v2`)
#[must_use]
pub fn render_selector(selector: &BTreeMap<String, String>) -> String {
    selector
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Fill unset ports from the local Service, if there is one
pub fn inherit_ports(entry: &mut EnabledServiceEndpoint, service: Option<&Service>) {
    if !entry.ports.is_empty() {
        return;
    }
    entry.ports = service
        .and_then(|s| s.spec.as_ref())
        .and_then(|spec| spec.ports.as_ref())
        .map(|ports| ports.iter().map(EndpointPort::from).collect())
        .unwrap_or_default();
}

/// Fill ports and label selector from the local Service for flat mode
pub fn prepare_flat_entry(entry: &mut EnabledServiceEndpoint, service: Option<&Service>) {
    inherit_ports(entry, service);
    if entry.selector_override().is_none() {
        let derived = service
            .and_then(|s| s.spec.as_ref())
            .and_then(|spec| spec.selector.as_ref())
            .map(render_selector)
            .unwrap_or_default();
        entry.label_selector = (!derived.is_empty()).then_some(derived);
    }
}

/// A pod qualifies only when it has containers and all of them are ready
#[must_use]
pub fn pod_is_ready(pod: &Pod) -> bool {
    let containers = pod.spec.as_ref().map_or(0, |spec| spec.containers.len());
    if containers == 0 {
        return false;
    }
    let ready = pod
        .status
        .as_ref()
        .and_then(|status| status.container_statuses.as_ref())
        .map_or(0, |statuses| statuses.iter().filter(|s| s.ready).count());
    ready == containers
}

/// IPs of the ready pods, in list order
#[must_use]
pub fn ready_pod_ips(pods: &[Pod]) -> Vec<String> {
    pods.iter()
        .filter(|pod| pod_is_ready(pod))
        .filter_map(|pod| pod.status.as_ref()?.pod_ip.clone())
        .filter(|ip| !ip.is_empty())
        .collect()
}

/// Gateway mode: inherit ports per entry and advertise `ips` everywhere
#[must_use]
pub fn apply_gateway(
    entries: &[EnabledServiceEndpoint],
    services: &HashMap<String, Service>,
    ips: &[String],
) -> Vec<EnabledServiceEndpoint> {
    entries
        .iter()
        .map(|entry| {
            let service = services.get(&entry.name);
            let mut entry = entry.clone();
            inherit_ports(&mut entry, service);
            entry.pod_ips = ips.to_vec();
            entry
        })
        .collect()
}

/// Run the selected strategy and return the entries with their IPs.
///
/// # Errors
///
/// `IngressSetupPending` when the gateway has no address in gateway mode,
/// `EndpointDiscovery` for any other lookup failure.
pub async fn discover(
    strategy: Strategy,
    store: &dyn Store,
    resolver: &dyn Resolver,
    namespace: &str,
    gateway_service: &str,
    entries: &[EnabledServiceEndpoint],
) -> Result<Vec<EnabledServiceEndpoint>, ReconcileError> {
    match strategy {
        Strategy::Flat => discover_flat(store, namespace, entries)
            .await
            .map_err(ReconcileError::EndpointDiscovery),
        Strategy::Gateway => {
            discover_gateway(store, resolver, namespace, gateway_service, entries).await
        }
    }
}

async fn discover_flat(
    store: &dyn Store,
    namespace: &str,
    entries: &[EnabledServiceEndpoint],
) -> anyhow::Result<Vec<EnabledServiceEndpoint>> {
    let mut discovered = Vec::with_capacity(entries.len());
    for entry in entries {
        let mut entry = entry.clone();
        let service = store
            .get_service(namespace, &entry.name)
            .await
            .with_context(|| format!("could not get service {namespace}/{}", entry.name))?;
        if service.is_none() {
            debug!(service = %entry.name, namespace = %namespace, "service not found, keeping overrides only");
        }
        prepare_flat_entry(&mut entry, service.as_ref());

        entry.pod_ips = match entry.selector_override() {
            Some(selector) => {
                let pods = store
                    .list_pods(namespace, selector)
                    .await
                    .with_context(|| format!("could not list pods for selector '{selector}'"))?;
                ready_pod_ips(&pods)
            }
            // no selector would match every pod in the namespace
            None => Vec::new(),
        };
        discovered.push(entry);
    }
    Ok(discovered)
}

async fn discover_gateway(
    store: &dyn Store,
    resolver: &dyn Resolver,
    namespace: &str,
    gateway_service: &str,
    entries: &[EnabledServiceEndpoint],
) -> Result<Vec<EnabledServiceEndpoint>, ReconcileError> {
    let gateway = store
        .get_service(namespace, gateway_service)
        .await
        .with_context(|| format!("could not get ingress gateway {namespace}/{gateway_service}"))
        .map_err(ReconcileError::EndpointDiscovery)?;

    let ips = match load_balancer_address(gateway.as_ref()) {
        Some(GatewayAddress::Ip(ip)) => vec![ip],
        Some(GatewayAddress::Hostname(host)) => {
            let addrs = resolver
                .lookup(&host)
                .await
                .with_context(|| format!("could not resolve ingress gateway hostname '{host}'"))
                .map_err(ReconcileError::EndpointDiscovery)?;
            dns::ipv4_only(&addrs)
        }
        None => {
            return Err(ReconcileError::IngressSetupPending(format!(
                "ingress gateway {namespace}/{gateway_service} has no load balancer address yet"
            )))
        }
    };

    let mut services = HashMap::new();
    for entry in entries {
        let service = store
            .get_service(namespace, &entry.name)
            .await
            .with_context(|| format!("could not get service {namespace}/{}", entry.name))
            .map_err(ReconcileError::EndpointDiscovery)?;
        if let Some(service) = service {
            services.insert(entry.name.clone(), service);
        }
    }

    Ok(apply_gateway(entries, &services, &ips))
}
