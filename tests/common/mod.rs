//! Shared fixtures for reconciler integration tests
//!
//! [`MemoryStore`] stands in for the API server: it enforces
//! `resourceVersion` preconditions, bumps `generation` on spec changes and
//! collects objects whose deletion was requested once their finalizers are
//! gone. The fake cluster side records every call in a shared [`ClusterLog`].

#![allow(dead_code, reason = "each test binary uses a different subset")]

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    Container, ContainerStatus, LoadBalancerIngress, LoadBalancerStatus, Pod, PodSpec, PodStatus,
    Secret, Service, ServicePort, ServiceSpec, ServiceStatus,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use k8s_openapi::ByteString;
use kube::ResourceExt;
use remote_mesh_controller::config::ControllerConfig;
use remote_mesh_controller::constants;
use remote_mesh_controller::controller::dns::Resolver;
use remote_mesh_controller::controller::reconciler::{
    reconcile_remote, Directive, ReconcileError, Reconciler,
};
use remote_mesh_controller::controller::registry::{
    ClusterConnector, ClusterKey, ClusterRegistry, RemoteCluster, RemoteClusterError,
};
use remote_mesh_controller::controller::store::{Store, StoreError};
use remote_mesh_controller::crd::{
    EnabledServiceEndpoint, Phase, PrimaryConfig, PrimaryConfigSpec, RemoteConfig,
    RemoteConfigSpec, RemoteConfigStatus,
};
use std::collections::{BTreeMap, HashMap};
use std::io;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const NS: &str = "istio-system";
pub const REMOTE: &str = "cluster-b";

type Key = (String, String);

fn key_of(meta: &ObjectMeta) -> Key {
    (
        meta.namespace.clone().unwrap_or_default(),
        meta.name.clone().unwrap_or_default(),
    )
}

#[derive(Default)]
struct State {
    remotes: BTreeMap<Key, RemoteConfig>,
    primaries: Vec<PrimaryConfig>,
    services: BTreeMap<Key, Service>,
    pods: Vec<Pod>,
    secrets: BTreeMap<Key, Secret>,
    version: u64,
    pending_status_conflicts: usize,
    rejected_status: Option<(Phase, usize)>,
    status_writes: usize,
}

impl State {
    fn next_version(&mut self) -> Option<String> {
        self.version += 1;
        Some(self.version.to_string())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn with_remote(self, mut remote: RemoteConfig) -> Self {
        {
            let mut state = self.lock();
            remote.metadata.resource_version = state.next_version();
            state.remotes.insert(key_of(&remote.metadata), remote);
        }
        self
    }

    pub fn with_primary(self, primary: PrimaryConfig) -> Self {
        self.lock().primaries.push(primary);
        self
    }

    pub fn with_service(self, service: Service) -> Self {
        self.lock().services.insert(key_of(&service.metadata), service);
        self
    }

    pub fn with_pod(self, pod: Pod) -> Self {
        self.lock().pods.push(pod);
        self
    }

    pub fn with_secret(self, secret: Secret) -> Self {
        self.lock().secrets.insert(key_of(&secret.metadata), secret);
        self
    }

    pub fn remote(&self, name: &str) -> Option<RemoteConfig> {
        self.lock()
            .remotes
            .get(&(NS.to_string(), name.to_string()))
            .cloned()
    }

    pub fn secret(&self, name: &str) -> Option<Secret> {
        self.lock()
            .secrets
            .get(&(NS.to_string(), name.to_string()))
            .cloned()
    }

    /// Simulate `kubectl delete`: set the deletion timestamp, keep finalizers
    pub fn request_deletion(&self, name: &str) {
        let mut state = self.lock();
        let version = state.next_version();
        let remote = state
            .remotes
            .get_mut(&(NS.to_string(), name.to_string()))
            .unwrap();
        remote.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
        remote.metadata.resource_version = version;
    }

    /// The next `n` status writes fail with a version conflict
    pub fn fail_next_status_writes(&self, n: usize) {
        self.lock().pending_status_conflicts = n;
    }

    /// The next `n` status writes that set `phase` fail with a non-conflict error
    pub fn reject_status_writes(&self, phase: Phase, n: usize) {
        self.lock().rejected_status = Some((phase, n));
    }

    pub fn status_writes(&self) -> usize {
        self.lock().status_writes
    }

    fn conflict(key: &Key) -> StoreError {
        StoreError::Conflict {
            kind: "RemoteConfig",
            namespace: key.0.clone(),
            name: key.1.clone(),
        }
    }

    fn not_found(kind: &'static str, key: &Key) -> StoreError {
        StoreError::NotFound {
            kind,
            namespace: key.0.clone(),
            name: key.1.clone(),
        }
    }
}

fn matches_selector(labels: &BTreeMap<String, String>, selector: &str) -> bool {
    selector
        .split(',')
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((k, v)) => labels.get(k).map(String::as_str) == Some(v),
            None => labels.contains_key(term),
        })
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_remote(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<RemoteConfig>, StoreError> {
        Ok(self
            .lock()
            .remotes
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn list_remotes(&self) -> Result<Vec<RemoteConfig>, StoreError> {
        Ok(self.lock().remotes.values().cloned().collect())
    }

    async fn replace_remote(&self, config: &RemoteConfig) -> Result<RemoteConfig, StoreError> {
        let mut state = self.lock();
        let key = key_of(&config.metadata);
        let stored = state
            .remotes
            .get(&key)
            .cloned()
            .ok_or_else(|| Self::not_found("RemoteConfig", &key))?;
        if stored.metadata.resource_version != config.metadata.resource_version {
            return Err(Self::conflict(&key));
        }

        let mut next = config.clone();
        next.status = stored.status.clone();
        let spec_changed =
            serde_json::to_value(&stored.spec).unwrap() != serde_json::to_value(&config.spec).unwrap();
        next.metadata.generation = if spec_changed {
            Some(stored.metadata.generation.unwrap_or(0) + 1)
        } else {
            stored.metadata.generation
        };
        next.metadata.resource_version = state.next_version();

        if next.metadata.deletion_timestamp.is_some() && next.finalizers().is_empty() {
            state.remotes.remove(&key);
        } else {
            state.remotes.insert(key, next.clone());
        }
        Ok(next)
    }

    async fn replace_remote_status(
        &self,
        config: &RemoteConfig,
    ) -> Result<RemoteConfig, StoreError> {
        let mut state = self.lock();
        let key = key_of(&config.metadata);
        if state.pending_status_conflicts > 0 {
            state.pending_status_conflicts -= 1;
            return Err(Self::conflict(&key));
        }
        let phase = config.status.as_ref().and_then(|status| status.phase);
        if let Some((rejected, remaining)) = state.rejected_status.as_mut() {
            if *remaining > 0 && phase == Some(*rejected) {
                *remaining -= 1;
                return Err(StoreError::Other(format!("status write for {key:?} rejected")));
            }
        }
        let mut next = state
            .remotes
            .get(&key)
            .cloned()
            .ok_or_else(|| Self::not_found("RemoteConfig", &key))?;
        if next.metadata.resource_version != config.metadata.resource_version {
            return Err(Self::conflict(&key));
        }
        next.status = config.status.clone();
        next.metadata.resource_version = state.next_version();
        state.status_writes += 1;
        state.remotes.insert(key, next.clone());
        Ok(next)
    }

    async fn list_primaries(&self) -> Result<Vec<PrimaryConfig>, StoreError> {
        Ok(self.lock().primaries.clone())
    }

    async fn get_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Service>, StoreError> {
        Ok(self
            .lock()
            .services
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>, StoreError> {
        Ok(self
            .lock()
            .pods
            .iter()
            .filter(|pod| pod.metadata.namespace.as_deref() == Some(namespace))
            .filter(|pod| matches_selector(pod.labels(), selector))
            .cloned()
            .collect())
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, StoreError> {
        Ok(self
            .lock()
            .secrets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn replace_secret(&self, secret: &Secret) -> Result<Secret, StoreError> {
        let mut state = self.lock();
        let key = key_of(&secret.metadata);
        if !state.secrets.contains_key(&key) {
            return Err(Self::not_found("Secret", &key));
        }
        let mut next = secret.clone();
        next.metadata.resource_version = state.next_version();
        state.secrets.insert(key, next.clone());
        Ok(next)
    }
}

/// Calls made against every fake remote cluster, in order
#[derive(Debug, Default)]
pub struct ClusterLog {
    calls: Mutex<Vec<String>>,
    ingress_pending: Mutex<Option<String>>,
    reconcile_failure: Mutex<Option<String>>,
    remove_failure: Mutex<Option<String>>,
    applied: Mutex<Vec<RemoteConfig>>,
}

impl ClusterLog {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn set_ingress_pending(&self, message: Option<&str>) {
        *self.ingress_pending.lock().unwrap() = message.map(str::to_string);
    }

    /// Make every remote apply fail with `message`
    pub fn fail_reconcile(&self, message: Option<&str>) {
        *self.reconcile_failure.lock().unwrap() = message.map(str::to_string);
    }

    /// Make every remote removal fail with `message`
    pub fn fail_remove(&self, message: Option<&str>) {
        *self.remove_failure.lock().unwrap() = message.map(str::to_string);
    }

    pub fn last_applied(&self) -> Option<RemoteConfig> {
        self.applied.lock().unwrap().last().cloned()
    }
}

pub struct FakeCluster {
    key: ClusterKey,
    log: Arc<ClusterLog>,
}

impl FakeCluster {
    pub fn new(key: ClusterKey, log: Arc<ClusterLog>) -> Self {
        Self { key, log }
    }
}

#[async_trait]
impl RemoteCluster for FakeCluster {
    fn key(&self) -> &ClusterKey {
        &self.key
    }

    async fn reconcile(
        &self,
        config: &RemoteConfig,
        _primary: &PrimaryConfig,
    ) -> Result<(), RemoteClusterError> {
        self.log
            .calls
            .lock()
            .unwrap()
            .push(format!("reconcile {}", self.key));
        self.log.applied.lock().unwrap().push(config.clone());
        if let Some(message) = self.log.reconcile_failure.lock().unwrap().clone() {
            return Err(RemoteClusterError::Failed(anyhow::anyhow!(message)));
        }
        match self.log.ingress_pending.lock().unwrap().clone() {
            Some(message) => Err(RemoteClusterError::IngressSetupPending(message)),
            None => Ok(()),
        }
    }

    async fn remove_config(&self) -> Result<(), RemoteClusterError> {
        self.log
            .calls
            .lock()
            .unwrap()
            .push(format!("remove {}", self.key));
        match self.log.remove_failure.lock().unwrap().clone() {
            Some(message) => Err(RemoteClusterError::Failed(anyhow::anyhow!(message))),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct FakeConnector {
    pub log: Arc<ClusterLog>,
    connects: AtomicUsize,
}

impl FakeConnector {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClusterConnector for FakeConnector {
    async fn connect(
        &self,
        key: ClusterKey,
        kubeconfig: &[u8],
    ) -> anyhow::Result<Arc<dyn RemoteCluster>> {
        anyhow::ensure!(!kubeconfig.is_empty(), "empty kubeconfig");
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeCluster::new(key, Arc::clone(&self.log))))
    }
}

#[derive(Default)]
pub struct FakeResolver {
    hosts: HashMap<String, Vec<IpAddr>>,
}

impl FakeResolver {
    pub fn with_host(mut self, host: &str, addrs: &[&str]) -> Self {
        let addrs = addrs.iter().map(|a| a.parse().unwrap()).collect();
        self.hosts.insert(host.to_string(), addrs);
        self
    }
}

#[async_trait]
impl Resolver for FakeResolver {
    async fn lookup(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        self.hosts
            .get(host)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no such host {host}")))
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub connector: Arc<FakeConnector>,
    pub registry: Arc<ClusterRegistry>,
    pub reconciler: Arc<Reconciler>,
}

impl Harness {
    pub fn new(store: MemoryStore) -> Self {
        Self::with_resolver(store, FakeResolver::default())
    }

    pub fn with_resolver(store: MemoryStore, resolver: FakeResolver) -> Self {
        let store = Arc::new(store);
        let connector = Arc::new(FakeConnector::default());
        let registry = Arc::new(ClusterRegistry::new());
        let reconciler = Arc::new(Reconciler::new(
            Arc::clone(&store) as Arc<dyn Store>,
            Arc::clone(&registry),
            Arc::clone(&connector) as Arc<dyn ClusterConnector>,
            Arc::new(resolver),
            ControllerConfig::default(),
        ));
        Self {
            store,
            connector,
            registry,
            reconciler,
        }
    }

    pub fn log(&self) -> &ClusterLog {
        &self.connector.log
    }

    pub async fn run(&self, name: &str) -> Result<Directive, ReconcileError> {
        reconcile_remote(&self.reconciler, &ClusterKey::new(NS, name)).await
    }

    pub fn remote(&self, name: &str) -> RemoteConfig {
        self.store.remote(name).unwrap()
    }
}

pub fn primary(version: &str, mesh_expansion: bool) -> PrimaryConfig {
    let mut primary = PrimaryConfig::new(
        "mesh",
        PrimaryConfigSpec {
            version: version.to_string(),
            mesh_expansion: Some(mesh_expansion),
        },
    );
    primary.metadata.namespace = Some(NS.to_string());
    primary.metadata.uid = Some("primary-uid".to_string());
    primary
}

/// A RemoteConfig exporting `services`, without the finalizer
pub fn remote(name: &str, services: &[&str]) -> RemoteConfig {
    let mut remote = RemoteConfig::new(
        name,
        RemoteConfigSpec {
            enabled_services: services
                .iter()
                .map(|s| EnabledServiceEndpoint::named(*s))
                .collect(),
            ..RemoteConfigSpec::default()
        },
    );
    remote.metadata.namespace = Some(NS.to_string());
    remote.metadata.uid = Some(format!("{name}-uid"));
    remote.metadata.generation = Some(1);
    remote
}

/// A RemoteConfig that already carries the controller finalizer
pub fn protected_remote(name: &str, services: &[&str]) -> RemoteConfig {
    let mut remote = remote(name, services);
    remote.metadata.finalizers = Some(vec![constants::DEFAULT_FINALIZER.to_string()]);
    remote
}

pub fn with_phase(mut remote: RemoteConfig, phase: Phase, message: &str) -> RemoteConfig {
    remote.status = Some(RemoteConfigStatus {
        phase: Some(phase),
        error_message: (!message.is_empty()).then(|| message.to_string()),
    });
    remote
}

fn secret(name: &str, data: &[(&str, &[u8])]) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(NS.to_string()),
            ..ObjectMeta::default()
        },
        data: Some(
            data.iter()
                .map(|(k, v)| ((*k).to_string(), ByteString(v.to_vec())))
                .collect(),
        ),
        ..Secret::default()
    }
}

pub fn kubeconfig_secret(name: &str) -> Secret {
    secret(name, &[(name, b"apiVersion: v1\nkind: Config\n")])
}

pub fn ca_secret() -> Secret {
    secret(
        constants::DEFAULT_CA_SECRET_NAME,
        &[
            (constants::CA_CERT_KEY, b"ca-cert-pem"),
            (constants::CA_KEY_KEY, b"ca-key-pem"),
        ],
    )
}

pub fn service(name: &str, selector: &[(&str, &str)], ports: &[i32]) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(NS.to_string()),
            ..ObjectMeta::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(
                selector
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect(),
            ),
            ports: Some(
                ports
                    .iter()
                    .map(|port| ServicePort {
                        name: Some(format!("port-{port}")),
                        port: *port,
                        protocol: Some("TCP".to_string()),
                        ..ServicePort::default()
                    })
                    .collect(),
            ),
            ..ServiceSpec::default()
        }),
        ..Service::default()
    }
}

/// Ingress gateway Service; `ingress` is its load balancer status, if any
pub fn gateway(ingress: Option<LoadBalancerIngress>) -> Service {
    let mut gateway = service(
        constants::DEFAULT_INGRESS_GATEWAY_SERVICE,
        &[(constants::DEFAULT_MESH_LABEL, constants::INGRESS_GATEWAY_LABEL_VALUE)],
        &[15443],
    );
    gateway.status = Some(ServiceStatus {
        load_balancer: Some(LoadBalancerStatus {
            ingress: ingress.map(|i| vec![i]),
        }),
        ..ServiceStatus::default()
    });
    gateway
}

/// A pod with `containers` containers of which `ready` report ready
pub fn pod(name: &str, labels: &[(&str, &str)], ip: &str, containers: usize, ready: usize) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(NS.to_string()),
            labels: Some(
                labels
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect(),
            ),
            ..ObjectMeta::default()
        },
        spec: Some(PodSpec {
            containers: (0..containers)
                .map(|i| Container {
                    name: format!("c{i}"),
                    ..Container::default()
                })
                .collect(),
            ..PodSpec::default()
        }),
        status: Some(PodStatus {
            pod_ip: Some(ip.to_string()),
            container_statuses: Some(
                (0..containers)
                    .map(|i| ContainerStatus {
                        name: format!("c{i}"),
                        ready: i < ready,
                        ..ContainerStatus::default()
                    })
                    .collect(),
            ),
            ..PodStatus::default()
        }),
    }
}

/// Primary, CA secret and kubeconfig secret for [`REMOTE`]
pub fn mesh(mesh_expansion: bool) -> MemoryStore {
    MemoryStore::new()
        .with_primary(primary("1.2.5", mesh_expansion))
        .with_secret(ca_secret())
        .with_secret(kubeconfig_secret(REMOTE))
}
