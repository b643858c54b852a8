//! # Remote Cluster
//!
//! [`RemoteCluster`] implementation over a client built from the kubeconfig
//! stored next to each RemoteConfig.
//!
//! The remote side is a set of plain objects in the remote mesh namespace,
//! applied with server-side apply and labelled as managed by this
//! controller:
//!
//! - the `cacerts` secret carrying the propagated CA material
//! - one selector-less Service plus Endpoints per exported service, so
//!   remote workloads resolve local services to the discovered addresses
//! - a values ConfigMap with the rendered remote mesh settings
//!
//! In gateway mode the remote ingress gateway must have a load balancer
//! address before the apply counts as done.

use crate::constants;
use crate::controller::reconciler::discovery;
use crate::controller::registry::{
    ClusterConnector, ClusterKey, RemoteCluster, RemoteClusterError,
};
use crate::crd::{EnabledServiceEndpoint, PrimaryConfig, RemoteConfig, SignCert};
use anyhow::Context;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    ConfigMap, EndpointAddress, EndpointPort as CoreEndpointPort, EndpointSubset, Endpoints,
    Namespace, Secret, Service, ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{debug, info};

/// Key of the rendered values inside the values ConfigMap
pub const VALUES_KEY: &str = "values.json";

/// Builds [`KubeRemoteCluster`] handles from kubeconfig bytes
#[derive(Debug, Clone, Copy, Default)]
pub struct KubeClusterConnector;

#[async_trait]
impl ClusterConnector for KubeClusterConnector {
    async fn connect(
        &self,
        key: ClusterKey,
        kubeconfig: &[u8],
    ) -> anyhow::Result<Arc<dyn RemoteCluster>> {
        let text = std::str::from_utf8(kubeconfig).context("kubeconfig is not valid UTF-8")?;
        let kubeconfig = Kubeconfig::from_yaml(text).context("could not parse kubeconfig")?;
        let config = kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .context("could not load kubeconfig")?;
        let client = Client::try_from(config).context("could not create remote cluster client")?;
        info!(cluster = %key, "remote cluster client created");
        Ok(Arc::new(KubeRemoteCluster::new(key, client)))
    }
}

pub struct KubeRemoteCluster {
    key: ClusterKey,
    client: Client,
    namespace: String,
}

impl Debug for KubeRemoteCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeRemoteCluster")
            .field("key", &self.key)
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl KubeRemoteCluster {
    #[must_use]
    pub fn new(key: ClusterKey, client: Client) -> Self {
        Self {
            key,
            client,
            namespace: constants::REMOTE_MESH_NAMESPACE.to_string(),
        }
    }

    fn api<K>(&self) -> Api<K>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Debug,
    {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    async fn apply<K>(&self, api: &Api<K>, obj: &K) -> anyhow::Result<()>
    where
        K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Serialize + Debug,
    {
        let name = obj.name_any();
        api.patch(
            &name,
            &PatchParams::apply(constants::FIELD_MANAGER).force(),
            &Patch::Apply(obj),
        )
        .await
        .with_context(|| format!("could not apply {} {name} on {}", K::kind(&()), self.key))?;
        Ok(())
    }

    /// Delete every managed object of kind `K` not named in `keep`
    async fn prune<K>(&self, api: &Api<K>, keep: &BTreeSet<String>) -> anyhow::Result<()>
    where
        K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
    {
        let params = ListParams::default().labels(&managed_selector());
        let existing = api
            .list(&params)
            .await
            .with_context(|| format!("could not list {} on {}", K::kind(&()), self.key))?;
        for obj in existing.items {
            let name = obj.name_any();
            if keep.contains(&name) {
                continue;
            }
            match api.delete(&name, &DeleteParams::default()).await {
                Ok(_) => debug!(cluster = %self.key, kind = %K::kind(&()), name = %name, "removed"),
                Err(kube::Error::Api(api_err)) if api_err.code == 404 => {}
                Err(e) => {
                    return Err(anyhow::Error::new(e)
                        .context(format!("could not delete {} {name} on {}", K::kind(&()), self.key)))
                }
            }
        }
        Ok(())
    }

    async fn check_ingress_gateway(&self) -> Result<(), RemoteClusterError> {
        let gateway = self
            .api::<Service>()
            .get_opt(constants::DEFAULT_INGRESS_GATEWAY_SERVICE)
            .await
            .with_context(|| format!("could not get ingress gateway on {}", self.key))?;
        if discovery::load_balancer_address(gateway.as_ref()).is_none() {
            return Err(RemoteClusterError::IngressSetupPending(format!(
                "ingress gateway {}/{} on remote cluster {} has no load balancer address yet",
                self.namespace,
                constants::DEFAULT_INGRESS_GATEWAY_SERVICE,
                self.key
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteCluster for KubeRemoteCluster {
    fn key(&self) -> &ClusterKey {
        &self.key
    }

    async fn reconcile(
        &self,
        config: &RemoteConfig,
        primary: &PrimaryConfig,
    ) -> Result<(), RemoteClusterError> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        self.apply(&namespaces, &desired_namespace(&self.namespace))
            .await?;

        if let Some(sign_cert) = &config.spec.sign_cert {
            self.apply(&self.api::<Secret>(), &desired_ca_secret(&self.namespace, sign_cert))
                .await?;
        }

        let services = self.api::<Service>();
        let endpoints = self.api::<Endpoints>();
        let mut keep = BTreeSet::new();
        for entry in &config.spec.enabled_services {
            self.apply(&services, &desired_service(&self.namespace, entry))
                .await?;
            self.apply(&endpoints, &desired_endpoints(&self.namespace, entry))
                .await?;
            keep.insert(entry.name.clone());
        }
        self.prune(&services, &keep).await?;
        self.prune(&endpoints, &keep).await?;

        let values = desired_values(&self.namespace, config, primary)?;
        self.apply(&self.api::<ConfigMap>(), &values).await?;

        if primary.mesh_expansion() {
            self.check_ingress_gateway().await?;
        }

        info!(
            cluster = %self.key,
            services = config.spec.enabled_services.len(),
            "remote mesh config applied"
        );
        Ok(())
    }

    async fn remove_config(&self) -> Result<(), RemoteClusterError> {
        let none = BTreeSet::new();
        self.prune(&self.api::<Service>(), &none).await?;
        self.prune(&self.api::<Endpoints>(), &none).await?;
        self.prune(&self.api::<ConfigMap>(), &none).await?;
        self.prune(&self.api::<Secret>(), &none).await?;
        info!(cluster = %self.key, "remote mesh config removed");
        Ok(())
    }
}

fn managed_labels() -> BTreeMap<String, String> {
    BTreeMap::from([(
        constants::MANAGED_BY_LABEL.to_string(),
        constants::FIELD_MANAGER.to_string(),
    )])
}

fn managed_selector() -> String {
    format!("{}={}", constants::MANAGED_BY_LABEL, constants::FIELD_MANAGER)
}

fn managed_meta(namespace: Option<&str>, name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: namespace.map(str::to_string),
        labels: Some(managed_labels()),
        ..ObjectMeta::default()
    }
}

#[must_use]
pub fn desired_namespace(name: &str) -> Namespace {
    Namespace {
        metadata: managed_meta(None, name),
        ..Namespace::default()
    }
}

/// Plug-in CA secret in the layout the mesh's CA reads
#[must_use]
pub fn desired_ca_secret(namespace: &str, sign_cert: &SignCert) -> Secret {
    let data = BTreeMap::from([
        ("ca-cert.pem".to_string(), ByteString(sign_cert.ca.clone())),
        ("ca-key.pem".to_string(), ByteString(sign_cert.key.clone())),
        ("root-cert.pem".to_string(), ByteString(sign_cert.root.clone())),
        ("cert-chain.pem".to_string(), ByteString(sign_cert.chain.clone())),
    ]);
    Secret {
        metadata: managed_meta(Some(namespace), constants::REMOTE_CA_SECRET_NAME),
        data: Some(data),
        ..Secret::default()
    }
}

/// Selector-less Service; its addresses come from the matching Endpoints
#[must_use]
pub fn desired_service(namespace: &str, entry: &EnabledServiceEndpoint) -> Service {
    let ports = entry
        .ports
        .iter()
        .map(|port| ServicePort {
            name: port.name.clone(),
            port: port.port,
            protocol: port.protocol.clone(),
            ..ServicePort::default()
        })
        .collect();
    Service {
        metadata: managed_meta(Some(namespace), &entry.name),
        spec: Some(ServiceSpec {
            ports: Some(ports),
            ..ServiceSpec::default()
        }),
        ..Service::default()
    }
}

#[must_use]
pub fn desired_endpoints(namespace: &str, entry: &EnabledServiceEndpoint) -> Endpoints {
    let subsets = if entry.pod_ips.is_empty() {
        Vec::new()
    } else {
        vec![EndpointSubset {
            addresses: Some(
                entry
                    .pod_ips
                    .iter()
                    .map(|ip| EndpointAddress {
                        ip: ip.clone(),
                        ..EndpointAddress::default()
                    })
                    .collect(),
            ),
            ports: Some(
                entry
                    .ports
                    .iter()
                    .map(|port| CoreEndpointPort {
                        name: port.name.clone(),
                        port: port.port,
                        protocol: port.protocol.clone(),
                        ..CoreEndpointPort::default()
                    })
                    .collect(),
            ),
            ..EndpointSubset::default()
        }]
    };
    Endpoints {
        metadata: managed_meta(Some(namespace), &entry.name),
        subsets: Some(subsets),
    }
}

/// Remote mesh settings rendered as JSON into a ConfigMap
///
/// # Errors
///
/// Fails only if the values cannot be serialized.
pub fn desired_values(
    namespace: &str,
    config: &RemoteConfig,
    primary: &PrimaryConfig,
) -> anyhow::Result<ConfigMap> {
    let values = serde_json::json!({
        "version": primary.spec.version,
        "meshExpansion": primary.mesh_expansion(),
        "includeIPRanges": config.spec.include_ip_ranges,
        "excludeIPRanges": config.spec.exclude_ip_ranges,
        "autoInjectionNamespaces": config.spec.auto_injection_namespaces,
        "proxyImage": config.spec.proxy_image,
        "enabledServices": config.spec.enabled_services,
    });
    let rendered = serde_json::to_string_pretty(&values).context("could not render values")?;
    Ok(ConfigMap {
        metadata: managed_meta(Some(namespace), constants::REMOTE_VALUES_CONFIGMAP),
        data: Some(BTreeMap::from([(VALUES_KEY.to_string(), rendered)])),
        ..ConfigMap::default()
    })
}
