//! # Declarative Store
//!
//! The reconciler reads and writes cluster state only through [`Store`].
//! [`KubeStore`] is the API server backed implementation; tests supply an
//! in-memory one.
//!
//! Optimistic concurrency: every write carries the object's
//! `metadata.resourceVersion` and a mismatch surfaces as
//! [`StoreError::Conflict`].

use crate::constants;
use crate::crd::{PrimaryConfig, RemoteConfig};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Pod, Secret, Service};
use kube::api::{Api, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: &'static str,
        namespace: String,
        name: String,
    },
    #[error("{kind} {namespace}/{name} was modified concurrently")]
    Conflict {
        kind: &'static str,
        namespace: String,
        name: String,
    },
    #[error("Kubernetes API error: {0}")]
    Api(#[source] kube::Error),
    #[error("{0}")]
    Other(String),
}

impl StoreError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    /// Classify a kube error for an object identity
    #[must_use]
    pub fn from_kube(err: kube::Error, kind: &'static str, namespace: &str, name: &str) -> Self {
        match err {
            kube::Error::Api(api_err) if api_err.code == 404 => StoreError::NotFound {
                kind,
                namespace: namespace.to_string(),
                name: name.to_string(),
            },
            kube::Error::Api(api_err) if api_err.code == 409 => StoreError::Conflict {
                kind,
                namespace: namespace.to_string(),
                name: name.to_string(),
            },
            other => StoreError::Api(other),
        }
    }
}

/// Read/write access to the objects the reconciler works with.
#[async_trait]
pub trait Store: Send + Sync {
    /// Fetch a RemoteConfig, `None` when it does not exist
    async fn get_remote(&self, namespace: &str, name: &str)
        -> Result<Option<RemoteConfig>, StoreError>;

    async fn list_remotes(&self) -> Result<Vec<RemoteConfig>, StoreError>;

    /// Replace metadata and spec; returns the stored object with its new version
    async fn replace_remote(&self, config: &RemoteConfig) -> Result<RemoteConfig, StoreError>;

    /// Replace the status subresource; returns the stored object with its new version
    async fn replace_remote_status(&self, config: &RemoteConfig)
        -> Result<RemoteConfig, StoreError>;

    async fn list_primaries(&self) -> Result<Vec<PrimaryConfig>, StoreError>;

    async fn get_service(&self, namespace: &str, name: &str)
        -> Result<Option<Service>, StoreError>;

    /// List pods in a namespace matching a label selector (empty selects all)
    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>, StoreError>;

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, StoreError>;

    async fn replace_secret(&self, secret: &Secret) -> Result<Secret, StoreError>;
}

/// [`Store`] backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    /// Scope for list calls, all namespaces when `None`
    namespace: Option<String>,
}

impl std::fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl KubeStore {
    #[must_use]
    pub fn new(client: Client, namespace: Option<String>) -> Self {
        Self { client, namespace }
    }

    fn remotes_in(&self, namespace: &str) -> Api<RemoteConfig> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn scoped<K>(&self) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>
            + Clone
            + serde::de::DeserializeOwned
            + std::fmt::Debug,
        <K as kube::Resource>::DynamicType: Default,
    {
        match &self.namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }
}

#[async_trait]
impl Store for KubeStore {
    async fn get_remote(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<RemoteConfig>, StoreError> {
        self.remotes_in(namespace)
            .get_opt(name)
            .await
            .map_err(|e| StoreError::from_kube(e, "RemoteConfig", namespace, name))
    }

    async fn list_remotes(&self) -> Result<Vec<RemoteConfig>, StoreError> {
        let list = self
            .scoped::<RemoteConfig>()
            .list(&ListParams::default())
            .await
            .map_err(StoreError::Api)?;
        Ok(list.items)
    }

    async fn replace_remote(&self, config: &RemoteConfig) -> Result<RemoteConfig, StoreError> {
        let namespace = config.namespace().unwrap_or_default();
        let name = config.name_any();
        self.remotes_in(&namespace)
            .replace(&name, &PostParams::default(), config)
            .await
            .map_err(|e| StoreError::from_kube(e, "RemoteConfig", &namespace, &name))
    }

    async fn replace_remote_status(
        &self,
        config: &RemoteConfig,
    ) -> Result<RemoteConfig, StoreError> {
        let namespace = config.namespace().unwrap_or_default();
        let name = config.name_any();
        // resourceVersion in a merge patch acts as a precondition
        let patch = serde_json::json!({
            "metadata": { "resourceVersion": config.resource_version() },
            "status": config.status,
        });
        self.remotes_in(&namespace)
            .patch_status(
                &name,
                &PatchParams::apply(constants::FIELD_MANAGER),
                &Patch::Merge(patch),
            )
            .await
            .map_err(|e| StoreError::from_kube(e, "RemoteConfig", &namespace, &name))
    }

    async fn list_primaries(&self) -> Result<Vec<PrimaryConfig>, StoreError> {
        let list = self
            .scoped::<PrimaryConfig>()
            .list(&ListParams::default())
            .await
            .map_err(StoreError::Api)?;
        Ok(list.items)
    }

    async fn get_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Service>, StoreError> {
        Api::<Service>::namespaced(self.client.clone(), namespace)
            .get_opt(name)
            .await
            .map_err(|e| StoreError::from_kube(e, "Service", namespace, name))
    }

    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>, StoreError> {
        let mut params = ListParams::default();
        if !selector.is_empty() {
            params = params.labels(selector);
        }
        let list = Api::<Pod>::namespaced(self.client.clone(), namespace)
            .list(&params)
            .await
            .map_err(StoreError::Api)?;
        Ok(list.items)
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, StoreError> {
        Api::<Secret>::namespaced(self.client.clone(), namespace)
            .get_opt(name)
            .await
            .map_err(|e| StoreError::from_kube(e, "Secret", namespace, name))
    }

    async fn replace_secret(&self, secret: &Secret) -> Result<Secret, StoreError> {
        let namespace = secret.namespace().unwrap_or_default();
        let name = secret.name_any();
        Api::<Secret>::namespaced(self.client.clone(), &namespace)
            .replace(&name, &PostParams::default(), secret)
            .await
            .map_err(|e| StoreError::from_kube(e, "Secret", &namespace, &name))
    }
}
