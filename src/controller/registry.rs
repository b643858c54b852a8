//! # Remote Cluster Registry
//!
//! Process-wide cache of remote cluster handles, keyed by RemoteConfig
//! identity. Handles are created lazily on the first reconciliation of an
//! identity and dropped during teardown.
//!
//! Distinct identities reconcile in parallel, so every operation takes the
//! registry lock. Attempts for the same identity are serialized by the
//! controller runtime.

use crate::crd::{PrimaryConfig, RemoteConfig};
use async_trait::async_trait;
use kube::ResourceExt;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

/// Identity of a remote cluster: the namespace/name of its RemoteConfig
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClusterKey {
    pub namespace: String,
    pub name: String,
}

impl ClusterKey {
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    #[must_use]
    pub fn of(config: &RemoteConfig) -> Self {
        Self::new(config.namespace().unwrap_or_default(), config.name_any())
    }
}

impl fmt::Display for ClusterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[derive(Debug, Error)]
pub enum RemoteClusterError {
    /// The gateway has no externally reachable address yet
    #[error("ingress setup pending: {0}")]
    IngressSetupPending(String),
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

/// Handle to a remote cluster's API
#[async_trait]
pub trait RemoteCluster: Send + Sync {
    fn key(&self) -> &ClusterKey;

    /// Apply the remote side of `config`
    async fn reconcile(
        &self,
        config: &RemoteConfig,
        primary: &PrimaryConfig,
    ) -> Result<(), RemoteClusterError>;

    /// Remove everything `reconcile` applied
    async fn remove_config(&self) -> Result<(), RemoteClusterError>;
}

/// Creates handles from a remote cluster's kubeconfig
#[async_trait]
pub trait ClusterConnector: Send + Sync {
    async fn connect(
        &self,
        key: ClusterKey,
        kubeconfig: &[u8],
    ) -> anyhow::Result<Arc<dyn RemoteCluster>>;
}

#[derive(Debug, Error)]
#[error("remote cluster {0} is already registered")]
pub struct AlreadyRegistered(pub ClusterKey);

#[derive(Default)]
pub struct ClusterRegistry {
    clusters: RwLock<HashMap<ClusterKey, Arc<dyn RemoteCluster>>>,
}

impl fmt::Debug for ClusterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let clusters = self.clusters.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("ClusterRegistry")
            .field("clusters", &clusters.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ClusterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: &ClusterKey) -> Option<Arc<dyn RemoteCluster>> {
        self.clusters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Register a handle; a second handle for the same identity is rejected
    pub fn add(&self, cluster: Arc<dyn RemoteCluster>) -> Result<(), AlreadyRegistered> {
        let mut clusters = self.clusters.write().unwrap_or_else(PoisonError::into_inner);
        let key = cluster.key().clone();
        if clusters.contains_key(&key) {
            return Err(AlreadyRegistered(key));
        }
        clusters.insert(key, cluster);
        Ok(())
    }

    /// Drop a handle, returning it if one was cached
    pub fn remove(&self, key: &ClusterKey) -> Option<Arc<dyn RemoteCluster>> {
        self.clusters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.clusters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
