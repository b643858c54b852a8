//! # Types
//!
//! Shared state handed to every reconciliation attempt.

use crate::config::ControllerConfig;
use crate::controller::backoff::FibonacciBackoff;
use crate::controller::dns::Resolver;
use crate::controller::reconciler::trigger::TriggerGate;
use crate::controller::registry::{ClusterConnector, ClusterKey, ClusterRegistry};
use crate::controller::store::Store;
use std::collections::HashMap;
use kube::runtime::reflector::ObjectRef;
use std::sync::{Arc, Mutex, PoisonError};

/// Backoff state for a specific resource
/// Tracks error count and backoff calculator for progressive retries
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
}

impl BackoffState {
    #[must_use]
    pub fn new(min_minutes: u64, max_minutes: u64) -> Self {
        Self {
            backoff: FibonacciBackoff::new(min_minutes, max_minutes),
            error_count: 0,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count += 1;
    }

    pub fn reset(&mut self) {
        self.error_count = 0;
        self.backoff.reset();
    }
}

#[derive(Clone)]
pub struct Reconciler {
    pub store: Arc<dyn Store>,
    /// Remote cluster handles, shared by every identity's attempts
    pub registry: Arc<ClusterRegistry>,
    pub connector: Arc<dyn ClusterConnector>,
    pub resolver: Arc<dyn Resolver>,
    pub config: Arc<ControllerConfig>,
    /// Filters attempts caused only by the controller's own status writes
    pub gate: Arc<TriggerGate>,
    // Backoff state per resource (identified by namespace/name)
    // Kept in the error_policy() layer, reset after a successful attempt
    pub backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<ClusterRegistry>,
        connector: Arc<dyn ClusterConnector>,
        resolver: Arc<dyn Resolver>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            store,
            registry,
            connector,
            resolver,
            config: Arc::new(config),
            gate: Arc::new(TriggerGate::new()),
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Drop per-identity bookkeeping once the RemoteConfig is gone
    pub fn forget(&self, key: &ClusterKey) {
        self.gate
            .remove(&ObjectRef::new(&key.name).within(&key.namespace));
        self.backoff_states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key.to_string());
    }
}
