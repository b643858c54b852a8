//! # Reconciliation Errors
//!
//! Closed error taxonomy for a reconciliation attempt and the scheduler
//! directive each kind maps to.

use crate::controller::registry::RemoteClusterError;
use crate::controller::store::StoreError;
use crate::crd::Phase;
use kube_runtime::controller::Action;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A write lost the optimistic concurrency race even after one retry
    #[error("version conflict: {0}")]
    VersionConflict(#[source] StoreError),
    /// The primary mesh runs a version this controller cannot manage
    #[error("intended mesh version '{0}' is unsupported by this version of the controller")]
    UnsupportedPrimaryVersion(String),
    /// The gateway has no externally reachable address yet
    #[error("ingress setup pending: {0}")]
    IngressSetupPending(String),
    #[error("could not populate service endpoints: {0:#}")]
    EndpointDiscovery(#[source] anyhow::Error),
    /// Zero or several PrimaryConfig objects exist
    #[error("primary mesh configuration: {0}")]
    PrimaryConfig(String),
    #[error("phase transition {from} -> {to} is not allowed")]
    InvalidTransition { from: Phase, to: Phase },
    #[error(transparent)]
    Store(StoreError),
    #[error("{0:#}")]
    Failed(#[from] anyhow::Error),
    /// The attempt failed and recording the failure in status failed too
    #[error("{source}; additionally could not record failure in status: {status_error}")]
    StatusUpdate {
        source: Box<ReconcileError>,
        status_error: Box<ReconcileError>,
    },
}

/// How the scheduler should treat an error kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequeuePolicy {
    /// Expected to clear on its own, retry after the fixed delay
    FixedDelay,
    /// Needs a human, do not retry until the resource changes
    NoRequeue,
    /// Opaque failure, default scheduler backoff
    Backoff,
}

impl ReconcileError {
    #[must_use]
    pub fn requeue_policy(&self) -> RequeuePolicy {
        match self {
            ReconcileError::IngressSetupPending(_) | ReconcileError::EndpointDiscovery(_) => {
                RequeuePolicy::FixedDelay
            }
            ReconcileError::UnsupportedPrimaryVersion(_) => RequeuePolicy::NoRequeue,
            _ => RequeuePolicy::Backoff,
        }
    }

    /// Metric label for the error kind
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            ReconcileError::VersionConflict(_) => "version-conflict",
            ReconcileError::UnsupportedPrimaryVersion(_) => "unsupported-version",
            ReconcileError::IngressSetupPending(_) => "ingress-setup-pending",
            ReconcileError::EndpointDiscovery(_) => "endpoint-discovery",
            ReconcileError::PrimaryConfig(_) => "primary-config",
            ReconcileError::InvalidTransition { .. } => "invalid-transition",
            ReconcileError::Store(_) => "store",
            ReconcileError::Failed(_) => "failed",
            ReconcileError::StatusUpdate { .. } => "status-update",
        }
    }

    /// Message recorded in the resource status
    #[must_use]
    pub fn status_message(&self) -> String {
        match self {
            // recorded verbatim so users see the provider's wording
            ReconcileError::IngressSetupPending(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

impl From<StoreError> for ReconcileError {
    fn from(err: StoreError) -> Self {
        if err.is_conflict() {
            ReconcileError::VersionConflict(err)
        } else {
            ReconcileError::Store(err)
        }
    }
}

impl From<RemoteClusterError> for ReconcileError {
    fn from(err: RemoteClusterError) -> Self {
        match err {
            RemoteClusterError::IngressSetupPending(msg) => ReconcileError::IngressSetupPending(msg),
            RemoteClusterError::Failed(e) => {
                ReconcileError::Failed(e.context("could not reconcile remote mesh"))
            }
        }
    }
}

/// Successful outcome of an attempt, as a signal to the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Re-run right away
    RequeueNow,
    /// Re-run after a fixed delay
    RequeueAfter(Duration),
    /// Nothing scheduled, wait for the next event
    Done,
}

impl From<Directive> for Action {
    fn from(directive: Directive) -> Self {
        match directive {
            Directive::RequeueNow => Action::requeue(Duration::ZERO),
            Directive::RequeueAfter(delay) => Action::requeue(delay),
            Directive::Done => Action::await_change(),
        }
    }
}
