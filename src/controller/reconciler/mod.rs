//! # Reconciler
//!
//! Core reconciliation logic for `RemoteConfig` resources.
//!
//! The reconciler:
//! - Guards each RemoteConfig with a finalizer until its remote side is gone
//! - Discovers the local endpoints exported to each remote cluster
//! - Propagates the primary cluster's CA material
//! - Applies the remote side through a cached cluster handle
//! - Records the lifecycle phase in the resource status
//!
//! ## Reconciliation Flow
//!
//! 1. Finalizer guard (or teardown when deletion was requested)
//! 2. PrimaryConfig singleton and owner reference
//! 3. Status `Reconciling`
//! 4. Endpoint discovery (flat or gateway)
//! 5. Sign cert propagation
//! 6. Remote cluster apply
//! 7. Kubeconfig secret label, status `Available`

pub mod certs;
pub mod discovery;
pub mod error;
pub mod finalizer;
pub mod labels;
pub mod primary;
pub mod reconcile;
pub mod release;
pub mod status;
pub mod trigger;
pub mod types;

// Re-export public API
pub use error::{Directive, ReconcileError, RequeuePolicy};
pub use reconcile::{reconcile, reconcile_remote};
pub use release::release_all;
pub use trigger::{remotes_for_event, EventObject, TriggerGate};
pub use types::{BackoffState, Reconciler};
