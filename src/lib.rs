//! # Remote Mesh Controller
//!
//! A Kubernetes controller that keeps secondary ("remote") service-mesh
//! clusters in sync with the primary mesh control plane.
//!
//! ## Overview
//!
//! For every `RemoteConfig` the controller:
//!
//! 1. **Discovers local endpoints** - pod IPs of the exported services, or
//!    the ingress gateway address when the primary runs in mesh expansion
//!    mode
//! 2. **Propagates trust** - hands the primary CA to the remote cluster so
//!    its control plane issues certificates in the same trust domain
//! 3. **Applies the remote side** - pushes the configuration to the remote
//!    cluster through the kubeconfig stored in a Secret of the same name
//! 4. **Tracks the lifecycle** - records the phase in the status and tears
//!    the remote side down behind a finalizer on deletion
//!
//! ## Binaries
//!
//! - `remote-mesh-controller`: the controller itself
//! - `crdgen`: prints the CRD manifests
//! - `rmctl`: inspects `RemoteConfig`s and releases finalizers

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod runtime;
