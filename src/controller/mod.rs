//! # Controller
//!
//! Core controller modules for the Remote Mesh Controller.
//!
//! - `backoff`: Fibonacci backoff mechanism for retries
//! - `dns`: Hostname resolution for load balancer addresses
//! - `reconciler`: Core reconciliation logic
//! - `registry`: Cache of remote cluster handles
//! - `remote_cluster`: Remote-side apply and removal over a kubeconfig
//! - `server`: HTTP server for metrics and health checks
//! - `store`: Read/write access to the local cluster's objects

pub mod backoff;
pub mod dns;
pub mod reconciler;
pub mod registry;
pub mod remote_cluster;
pub mod server;
pub mod store;
