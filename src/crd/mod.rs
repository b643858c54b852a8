//! # Custom Resource Definitions
//!
//! CRD types for the Remote Mesh Controller.
//!
//! ## Module Structure
//!
//! - `remote.rs` - `RemoteConfig`, one per secondary cluster
//! - `primary.rs` - `PrimaryConfig`, the local mesh singleton
//! - `status.rs` - `RemoteConfig` status and lifecycle phases

mod primary;
mod remote;
mod status;

pub use primary::{MeshVersion, PrimaryConfig, PrimaryConfigSpec};
pub use remote::{EnabledServiceEndpoint, EndpointPort, RemoteConfig, RemoteConfigSpec, SignCert};
pub use status::{Phase, RemoteConfigStatus};
