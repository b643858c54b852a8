//! # CRD Generator
//!
//! Generates the CustomResourceDefinition YAML for `RemoteConfig` and
//! `PrimaryConfig` from the Rust type definitions.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/crds.yaml
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use kube::core::CustomResourceExt;
use remote_mesh_controller::crd::{PrimaryConfig, RemoteConfig};

fn main() {
    let documents = [
        serde_yaml::to_string(&RemoteConfig::crd()),
        serde_yaml::to_string(&PrimaryConfig::crd()),
    ];

    let mut rendered = Vec::with_capacity(documents.len());
    for document in documents {
        match document {
            Ok(yaml) => rendered.push(yaml),
            Err(e) => {
                eprintln!("Failed to serialize CRD to YAML: {e}");
                std::process::exit(1);
            }
        }
    }
    print!("{}", rendered.join("---\n"));
}
