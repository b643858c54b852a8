//! # Primary Mesh Configuration
//!
//! Fetches the PrimaryConfig singleton and links RemoteConfigs to it with an
//! owner reference, which the trigger mapper uses to fan PrimaryConfig
//! events out to their remotes.

use crate::controller::reconciler::error::ReconcileError;
use crate::controller::store::Store;
use crate::crd::{PrimaryConfig, RemoteConfig};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};

/// Fetch the single PrimaryConfig, with defaults applied.
///
/// # Errors
///
/// `PrimaryConfig` when zero or several exist.
pub async fn fetch_primary(store: &dyn Store) -> Result<PrimaryConfig, ReconcileError> {
    let mut primaries = store.list_primaries().await?;
    match primaries.len() {
        1 => {}
        0 => return Err(ReconcileError::PrimaryConfig("no PrimaryConfig found".to_string())),
        n => {
            return Err(ReconcileError::PrimaryConfig(format!(
                "expected exactly one PrimaryConfig, found {n}"
            )))
        }
    }
    let mut primary = primaries.remove(0);
    primary.apply_defaults();
    Ok(primary)
}

/// Owner reference pointing at `primary`
///
/// # Errors
///
/// `PrimaryConfig` when the object has no uid yet (never persisted).
pub fn owner_reference(primary: &PrimaryConfig) -> Result<OwnerReference, ReconcileError> {
    primary.owner_ref(&()).ok_or_else(|| {
        ReconcileError::PrimaryConfig(format!("PrimaryConfig {} has no uid", primary.name_any()))
    })
}

/// Add or refresh the owner reference to `owner`. Returns whether the
/// reference list changed.
pub fn merge_owner_reference(config: &mut RemoteConfig, owner: OwnerReference) -> bool {
    let refs = config.meta_mut().owner_references.get_or_insert_with(Vec::new);
    match refs.iter_mut().find(|r| r.uid == owner.uid) {
        Some(existing) if *existing == owner => false,
        Some(existing) => {
            *existing = owner;
            true
        }
        None => {
            refs.push(owner);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{PrimaryConfigSpec, RemoteConfigSpec};

    fn primary(uid: &str) -> PrimaryConfig {
        let mut primary = PrimaryConfig::new(
            "mesh",
            PrimaryConfigSpec {
                version: "1.2.5".to_string(),
                mesh_expansion: None,
            },
        );
        primary.metadata.namespace = Some("istio-system".to_string());
        primary.metadata.uid = Some(uid.to_string());
        primary
    }

    #[test]
    fn test_owner_reference_identity() {
        let owner = owner_reference(&primary("uid-1")).unwrap();
        assert_eq!(owner.kind, "PrimaryConfig");
        assert_eq!(owner.api_version, "mesh.microscaler.io/v1beta1");
        assert_eq!(owner.name, "mesh");
        assert_eq!(owner.uid, "uid-1");
    }

    #[test]
    fn test_owner_reference_requires_uid() {
        let mut unsaved = primary("uid-1");
        unsaved.metadata.uid = None;
        assert!(matches!(
            owner_reference(&unsaved),
            Err(ReconcileError::PrimaryConfig(_))
        ));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut config = RemoteConfig::new("cluster-b", RemoteConfigSpec::default());
        let owner = owner_reference(&primary("uid-1")).unwrap();

        assert!(merge_owner_reference(&mut config, owner.clone()));
        assert!(!merge_owner_reference(&mut config, owner));
        assert_eq!(config.owner_references().len(), 1);

        let other = owner_reference(&primary("uid-2")).unwrap();
        assert!(merge_owner_reference(&mut config, other));
        assert_eq!(config.owner_references().len(), 2);
    }
}
