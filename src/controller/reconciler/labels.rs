//! # Secret Labels
//!
//! Marks a remote cluster's kubeconfig secret as in use while the
//! controller manages that cluster.

use crate::controller::store::{Store, StoreError};
use k8s_openapi::api::core::v1::Secret;
use tracing::debug;

/// Set `label=value` on the secret, or remove the label when `value` is `None`.
///
/// Returns `false` when the secret already had the desired label state and
/// nothing was written.
#[must_use]
pub fn apply_label(secret: &mut Secret, label: &str, value: Option<&str>) -> bool {
    let labels = secret.metadata.labels.get_or_insert_with(Default::default);
    match value {
        Some(value) => {
            if labels.get(label).map(String::as_str) == Some(value) {
                return false;
            }
            labels.insert(label.to_string(), value.to_string());
            true
        }
        None => labels.remove(label).is_some(),
    }
}

/// Set or clear a label on a named secret.
///
/// # Errors
///
/// `NotFound` when the secret does not exist, or any store failure.
pub async fn label_secret(
    store: &dyn Store,
    namespace: &str,
    name: &str,
    label: &str,
    value: Option<&str>,
) -> Result<(), StoreError> {
    let mut secret = store
        .get_secret(namespace, name)
        .await?
        .ok_or_else(|| StoreError::NotFound {
            kind: "Secret",
            namespace: namespace.to_string(),
            name: name.to_string(),
        })?;

    if apply_label(&mut secret, label, value) {
        store.replace_secret(&secret).await?;
        debug!(secret = %name, namespace = %namespace, label = %label, value = ?value, "secret label updated");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_clear() {
        let mut secret = Secret::default();
        assert!(apply_label(&mut secret, "istio/multiCluster", Some("true")));
        assert!(!apply_label(&mut secret, "istio/multiCluster", Some("true")));
        assert_eq!(
            secret.metadata.labels.as_ref().unwrap()["istio/multiCluster"],
            "true"
        );

        assert!(apply_label(&mut secret, "istio/multiCluster", None));
        assert!(!apply_label(&mut secret, "istio/multiCluster", None));
        assert!(secret.metadata.labels.unwrap().is_empty());
    }
}
