//! # RemoteConfig Spec
//!
//! One `RemoteConfig` exists per secondary cluster. It declares which local
//! service endpoints are exported to that cluster and carries the trust
//! material the remote control plane needs for cross-cluster mTLS.

use crate::constants;
use k8s_openapi::api::core::v1::ServicePort;
use serde::{Deserialize, Serialize};

/// RemoteConfig Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: mesh.microscaler.io/v1beta1
/// kind: RemoteConfig
/// metadata:
///   name: cluster-b
///   namespace: istio-system
/// spec:
///   enabledServices:
///     - name: istio-pilot
///     - name: istio-policy
///       labelSelector: app=policy
/// ```
#[derive(kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "RemoteConfig",
    group = "mesh.microscaler.io",
    version = "v1beta1",
    namespaced,
    status = "crate::crd::RemoteConfigStatus",
    shortname = "rc",
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}, {"name":"Error", "type":"string", "jsonPath":".status.errorMessage"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConfigSpec {
    /// Local services whose endpoints are exported to the remote cluster
    #[serde(default)]
    pub enabled_services: Vec<EnabledServiceEndpoint>,
    /// CA material propagated from the primary cluster on every reconciliation
    #[serde(default)]
    pub sign_cert: Option<SignCert>,
    /// Outbound IP ranges intercepted by the remote sidecars
    #[serde(default)]
    pub include_ip_ranges: Option<String>,
    /// Outbound IP ranges excluded from sidecar interception
    #[serde(default)]
    pub exclude_ip_ranges: Option<String>,
    /// Namespaces on the remote cluster that get automatic sidecar injection
    #[serde(default)]
    pub auto_injection_namespaces: Vec<String>,
    /// Sidecar proxy image used on the remote cluster
    #[serde(default)]
    pub proxy_image: Option<String>,
}

/// A local service exported to a remote cluster.
///
/// `ports` and `label_selector` are optional overrides; when empty they are
/// filled from the local Service of the same name. `pod_ips` is always
/// computed by endpoint discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnabledServiceEndpoint {
    pub name: String,
    #[serde(default)]
    pub ports: Vec<EndpointPort>,
    #[serde(default)]
    pub label_selector: Option<String>,
    #[serde(default, rename = "podIPs")]
    pub pod_ips: Vec<String>,
}

impl EnabledServiceEndpoint {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Label selector override, if one was actually provided
    #[must_use]
    pub fn selector_override(&self) -> Option<&str> {
        self.label_selector.as_deref().filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EndpointPort {
    #[serde(default)]
    pub name: Option<String>,
    pub port: i32,
    #[serde(default)]
    pub protocol: Option<String>,
}

impl From<&ServicePort> for EndpointPort {
    fn from(port: &ServicePort) -> Self {
        Self {
            name: port.name.clone(),
            port: port.port,
            protocol: port.protocol.clone(),
        }
    }
}

/// CA and signing material for the remote control plane.
///
/// `root` always mirrors `ca` and `chain` is left empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignCert {
    #[serde(default, with = "base64_bytes")]
    #[schemars(with = "String")]
    pub ca: Vec<u8>,
    #[serde(default, with = "base64_bytes")]
    #[schemars(with = "String")]
    pub root: Vec<u8>,
    #[serde(default, with = "base64_bytes")]
    #[schemars(with = "String")]
    pub chain: Vec<u8>,
    #[serde(default, with = "base64_bytes")]
    #[schemars(with = "String")]
    pub key: Vec<u8>,
}

impl RemoteConfig {
    /// Fill unset optional fields with their defaults
    pub fn apply_defaults(&mut self) {
        let spec = &mut self.spec;
        if spec.include_ip_ranges.is_none() {
            spec.include_ip_ranges = Some(constants::DEFAULT_INCLUDE_IP_RANGES.to_string());
        }
        if spec.exclude_ip_ranges.is_none() {
            spec.exclude_ip_ranges = Some(String::new());
        }
        if spec.proxy_image.is_none() {
            spec.proxy_image = Some(constants::DEFAULT_PROXY_IMAGE.to_string());
        }
    }

    /// Current lifecycle phase; an absent status reads as `Empty`
    #[must_use]
    pub fn phase(&self) -> crate::crd::Phase {
        self.status
            .as_ref()
            .and_then(|s| s.phase)
            .unwrap_or_default()
    }

    /// Error message recorded by the last failed attempt, empty if none
    #[must_use]
    pub fn error_message(&self) -> &str {
        self.status
            .as_ref()
            .and_then(|s| s.error_message.as_deref())
            .unwrap_or("")
    }
}

/// Serialize byte payloads as standard base64 strings, the same encoding the
/// API server uses for `Secret.data`.
mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_defaults_keeps_explicit_values() {
        let mut config = RemoteConfig::new(
            "cluster-b",
            RemoteConfigSpec {
                include_ip_ranges: Some("10.0.0.0/8".to_string()),
                ..RemoteConfigSpec::default()
            },
        );
        config.apply_defaults();

        assert_eq!(config.spec.include_ip_ranges.as_deref(), Some("10.0.0.0/8"));
        assert_eq!(config.spec.exclude_ip_ranges.as_deref(), Some(""));
        assert_eq!(
            config.spec.proxy_image.as_deref(),
            Some(constants::DEFAULT_PROXY_IMAGE)
        );
    }

    #[test]
    fn test_sign_cert_serializes_as_base64() {
        let cert = SignCert {
            ca: b"ca".to_vec(),
            root: b"ca".to_vec(),
            chain: Vec::new(),
            key: b"key".to_vec(),
        };
        let value = serde_json::to_value(&cert).unwrap();
        assert_eq!(value["ca"], "Y2E=");
        assert_eq!(value["chain"], "");

        let decoded: SignCert = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, cert);
    }

    #[test]
    fn test_empty_selector_is_not_an_override() {
        let mut endpoint = EnabledServiceEndpoint::named("svc-a");
        assert_eq!(endpoint.selector_override(), None);
        endpoint.label_selector = Some(String::new());
        assert_eq!(endpoint.selector_override(), None);
        endpoint.label_selector = Some("app=a".to_string());
        assert_eq!(endpoint.selector_override(), Some("app=a"));
    }
}
