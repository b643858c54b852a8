//! # PrimaryConfig Spec
//!
//! The singleton resource describing the local (primary) mesh. Its version
//! gates whether remote clusters are reconciled at all and its mesh expansion
//! flag selects how local endpoints are exported.

use crate::constants;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// PrimaryConfig Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: mesh.microscaler.io/v1beta1
/// kind: PrimaryConfig
/// metadata:
///   name: mesh
///   namespace: istio-system
/// spec:
///   version: "1.2.5"
///   meshExpansion: true
/// ```
#[derive(kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "PrimaryConfig",
    group = "mesh.microscaler.io",
    version = "v1beta1",
    namespaced,
    shortname = "pc",
    printcolumn = r#"{"name":"Version", "type":"string", "jsonPath":".spec.version"}, {"name":"MeshExpansion", "type":"boolean", "jsonPath":".spec.meshExpansion"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PrimaryConfigSpec {
    /// Mesh version the primary control plane runs
    pub version: String,
    /// Route all cross-cluster traffic through the ingress gateway
    #[serde(default)]
    pub mesh_expansion: Option<bool>,
}

impl PrimaryConfig {
    pub fn apply_defaults(&mut self) {
        if self.spec.mesh_expansion.is_none() {
            self.spec.mesh_expansion = Some(false);
        }
    }

    #[must_use]
    pub fn mesh_expansion(&self) -> bool {
        self.spec.mesh_expansion.unwrap_or(false)
    }

    /// Whether this controller can manage remotes for the declared version
    #[must_use]
    pub fn is_version_supported(&self) -> bool {
        self.spec
            .version
            .parse::<MeshVersion>()
            .is_ok_and(|v| v.is_supported())
    }
}

/// `major.minor[.patch]` mesh version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MeshVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl MeshVersion {
    #[must_use]
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Supported range is `[MIN_SUPPORTED, MAX_UNSUPPORTED)`
    #[must_use]
    pub fn is_supported(&self) -> bool {
        let (min_major, min_minor) = constants::MIN_SUPPORTED_MESH_VERSION;
        let (max_major, max_minor) = constants::FIRST_UNSUPPORTED_MESH_VERSION;
        *self >= MeshVersion::new(min_major, min_minor, 0)
            && *self < MeshVersion::new(max_major, max_minor, 0)
    }
}

impl FromStr for MeshVersion {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches('v');
        let mut parts = trimmed.splitn(3, '.');
        let mut next = |what: &str| -> anyhow::Result<Option<u32>> {
            parts
                .next()
                .map(|p| {
                    // tolerate pre-release suffixes like "1.2.0-rc1"
                    let digits: String = p.chars().take_while(char::is_ascii_digit).collect();
                    digits
                        .parse::<u32>()
                        .map_err(|e| anyhow::anyhow!("invalid {what} in version '{s}': {e}"))
                })
                .transpose()
        };

        let major = next("major")?.ok_or_else(|| anyhow::anyhow!("empty version"))?;
        let minor = next("minor")?
            .ok_or_else(|| anyhow::anyhow!("version '{s}' is missing a minor component"))?;
        let patch = next("patch")?.unwrap_or(0);
        Ok(MeshVersion::new(major, minor, patch))
    }
}

impl fmt::Display for MeshVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn primary(version: &str) -> PrimaryConfig {
        PrimaryConfig::new(
            "mesh",
            PrimaryConfigSpec {
                version: version.to_string(),
                mesh_expansion: None,
            },
        )
    }

    #[test]
    fn test_parse_versions() {
        assert_eq!("1.2".parse::<MeshVersion>().unwrap(), MeshVersion::new(1, 2, 0));
        assert_eq!("v1.1.7".parse::<MeshVersion>().unwrap(), MeshVersion::new(1, 1, 7));
        assert_eq!(
            "1.2.0-rc1".parse::<MeshVersion>().unwrap(),
            MeshVersion::new(1, 2, 0)
        );
        assert!("1".parse::<MeshVersion>().is_err());
        assert!("abc".parse::<MeshVersion>().is_err());
    }

    #[test]
    fn test_supported_range() {
        assert!(primary("1.1.0").is_version_supported());
        assert!(primary("1.2.9").is_version_supported());
        assert!(!primary("1.0.8").is_version_supported());
        assert!(!primary("1.3.0").is_version_supported());
        assert!(!primary("garbage").is_version_supported());
    }

    #[test]
    fn test_mesh_expansion_defaults_off() {
        let mut config = primary("1.2.0");
        assert!(!config.mesh_expansion());
        config.apply_defaults();
        assert_eq!(config.spec.mesh_expansion, Some(false));
    }
}
