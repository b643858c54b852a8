//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use crate::constants;
use std::time::Duration;

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Finalizer protecting RemoteConfig resources
    pub finalizer: String,
    /// Label set on a remote cluster's kubeconfig secret while it is in use
    pub secret_in_use_label: String,
    /// Secret (in the RemoteConfig namespace) holding the CA material
    pub ca_secret_name: String,
    /// Ingress gateway Service (in the RemoteConfig namespace) used in mesh expansion mode
    pub ingress_gateway_service: String,
    /// Label key identifying mesh workload pods and gateway services
    pub mesh_label: String,
    /// Delay for transient conditions that are expected to clear on their own (seconds)
    pub fixed_retry_delay_secs: u64,
    /// Fibonacci backoff floor for failed reconciliations (minutes)
    pub backoff_min_minutes: u64,
    /// Fibonacci backoff ceiling for failed reconciliations (minutes)
    pub backoff_max_minutes: u64,
    /// Watch stream restart delay (seconds)
    pub watch_restart_delay_secs: u64,
    /// Restrict watches to one namespace, all namespaces when unset
    pub watch_namespace: Option<String>,
    /// HTTP port for metrics and probes
    pub metrics_port: u16,
    /// Log format (json, text)
    pub log_format: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let string = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let number = |key: &str, default: u64| {
            lookup(key)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        };

        Self {
            finalizer: string("FINALIZER_NAME", constants::DEFAULT_FINALIZER),
            secret_in_use_label: string(
                "SECRET_IN_USE_LABEL",
                constants::DEFAULT_SECRET_IN_USE_LABEL,
            ),
            ca_secret_name: string("CA_SECRET_NAME", constants::DEFAULT_CA_SECRET_NAME),
            ingress_gateway_service: string(
                "INGRESS_GATEWAY_SERVICE",
                constants::DEFAULT_INGRESS_GATEWAY_SERVICE,
            ),
            mesh_label: string("MESH_LABEL", constants::DEFAULT_MESH_LABEL),
            fixed_retry_delay_secs: number(
                "FIXED_RETRY_DELAY_SECS",
                constants::FIXED_RETRY_DELAY_SECS,
            ),
            backoff_min_minutes: number(
                "BACKOFF_MIN_MINUTES",
                constants::DEFAULT_BACKOFF_MIN_MINUTES,
            ),
            backoff_max_minutes: number(
                "BACKOFF_MAX_MINUTES",
                constants::DEFAULT_BACKOFF_MAX_MINUTES,
            ),
            watch_restart_delay_secs: number(
                "WATCH_RESTART_DELAY_SECS",
                constants::DEFAULT_WATCH_RESTART_DELAY_SECS,
            ),
            watch_namespace: lookup("WATCH_NAMESPACE").filter(|ns| !ns.trim().is_empty()),
            metrics_port: lookup("METRICS_PORT")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(constants::DEFAULT_METRICS_PORT),
            log_format: string("LOG_FORMAT", "json").to_lowercase(),
        }
    }

    /// Delay used for transient endpoint and ingress conditions
    #[must_use]
    pub fn fixed_retry_delay(&self) -> Duration {
        Duration::from_secs(self.fixed_retry_delay_secs)
    }

    #[must_use]
    pub fn watch_restart_delay(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.finalizer, constants::DEFAULT_FINALIZER);
        assert_eq!(config.ca_secret_name, "istio-ca-secret");
        assert_eq!(config.fixed_retry_delay(), Duration::from_secs(30));
        assert_eq!(config.watch_namespace, None);
        assert_eq!(config.log_format, "json");
    }

    #[test]
    fn test_overrides_and_invalid_numbers() {
        let env: HashMap<&str, &str> = [
            ("CA_SECRET_NAME", "custom-ca"),
            ("FIXED_RETRY_DELAY_SECS", "5"),
            ("METRICS_PORT", "not-a-port"),
            ("WATCH_NAMESPACE", "  "),
            ("LOG_FORMAT", "TEXT"),
        ]
        .into_iter()
        .collect();
        let config = ControllerConfig::from_lookup(|k| env.get(k).map(|v| (*v).to_string()));

        assert_eq!(config.ca_secret_name, "custom-ca");
        assert_eq!(config.fixed_retry_delay_secs, 5);
        assert_eq!(config.metrics_port, constants::DEFAULT_METRICS_PORT);
        assert_eq!(config.watch_namespace, None);
        assert_eq!(config.log_format, "text");
    }
}
