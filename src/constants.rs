//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! environment variables where `ControllerConfig` exposes them.

/// Field manager used for server-side apply and status patches
pub const FIELD_MANAGER: &str = "remote-mesh-controller";

/// Finalizer protecting a RemoteConfig until its remote side is torn down
pub const DEFAULT_FINALIZER: &str = "remote-mesh.finalizer.microscaler.io";

/// Label marking a kubeconfig secret as in use by a remote cluster
pub const DEFAULT_SECRET_IN_USE_LABEL: &str = "istio/multiCluster";

/// Secret holding the primary cluster's CA material
pub const DEFAULT_CA_SECRET_NAME: &str = "istio-ca-secret";

/// Key of the CA certificate inside the CA secret
pub const CA_CERT_KEY: &str = "ca-cert.pem";

/// Key of the CA private key inside the CA secret
pub const CA_KEY_KEY: &str = "ca-key.pem";

/// Ingress gateway Service used in mesh expansion mode
pub const DEFAULT_INGRESS_GATEWAY_SERVICE: &str = "istio-ingressgateway";

/// Label carried by mesh workload pods and gateway services
pub const DEFAULT_MESH_LABEL: &str = "istio";

/// Label value identifying the ingress gateway Service
pub const INGRESS_GATEWAY_LABEL_VALUE: &str = "ingressgateway";

/// Fixed delay for transient conditions (rollouts, load balancer provisioning)
pub const FIXED_RETRY_DELAY_SECS: u64 = 30;

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Fibonacci backoff floor for failed reconciliations (minutes)
pub const DEFAULT_BACKOFF_MIN_MINUTES: u64 = 1;

/// Fibonacci backoff ceiling for failed reconciliations (minutes)
pub const DEFAULT_BACKOFF_MAX_MINUTES: u64 = 10;

/// Delay before restarting the watch stream after it ends (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Initial backoff when the API server is throttling watches (milliseconds)
pub const WATCH_BACKOFF_START_MS: u64 = 2_000;

/// Ceiling for the watch throttling backoff (milliseconds)
pub const WATCH_BACKOFF_MAX_MS: u64 = 60_000;

/// Default sidecar interception range
pub const DEFAULT_INCLUDE_IP_RANGES: &str = "*";

/// Default sidecar proxy image for remote clusters
pub const DEFAULT_PROXY_IMAGE: &str = "docker.io/istio/proxyv2:1.2.5";

/// Lowest supported mesh version (inclusive)
pub const MIN_SUPPORTED_MESH_VERSION: (u32, u32) = (1, 1);

/// First mesh version this controller does not support
pub const FIRST_UNSUPPORTED_MESH_VERSION: (u32, u32) = (1, 3);

/// Namespace on the remote cluster that receives the mesh configuration
pub const REMOTE_MESH_NAMESPACE: &str = "istio-system";

/// Secret on the remote cluster receiving the propagated CA material
pub const REMOTE_CA_SECRET_NAME: &str = "cacerts";

/// ConfigMap on the remote cluster carrying the rendered mesh values
pub const REMOTE_VALUES_CONFIGMAP: &str = "mesh-remote-values";

/// Label stamped on every object the controller creates on a remote cluster
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
