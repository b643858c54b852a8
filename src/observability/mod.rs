//! # Observability
//!
//! Prometheus metrics for the controller. Logging is plain `tracing`,
//! configured in `main`.

pub mod metrics;
