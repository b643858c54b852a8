//! # Runtime
//!
//! Process wiring around the reconciler: startup, the watch loop, and the
//! error policy that turns failed attempts into requeues.

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;
