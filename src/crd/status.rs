//! # RemoteConfig Status
//!
//! Lifecycle phase of a remote cluster configuration and the transition table
//! the reconciler is allowed to walk.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of the RemoteConfig resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConfigStatus {
    /// Lifecycle phase, absent until the resource is first seen
    #[serde(default)]
    pub phase: Option<Phase>,
    /// Error recorded by the last failed reconciliation, empty on success
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Lifecycle phase of a RemoteConfig
///
/// ```text
/// Empty -> Created -> Reconciling -> Available
///                          ^    \--> ReconcileFailed
///                          |              |
///                          +--------------+
/// ```
///
/// `Unmanaged` is only written when the controller releases every resource
/// it manages.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize, schemars::JsonSchema,
)]
pub enum Phase {
    #[default]
    Empty,
    Created,
    Reconciling,
    Available,
    ReconcileFailed,
    Unmanaged,
}

impl Phase {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Empty => "",
            Phase::Created => "Created",
            Phase::Reconciling => "Reconciling",
            Phase::Available => "Available",
            Phase::ReconcileFailed => "ReconcileFailed",
            Phase::Unmanaged => "Unmanaged",
        }
    }

    /// Whether the reconciler may move a resource from `self` to `next`.
    ///
    /// Rewriting the current phase is always allowed so that a failure
    /// message can be refreshed. Any attempt may end in `ReconcileFailed`. `Unmanaged -> Reconciling` covers a
    /// controller that is reinstalled after releasing its resources.
    #[must_use]
    pub fn can_transition(self, next: Phase) -> bool {
        use Phase::{Available, Created, Empty, ReconcileFailed, Reconciling, Unmanaged};

        if self == next || next == Unmanaged {
            return true;
        }
        match (self, next) {
            (Empty, Created) => true,
            (Created | Available | ReconcileFailed | Unmanaged, Reconciling) => true,
            (Reconciling, Available) => true,
            (_, ReconcileFailed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Empty => f.write_str("<empty>"),
            other => f.write_str(other.as_str()),
        }
    }
}
