//! # Trigger Mapper
//!
//! Maps watch events on other kinds to the RemoteConfigs that must be
//! re-evaluated.
//!
//! - PrimaryConfig events select the RemoteConfigs that reference the
//!   object in their owner references.
//! - Topology events (workload pods, gateway services) carry no usable
//!   owner and invalidate every RemoteConfig.
//! - A RemoteConfig without owner references is always selected, since
//!   its link to the PrimaryConfig may not be attached yet.
//!
//! [`TriggerGate`] keeps the controller from re-running on its own status
//! writes: an `Available` object whose generation was already reconciled
//! only runs again when a mapper marked it.

use crate::crd::{Phase, RemoteConfig};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::runtime::reflector::ObjectRef;
use kube::{Resource, ResourceExt};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

/// Identity of the object an event refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventObject {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub uid: String,
}

impl EventObject {
    /// `None` when the object has not been persisted (no uid)
    #[must_use]
    pub fn of<K>(obj: &K) -> Option<Self>
    where
        K: Resource<DynamicType = ()>,
    {
        Some(Self {
            api_version: K::api_version(&()).into_owned(),
            kind: K::kind(&()).into_owned(),
            name: obj.meta().name.clone()?,
            uid: obj.meta().uid.clone()?,
        })
    }

    #[must_use]
    pub fn is_referenced_by(&self, owner: &OwnerReference) -> bool {
        owner.kind == self.kind
            && owner.api_version == self.api_version
            && owner.name == self.name
            && owner.uid == self.uid
    }
}

/// RemoteConfigs to re-evaluate for an event.
///
/// `event` is `None` for topology changes with no single owner. The result
/// holds each identity once, in snapshot order.
pub fn remotes_for_event<'a>(
    remotes: impl IntoIterator<Item = &'a RemoteConfig>,
    event: Option<&EventObject>,
) -> Vec<ObjectRef<RemoteConfig>> {
    let mut seen = HashSet::new();
    remotes
        .into_iter()
        .filter(|remote| {
            let owners = remote.owner_references();
            match event {
                None => true,
                Some(_) if owners.is_empty() => true,
                Some(event) => owners.iter().any(|o| event.is_referenced_by(o)),
            }
        })
        .map(ObjectRef::from_obj)
        .filter(|obj_ref| seen.insert(obj_ref.clone()))
        .collect()
}

/// Tracks which identities have pending external triggers and which
/// generation each identity last reconciled successfully.
#[derive(Debug, Default)]
pub struct TriggerGate {
    marked: Mutex<HashSet<ObjectRef<RemoteConfig>>>,
    reconciled: Mutex<HashMap<ObjectRef<RemoteConfig>, Option<i64>>>,
}

impl TriggerGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a watch mapper selected these identities
    pub fn mark(&self, refs: &[ObjectRef<RemoteConfig>]) {
        let mut marked = self.marked.lock().unwrap_or_else(PoisonError::into_inner);
        marked.extend(refs.iter().cloned());
    }

    /// Decide whether an attempt for `obj` should run, consuming its mark.
    ///
    /// Skips only an `Available`, undeleted object whose generation was
    /// already reconciled and that no mapper has marked since.
    pub fn admit(&self, obj: &RemoteConfig) -> bool {
        let obj_ref = ObjectRef::from_obj(obj);
        let was_marked = self
            .marked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&obj_ref);
        if was_marked
            || obj.metadata.deletion_timestamp.is_some()
            || obj.phase() != Phase::Available
        {
            return true;
        }
        let reconciled = self.reconciled.lock().unwrap_or_else(PoisonError::into_inner);
        reconciled.get(&obj_ref) != Some(&obj.metadata.generation)
    }

    /// Remember the generation of a successful attempt
    pub fn reconciled(&self, obj: &RemoteConfig) {
        self.reconciled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(ObjectRef::from_obj(obj), obj.metadata.generation);
    }

    /// Forget the reconciled generation, e.g. after an attempt failed
    pub fn forget(&self, obj: &RemoteConfig) {
        self.reconciled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&ObjectRef::from_obj(obj));
    }

    /// Drop everything known about a deleted identity
    pub fn remove(&self, obj_ref: &ObjectRef<RemoteConfig>) {
        self.marked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(obj_ref);
        self.reconciled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(obj_ref);
    }

    /// Number of identities with a pending mark or a reconciled generation
    #[must_use]
    pub fn tracked(&self) -> usize {
        let marked = self.marked.lock().unwrap_or_else(PoisonError::into_inner);
        let reconciled = self.reconciled.lock().unwrap_or_else(PoisonError::into_inner);
        let mut all: HashSet<&ObjectRef<RemoteConfig>> = reconciled.keys().collect();
        all.extend(marked.iter());
        all.len()
    }
}
