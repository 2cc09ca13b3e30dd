// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Proxy workloads (Deployments, StatefulSets, DaemonSets) receiving generated configuration.

pub mod binding;

pub use binding::{attach, config_key, config_map_name, detach, VolumeBinding};

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{PodSpec, PodTemplateSpec};
use kube::ResourceExt;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadKind {
    Deployment,
    StatefulSet,
    DaemonSet,
}

impl WorkloadKind {
    /// All kinds, in processing order
    pub const ALL: [WorkloadKind; 3] = [
        WorkloadKind::Deployment,
        WorkloadKind::StatefulSet,
        WorkloadKind::DaemonSet,
    ];
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkloadKind::Deployment => write!(f, "Deployment"),
            WorkloadKind::StatefulSet => write!(f, "StatefulSet"),
            WorkloadKind::DaemonSet => write!(f, "DaemonSet"),
        }
    }
}

/// A workload of any supported kind
#[derive(Debug, Clone, PartialEq)]
pub enum Workload {
    Deployment(Deployment),
    StatefulSet(StatefulSet),
    DaemonSet(DaemonSet),
}

impl Workload {
    pub fn kind(&self) -> WorkloadKind {
        match self {
            Workload::Deployment(_) => WorkloadKind::Deployment,
            Workload::StatefulSet(_) => WorkloadKind::StatefulSet,
            Workload::DaemonSet(_) => WorkloadKind::DaemonSet,
        }
    }

    pub fn name(&self) -> String {
        match self {
            Workload::Deployment(w) => w.name_any(),
            Workload::StatefulSet(w) => w.name_any(),
            Workload::DaemonSet(w) => w.name_any(),
        }
    }

    /// Version the workload was read at, for optimistic concurrency on writes
    pub fn resource_version(&self) -> Option<String> {
        match self {
            Workload::Deployment(w) => w.resource_version(),
            Workload::StatefulSet(w) => w.resource_version(),
            Workload::DaemonSet(w) => w.resource_version(),
        }
    }

    pub fn template(&self) -> Option<&PodTemplateSpec> {
        match self {
            Workload::Deployment(w) => w.spec.as_ref().map(|s| &s.template),
            Workload::StatefulSet(w) => w.spec.as_ref().map(|s| &s.template),
            Workload::DaemonSet(w) => w.spec.as_ref().map(|s| &s.template),
        }
    }

    pub fn template_mut(&mut self) -> Option<&mut PodTemplateSpec> {
        match self {
            Workload::Deployment(w) => w.spec.as_mut().map(|s| &mut s.template),
            Workload::StatefulSet(w) => w.spec.as_mut().map(|s| &mut s.template),
            Workload::DaemonSet(w) => w.spec.as_mut().map(|s| &mut s.template),
        }
    }

    pub fn pod_spec(&self) -> Option<&PodSpec> {
        self.template().and_then(|t| t.spec.as_ref())
    }

    pub fn pod_spec_mut(&mut self) -> Option<&mut PodSpec> {
        self.template_mut().and_then(|t| t.spec.as_mut())
    }
}

impl From<Deployment> for Workload {
    fn from(w: Deployment) -> Self {
        Workload::Deployment(w)
    }
}

impl From<StatefulSet> for Workload {
    fn from(w: StatefulSet) -> Self {
        Workload::StatefulSet(w)
    }
}

impl From<DaemonSet> for Workload {
    fn from(w: DaemonSet) -> Self {
        Workload::DaemonSet(w)
    }
}
