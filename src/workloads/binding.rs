// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Attaching and detaching generated nginx configuration on a pod spec.

use crate::constants::nginx;
use k8s_openapi::api::core::v1::{ConfigMapVolumeSource, PodSpec, Volume, VolumeMount};

/// Volume and mount linking a site's ConfigMap into proxy containers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeBinding {
    pub volume_name: String,
    pub config_map_name: String,
    pub mount_path: String,
    pub sub_path: String,
}

impl VolumeBinding {
    pub fn for_site(name: &str) -> Self {
        let config_map_name = config_map_name(name);
        Self {
            volume_name: config_map_name.clone(),
            config_map_name,
            mount_path: format!("{}/{}", nginx::CONF_DIR, config_key(name)),
            sub_path: config_key(name),
        }
    }

    pub fn volume(&self) -> Volume {
        Volume {
            name: self.volume_name.clone(),
            config_map: Some(ConfigMapVolumeSource {
                name: self.config_map_name.clone(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    pub fn mount(&self) -> VolumeMount {
        VolumeMount {
            name: self.volume_name.clone(),
            mount_path: self.mount_path.clone(),
            sub_path: Some(self.sub_path.clone()),
            ..Default::default()
        }
    }

    /// Whether `volume` already points at the site's ConfigMap. Fields the API server defaults
    /// (such as `defaultMode`) are not ours and are ignored.
    fn binds_volume(&self, volume: &Volume) -> bool {
        volume
            .config_map
            .as_ref()
            .is_some_and(|cm| cm.name == self.config_map_name)
    }

    fn binds_mount(&self, mount: &VolumeMount) -> bool {
        mount.mount_path == self.mount_path
            && mount.sub_path.as_deref() == Some(self.sub_path.as_str())
    }
}

/// Name of the ConfigMap holding a site's config
pub fn config_map_name(name: &str) -> String {
    format!("{}-nginx-config", name)
}

/// Data key (and file name) of a site's config
pub fn config_key(name: &str) -> String {
    format!("{}.conf", name)
}

/// Ensure the pod spec carries exactly one volume and, per container, one mount for `binding`.
/// Returns whether the spec changed.
pub fn attach(pod_spec: &mut PodSpec, binding: &VolumeBinding) -> bool {
    let mut changed = upsert_by_name(
        pod_spec.volumes.get_or_insert_with(Vec::new),
        binding.volume(),
        |v| &v.name,
        |v| binding.binds_volume(v),
    );

    for container in pod_spec.containers.iter_mut() {
        changed |= upsert_by_name(
            container.volume_mounts.get_or_insert_with(Vec::new),
            binding.mount(),
            |m| &m.name,
            |m| binding.binds_mount(m),
        );
    }

    changed
}

/// Remove the volume and every container mount named after `binding`. Absent bindings are a no-op.
pub fn detach(pod_spec: &mut PodSpec, binding: &VolumeBinding) -> bool {
    let mut changed = false;

    if let Some(volumes) = pod_spec.volumes.as_mut() {
        let before = volumes.len();
        volumes.retain(|v| v.name != binding.volume_name);
        changed |= volumes.len() != before;
    }

    for container in pod_spec.containers.iter_mut() {
        if let Some(mounts) = container.volume_mounts.as_mut() {
            let before = mounts.len();
            mounts.retain(|m| m.name != binding.volume_name);
            changed |= mounts.len() != before;
        }
    }

    changed
}

/// Keyed insert: replaces the first entry with the same name unless it is already `bound`,
/// drops any further duplicates, appends when missing.
fn upsert_by_name<T, F, B>(items: &mut Vec<T>, desired: T, name_of: F, bound: B) -> bool
where
    F: Fn(&T) -> &String,
    B: Fn(&T) -> bool,
{
    let name = name_of(&desired).clone();
    let matching = items.iter().filter(|item| *name_of(item) == name).count();

    match items.iter().position(|item| *name_of(item) == name) {
        Some(idx) if matching == 1 && bound(&items[idx]) => false,
        Some(idx) => {
            items[idx] = desired;
            let mut seen = false;
            items.retain(|item| {
                if *name_of(item) != name {
                    return true;
                }
                let keep = !seen;
                seen = true;
                keep
            });
            true
        }
        None => {
            items.push(desired);
            true
        }
    }
}
