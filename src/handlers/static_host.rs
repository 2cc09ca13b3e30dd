// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Handlers for static sites (StaticHost and the legacy AzureStaticHost).
//!
//! A site owns a ConfigMap with its rendered nginx server block, an Ingress routing its host to
//! the proxy service, and a volume binding on every workload labeled `asterius.fr/proxy=true`
//! in its namespace.

use crate::constants::{annotations, labels};
use crate::error::{OperatorError, Result};
use crate::handlers::{managed_labels, tls_ingress, Outcome};
use crate::kubernetes::{Driver, Missing};
use crate::nginx::{self, Origin};
use crate::types::static_host::require;
use crate::types::StaticSite;
use crate::workloads::{
    attach, config_key, config_map_name, detach, VolumeBinding, Workload, WorkloadKind,
};
use chrono::Utc;
use k8s_openapi::api::core::v1::{ConfigMap, PodSpec};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::ObjectMeta;
use kube::{Resource, ResourceExt};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{debug, error, info, instrument, warn};

/// A static site resolved from its custom resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    pub name: String,
    pub namespace: String,
    pub ingress_host: String,
    pub origin: Origin,
    /// Service the Ingress routes to
    pub backend_service: String,
}

impl Site {
    pub fn from_resource<K>(resource: &K, default_proxy_service: &str) -> Result<Self>
    where
        K: StaticSite + Resource,
    {
        let name = resource.name_any();
        let namespace = resource.namespace().ok_or_else(|| {
            OperatorError::Validation(format!("{} {} has no namespace", K::KIND, name))
        })?;
        require("ingress host", resource.ingress_host())?;

        Ok(Site {
            origin: resource.origin()?,
            ingress_host: resource.ingress_host().to_string(),
            backend_service: resource
                .proxy_service_override()
                .filter(|s| !s.is_empty())
                .unwrap_or(default_proxy_service)
                .to_string(),
            name,
            namespace,
        })
    }

    /// Rendered nginx server block
    pub fn config(&self) -> String {
        nginx::render(&self.origin, &self.ingress_host)
    }

    fn config_map(&self, config: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(config_map_name(&self.name)),
                namespace: Some(self.namespace.clone()),
                labels: Some(managed_labels()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(config_key(&self.name), config.to_string())])),
            ..Default::default()
        }
    }

    fn ingress(&self) -> Ingress {
        tls_ingress(
            &self.name,
            &self.namespace,
            &self.ingress_host,
            &self.backend_service,
            &format!("{}-tls", self.name),
        )
    }
}

/// Render and store the site config, route its host and bind the config into every managed
/// proxy workload. Safe to re-run: existing objects are adopted and brought in line with the
/// site, and bindings are not duplicated. Workloads that already mount the config are restarted
/// when it differs from `rolled_out_hash` or the stored content had to be replaced.
#[instrument(skip(driver, site), fields(name = %site.name, namespace = %site.namespace))]
pub async fn create(
    driver: &Driver,
    site: &Site,
    rolled_out_hash: Option<&str>,
) -> Result<Outcome> {
    let config = site.config();
    let hash = nginx::config_hash(&config);
    let config_replaced = store_config(driver, &site.namespace, &site.config_map(&config)).await?;
    let restart_bound = config_replaced || rolled_out_hash != Some(hash.as_str());
    let ingress = site.ingress();
    if !driver.create_ingress(&site.namespace, &ingress).await? {
        driver.patch_ingress(&site.namespace, &ingress).await?;
    }

    let mut outcome = Outcome::with_hash(hash);
    let binding = VolumeBinding::for_site(&site.name);

    for kind in WorkloadKind::ALL {
        for mut workload in managed_workloads(driver, kind, &site.namespace, &mut outcome).await {
            let name = workload.name();
            let resource_version = workload.resource_version();
            let Some(pod_spec) = workload.pod_spec_mut() else {
                warn!("{} {}/{} has no pod template, skipping", kind, site.namespace, name);
                continue;
            };

            // Bound workloads only pick up new content through a restart
            let (patch, action) = if attach(pod_spec, &binding) {
                (binding_patch(pod_spec, resource_version), "Mounted config into")
            } else if restart_bound {
                (restart_patch(), "Restarted")
            } else {
                debug!(
                    "{} {}/{} already mounts {}",
                    kind, site.namespace, name, binding.volume_name
                );
                continue;
            };

            match driver.patch_workload(kind, &site.namespace, &name, &patch).await {
                Ok(()) => info!("{} {} {}/{}", action, kind, site.namespace, name),
                Err(e) => {
                    error!("Failed to converge {} {}/{}: {}", kind, site.namespace, name, e);
                    outcome.record_failure(format!("{} {}/{}: {}", kind, site.namespace, name, e));
                }
            }
        }
    }

    Ok(outcome)
}

/// Create the site's ConfigMap, or bring the data of an adopted one in line.
/// Returns whether existing content was replaced.
async fn store_config(driver: &Driver, namespace: &str, config_map: &ConfigMap) -> Result<bool> {
    if driver.create_or_adopt_config_map(namespace, config_map).await? {
        return Ok(false);
    }
    let current = driver
        .get_config_map(namespace, &config_map.name_any())
        .await?;
    if current.and_then(|cm| cm.data) == config_map.data {
        return Ok(false);
    }
    info!("Replacing stale config in ConfigMap {}/{}", namespace, config_map.name_any());
    driver.update_config_map(namespace, config_map).await
}

/// Re-render the config and refresh the ConfigMap and Ingress. Managed workloads are restarted
/// when the rendered config differs from `previous_hash`, or always with `restart_unchanged`.
#[instrument(skip(driver, site), fields(name = %site.name, namespace = %site.namespace))]
pub async fn update(
    driver: &Driver,
    site: &Site,
    previous_hash: Option<&str>,
    restart_unchanged: bool,
) -> Result<Outcome> {
    let config = site.config();
    let hash = nginx::config_hash(&config);

    driver
        .update_config_map(&site.namespace, &site.config_map(&config))
        .await?;
    driver.patch_ingress(&site.namespace, &site.ingress()).await?;

    let mut outcome = Outcome::with_hash(hash);
    if previous_hash == outcome.config_hash.as_deref() && !restart_unchanged {
        debug!("Rendered config unchanged, not restarting proxy workloads");
        return Ok(outcome);
    }

    let patch = restart_patch();
    for kind in WorkloadKind::ALL {
        for workload in managed_workloads(driver, kind, &site.namespace, &mut outcome).await {
            let name = workload.name();
            match driver.patch_workload(kind, &site.namespace, &name, &patch).await {
                Ok(()) => info!("Restarted {} {}/{}", kind, site.namespace, name),
                Err(e) => {
                    error!("Failed to restart {} {}/{}: {}", kind, site.namespace, name, e);
                    outcome.record_failure(format!("{} {}/{}: {}", kind, site.namespace, name, e));
                }
            }
        }
    }

    Ok(outcome)
}

/// Unbind the site from every managed workload, then remove its ConfigMap and Ingress.
/// Objects already gone count as removed.
#[instrument(skip(driver))]
pub async fn delete(driver: &Driver, name: &str, namespace: &str) -> Result<Outcome> {
    let mut outcome = Outcome::default();
    let binding = VolumeBinding::for_site(name);

    for kind in WorkloadKind::ALL {
        for mut workload in managed_workloads(driver, kind, namespace, &mut outcome).await {
            let changed = workload
                .pod_spec_mut()
                .is_some_and(|pod_spec| detach(pod_spec, &binding));
            if !changed {
                continue;
            }

            let target = format!("{} {}/{}", kind, namespace, workload.name());
            match driver.replace_workload(namespace, &workload).await {
                Ok(()) => info!("Unmounted {} from {}", binding.config_map_name, target),
                Err(e) => {
                    error!("Failed to unmount config from {}: {}", target, e);
                    outcome.record_failure(format!("{}: {}", target, e));
                }
            }
        }
    }

    if outcome.is_complete() {
        driver.delete_config_map(namespace, &binding.config_map_name).await?;
    } else {
        warn!(
            "Keeping ConfigMap {}/{} while workloads may still mount it",
            namespace, binding.config_map_name
        );
    }
    driver.delete_ingress(namespace, name, Missing::Tolerate).await?;

    Ok(outcome)
}

/// Workloads of one kind carrying the proxy label. A failed list is recorded and yields nothing,
/// so the remaining kinds are still processed.
async fn managed_workloads(
    driver: &Driver,
    kind: WorkloadKind,
    namespace: &str,
    outcome: &mut Outcome,
) -> Vec<Workload> {
    match driver
        .list_workloads(kind, namespace, labels::PROXY_SELECTOR)
        .await
    {
        Ok(workloads) => workloads,
        Err(e) => {
            error!("Failed to list {}s in {}, skipping: {}", kind, namespace, e);
            outcome.record_failure(format!("list {}s in {}: {}", kind, namespace, e));
            Vec::new()
        }
    }
}

/// Merge patch carrying the pod spec's volumes and containers. The lists are replaced as a
/// whole, so the patch is pinned to the version they were read at.
fn binding_patch(pod_spec: &PodSpec, resource_version: Option<String>) -> Value {
    json!({
        "metadata": { "resourceVersion": resource_version },
        "spec": {
            "template": {
                "spec": {
                    "volumes": pod_spec.volumes,
                    "containers": pod_spec.containers,
                }
            }
        }
    })
}

/// Merge patch triggering a rolling restart, the same way `kubectl rollout restart` does
fn restart_patch() -> Value {
    json!({
        "spec": {
            "template": {
                "metadata": {
                    "annotations": {
                        (annotations::RESTARTED_AT): Utc::now().to_rfc3339()
                    }
                }
            }
        }
    })
}
