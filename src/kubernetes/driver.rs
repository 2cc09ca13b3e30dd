// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Mutating calls against the cluster, wrapped in the retry policy and the
//! idempotency rules (adopt on conflict, tolerate missing objects).

use crate::constants::OPERATOR_NAME;
use crate::error::{OperatorError, Result};
use crate::kubernetes::retry::{is_conflict, is_not_found, RetryPolicy};
use crate::types::ResourceStatus;
use crate::workloads::{Workload, WorkloadKind};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::NamespaceResourceScope;
use kube::{
    api::{DeleteParams, ListParams, Patch, PatchParams, PostParams},
    Api, Client, Resource, ResourceExt,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt::Debug;
use tracing::{debug, info, instrument};

/// What to do when the object to mutate or delete does not exist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    /// Already converged, log and succeed
    Tolerate,
    /// Surface as an error, `OperatorError::MissingOnDelete` for deletions
    Fail,
}

/// Issues the create/patch/replace/delete calls needed to converge a resource.
#[derive(Clone)]
pub struct Driver {
    client: Client,
    retry: RetryPolicy,
}

impl Driver {
    pub fn new(client: Client, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Returns false when an existing ConfigMap was adopted
    #[instrument(skip(self, config_map), fields(name = %config_map.name_any()))]
    pub async fn create_or_adopt_config_map(
        &self,
        namespace: &str,
        config_map: &ConfigMap,
    ) -> Result<bool> {
        self.create_or_adopt(namespace, config_map).await
    }

    #[instrument(skip(self))]
    pub async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>> {
        self.get(namespace, name).await
    }

    /// Replace the data of an existing ConfigMap, a missing one is left alone
    #[instrument(skip(self, config_map), fields(name = %config_map.name_any()))]
    pub async fn update_config_map(&self, namespace: &str, config_map: &ConfigMap) -> Result<bool> {
        let patch = json!({ "data": config_map.data });
        let name = config_map.name_any();
        self.merge_patch::<ConfigMap>(namespace, &name, &patch, Missing::Tolerate)
            .await
    }

    #[instrument(skip(self))]
    pub async fn delete_config_map(&self, namespace: &str, name: &str) -> Result<()> {
        self.delete::<ConfigMap>(namespace, name, Missing::Tolerate).await
    }

    #[instrument(skip(self, ingress), fields(name = %ingress.name_any()))]
    pub async fn create_ingress(&self, namespace: &str, ingress: &Ingress) -> Result<bool> {
        self.create_or_adopt(namespace, ingress).await
    }

    /// Bring an existing Ingress's annotations and spec in line with `ingress`
    #[instrument(skip(self, ingress), fields(name = %ingress.name_any()))]
    pub async fn patch_ingress(&self, namespace: &str, ingress: &Ingress) -> Result<bool> {
        let patch = json!({
            "metadata": { "annotations": ingress.metadata.annotations },
            "spec": ingress.spec,
        });
        self.merge_patch::<Ingress>(namespace, &ingress.name_any(), &patch, Missing::Tolerate)
            .await
    }

    #[instrument(skip(self))]
    pub async fn delete_ingress(
        &self,
        namespace: &str,
        name: &str,
        missing: Missing,
    ) -> Result<()> {
        self.delete::<Ingress>(namespace, name, missing).await
    }

    #[instrument(skip(self, service), fields(name = %service.name_any()))]
    pub async fn create_service(&self, namespace: &str, service: &Service) -> Result<bool> {
        self.create_or_adopt(namespace, service).await
    }

    #[instrument(skip(self))]
    pub async fn delete_service(
        &self,
        namespace: &str,
        name: &str,
        missing: Missing,
    ) -> Result<()> {
        self.delete::<Service>(namespace, name, missing).await
    }

    #[instrument(skip(self, deployment), fields(name = %deployment.name_any()))]
    pub async fn create_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> Result<bool> {
        self.create_or_adopt(namespace, deployment).await
    }

    #[instrument(skip(self))]
    pub async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Option<Deployment>> {
        self.get(namespace, name).await
    }

    #[instrument(skip(self, patch))]
    pub async fn patch_deployment(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<bool> {
        self.merge_patch::<Deployment>(namespace, name, patch, Missing::Fail)
            .await
    }

    #[instrument(skip(self))]
    pub async fn delete_deployment(
        &self,
        namespace: &str,
        name: &str,
        missing: Missing,
    ) -> Result<()> {
        self.delete::<Deployment>(namespace, name, missing).await
    }

    /// List workloads of one kind matching a label selector
    #[instrument(skip(self, kind), fields(kind = %kind))]
    pub async fn list_workloads(
        &self,
        kind: WorkloadKind,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<Workload>> {
        let lp = ListParams::default().labels(selector);
        let workloads = match kind {
            WorkloadKind::Deployment => {
                into_workloads(self.list::<Deployment>(namespace, &lp).await?)
            }
            WorkloadKind::StatefulSet => {
                into_workloads(self.list::<StatefulSet>(namespace, &lp).await?)
            }
            WorkloadKind::DaemonSet => {
                into_workloads(self.list::<DaemonSet>(namespace, &lp).await?)
            }
        };
        debug!("Found {} {}s matching {}", workloads.len(), kind, selector);
        Ok(workloads)
    }

    /// JSON merge patch a workload
    #[instrument(skip(self, kind, patch), fields(kind = %kind))]
    pub async fn patch_workload(
        &self,
        kind: WorkloadKind,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<()> {
        let missing = Missing::Fail;
        match kind {
            WorkloadKind::Deployment => {
                self.merge_patch::<Deployment>(namespace, name, patch, missing).await?
            }
            WorkloadKind::StatefulSet => {
                self.merge_patch::<StatefulSet>(namespace, name, patch, missing).await?
            }
            WorkloadKind::DaemonSet => {
                self.merge_patch::<DaemonSet>(namespace, name, patch, missing).await?
            }
        };
        Ok(())
    }

    /// Overwrite a workload; its resourceVersion guards against concurrent writers
    #[instrument(skip(self, workload), fields(kind = %workload.kind(), name = %workload.name()))]
    pub async fn replace_workload(&self, namespace: &str, workload: &Workload) -> Result<()> {
        match workload {
            Workload::Deployment(w) => self.replace(namespace, w).await,
            Workload::StatefulSet(w) => self.replace(namespace, w).await,
            Workload::DaemonSet(w) => self.replace(namespace, w).await,
        }
    }

    /// Merge patch the status subresource of a custom resource
    #[instrument(skip(self, status))]
    pub async fn patch_status<K>(
        &self,
        namespace: &str,
        name: &str,
        status: &ResourceStatus,
    ) -> Result<()>
    where
        K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + Debug,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let pp = PatchParams {
            field_manager: Some(OPERATOR_NAME.to_string()),
            ..Default::default()
        };
        let patch = json!({ "status": status });
        let patch = Patch::Merge(&patch);
        let (api, pp, patch) = (&api, &pp, &patch);

        self.retry
            .run(&format!("patch status of {}/{}", namespace, name), move || {
                api.patch_status(name, pp, patch)
            })
            .await?;
        debug!("Updated status of {} {}/{}", K::kind(&()), namespace, name);
        Ok(())
    }

    /// Whether the object exists
    pub async fn exists<K>(&self, namespace: &str, name: &str) -> Result<bool>
    where
        K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + Debug,
    {
        Ok(self.get::<K>(namespace, name).await?.is_some())
    }

    async fn get<K>(&self, namespace: &str, name: &str) -> Result<Option<K>>
    where
        K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + Debug,
    {
        let kind = K::kind(&());
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let api = &api;

        Ok(self
            .retry
            .run(&format!("get {} {}/{}", kind, namespace, name), move || {
                api.get_opt(name)
            })
            .await?)
    }

    /// Create `object`, treating 409 as adoption. Returns whether it was created.
    async fn create_or_adopt<K>(&self, namespace: &str, object: &K) -> Result<bool>
    where
        K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + Serialize
            + Debug,
    {
        let kind = K::kind(&());
        let name = object.name_any();
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let pp = PostParams {
            field_manager: Some(OPERATOR_NAME.to_string()),
            ..Default::default()
        };
        let (api, pp) = (&api, &pp);

        match self
            .retry
            .run(&format!("create {} {}/{}", kind, namespace, name), move || {
                api.create(pp, object)
            })
            .await
        {
            Ok(_) => {
                info!("Created {} {}/{}", kind, namespace, name);
                Ok(true)
            }
            Err(e) if is_conflict(&e) => {
                info!("{} {}/{} already exists, adopting", kind, namespace, name);
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Returns false when the object is missing and `missing` tolerates it
    async fn merge_patch<K>(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
        missing: Missing,
    ) -> Result<bool>
    where
        K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + Debug,
    {
        let kind = K::kind(&());
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let pp = PatchParams {
            field_manager: Some(OPERATOR_NAME.to_string()),
            ..Default::default()
        };
        let patch = Patch::Merge(patch);
        let (api, pp, patch) = (&api, &pp, &patch);

        match self
            .retry
            .run(&format!("patch {} {}/{}", kind, namespace, name), move || {
                api.patch(name, pp, patch)
            })
            .await
        {
            Ok(_) => {
                debug!("Patched {} {}/{}", kind, namespace, name);
                Ok(true)
            }
            Err(e) if is_not_found(&e) => match missing {
                Missing::Tolerate => {
                    info!("{} {}/{} not found, nothing to update", kind, namespace, name);
                    Ok(false)
                }
                Missing::Fail => Err(e.into()),
            },
            Err(e) => Err(e.into()),
        }
    }

    async fn replace<K>(&self, namespace: &str, object: &K) -> Result<()>
    where
        K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + Serialize
            + Debug,
    {
        let kind = K::kind(&());
        let name = object.name_any();
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let pp = PostParams {
            field_manager: Some(OPERATOR_NAME.to_string()),
            ..Default::default()
        };
        let (api, pp, name_ref) = (&api, &pp, name.as_str());

        self.retry
            .run(&format!("replace {} {}/{}", kind, namespace, name), move || {
                api.replace(name_ref, pp, object)
            })
            .await?;
        debug!("Replaced {} {}/{}", kind, namespace, name);
        Ok(())
    }

    async fn delete<K>(&self, namespace: &str, name: &str, missing: Missing) -> Result<()>
    where
        K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + Debug,
    {
        let kind = K::kind(&());
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let dp = DeleteParams::default();
        let (api, dp) = (&api, &dp);

        match self
            .retry
            .run(&format!("delete {} {}/{}", kind, namespace, name), move || {
                api.delete(name, dp)
            })
            .await
        {
            Ok(_) => {
                info!("Deleted {} {}/{}", kind, namespace, name);
                Ok(())
            }
            Err(e) if is_not_found(&e) => match missing {
                Missing::Tolerate => {
                    debug!("{} {}/{} already absent", kind, namespace, name);
                    Ok(())
                }
                Missing::Fail => Err(OperatorError::MissingOnDelete(format!(
                    "{} {}/{}",
                    kind, namespace, name
                ))),
            },
            Err(e) => Err(e.into()),
        }
    }

    async fn list<K>(&self, namespace: &str, lp: &ListParams) -> Result<Vec<K>>
    where
        K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + Debug,
    {
        let kind = K::kind(&());
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let api = &api;

        let list = self
            .retry
            .run(&format!("list {} in {}", kind, namespace), move || api.list(lp))
            .await?;
        Ok(list.items)
    }
}

fn into_workloads<K: Into<Workload>>(items: Vec<K>) -> Vec<Workload> {
    items.into_iter().map(Into::into).collect()
}
