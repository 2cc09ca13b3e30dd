// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Handlers for StaticProxy: a dedicated nginx Deployment, its Service and an optional TLS
//! Ingress, all named after the resource.

use crate::constants::{labels, nginx};
use crate::error::{OperatorError, Result};
use crate::handlers::{managed_labels, tls_ingress, Outcome};
use crate::kubernetes::{Driver, Missing};
use crate::types::static_proxy::{ProxyTls, StaticProxySpec};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, PodSpec, PodTemplateSpec, Service, ServicePort, ServiceSpec,
};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;
use kube::ResourceExt;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{info, instrument};

/// Create the Deployment, Service and, with TLS enabled, the Ingress. Objects that already exist
/// are adopted and brought in line with the spec.
#[instrument(skip(driver, spec))]
pub async fn create(
    driver: &Driver,
    name: &str,
    namespace: &str,
    spec: &StaticProxySpec,
) -> Result<Outcome> {
    spec.validate()?;

    if !driver
        .create_deployment(namespace, &deployment(name, namespace, spec))
        .await?
    {
        sync_deployment(driver, name, namespace, spec).await?;
    }
    driver.create_service(namespace, &service(name, namespace)).await?;
    if let Some(tls) = spec.enabled_tls()? {
        let ingress = ingress(name, namespace, tls);
        if !driver.create_ingress(namespace, &ingress).await? {
            driver.patch_ingress(namespace, &ingress).await?;
        }
    }

    Ok(Outcome::default())
}

/// Bring the Deployment's image, replicas and resources in line with the spec, and add or
/// remove the Ingress as TLS is toggled. Missing objects are recreated.
#[instrument(skip(driver, spec))]
pub async fn update(
    driver: &Driver,
    name: &str,
    namespace: &str,
    spec: &StaticProxySpec,
) -> Result<Outcome> {
    spec.validate()?;

    sync_deployment(driver, name, namespace, spec).await?;
    driver.create_service(namespace, &service(name, namespace)).await?;

    match spec.enabled_tls()? {
        Some(tls) => {
            let ingress = ingress(name, namespace, tls);
            if !driver.create_ingress(namespace, &ingress).await? {
                driver.patch_ingress(namespace, &ingress).await?;
            }
        }
        None => driver.delete_ingress(namespace, name, Missing::Tolerate).await?,
    }

    Ok(Outcome::default())
}

/// Fail with `MissingOnDelete` if the Deployment, the Service or, with TLS enabled, the Ingress
/// is gone. Nothing is deleted.
#[instrument(skip(driver, spec))]
pub async fn ensure_present(
    driver: &Driver,
    name: &str,
    namespace: &str,
    spec: &StaticProxySpec,
) -> Result<()> {
    let mut missing = Vec::new();
    if !driver.exists::<Deployment>(namespace, name).await? {
        missing.push(format!("Deployment {}/{}", namespace, name));
    }
    if !driver.exists::<Service>(namespace, name).await? {
        missing.push(format!("Service {}/{}", namespace, name));
    }
    if tls_enabled(spec) && !driver.exists::<Ingress>(namespace, name).await? {
        missing.push(format!("Ingress {}/{}", namespace, name));
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(OperatorError::MissingOnDelete(missing.join(", ")))
    }
}

/// Remove the Deployment, Service and, with TLS enabled, the Ingress. Objects already gone count
/// as removed, so an interrupted delete can be resumed.
#[instrument(skip(driver, spec))]
pub async fn delete(
    driver: &Driver,
    name: &str,
    namespace: &str,
    spec: &StaticProxySpec,
) -> Result<Outcome> {
    driver
        .delete_deployment(namespace, name, Missing::Tolerate)
        .await?;
    driver.delete_service(namespace, name, Missing::Tolerate).await?;
    if tls_enabled(spec) {
        driver.delete_ingress(namespace, name, Missing::Tolerate).await?;
    }

    Ok(Outcome::default())
}

/// Patch the nginx container of an existing Deployment, or recreate a missing one
async fn sync_deployment(
    driver: &Driver,
    name: &str,
    namespace: &str,
    spec: &StaticProxySpec,
) -> Result<()> {
    let Some(existing) = driver.get_deployment(namespace, name).await? else {
        driver
            .create_deployment(namespace, &deployment(name, namespace, spec))
            .await?;
        return Ok(());
    };

    // Containers are replaced as a whole; a concurrent site binding must not be lost
    let resource_version = existing.resource_version();
    let containers = updated_containers(existing, spec);
    let patch = json!({
        "metadata": { "resourceVersion": resource_version },
        "spec": {
            "replicas": spec.replicas(),
            "template": { "spec": { "containers": containers } }
        }
    });
    driver.patch_deployment(namespace, name, &patch).await?;
    info!("Updated Deployment {}/{} to {}", namespace, name, spec.image());
    Ok(())
}

fn tls_enabled(spec: &StaticProxySpec) -> bool {
    spec.tls.as_ref().is_some_and(|tls| tls.enabled)
}

fn app_labels(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(labels::APP.to_string(), name.to_string())])
}

fn container(spec: &StaticProxySpec) -> Container {
    Container {
        name: nginx::CONTAINER_NAME.to_string(),
        image: Some(spec.image()),
        ports: Some(vec![ContainerPort {
            container_port: nginx::HTTP_PORT,
            ..Default::default()
        }]),
        resources: spec.resources.clone(),
        ..Default::default()
    }
}

/// Existing containers with the nginx one updated in place, keeping mounts added by static sites
fn updated_containers(existing: Deployment, spec: &StaticProxySpec) -> Vec<Container> {
    let mut containers = existing
        .spec
        .and_then(|s| s.template.spec)
        .map(|pod_spec| pod_spec.containers)
        .unwrap_or_default();

    match containers
        .iter_mut()
        .find(|c| c.name == nginx::CONTAINER_NAME)
    {
        Some(nginx_container) => {
            nginx_container.image = Some(spec.image());
            nginx_container.resources = spec.resources.clone();
        }
        None => containers.push(container(spec)),
    }
    containers
}

fn deployment(name: &str, namespace: &str, spec: &StaticProxySpec) -> Deployment {
    let mut metadata_labels = managed_labels();
    metadata_labels.insert(labels::PROXY.to_string(), "true".to_string());

    Deployment {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(metadata_labels),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(spec.replicas()),
            selector: LabelSelector {
                match_labels: Some(app_labels(name)),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(app_labels(name)),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container(spec)],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn service(name: &str, namespace: &str) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(managed_labels()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(app_labels(name)),
            ports: Some(vec![ServicePort {
                name: Some("http".to_string()),
                port: nginx::HTTP_PORT,
                target_port: Some(IntOrString::Int(nginx::HTTP_PORT)),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn ingress(name: &str, namespace: &str, tls: &ProxyTls) -> Ingress {
    tls_ingress(name, namespace, &tls.domain, name, &tls.secret_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{fast_retry, FakeApiServer};
    use crate::workloads::{attach, VolumeBinding};
    use k8s_openapi::api::core::v1::ResourceRequirements;
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

    fn driver(server: &FakeApiServer) -> Driver {
        Driver::new(server.clone().into_client(), fast_retry())
    }

    fn tls_spec() -> StaticProxySpec {
        serde_json::from_value(json!({
            "nginxVersion": "1.27",
            "tls": {"enabled": true, "secretName": "px1-cert", "domain": "px1.example.com"}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_without_tls() {
        let server = FakeApiServer::new();
        let spec: StaticProxySpec =
            serde_json::from_value(json!({"tls": {"enabled": false}})).unwrap();

        create(&driver(&server), "px1", "web", &spec).await.unwrap();

        let deployment: Deployment = server.get("web", "px1").unwrap();
        assert_eq!(deployment.metadata.labels.unwrap()["asterius.fr/proxy"], "true");
        let deployment_spec = deployment.spec.unwrap();
        assert_eq!(deployment_spec.replicas, Some(1));
        assert_eq!(deployment_spec.selector.match_labels.unwrap()["app"], "px1");
        let pod_spec = deployment_spec.template.spec.unwrap();
        assert_eq!(pod_spec.containers[0].name, "nginx");
        assert_eq!(pod_spec.containers[0].image.as_deref(), Some("nginx:latest"));

        let service: Service = server.get("web", "px1").unwrap();
        let service_spec = service.spec.unwrap();
        assert_eq!(service_spec.selector.unwrap()["app"], "px1");
        assert_eq!(service_spec.ports.unwrap()[0].port, 80);

        assert_eq!(server.count::<Ingress>("web"), 0);
    }

    #[tokio::test]
    async fn test_create_with_tls_adds_ingress() {
        let server = FakeApiServer::new();

        create(&driver(&server), "px1", "web", &tls_spec()).await.unwrap();

        let ingress: Ingress = server.get("web", "px1").unwrap();
        let ingress_spec = ingress.spec.unwrap();
        let tls = &ingress_spec.tls.unwrap()[0];
        assert_eq!(tls.secret_name.as_deref(), Some("px1-cert"));
        assert_eq!(tls.hosts.as_ref().unwrap()[0], "px1.example.com");
        let backend = ingress_spec.rules.unwrap()[0].http.clone().unwrap().paths[0]
            .backend
            .service
            .clone()
            .unwrap();
        assert_eq!(backend.name, "px1");
    }

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let server = FakeApiServer::new();
        let driver = driver(&server);

        create(&driver, "px1", "web", &tls_spec()).await.unwrap();
        create(&driver, "px1", "web", &tls_spec()).await.unwrap();

        assert_eq!(server.count::<Deployment>("web"), 1);
        assert_eq!(server.count::<Service>("web"), 1);
        assert_eq!(server.count::<Ingress>("web"), 1);
    }

    #[tokio::test]
    async fn test_invalid_tls_is_rejected_before_any_call() {
        let server = FakeApiServer::new();
        let spec: StaticProxySpec =
            serde_json::from_value(json!({"tls": {"enabled": true, "secretName": "x"}})).unwrap();

        let err = create(&driver(&server), "px1", "web", &spec).await.unwrap_err();

        assert!(matches!(err, OperatorError::Validation(_)));
        assert_eq!(server.count::<Deployment>("web"), 0);
    }

    #[tokio::test]
    async fn test_update_keeps_site_mounts() {
        let server = FakeApiServer::new();
        let driver = driver(&server);
        let mut spec = StaticProxySpec::default();
        create(&driver, "px1", "web", &spec).await.unwrap();

        // A static site bound its config in the meantime
        let mut deployment: Deployment = server.get("web", "px1").unwrap();
        let pod_spec = deployment.spec.as_mut().unwrap().template.spec.as_mut().unwrap();
        attach(pod_spec, &VolumeBinding::for_site("site1"));
        server.seed(&deployment);

        spec.nginx_version = Some("1.27".to_string());
        spec.replicas = Some(3);
        spec.resources = Some(ResourceRequirements {
            limits: Some(BTreeMap::from([("memory".to_string(), Quantity("128Mi".to_string()))])),
            ..Default::default()
        });
        update(&driver, "px1", "web", &spec).await.unwrap();

        let deployment_spec = server.get::<Deployment>("web", "px1").unwrap().spec.unwrap();
        assert_eq!(deployment_spec.replicas, Some(3));
        let pod_spec = deployment_spec.template.spec.unwrap();
        let nginx = &pod_spec.containers[0];
        assert_eq!(nginx.image.as_deref(), Some("nginx:1.27"));
        assert!(nginx.resources.as_ref().unwrap().limits.is_some());
        assert_eq!(nginx.volume_mounts.as_ref().unwrap().len(), 1);
        assert_eq!(pod_spec.volumes.as_ref().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_toggles_ingress() {
        let server = FakeApiServer::new();
        let driver = driver(&server);
        create(&driver, "px1", "web", &StaticProxySpec::default()).await.unwrap();

        update(&driver, "px1", "web", &tls_spec()).await.unwrap();
        assert_eq!(server.count::<Ingress>("web"), 1);

        update(&driver, "px1", "web", &StaticProxySpec::default()).await.unwrap();
        assert_eq!(server.count::<Ingress>("web"), 0);
    }

    #[tokio::test]
    async fn test_update_recreates_missing_deployment() {
        let server = FakeApiServer::new();

        update(&driver(&server), "px1", "web", &StaticProxySpec::default())
            .await
            .unwrap();

        assert_eq!(server.count::<Deployment>("web"), 1);
        assert_eq!(server.count::<Service>("web"), 1);
    }

    #[tokio::test]
    async fn test_create_converges_adopted_deployment() {
        let server = FakeApiServer::new();
        let driver = driver(&server);
        create(&driver, "px1", "web", &StaticProxySpec::default()).await.unwrap();

        create(&driver, "px1", "web", &tls_spec()).await.unwrap();

        let deployment: Deployment = server.get("web", "px1").unwrap();
        let pod_spec = deployment.spec.unwrap().template.spec.unwrap();
        assert_eq!(pod_spec.containers[0].image.as_deref(), Some("nginx:1.27"));
        assert_eq!(server.count::<Ingress>("web"), 1);
    }

    #[tokio::test]
    async fn test_update_conflicts_with_concurrent_write() {
        let server = FakeApiServer::new();
        let driver = driver(&server);
        create(&driver, "px1", "web", &StaticProxySpec::default()).await.unwrap();
        server.fail("PATCH", "/apis/apps/v1/namespaces/web/deployments/px1", 409, 1);

        let err = update(&driver, "px1", "web", &tls_spec()).await.unwrap_err();

        assert_eq!(err.api_code(), Some(409));
        assert!(!err.is_permanent());
    }

    #[tokio::test]
    async fn test_delete_removes_all_objects() {
        let server = FakeApiServer::new();
        let driver = driver(&server);
        create(&driver, "px1", "web", &tls_spec()).await.unwrap();

        ensure_present(&driver, "px1", "web", &tls_spec()).await.unwrap();
        delete(&driver, "px1", "web", &tls_spec()).await.unwrap();

        assert_eq!(server.count::<Deployment>("web"), 0);
        assert_eq!(server.count::<Service>("web"), 0);
        assert_eq!(server.count::<Ingress>("web"), 0);
    }

    #[tokio::test]
    async fn test_ensure_present_reports_missing_objects() {
        let server = FakeApiServer::new();
        let driver = driver(&server);
        create(&driver, "px1", "web", &tls_spec()).await.unwrap();
        driver
            .delete_service("web", "px1", Missing::Tolerate)
            .await
            .unwrap();

        let err = ensure_present(&driver, "px1", "web", &tls_spec())
            .await
            .unwrap_err();

        assert!(matches!(&err, OperatorError::MissingOnDelete(m) if m == "Service web/px1"));
        assert!(err.is_permanent());
        assert_eq!(server.count::<Deployment>("web"), 1);
    }

    #[tokio::test]
    async fn test_delete_resumes_after_interruption() {
        let server = FakeApiServer::new();
        let driver = driver(&server);
        create(&driver, "px1", "web", &StaticProxySpec::default()).await.unwrap();
        server.fail("DELETE", "/api/v1/namespaces/web/services/px1", 503, 3);

        let err = delete(&driver, "px1", "web", &StaticProxySpec::default())
            .await
            .unwrap_err();
        assert!(!err.is_permanent());
        assert_eq!(server.count::<Deployment>("web"), 0);

        delete(&driver, "px1", "web", &StaticProxySpec::default())
            .await
            .unwrap();
        assert_eq!(server.count::<Service>("web"), 0);
    }
}
