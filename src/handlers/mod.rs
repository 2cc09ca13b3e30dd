// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Create, update and delete handlers converging cluster objects for each custom resource.
//!
//! Handlers are idempotent: re-running create on an already converged resource makes no
//! changes. Failures on individual proxy workloads are collected in the returned [`Outcome`]
//! instead of aborting the pass.

pub mod static_host;
pub mod static_proxy;

use crate::constants::{annotations, labels, nginx, OPERATOR_NAME};
use crate::error::{OperatorError, Result};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, IngressTLS, ServiceBackendPort,
};
use kube::api::ObjectMeta;
use std::collections::BTreeMap;

/// Result of a handler pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    /// Isolated failures, one message per object that could not be converged
    pub failures: Vec<String>,
    /// Hash of the nginx config rendered during the pass
    pub config_hash: Option<String>,
}

impl Outcome {
    pub fn with_hash(config_hash: String) -> Self {
        Self {
            failures: Vec::new(),
            config_hash: Some(config_hash),
        }
    }

    pub fn record_failure(&mut self, failure: impl Into<String>) {
        self.failures.push(failure.into());
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} object(s) failed to converge: {}",
            self.failures.len(),
            self.failures.join("; ")
        )
    }

    /// Turn isolated failures into an error
    pub fn into_result(self) -> Result<Self> {
        if self.is_complete() {
            Ok(self)
        } else {
            Err(OperatorError::PartialFailure(self.summary()))
        }
    }
}

/// Labels put on every object the operator generates
pub(crate) fn managed_labels() -> BTreeMap<String, String> {
    BTreeMap::from([(labels::MANAGED_BY.to_string(), OPERATOR_NAME.to_string())])
}

/// A cert-manager backed, TLS terminated Ingress routing `host` to `service` on port 80
pub(crate) fn tls_ingress(
    name: &str,
    namespace: &str,
    host: &str,
    service: &str,
    secret_name: &str,
) -> Ingress {
    let backend = IngressBackend {
        service: Some(IngressServiceBackend {
            name: service.to_string(),
            port: Some(ServiceBackendPort {
                number: Some(nginx::HTTP_PORT),
                ..Default::default()
            }),
        }),
        ..Default::default()
    };

    Ingress {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(managed_labels()),
            annotations: Some(BTreeMap::from([(
                annotations::CLUSTER_ISSUER.to_string(),
                annotations::CLUSTER_ISSUER_VALUE.to_string(),
            )])),
            ..Default::default()
        },
        spec: Some(IngressSpec {
            ingress_class_name: Some(nginx::INGRESS_CLASS.to_string()),
            rules: Some(vec![IngressRule {
                host: Some(host.to_string()),
                http: Some(HTTPIngressRuleValue {
                    paths: vec![HTTPIngressPath {
                        path: Some("/".to_string()),
                        path_type: "ImplementationSpecific".to_string(),
                        backend,
                    }],
                }),
            }]),
            tls: Some(vec![IngressTLS {
                hosts: Some(vec![host.to_string()]),
                secret_name: Some(secret_name.to_string()),
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}
