// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::nginx;
use crate::error::{OperatorError, Result};
use crate::types::status::ResourceStatus;
use k8s_openapi::api::core::v1::ResourceRequirements;
use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// A dedicated nginx deployment with its own Service and optional TLS Ingress.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
#[kube(
    group = "asterius.fr",
    version = "v1",
    kind = "StaticProxy",
    plural = "staticproxies",
    shortname = "sp"
)]
#[kube(namespaced)]
#[kube(status = "ResourceStatus")]
#[serde(rename_all = "camelCase")]
pub struct StaticProxySpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nginx_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<ProxyTls>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProxyTls {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub secret_name: String,
    #[serde(default)]
    pub domain: String,
}

impl StaticProxySpec {
    /// Container image, `nginx:latest` unless a version is pinned
    pub fn image(&self) -> String {
        let version = self
            .nginx_version
            .as_deref()
            .filter(|v| !v.is_empty())
            .unwrap_or(nginx::DEFAULT_VERSION);
        format!("{}:{}", nginx::IMAGE, version)
    }

    pub fn replicas(&self) -> i32 {
        self.replicas.unwrap_or(1)
    }

    /// TLS settings when enabled, validated
    pub fn enabled_tls(&self) -> Result<Option<&ProxyTls>> {
        match self.tls.as_ref().filter(|tls| tls.enabled) {
            Some(tls) => {
                if tls.domain.trim().is_empty() || tls.secret_name.trim().is_empty() {
                    return Err(OperatorError::Validation(
                        "spec.tls.domain and spec.tls.secretName are required when TLS is enabled"
                            .into(),
                    ));
                }
                Ok(Some(tls))
            }
            None => Ok(None),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.replicas() < 0 {
            return Err(OperatorError::Validation("spec.replicas must not be negative".into()));
        }
        self.enabled_tls().map(|_| ())
    }
}

impl StaticProxy {
    pub fn resource_status(&self) -> Option<&ResourceStatus> {
        self.status.as_ref()
    }
}
