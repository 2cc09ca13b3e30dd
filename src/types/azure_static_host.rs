// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::error::Result;
use crate::nginx::{Origin, Scheme};
use crate::types::static_host::require;
use crate::types::status::ResourceStatus;
use crate::types::StaticSite;
use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// Legacy Azure-only static host, superseded by StaticHost.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, schemars::JsonSchema)]
#[kube(
    group = "asterius.fr",
    version = "v1",
    kind = "AzureStaticHost",
    plural = "azurestatichosts",
    shortname = "ash"
)]
#[kube(namespaced)]
#[kube(status = "ResourceStatus")]
#[serde(rename_all = "camelCase")]
pub struct AzureStaticHostSpec {
    /// Public host name served by the Ingress
    pub host: String,
    pub source: AzureStaticSource,
}

#[derive(Serialize, Deserialize, Clone, Debug, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AzureStaticSource {
    /// Full static website host, e.g. account.z6.web.core.windows.net
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl StaticSite for AzureStaticHost {
    const KIND: &'static str = "AzureStaticHost";

    fn origin(&self) -> Result<Origin> {
        require("spec.source.host", &self.spec.source.host)?;
        Ok(Origin::new(
            Scheme::Https,
            self.spec.source.host.clone(),
            self.spec.source.path.clone(),
        ))
    }

    fn ingress_host(&self) -> &str {
        &self.spec.host
    }

    fn proxy_service_override(&self) -> Option<&str> {
        None
    }

    fn resource_status(&self) -> Option<&ResourceStatus> {
        self.status.as_ref()
    }
}
