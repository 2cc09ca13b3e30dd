// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::error::{OperatorError, Result};
use crate::nginx::{Origin, Scheme};
use crate::types::status::ResourceStatus;
use crate::types::StaticSite;
use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// A static website hosted on a cloud storage provider, served through the nginx proxy pool.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, schemars::JsonSchema)]
#[kube(
    group = "asterius.fr",
    version = "v1",
    kind = "StaticHost",
    plural = "statichosts",
    shortname = "sh"
)]
#[kube(namespaced)]
#[kube(status = "ResourceStatus")]
#[kube(printcolumn = r#"{"name":"Host","type":"string","jsonPath":".spec.ingressHost"}"#)]
#[kube(printcolumn = r#"{"name":"Provider","type":"string","jsonPath":".spec.provider"}"#)]
#[serde(rename_all = "camelCase")]
pub struct StaticHostSpec {
    pub provider: Provider,
    #[serde(alias = "ingress")]
    pub ingress_host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure: Option<AzureSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws: Option<AwsSource>,
    /// Service the Ingress routes to instead of the default proxy service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_service_override: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Azure,
    Aws,
}

/// Azure storage account static website
#[derive(Serialize, Deserialize, Clone, Debug, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AzureSource {
    pub account_name: String,
    pub dns_zone_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subpath: Option<String>,
}

/// S3 bucket website endpoint
#[derive(Serialize, Deserialize, Clone, Debug, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AwsSource {
    pub bucket_name: String,
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subpath: Option<String>,
}

impl StaticHostSpec {
    /// Resolve the upstream origin for the selected provider
    pub fn origin(&self) -> Result<Origin> {
        match self.provider {
            Provider::Azure => {
                let azure = self.azure.as_ref().ok_or_else(|| {
                    OperatorError::Validation("provider is azure but spec.azure is missing".into())
                })?;
                require("spec.azure.accountName", &azure.account_name)?;
                require("spec.azure.dnsZoneId", &azure.dns_zone_id)?;
                Ok(Origin::new(
                    Scheme::Https,
                    format!(
                        "{}.z{}.web.core.windows.net",
                        azure.account_name, azure.dns_zone_id
                    ),
                    azure.subpath.clone(),
                ))
            }
            Provider::Aws => {
                let aws = self.aws.as_ref().ok_or_else(|| {
                    OperatorError::Validation("provider is aws but spec.aws is missing".into())
                })?;
                require("spec.aws.bucketName", &aws.bucket_name)?;
                require("spec.aws.region", &aws.region)?;
                Ok(Origin::new(
                    Scheme::Http,
                    format!("{}.s3-website.{}.amazonaws.com", aws.bucket_name, aws.region),
                    aws.subpath.clone(),
                ))
            }
        }
    }
}

pub(crate) fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(OperatorError::Validation(format!("{} must not be empty", field)));
    }
    Ok(())
}

impl StaticSite for StaticHost {
    const KIND: &'static str = "StaticHost";

    fn origin(&self) -> Result<Origin> {
        self.spec.origin()
    }

    fn ingress_host(&self) -> &str {
        &self.spec.ingress_host
    }

    fn proxy_service_override(&self) -> Option<&str> {
        self.spec.proxy_service_override.as_deref()
    }

    fn resource_status(&self) -> Option<&ResourceStatus> {
        self.status.as_ref()
    }
}
