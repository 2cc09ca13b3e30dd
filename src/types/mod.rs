// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Custom resources served under asterius.fr/v1.

pub mod azure_static_host;
pub mod static_host;
pub mod static_proxy;
pub mod status;

pub use azure_static_host::{AzureStaticHost, AzureStaticHostSpec};
pub use static_host::{StaticHost, StaticHostSpec};
pub use static_proxy::{StaticProxy, StaticProxySpec};
pub use status::ResourceStatus;

use crate::error::Result;
use crate::nginx::Origin;

/// A custom resource describing a static site proxied by the shared nginx pool.
pub trait StaticSite {
    const KIND: &'static str;

    /// Upstream origin, validated
    fn origin(&self) -> Result<Origin>;

    fn ingress_host(&self) -> &str;

    fn proxy_service_override(&self) -> Option<&str>;

    fn resource_status(&self) -> Option<&ResourceStatus>;
}
