// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// API group and version of the custom resources
pub const API_GROUP: &str = "asterius.fr";
pub const API_VERSION: &str = "v1";

/// Finalizer guarding cleanup of generated objects
pub const FINALIZER: &str = "asterius.fr/cleanup";

/// The operator name used as field manager and managed-by label value
pub const OPERATOR_NAME: &str = "asterius-operator";

/// Kubernetes label keys and values used by the operator
pub mod labels {
    /// Marks workloads that receive generated nginx configuration
    pub const PROXY: &str = "asterius.fr/proxy";
    /// Label selector for managed proxy workloads
    pub const PROXY_SELECTOR: &str = "asterius.fr/proxy=true";
    pub const MANAGED_BY: &str = "app.kubernetes.io/managed-by";
    /// Pod label used by StaticProxy deployments and services
    pub const APP: &str = "app";
}

/// Kubernetes annotation keys used by the operator
pub mod annotations {
    pub const CLUSTER_ISSUER: &str = "cert-manager.io/cluster-issuer";
    pub const CLUSTER_ISSUER_VALUE: &str = "letsencrypt-prod";
    /// Bumped on pod templates to force a rollout
    pub const RESTARTED_AT: &str = "kubectl.kubernetes.io/restartedAt";
}

/// nginx proxy defaults
pub mod nginx {
    pub const INGRESS_CLASS: &str = "nginx";
    /// Service name fronting the shared proxy pool
    pub const DEFAULT_PROXY_SERVICE: &str = "nginx-proxy";
    pub const CONF_DIR: &str = "/etc/nginx/conf.d";
    pub const IMAGE: &str = "nginx";
    pub const DEFAULT_VERSION: &str = "latest";
    pub const CONTAINER_NAME: &str = "nginx";
    pub const HTTP_PORT: i32 = 80;
}

/// API retry defaults
pub mod retry {
    pub const ATTEMPTS: u32 = 3;
    pub const WAIT_SECS: u64 = 1;
    pub const MULTIPLIER: u32 = 2;
    pub const MAX_WAIT_SECS: u64 = 10;
}

/// CRD polling configuration
pub mod crd {
    /// Initial polling interval in seconds when waiting for CRDs
    pub const POLL_INTERVAL_SECS: u64 = 10;
    /// Maximum polling interval in seconds (exponential backoff cap)
    pub const POLL_MAX_INTERVAL_SECS: u64 = 60;
}

/// Requeue intervals for the reconcilers
pub mod requeue {
    pub const RESYNC_SECS: u64 = 300;
    pub const ERROR_SECS: u64 = 60;
    pub const PARTIAL_FAILURE_SECS: u64 = 30;
}
