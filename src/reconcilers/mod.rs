// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes reconcilers that react to watch events.

pub mod static_proxy;
pub mod static_site;

pub use static_proxy::StaticProxyReconciler;
pub use static_site::StaticSiteReconciler;

use crate::config::Config;
use crate::constants::requeue;
use crate::error::{OperatorError, Result};
use crate::handlers::Outcome;
use crate::kubernetes::Driver;
use crate::types::status::{reasons, Condition, ResourceStatus};
use k8s_openapi::NamespaceResourceScope;
use kube::{runtime::controller::Action, Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// State shared by all reconcilers
pub struct Context {
    pub driver: Driver,
    pub config: Config,
}

impl Context {
    pub fn new(client: Client, config: Config) -> Self {
        Self {
            driver: Driver::new(client, config.retry_policy()),
            config,
        }
    }

    /// Api for the watched namespace, or all namespaces
    fn watched<K>(&self) -> Api<K>
    where
        K: Resource<DynamicType = (), Scope = NamespaceResourceScope>,
    {
        let client = self.driver.client().clone();
        match self.config.watch_namespace.as_deref() {
            Some(namespace) => Api::namespaced(client, namespace),
            None => Api::all(client),
        }
    }
}

/// Lifecycle transition, derived from how far the status lags behind the spec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Never converged
    Create,
    /// Spec changed since the last converged generation
    Update,
    /// Nothing changed, re-apply to pick up drift and newly labeled workloads
    Resync,
}

impl Transition {
    pub fn detect(generation: Option<i64>, status: Option<&ResourceStatus>) -> Self {
        match status.and_then(|s| s.observed_generation) {
            None => Transition::Create,
            Some(observed) if Some(observed) != generation => Transition::Update,
            Some(_) => Transition::Resync,
        }
    }
}

/// Status to report after an apply pass. The observed generation and config hash only move
/// forward when everything converged.
pub fn next_status(
    previous: Option<&ResourceStatus>,
    generation: Option<i64>,
    result: &Result<Outcome>,
) -> ResourceStatus {
    let previous = previous.cloned().unwrap_or_default();
    let ready = previous.ready_condition();

    let (condition, observed_generation, config_hash) = match result {
        Ok(outcome) if outcome.is_complete() => (
            Condition::ready(true, reasons::RECONCILED, "All objects converged", ready),
            generation,
            outcome.config_hash.clone().or_else(|| previous.config_hash.clone()),
        ),
        Ok(outcome) => (
            Condition::ready(false, reasons::PARTIAL_FAILURE, outcome.summary(), ready),
            previous.observed_generation,
            previous.config_hash.clone(),
        ),
        Err(OperatorError::Validation(message)) => (
            Condition::ready(false, reasons::VALIDATION_FAILED, message.clone(), ready),
            previous.observed_generation,
            previous.config_hash.clone(),
        ),
        Err(e) => (
            Condition::ready(false, reasons::API_ERROR, e.to_string(), ready),
            previous.observed_generation,
            previous.config_hash.clone(),
        ),
    };

    ResourceStatus {
        observed_generation,
        config_hash,
        conditions: Some(vec![condition]),
    }
}

/// Report the outcome of an apply pass on the status subresource and pick the next action
async fn finish<K>(
    driver: &Driver,
    resource: &K,
    previous: Option<&ResourceStatus>,
    result: Result<Outcome>,
) -> Result<Action>
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + DeserializeOwned
        + Debug,
{
    let kind = K::kind(&());
    let name = resource.name_any();
    let namespace = resource.namespace().unwrap_or_default();

    let status = next_status(previous, resource.meta().generation, &result);
    let patched = if previous == Some(&status) {
        Ok(())
    } else {
        driver.patch_status::<K>(&namespace, &name, &status).await
    };

    match result {
        Ok(outcome) if outcome.is_complete() => {
            patched?;
            info!("Reconciled {} {}/{}", kind, namespace, name);
            Ok(Action::requeue(Duration::from_secs(requeue::RESYNC_SECS)))
        }
        Ok(outcome) => {
            patched?;
            warn!("{} {}/{}: {}", kind, namespace, name, outcome.summary());
            Ok(Action::requeue(Duration::from_secs(requeue::PARTIAL_FAILURE_SECS)))
        }
        Err(e) => {
            if let Err(status_error) = patched {
                warn!(
                    "Failed to report status of {} {}/{}: {}",
                    kind, namespace, name, status_error
                );
            }
            Err(e)
        }
    }
}

/// Errors that retrying cannot fix wait for the resource to change
fn error_policy<K>(resource: Arc<K>, error: &OperatorError, _ctx: Arc<Context>) -> Action
where
    K: Resource<DynamicType = ()>,
{
    let kind = K::kind(&());
    let name = resource.name_any();
    let namespace = resource.namespace().unwrap_or_default();

    if error.is_permanent() {
        warn!("{} {}/{} needs attention: {}", kind, namespace, name, error);
        Action::await_change()
    } else {
        error!("Reconciliation error for {} {}/{}: {}", kind, namespace, name, error);
        Action::requeue(Duration::from_secs(requeue::ERROR_SECS))
    }
}
