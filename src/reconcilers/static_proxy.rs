// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! StaticProxy reconciler - manages dedicated nginx deployments.

use crate::constants::FINALIZER;
use crate::error::{OperatorError, Result};
use crate::handlers::static_proxy;
use crate::reconcilers::{error_policy, finish, Context, Transition};
use crate::types::status::{reasons, Condition};
use crate::types::StaticProxy;
use futures::StreamExt;
use kube::{
    runtime::{
        controller::Action,
        finalizer::{finalizer, Event},
        Controller,
    },
    Api, Resource, ResourceExt,
};
use kube_runtime::watcher::Config as WatcherConfig;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct StaticProxyReconciler {
    context: Arc<Context>,
}

impl StaticProxyReconciler {
    pub fn new(context: Arc<Context>) -> Self {
        Self { context }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let proxies: Api<StaticProxy> = self.context.watched();
        info!("Watching StaticProxy resources");

        Controller::new(proxies, WatcherConfig::default())
            .run(reconcile, error_policy::<StaticProxy>, self.context)
            .for_each(|res| async move {
                match res {
                    Ok(o) => debug!("Reconciled static proxy: {:?}", o),
                    Err(e) => warn!("Reconciliation error: {:?}", e),
                }
            })
            .await;

        Ok(())
    }
}

async fn reconcile(proxy: Arc<StaticProxy>, ctx: Arc<Context>) -> Result<Action> {
    let namespace = proxy.namespace().ok_or_else(|| {
        OperatorError::Validation(format!("StaticProxy {} has no namespace", proxy.name_any()))
    })?;
    let api: Api<StaticProxy> = Api::namespaced(ctx.driver.client().clone(), &namespace);

    finalizer(&api, FINALIZER, proxy, |event| async {
        match event {
            Event::Apply(proxy) => apply(&proxy, &namespace, &ctx).await,
            Event::Cleanup(proxy) => cleanup(&proxy, &namespace, &ctx).await,
        }
    })
    .await
    .map_err(|e| OperatorError::FinalizerError(Box::new(e)))
}

async fn apply(proxy: &StaticProxy, namespace: &str, ctx: &Context) -> Result<Action> {
    let name = proxy.name_any();
    let status = proxy.resource_status();
    let transition = Transition::detect(proxy.meta().generation, status);
    debug!("StaticProxy {} transition: {:?}", name, transition);

    let result = match transition {
        Transition::Create => {
            static_proxy::create(&ctx.driver, &name, namespace, &proxy.spec).await
        }
        Transition::Update | Transition::Resync => {
            static_proxy::update(&ctx.driver, &name, namespace, &proxy.spec).await
        }
    };

    finish(&ctx.driver, proxy, status, result).await
}

/// A proxy that was fully provisioned once must still have all its objects when cleanup starts:
/// anything missing is reported and nothing is deleted. Once the `Deleting` marker is recorded,
/// retries tolerate objects removed by an earlier attempt. Proxies that never converged are
/// cleaned up leniently.
async fn cleanup(proxy: &StaticProxy, namespace: &str, ctx: &Context) -> Result<Action> {
    let name = proxy.name_any();
    let status = proxy.resource_status();
    let provisioned = status.is_some_and(|s| s.observed_generation.is_some());
    let resuming = status.is_some_and(|s| s.has_reason(reasons::DELETING));

    if provisioned && !resuming {
        static_proxy::ensure_present(&ctx.driver, &name, namespace, &proxy.spec).await?;

        let mut deleting = status.cloned().unwrap_or_default();
        deleting.conditions = Some(vec![Condition::ready(
            false,
            reasons::DELETING,
            "Removing Deployment, Service and Ingress",
            status.and_then(|s| s.ready_condition()),
        )]);
        ctx.driver
            .patch_status::<StaticProxy>(namespace, &name, &deleting)
            .await?;
    }
    info!("Cleaning up StaticProxy {}/{}", namespace, name);

    static_proxy::delete(&ctx.driver, &name, namespace, &proxy.spec).await?;
    Ok(Action::await_change())
}
