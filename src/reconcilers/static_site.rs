// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Static site reconciler - converges StaticHost and AzureStaticHost resources.

use crate::constants::FINALIZER;
use crate::error::{OperatorError, Result};
use crate::handlers::static_host::{self, Site};
use crate::reconcilers::{error_policy, finish, Context, Transition};
use crate::types::StaticSite;
use futures::StreamExt;
use k8s_openapi::NamespaceResourceScope;
use kube::{
    runtime::{
        controller::Action,
        finalizer::{finalizer, Event},
        Controller,
    },
    Api, Resource, ResourceExt,
};
use kube_runtime::watcher::Config as WatcherConfig;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct StaticSiteReconciler<K> {
    context: Arc<Context>,
    kind: PhantomData<fn() -> K>,
}

impl<K> StaticSiteReconciler<K>
where
    K: StaticSite
        + Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + DeserializeOwned
        + Serialize
        + Debug
        + Send
        + Sync
        + 'static,
{
    pub fn new(context: Arc<Context>) -> Self {
        Self {
            context,
            kind: PhantomData,
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let sites: Api<K> = self.context.watched();
        info!("Watching {} resources", K::KIND);

        Controller::new(sites, WatcherConfig::default())
            .run(reconcile::<K>, error_policy::<K>, self.context)
            .for_each(|res| async move {
                match res {
                    Ok(o) => debug!("Reconciled {:?}", o),
                    Err(e) => warn!("Reconciliation error: {:?}", e),
                }
            })
            .await;

        Ok(())
    }
}

async fn reconcile<K>(site: Arc<K>, ctx: Arc<Context>) -> Result<Action>
where
    K: StaticSite
        + Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + DeserializeOwned
        + Serialize
        + Debug
        + Send
        + Sync
        + 'static,
{
    let namespace = site.namespace().ok_or_else(|| {
        OperatorError::Validation(format!("{} {} has no namespace", K::KIND, site.name_any()))
    })?;
    let api: Api<K> = Api::namespaced(ctx.driver.client().clone(), &namespace);

    finalizer(&api, FINALIZER, site, |event| async {
        match event {
            Event::Apply(site) => apply(site.as_ref(), &ctx).await,
            Event::Cleanup(site) => cleanup(site.as_ref(), &ctx).await,
        }
    })
    .await
    .map_err(|e| OperatorError::FinalizerError(Box::new(e)))
}

async fn apply<K>(site: &K, ctx: &Context) -> Result<Action>
where
    K: StaticSite
        + Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + DeserializeOwned
        + Debug,
{
    let status = site.resource_status();
    let transition = Transition::detect(site.meta().generation, status);
    debug!("{} {} transition: {:?}", K::KIND, site.name_any(), transition);

    let rolled_out_hash = status.and_then(|s| s.config_hash.as_deref());
    let result = match Site::from_resource(site, &ctx.config.default_proxy_service) {
        Ok(resolved) => match transition {
            Transition::Create | Transition::Resync => {
                static_host::create(&ctx.driver, &resolved, rolled_out_hash).await
            }
            Transition::Update => {
                static_host::update(
                    &ctx.driver,
                    &resolved,
                    rolled_out_hash,
                    ctx.config.restart_on_unchanged_config,
                )
                .await
            }
        },
        Err(e) => Err(e),
    };

    finish(&ctx.driver, site, status, result).await
}

/// Runs even when the spec no longer validates: everything to remove is derived from the name
async fn cleanup<K>(site: &K, ctx: &Context) -> Result<Action>
where
    K: StaticSite + Resource,
{
    let name = site.name_any();
    let namespace = site.namespace().unwrap_or_default();
    info!("Cleaning up {} {}/{}", K::KIND, namespace, name);

    static_host::delete(&ctx.driver, &name, &namespace)
        .await?
        .into_result()?;
    Ok(Action::await_change())
}
