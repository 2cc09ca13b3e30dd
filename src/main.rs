// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::Result;
use kube::Client;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use asterius_operator::config::Config;
use asterius_operator::kubernetes::wait_for_crds;
use asterius_operator::reconcilers::{Context, StaticProxyReconciler, StaticSiteReconciler};
use asterius_operator::types::{AzureStaticHost, StaticHost};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing, RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting asterius operator");

    // Load configuration
    let config = Config::from_env()?;
    info!(
        "Configuration loaded: watch_namespace={}, default_proxy_service={}",
        config.watch_namespace.as_deref().unwrap_or("<all>"),
        config.default_proxy_service
    );

    // Create Kubernetes client
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    // Wait for our CRDs before starting reconcilers
    info!("Waiting for asterius.fr CRDs to become available...");
    wait_for_crds(&client).await?;

    let context = Arc::new(Context::new(client, config));

    let azure_static_hosts = StaticSiteReconciler::<AzureStaticHost>::new(context.clone());
    let static_hosts = StaticSiteReconciler::<StaticHost>::new(context.clone());
    let static_proxies = StaticProxyReconciler::new(context);

    info!("Starting reconcilers...");

    tokio::try_join!(
        azure_static_hosts.run(),
        static_hosts.run(),
        static_proxies.run()
    )?;

    // This should never be reached as reconcilers run forever
    warn!("All reconcilers stopped unexpectedly");
    Ok(())
}
