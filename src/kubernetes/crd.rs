// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! CRD availability checking utilities

use crate::constants::crd::{POLL_INTERVAL_SECS, POLL_MAX_INTERVAL_SECS};
use crate::constants::{API_GROUP, API_VERSION};
use crate::error::Result;
use kube::{discovery::Discovery, Client};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Kinds the operator reconciles
pub const KINDS: [&str; 3] = ["AzureStaticHost", "StaticHost", "StaticProxy"];

/// Wait until every asterius.fr/v1 CRD is served by the API server.
/// Polls with exponential backoff starting at POLL_INTERVAL_SECS seconds.
pub async fn wait_for_crds(client: &Client) -> Result<()> {
    let mut interval = POLL_INTERVAL_SECS;

    loop {
        match missing_kinds(client).await {
            Ok(missing) if missing.is_empty() => {
                info!("CRDs ({}/{}) are available", API_GROUP, API_VERSION);
                return Ok(());
            }
            Ok(missing) => {
                info!(
                    "CRDs {:?} ({}/{}) not yet available, waiting {} seconds...",
                    missing, API_GROUP, API_VERSION, interval
                );
            }
            Err(e) => {
                warn!(
                    "Error checking for CRDs: {}, retrying in {} seconds...",
                    e, interval
                );
            }
        }

        sleep(Duration::from_secs(interval)).await;

        interval = (interval * 2).min(POLL_MAX_INTERVAL_SECS);
    }
}

/// Kinds from KINDS not yet discoverable
async fn missing_kinds(client: &Client) -> Result<Vec<&'static str>> {
    let discovery = Discovery::new(client.clone())
        .filter(&[API_GROUP])
        .run()
        .await?;

    let served: Vec<String> = discovery
        .groups()
        .filter(|group| group.name() == API_GROUP)
        .flat_map(|group| group.recommended_resources())
        .filter(|(ar, _)| ar.version == API_VERSION)
        .map(|(ar, _)| ar.kind)
        .collect();

    Ok(KINDS
        .into_iter()
        .filter(|kind| !served.iter().any(|s| s == kind))
        .collect())
}
