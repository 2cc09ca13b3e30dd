// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::{nginx, retry};
use crate::kubernetes::retry::RetryPolicy;
use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Operator configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Restrict watches to a single namespace, all namespaces when unset
    pub watch_namespace: Option<String>,
    /// Ingress backend for static hosts without a proxy service override
    pub default_proxy_service: String,
    pub retry_attempts: u32,
    pub retry_wait_secs: u64,
    pub retry_multiplier: u32,
    /// Restart proxy workloads on every update, even when the rendered config is unchanged
    pub restart_on_unchanged_config: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            watch_namespace: None,
            default_proxy_service: nginx::DEFAULT_PROXY_SERVICE.to_string(),
            retry_attempts: retry::ATTEMPTS,
            retry_wait_secs: retry::WAIT_SECS,
            retry_multiplier: retry::MULTIPLIER,
            restart_on_unchanged_config: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let watch_namespace = lookup("WATCH_NAMESPACE").filter(|ns| !ns.is_empty());
        let default_proxy_service =
            lookup("DEFAULT_PROXY_SERVICE").unwrap_or(defaults.default_proxy_service);

        let retry_attempts: u32 =
            parse_or(&lookup, "API_RETRY_ATTEMPTS", defaults.retry_attempts)?;
        if retry_attempts == 0 {
            anyhow::bail!("API_RETRY_ATTEMPTS must be at least 1");
        }

        Ok(Config {
            watch_namespace,
            default_proxy_service,
            retry_attempts,
            retry_wait_secs: parse_or(&lookup, "API_RETRY_WAIT_SECONDS", defaults.retry_wait_secs)?,
            retry_multiplier: parse_or(&lookup, "API_RETRY_MULTIPLIER", defaults.retry_multiplier)?,
            restart_on_unchanged_config: parse_or(
                &lookup,
                "RESTART_ON_UNCHANGED_CONFIG",
                defaults.restart_on_unchanged_config,
            )?,
        })
    }

    /// Retry policy applied to every mutating API call
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts,
            initial_delay: Duration::from_secs(self.retry_wait_secs),
            multiplier: self.retry_multiplier,
            max_delay: Duration::from_secs(retry::MAX_WAIT_SECS),
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {}", key, raw)),
        None => Ok(default),
    }
}
