// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Bounded exponential backoff around Kubernetes API calls.

use crate::constants::retry;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Error classification for retry behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network issues, throttling, server errors: retried with backoff
    Transient,
    /// Not found and conflict: meaningful to the caller, returned immediately
    Final,
}

pub fn classify(error: &kube::Error) -> ErrorKind {
    match error {
        kube::Error::Api(resp) if resp.code == 404 || resp.code == 409 => ErrorKind::Final,
        _ => ErrorKind::Transient,
    }
}

pub fn is_not_found(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(resp) if resp.code == 404)
}

pub fn is_conflict(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(resp) if resp.code == 409)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: u32,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: retry::ATTEMPTS,
            initial_delay: Duration::from_secs(retry::WAIT_SECS),
            multiplier: retry::MULTIPLIER,
            max_delay: Duration::from_secs(retry::MAX_WAIT_SECS),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after the given (1-based) failed attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self
            .multiplier
            .max(1)
            .saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    /// Run `operation` until it succeeds, fails with a final error, or attempts run out.
    pub async fn run<T, F, Fut>(&self, what: &str, mut operation: F) -> Result<T, kube::Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, kube::Error>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "{} succeeded after retry", what);
                    }
                    return Ok(value);
                }
                Err(e) if classify(&e) == ErrorKind::Final => return Err(e),
                Err(e) if attempt >= self.max_attempts => {
                    warn!(attempt, "{} failed, giving up: {}", what, e);
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "{} failed, retrying: {}",
                        what,
                        e
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
