// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes utilities for CRD discovery and converging cluster objects.

pub mod crd;
pub mod driver;
pub mod retry;

pub use crd::wait_for_crds;
pub use driver::{Driver, Missing};
pub use retry::RetryPolicy;
