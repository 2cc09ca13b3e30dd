// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use kube::runtime::finalizer;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OperatorError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Invalid resource spec: {0}")]
    Validation(String),

    #[error("Reconciliation partially failed: {0}")]
    PartialFailure(String),

    #[error("Resource missing during deletion: {0}")]
    MissingOnDelete(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Finalizer error: {0}")]
    FinalizerError(#[source] Box<finalizer::Error<OperatorError>>),
}

impl OperatorError {
    /// HTTP status code of the underlying API error, if any
    pub fn api_code(&self) -> Option<u16> {
        match self {
            OperatorError::KubeError(kube::Error::Api(resp)) => Some(resp.code),
            _ => None,
        }
    }

    /// Errors that will not go away by retrying until the resource changes
    pub fn is_permanent(&self) -> bool {
        match self {
            OperatorError::Validation(_) | OperatorError::MissingOnDelete(_) => true,
            OperatorError::FinalizerError(e) => matches!(
                e.as_ref(),
                finalizer::Error::ApplyFailed(inner) | finalizer::Error::CleanupFailed(inner)
                    if inner.is_permanent()
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, OperatorError>;
