// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

pub const CONDITION_READY: &str = "Ready";
pub const CONDITION_TRUE: &str = "True";
pub const CONDITION_FALSE: &str = "False";

/// Reasons reported on the Ready condition
pub mod reasons {
    pub const RECONCILED: &str = "Reconciled";
    pub const PARTIAL_FAILURE: &str = "PartialFailure";
    pub const VALIDATION_FAILED: &str = "ValidationFailed";
    pub const API_ERROR: &str = "ApiError";
    /// Cleanup has started; objects found missing from here on were removed by the operator
    pub const DELETING: &str = "Deleting";
}

/// Status shared by all asterius.fr custom resources
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceStatus {
    /// Generation last converged without errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    /// sha256 of the nginx config last rolled out to proxy workloads
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<Condition>>,
}

impl ResourceStatus {
    pub fn is_ready(&self) -> bool {
        self.conditions.as_ref().is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.condition_type == CONDITION_READY && c.status == CONDITION_TRUE)
        })
    }

    /// The Ready condition, if reported
    pub fn ready_condition(&self) -> Option<&Condition> {
        self.conditions
            .as_ref()
            .and_then(|c| c.iter().find(|c| c.condition_type == CONDITION_READY))
    }

    /// Whether the Ready condition carries `reason`
    pub fn has_reason(&self, reason: &str) -> bool {
        self.ready_condition()
            .is_some_and(|c| c.reason.as_deref() == Some(reason))
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

impl Condition {
    /// Build a Ready condition, keeping the previous transition time if the status did not flip
    pub fn ready(
        ready: bool,
        reason: &str,
        message: impl Into<String>,
        previous: Option<&Condition>,
    ) -> Self {
        let status = if ready { CONDITION_TRUE } else { CONDITION_FALSE };
        let last_transition_time = match previous {
            Some(prev) if prev.status == status => prev.last_transition_time.clone(),
            _ => Some(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
        };

        Condition {
            condition_type: CONDITION_READY.to_string(),
            status: status.to_string(),
            reason: Some(reason.to_string()),
            message: Some(message.into()),
            last_transition_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_ready_with_ready_condition() {
        let status = ResourceStatus {
            conditions: Some(vec![Condition::ready(true, reasons::RECONCILED, "ok", None)]),
            ..Default::default()
        };
        assert!(status.is_ready());
    }

    #[test]
    fn test_is_ready_with_no_conditions() {
        assert!(!ResourceStatus::default().is_ready());
    }

    #[test]
    fn test_is_ready_false_condition() {
        let status = ResourceStatus {
            conditions: Some(vec![Condition::ready(
                false,
                reasons::PARTIAL_FAILURE,
                "1 workload failed",
                None,
            )]),
            ..Default::default()
        };
        assert!(!status.is_ready());
        assert_eq!(
            status.ready_condition().and_then(|c| c.reason.as_deref()),
            Some(reasons::PARTIAL_FAILURE)
        );
        assert!(status.has_reason(reasons::PARTIAL_FAILURE));
        assert!(!status.has_reason(reasons::DELETING));
    }

    #[test]
    fn test_transition_time_kept_when_status_unchanged() {
        let mut previous = Condition::ready(true, reasons::RECONCILED, "ok", None);
        previous.last_transition_time = Some("2026-01-01T00:00:00Z".to_string());

        let same = Condition::ready(true, reasons::RECONCILED, "still ok", Some(&previous));
        assert_eq!(same.last_transition_time.as_deref(), Some("2026-01-01T00:00:00Z"));

        let flipped = Condition::ready(false, reasons::API_ERROR, "down", Some(&previous));
        assert_ne!(flipped.last_transition_time.as_deref(), Some("2026-01-01T00:00:00Z"));
    }
}
