//! Delegation authorization
//!
//! A delegation from `source` to `target` is authorized only when:
//! 1. the source template may delegate at all,
//! 2. the target is in the source's allow-list (an empty list allows any),
//! 3. the target is not pinned to a workflow other than the current one.
//!
//! Each failed condition has its own error variant so callers can explain
//! the denial to the requesting agent.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Delegation permissions attached to a specialist template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelegationConfig {
    pub can_delegate: bool,
    /// Target types this role may delegate to; empty means unrestricted
    pub allowed_delegates: BTreeSet<String>,
    /// Only delegatable while this workflow is running
    pub restricted_to_workflow: Option<String>,
    pub supervisor_can_invoke: bool,
}

impl Default for DelegationConfig {
    /// Cannot delegate, but may be invoked from anywhere.
    fn default() -> Self {
        Self {
            can_delegate: false,
            allowed_delegates: BTreeSet::new(),
            restricted_to_workflow: None,
            supervisor_can_invoke: true,
        }
    }
}

impl DelegationConfig {
    /// A role that may delegate to the given types (none = any type)
    pub fn delegating<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            can_delegate: true,
            allowed_delegates: allowed.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn restricted_to(mut self, workflow: impl Into<String>) -> Self {
        self.restricted_to_workflow = Some(workflow.into());
        self
    }

    pub fn supervisor_can_invoke(mut self, allowed: bool) -> Self {
        self.supervisor_can_invoke = allowed;
        self
    }
}

/// Why a delegation was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DelegationError {
    #[error("agent type '{source_type}' is not permitted to delegate")]
    NotPermitted { source_type: String },

    #[error("agent type '{target_type}' is not in the delegate allow-list of '{source_type}'")]
    TargetNotAllowed {
        source_type: String,
        target_type: String,
    },

    #[error(
        "agent type '{target_type}' is restricted to workflow '{required}' (current workflow: {current:?})"
    )]
    WorkflowMismatch {
        target_type: String,
        required: String,
        current: Option<String>,
    },
}

/// Evaluate the three delegation conditions in order.
pub fn check_delegation(
    source_type: &str,
    source: &DelegationConfig,
    target_type: &str,
    target: &DelegationConfig,
    current_workflow: Option<&str>,
) -> Result<(), DelegationError> {
    if !source.can_delegate {
        return Err(DelegationError::NotPermitted {
            source_type: source_type.to_string(),
        });
    }

    if !source.allowed_delegates.is_empty() && !source.allowed_delegates.contains(target_type) {
        return Err(DelegationError::TargetNotAllowed {
            source_type: source_type.to_string(),
            target_type: target_type.to_string(),
        });
    }

    if let Some(required) = &target.restricted_to_workflow {
        if current_workflow != Some(required.as_str()) {
            return Err(DelegationError::WorkflowMismatch {
                target_type: target_type.to_string(),
                required: required.clone(),
                current: current_workflow.map(ToString::to_string),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_cannot_delegate() {
        let err = check_delegation(
            "worker",
            &DelegationConfig::default(),
            "other",
            &DelegationConfig::default(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, DelegationError::NotPermitted { .. }));
    }

    #[test]
    fn test_empty_allow_list_is_unrestricted() {
        let source = DelegationConfig::delegating(Vec::<String>::new());
        assert!(check_delegation(
            "lead",
            &source,
            "anything",
            &DelegationConfig::default(),
            None
        )
        .is_ok());
    }

    #[test]
    fn test_allow_list_rejects_unlisted_target() {
        let source = DelegationConfig::delegating(["research-worker"]);
        let err = check_delegation(
            "lead",
            &source,
            "browser",
            &DelegationConfig::default(),
            None,
        )
        .unwrap_err();
        assert_eq!(
            err,
            DelegationError::TargetNotAllowed {
                source_type: "lead".to_string(),
                target_type: "browser".to_string(),
            }
        );
    }

    #[test]
    fn test_workflow_restriction() {
        let source = DelegationConfig::delegating(["research-worker"]);
        let target = DelegationConfig::default().restricted_to("deep-research");

        assert!(check_delegation(
            "lead",
            &source,
            "research-worker",
            &target,
            Some("deep-research")
        )
        .is_ok());

        let err = check_delegation("lead", &source, "research-worker", &target, Some("other"))
            .unwrap_err();
        assert!(matches!(err, DelegationError::WorkflowMismatch { .. }));
        assert!(err.to_string().contains("deep-research"));
    }

    #[test]
    fn test_conditions_are_checked_in_order() {
        // Both the allow-list and the workflow fail; the allow-list wins.
        let source = DelegationConfig::delegating(["a"]);
        let target = DelegationConfig::default().restricted_to("wf");
        let err = check_delegation("s", &source, "b", &target, None).unwrap_err();
        assert!(matches!(err, DelegationError::TargetNotAllowed { .. }));
    }
}
