//! # Upgrade Errors
//!
//! Everything an upgrade attempt can fail with. Environment reasons are
//! carried verbatim; nothing here is retried automatically.

use crate::environment::{EnvError, TxHandle};
use facetcut_core::{Address, FacetError, Revert, Selector};
use thiserror::Error;

/// Failure of one upgrade step.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UpgradeError {
    /// The plan itself is unusable.
    #[error("invalid upgrade plan: {0}")]
    Planning(String),

    /// Local computation failed.
    #[error(transparent)]
    Facet(#[from] FacetError),

    /// A facet could not be deployed. Retryable; deployed siblings are kept.
    #[error("failed to deploy facet `{facet}`: {reason}")]
    DeploymentFailed { facet: String, reason: String },

    /// An Add cut targets a selector owned by another facet.
    #[error("selector {selector} already routed to {existing}, cannot add it for {proposed}")]
    SelectorCollision {
        selector: Selector,
        existing: Address,
        proposed: Address,
    },

    /// A cut is malformed or inconsistent with the table.
    #[error("invalid cut #{index}: {reason}")]
    InvalidCutAction { index: usize, reason: String },

    /// The submitter lacks the upgrade role.
    #[error("{sender} is not authorized to upgrade")]
    UnauthorizedUpgrader { sender: Address },

    /// The init call reverted and the whole upgrade was rolled back.
    #[error("initialization reverted: {reason}")]
    InitializationReverted { reason: String },

    /// Any other revert.
    #[error("transaction reverted: {reason}")]
    Reverted { reason: String },

    /// The confirmation wait was cancelled; on-chain effect unknown.
    #[error("stopped waiting for {tx}; its outcome is unknown and must be re-queried")]
    ConfirmationCancelled { tx: TxHandle },

    /// Transport or environment failure outside a revert.
    #[error("execution environment error: {0}")]
    Environment(String),
}

impl UpgradeError {
    /// True when a new attempt may succeed without changing the plan.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DeploymentFailed { .. } | Self::Environment(_) | Self::ConfirmationCancelled { .. }
        )
    }
}

impl From<Revert> for UpgradeError {
    fn from(revert: Revert) -> Self {
        match revert {
            Revert::SelectorCollision {
                selector,
                existing,
                proposed,
            } => Self::SelectorCollision {
                selector,
                existing,
                proposed,
            },
            Revert::InvalidCutAction { index, reason } => Self::InvalidCutAction { index, reason },
            Revert::UnauthorizedUpgrader { sender } => Self::UnauthorizedUpgrader { sender },
            Revert::InitializationReverted { reason } => Self::InitializationReverted { reason },
            Revert::Other(reason) => Self::Reverted { reason },
        }
    }
}

impl From<EnvError> for UpgradeError {
    fn from(error: EnvError) -> Self {
        match error {
            EnvError::Reverted(revert) => revert.into(),
            other => Self::Environment(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revert_reasons_survive_mapping() {
        let err: UpgradeError = Revert::InitializationReverted {
            reason: "Access denied, caller doesn't have role".into(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "initialization reverted: Access denied, caller doesn't have role"
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn deployment_failures_are_retryable() {
        let err = UpgradeError::DeploymentFailed {
            facet: "B".into(),
            reason: "out of gas".into(),
        };
        assert!(err.is_retryable());
        assert!(!UpgradeError::UnauthorizedUpgrader { sender: Address::ZERO }.is_retryable());
    }

    #[test]
    fn transport_errors_become_environment_errors() {
        let err: UpgradeError = EnvError::Transport("connection reset".into()).into();
        assert_eq!(
            err,
            UpgradeError::Environment("transport failure: connection reset".into())
        );
    }
}
