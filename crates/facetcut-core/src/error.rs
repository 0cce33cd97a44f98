//! # Error Types
//!
//! Two families of errors live here:
//!
//! - [`FacetError`]: local, deterministic failures while computing selectors,
//!   interface ids, cuts or payloads. Nothing has touched the environment.
//! - [`Revert`]: the reason a routing-table owner rejected a submission.
//!   A revert always means the whole batch was discarded.

use crate::primitives::Selector;
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the pure engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FacetError {
    /// A function signature could not be parsed.
    #[error("invalid function signature `{signature}`: {reason}")]
    InvalidSignature { signature: String, reason: String },

    /// A contract name is not present in the registry.
    #[error("unknown contract `{0}`")]
    UnknownContract(String),

    /// The inheritance graph loops back on itself.
    #[error("inheritance cycle through `{0}`")]
    InheritanceCycle(String),

    /// Two signatures in one facet hash to the same selector.
    #[error("selector {selector} declared twice in `{contract}` (`{first}` and `{second}`)")]
    DuplicateSelector {
        contract: String,
        selector: Selector,
        first: String,
        second: String,
    },

    /// Version tag does not fit the fixed-width field.
    #[error("invalid version tag `{tag}`: {reason}")]
    InvalidVersionTag { tag: String, reason: String },

    /// An initializer argument does not match its declared type.
    #[error("invalid argument {index} for `{signature}`: {reason}")]
    InvalidArgument {
        signature: String,
        index: usize,
        reason: String,
    },

    /// Initializer arity mismatch.
    #[error("`{signature}` expects {expected} argument(s), got {actual}")]
    ArgumentCount {
        signature: String,
        expected: usize,
        actual: usize,
    },

    /// A return value could not be decoded.
    #[error("malformed return data: {0}")]
    MalformedReturnData(String),

    /// A persisted record could not be read or written.
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl FacetError {
    pub(crate) fn signature(signature: &str, reason: impl Into<String>) -> Self {
        Self::InvalidSignature {
            signature: signature.to_string(),
            reason: reason.into(),
        }
    }
}

/// Why a routing-table owner rejected a submission.
///
/// Carried verbatim from the environment to the caller.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Revert {
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

    /// The submitter does not hold the upgrade role.
    #[error("{sender} is not authorized to upgrade")]
    UnauthorizedUpgrader { sender: Address },

    /// The init call inside the submission reverted.
    #[error("initialization reverted: {reason}")]
    InitializationReverted { reason: String },

    /// Any other revert string.
    #[error("{0}")]
    Other(String),
}
