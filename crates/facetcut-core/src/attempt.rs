//! # Attempt State
//!
//! Bookkeeping carried from one upgrade attempt to the next, so a retry
//! after a partial failure never redeploys a facet whose address is known.
//!
//! ## Binary format
//!
//! ```text
//! [ magic "FCAT" (4) | format version (1) | postcard body ]
//! ```

use crate::error::FacetError;
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// File magic.
pub const ATTEMPT_MAGIC: &[u8; 4] = b"FCAT";

/// Current format version.
pub const ATTEMPT_FORMAT_VERSION: u8 = 1;

/// Deployment progress across attempts of one upgrade.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptState {
    /// Number of attempts started so far.
    attempts: u32,

    /// facet name -> assigned address
    deployed: BTreeMap<String, Address>,

    /// Address of the facet receiving the init call, once known.
    protocol_initialization_facet: Option<Address>,
}

impl AttemptState {
    /// A fresh record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the start of an attempt and return its 1-based number.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempts = self.attempts.saturating_add(1);
        self.attempts
    }

    /// Attempts started so far.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Record a successful deployment.
    pub fn record_deployment(&mut self, name: impl Into<String>, address: Address) {
        self.deployed.insert(name.into(), address);
    }

    /// Address of a facet deployed in an earlier attempt.
    #[must_use]
    pub fn address_of(&self, name: &str) -> Option<Address> {
        self.deployed.get(name).copied()
    }

    /// True if `name` needs no deployment.
    #[must_use]
    pub fn is_deployed(&self, name: &str) -> bool {
        self.deployed.contains_key(name)
    }

    /// All recorded deployments.
    pub fn deployed(&self) -> impl Iterator<Item = (&str, Address)> {
        self.deployed.iter().map(|(n, a)| (n.as_str(), *a))
    }

    /// Number of recorded deployments.
    #[must_use]
    pub fn deployed_count(&self) -> usize {
        self.deployed.len()
    }

    /// Remember the init target.
    pub fn set_protocol_initialization_facet(&mut self, address: Address) {
        self.protocol_initialization_facet = Some(address);
    }

    /// The init target, if known.
    #[must_use]
    pub fn protocol_initialization_facet(&self) -> Option<Address> {
        self.protocol_initialization_facet
    }

    /// Serialize with header.
    pub fn to_bytes(&self) -> Result<Vec<u8>, FacetError> {
        let body = postcard::to_allocvec(self).map_err(|e| FacetError::Persistence(e.to_string()))?;
        let mut out = Vec::with_capacity(ATTEMPT_MAGIC.len() + 1 + body.len());
        out.extend_from_slice(ATTEMPT_MAGIC);
        out.push(ATTEMPT_FORMAT_VERSION);
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Deserialize, checking the header.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FacetError> {
        let header_len = ATTEMPT_MAGIC.len() + 1;
        if bytes.len() < header_len || &bytes[..ATTEMPT_MAGIC.len()] != ATTEMPT_MAGIC {
            return Err(FacetError::Persistence("not an attempt-state file".into()));
        }
        let version = bytes[ATTEMPT_MAGIC.len()];
        if version != ATTEMPT_FORMAT_VERSION {
            return Err(FacetError::Persistence(format!(
                "unsupported attempt-state version {version}"
            )));
        }
        postcard::from_bytes(&bytes[header_len..]).map_err(|e| FacetError::Persistence(e.to_string()))
    }
}

// =============================================================================
// TESTS
// =============================================================================
