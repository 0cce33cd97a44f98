//! # Facet Cuts
//!
//! A cut is one proposed change to the routing table: add, replace or
//! remove a list of selectors for a facet address.

use crate::contract::ContractAbi;
use crate::error::FacetError;
use crate::primitives::Selector;
use crate::selector_set::{FacetRef, SelectorSet};
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// What a cut does to its selectors.
///
/// The discriminants are the on-wire action codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FacetCutAction {
    Add = 0,
    Replace = 1,
    Remove = 2,
}

impl FacetCutAction {
    /// Wire code.
    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Parse a wire code.
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Add),
            1 => Some(Self::Replace),
            2 => Some(Self::Remove),
            _ => None,
        }
    }
}

impl fmt::Display for FacetCutAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Add => "add",
            Self::Replace => "replace",
            Self::Remove => "remove",
        };
        f.write_str(name)
    }
}

/// One routing-table change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetCut {
    pub facet_address: Address,
    pub action: FacetCutAction,
    pub selectors: Vec<Selector>,
}

impl FacetCut {
    /// Build a cut from parts.
    #[must_use]
    pub fn new(facet_address: Address, action: FacetCutAction, selectors: Vec<Selector>) -> Self {
        Self {
            facet_address,
            action,
            selectors,
        }
    }

    /// The `(address, action, selectors)` tuple in wire order.
    #[must_use]
    pub fn to_tuple(&self) -> (Address, u8, Vec<Selector>) {
        (self.facet_address, self.action.code(), self.selectors.clone())
    }
}

// =============================================================================
// FACET
// =============================================================================

/// A deployed facet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Facet {
    pub name: String,
    pub address: Address,
    pub abi: Arc<ContractAbi>,
    /// Encoded initializer call; empty when the facet needs none.
    pub init_payload: Vec<u8>,
}

impl Facet {
    /// A deployed facet without an initializer call.
    #[must_use]
    pub fn new(abi: Arc<ContractAbi>, address: Address) -> Self {
        Self {
            name: abi.name.clone(),
            address,
            abi,
            init_payload: Vec::new(),
        }
    }

    /// Attach the encoded initializer call.
    #[must_use]
    pub fn with_init_payload(mut self, payload: Vec<u8>) -> Self {
        self.init_payload = payload;
        self
    }

    /// The initializer call, if any.
    #[must_use]
    pub fn init_payload(&self) -> Option<&[u8]> {
        (!self.init_payload.is_empty()).then_some(self.init_payload.as_slice())
    }

    /// Routable selectors of this facet, bound to its address.
    pub fn selector_set(&self) -> Result<SelectorSet, FacetError> {
        SelectorSet::from_facet_interface(FacetRef::deployed(self.abi.clone(), self.address))
    }
}

// =============================================================================
// CUT BUILDER
// =============================================================================

fn build<S: AsRef<str>>(
    facet: &Facet,
    action: FacetCutAction,
    omit: &[S],
) -> Result<FacetCut, FacetError> {
    let selectors = facet.selector_set()?.remove(omit).into_selectors();
    Ok(FacetCut::new(facet.address, action, selectors))
}

/// Route every selector of `facet`, except `omit`, to it.
pub fn add_cut<S: AsRef<str>>(facet: &Facet, omit: &[S]) -> Result<FacetCut, FacetError> {
    build(facet, FacetCutAction::Add, omit)
}

/// Re-route every selector of `facet`, except `omit`, to it.
pub fn replace_cut<S: AsRef<str>>(facet: &Facet, omit: &[S]) -> Result<FacetCut, FacetError> {
    build(facet, FacetCutAction::Replace, omit)
}

/// Unroute every selector of `facet`, except `omit`.
///
/// The address is kept for diagnostics; the table ignores it.
pub fn remove_cut<S: AsRef<str>>(facet: &Facet, omit: &[S]) -> Result<FacetCut, FacetError> {
    build(facet, FacetCutAction::Remove, omit)
}

/// Position of `address` in a loupe `facets()` listing.
#[must_use]
pub fn find_address_position(address: Address, facets: &[(Address, Vec<Selector>)]) -> Option<usize> {
    facets.iter().position(|(a, _)| *a == address)
}

// =============================================================================
// TESTS
// =============================================================================
