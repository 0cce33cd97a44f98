//! # Interface Identifiers
//!
//! The interface id of a contract type is the XOR of the selectors of the
//! functions it declares itself. Artifacts only expose the full function
//! list, so the inherited part is cancelled by XOR-ing in the id of every
//! ancestor.
//!
//! Each distinct ancestor is visited exactly once, however many inheritance
//! paths lead to it. XOR is self-inverse: cancelling a shared base once per
//! path would re-introduce it whenever the path count is even. Results are
//! memoized per type.

use crate::contract::ContractRegistry;
use crate::error::FacetError;
use crate::primitives::InterfaceId;
use std::collections::{BTreeMap, BTreeSet};

/// Computes interface ids against a registry.
#[derive(Debug)]
pub struct InterfaceIdCalculator<'a> {
    registry: &'a ContractRegistry,
    memo: BTreeMap<String, InterfaceId>,
}

impl<'a> InterfaceIdCalculator<'a> {
    /// Create a calculator with an empty memo.
    #[must_use]
    pub fn new(registry: &'a ContractRegistry) -> Self {
        Self {
            registry,
            memo: BTreeMap::new(),
        }
    }

    /// Interface id of `name` with inherited functions cancelled.
    pub fn interface_id(&mut self, name: &str) -> Result<InterfaceId, FacetError> {
        if let Some(id) = self.memo.get(name) {
            return Ok(*id);
        }

        let mut acc = self.full_fold(name)?;
        for ancestor in self.ancestors(name)? {
            acc ^= self.interface_id(&ancestor)?.to_u32();
        }

        let id = InterfaceId::from_u32(acc);
        self.memo.insert(name.to_string(), id);
        Ok(id)
    }

    /// Interface id of `name`, optionally without consulting its bases.
    pub fn interface_id_with(
        &mut self,
        name: &str,
        skip_base_check: bool,
    ) -> Result<InterfaceId, FacetError> {
        if skip_base_check {
            return Ok(InterfaceId::from_u32(self.full_fold(name)?));
        }
        self.interface_id(name)
    }

    /// Distinct transitive ancestors of `name`, in depth-first preorder.
    pub fn ancestors(&self, name: &str) -> Result<Vec<String>, FacetError> {
        let mut order = Vec::new();
        let mut seen = BTreeSet::new();
        let mut stack = BTreeSet::new();
        stack.insert(name.to_string());
        self.collect_ancestors(name, &mut seen, &mut stack, &mut order)?;
        Ok(order)
    }

    fn collect_ancestors(
        &self,
        name: &str,
        seen: &mut BTreeSet<String>,
        stack: &mut BTreeSet<String>,
        order: &mut Vec<String>,
    ) -> Result<(), FacetError> {
        let abi = self.registry.get(name)?;
        for base in &abi.bases {
            if stack.contains(base) {
                return Err(FacetError::InheritanceCycle(base.clone()));
            }
            if !seen.insert(base.clone()) {
                continue;
            }
            order.push(base.clone());
            stack.insert(base.clone());
            self.collect_ancestors(base, seen, stack, order)?;
            stack.remove(base);
        }
        Ok(())
    }

    /// XOR of every selector in the full function list.
    fn full_fold(&self, name: &str) -> Result<u32, FacetError> {
        let abi = self.registry.get(name)?;
        Ok(abi
            .functions
            .iter()
            .fold(0u32, |acc, f| acc ^ f.selector().to_u32()))
    }
}

/// One-shot interface id computation.
pub fn interface_id(registry: &ContractRegistry, name: &str) -> Result<InterfaceId, FacetError> {
    InterfaceIdCalculator::new(registry).interface_id(name)
}

// =============================================================================
// TESTS
// =============================================================================
