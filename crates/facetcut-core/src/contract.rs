//! # Contract Interfaces
//!
//! The declared surface of a contract type: its full function list, the
//! mutability of each function and the names of the types it inherits from.
//! A [`ContractRegistry`] is the artifact store the rest of the engine
//! resolves names against.

use crate::error::FacetError;
use crate::primitives::{FACET_INITIALIZER_NAME, Selector};
use crate::signature::{FunctionKey, FunctionSignature};
use alloy_primitives::{B256, keccak256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// State mutability of a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mutability {
    Pure,
    View,
    #[default]
    Nonpayable,
    Payable,
}

impl Mutability {
    /// True for functions that can change state.
    #[must_use]
    pub fn is_state_modifying(self) -> bool {
        matches!(self, Self::Nonpayable | Self::Payable)
    }
}

/// One declared function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionFragment {
    pub signature: FunctionSignature,
    #[serde(default)]
    pub mutability: Mutability,
}

impl FunctionFragment {
    /// A nonpayable function.
    pub fn new(signature: &str) -> Result<Self, FacetError> {
        Ok(Self {
            signature: FunctionSignature::parse(signature)?,
            mutability: Mutability::default(),
        })
    }

    /// A function with explicit mutability.
    pub fn with_mutability(signature: &str, mutability: Mutability) -> Result<Self, FacetError> {
        Ok(Self {
            signature: FunctionSignature::parse(signature)?,
            mutability,
        })
    }

    /// Selector of this function.
    #[must_use]
    pub fn selector(&self) -> Selector {
        self.signature.selector()
    }
}

// =============================================================================
// CONTRACT ABI
// =============================================================================

/// The interface of one contract type.
///
/// `functions` is the full list as an ABI artifact presents it: inherited
/// functions are included, each at most once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractAbi {
    pub name: String,
    #[serde(default)]
    pub functions: Vec<FunctionFragment>,
    #[serde(default)]
    pub bases: Vec<String>,
}

impl ContractAbi {
    /// Build an interface from plain nonpayable signatures.
    pub fn new(name: impl Into<String>, signatures: &[&str]) -> Result<Self, FacetError> {
        let functions = signatures
            .iter()
            .map(|s| FunctionFragment::new(s))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            name: name.into(),
            functions,
            bases: Vec::new(),
        })
    }

    /// Declare base types.
    #[must_use]
    pub fn with_bases(mut self, bases: &[&str]) -> Self {
        self.bases = bases.iter().map(|b| (*b).to_string()).collect();
        self
    }

    /// Append a function.
    #[must_use]
    pub fn with_function(mut self, fragment: FunctionFragment) -> Self {
        self.functions.push(fragment);
        self
    }

    /// Find a function by canonical signature.
    #[must_use]
    pub fn function(&self, signature: &FunctionSignature) -> Option<&FunctionFragment> {
        self.functions.iter().find(|f| &f.signature == signature)
    }

    /// Find the function owning a selector.
    #[must_use]
    pub fn function_by_selector(&self, selector: Selector) -> Option<&FunctionFragment> {
        self.functions.iter().find(|f| f.selector() == selector)
    }

    /// The facet initializer, if the contract declares exactly one.
    #[must_use]
    pub fn initializer(&self) -> Option<&FunctionFragment> {
        let mut found = self
            .functions
            .iter()
            .filter(|f| f.signature.name() == FACET_INITIALIZER_NAME);
        let first = found.next()?;
        found.next().is_none().then_some(first)
    }

    /// Resolve a filtering key to a selector.
    ///
    /// Signatures and selector literals resolve without consulting the
    /// function list; bare names resolve only when unambiguous.
    #[must_use]
    pub fn resolve(&self, key: &FunctionKey) -> Option<Selector> {
        match key {
            FunctionKey::Signature(sig) => Some(sig.selector()),
            FunctionKey::Selector(selector) => Some(*selector),
            FunctionKey::Name(name) => {
                let mut matches = self.functions.iter().filter(|f| f.signature.name() == name);
                let first = matches.next()?;
                matches.next().is_none().then(|| first.selector())
            }
        }
    }

    /// Canonical signatures of state-modifying functions, excluding the
    /// facet initializer and any signature in `omit`.
    #[must_use]
    pub fn state_modifying_functions(&self, omit: &[&str]) -> Vec<String> {
        self.functions
            .iter()
            .filter(|f| f.mutability.is_state_modifying())
            .map(|f| f.signature.canonical())
            .filter(|sig| sig != "initialize()")
            .filter(|sig| !omit.iter().any(|o| o == sig))
            .collect()
    }
}

// =============================================================================
// CONTRACT REGISTRY
// =============================================================================

/// Named contract interfaces, loaded from build artifacts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContractRegistry {
    contracts: BTreeMap<String, Arc<ContractAbi>>,
}

impl ContractRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a list of interfaces. Later entries win.
    #[must_use]
    pub fn from_contracts(contracts: impl IntoIterator<Item = ContractAbi>) -> Self {
        let mut registry = Self::new();
        for abi in contracts {
            registry.insert(abi);
        }
        registry
    }

    /// Insert or replace a contract interface.
    pub fn insert(&mut self, abi: ContractAbi) {
        self.contracts.insert(abi.name.clone(), Arc::new(abi));
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, abi: ContractAbi) -> Self {
        self.insert(abi);
        self
    }

    /// Look up a contract by name.
    pub fn get(&self, name: &str) -> Result<&Arc<ContractAbi>, FacetError> {
        self.contracts
            .get(name)
            .ok_or_else(|| FacetError::UnknownContract(name.to_string()))
    }

    /// True if the registry knows `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.contracts.contains_key(name)
    }

    /// All contract names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.contracts.keys().map(String::as_str)
    }

    /// Number of contracts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    /// True if empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    /// State-modifying signatures across several facets, in facet order.
    pub fn state_modifying_functions(
        &self,
        facet_names: &[&str],
        omit: &[&str],
    ) -> Result<Vec<String>, FacetError> {
        let mut out = Vec::new();
        for name in facet_names {
            out.extend(self.get(name)?.state_modifying_functions(omit));
        }
        Ok(out)
    }

    /// Full Keccak-256 hashes of the state-modifying signatures, as used by
    /// function allowlists.
    pub fn state_modifying_function_hashes(
        &self,
        facet_names: &[&str],
        omit: &[&str],
    ) -> Result<Vec<B256>, FacetError> {
        Ok(self
            .state_modifying_functions(facet_names, omit)?
            .iter()
            .map(|sig| keccak256(sig.as_bytes()))
            .collect())
    }
}

// =============================================================================
// TESTS
// =============================================================================
