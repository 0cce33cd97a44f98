//! # Selector Sets
//!
//! An ordered, duplicate-free list of selectors that remembers which facet
//! it came from. `remove` and `get` return new sets of the same type, so
//! filters chain without touching the original.

use crate::contract::ContractAbi;
use crate::error::FacetError;
use crate::primitives::{EXCLUDED_INITIALIZER, Selector};
use crate::signature::FunctionKey;
use alloy_primitives::Address;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Lookup-only reference to the facet a set was derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacetRef {
    abi: Arc<ContractAbi>,
    address: Option<Address>,
}

impl FacetRef {
    /// Reference an undeployed facet interface.
    #[must_use]
    pub fn new(abi: Arc<ContractAbi>) -> Self {
        Self { abi, address: None }
    }

    /// Reference a deployed facet.
    #[must_use]
    pub fn deployed(abi: Arc<ContractAbi>, address: Address) -> Self {
        Self {
            abi,
            address: Some(address),
        }
    }

    /// Contract name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.abi.name
    }

    /// Deployed address, if any.
    #[must_use]
    pub fn address(&self) -> Option<Address> {
        self.address
    }

    /// The facet's interface.
    #[must_use]
    pub fn abi(&self) -> &ContractAbi {
        &self.abi
    }
}

/// Selectors of one facet, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorSet {
    selectors: Vec<Selector>,
    owner: FacetRef,
}

impl SelectorSet {
    /// Every routable selector of a facet.
    ///
    /// Skips the `init(bytes)` entry point. Two signatures hashing to the
    /// same selector are rejected.
    pub fn from_facet_interface(owner: FacetRef) -> Result<Self, FacetError> {
        let mut seen: BTreeSet<Selector> = BTreeSet::new();
        let mut selectors = Vec::with_capacity(owner.abi.functions.len());

        for function in &owner.abi.functions {
            let canonical = function.signature.canonical();
            if canonical == EXCLUDED_INITIALIZER {
                continue;
            }
            let selector = function.selector();
            if !seen.insert(selector) {
                let first = owner
                    .abi
                    .function_by_selector(selector)
                    .map(|f| f.signature.canonical())
                    .unwrap_or_default();
                return Err(FacetError::DuplicateSelector {
                    contract: owner.abi.name.clone(),
                    selector,
                    first,
                    second: canonical,
                });
            }
            selectors.push(selector);
        }

        Ok(Self { selectors, owner })
    }

    /// Every routable selector of an ABI that has no address yet.
    pub fn from_abi(abi: Arc<ContractAbi>) -> Result<Self, FacetError> {
        Self::from_facet_interface(FacetRef::new(abi))
    }

    /// A new set without the selectors matching any of `keys`.
    ///
    /// Keys that match nothing are ignored.
    #[must_use]
    pub fn remove<S: AsRef<str>>(&self, keys: &[S]) -> Self {
        let targets = self.resolve(keys);
        self.filtered(|s| !targets.contains(s))
    }

    /// A new set with only the selectors matching `keys`.
    #[must_use]
    pub fn get<S: AsRef<str>>(&self, keys: &[S]) -> Self {
        let targets = self.resolve(keys);
        self.filtered(|s| targets.contains(s))
    }

    /// The owning facet.
    #[must_use]
    pub fn owner(&self) -> &FacetRef {
        &self.owner
    }

    /// Selectors in order.
    #[must_use]
    pub fn selectors(&self) -> &[Selector] {
        &self.selectors
    }

    /// Consume into the plain selector list.
    #[must_use]
    pub fn into_selectors(self) -> Vec<Selector> {
        self.selectors
    }

    /// True if `selector` is in the set.
    #[must_use]
    pub fn contains(&self, selector: Selector) -> bool {
        self.selectors.contains(&selector)
    }

    /// Number of selectors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.selectors.len()
    }

    /// True if empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }

    /// Canonical signature behind a selector, for diagnostics.
    #[must_use]
    pub fn signature_of(&self, selector: Selector) -> Option<String> {
        if !self.contains(selector) {
            return None;
        }
        self.owner
            .abi
            .function_by_selector(selector)
            .map(|f| f.signature.canonical())
    }

    fn resolve<S: AsRef<str>>(&self, keys: &[S]) -> BTreeSet<Selector> {
        keys.iter()
            .filter_map(|k| FunctionKey::parse(k.as_ref()))
            .filter_map(|k| self.owner.abi.resolve(&k))
            .collect()
    }

    fn filtered(&self, keep: impl Fn(&Selector) -> bool) -> Self {
        Self {
            selectors: self.selectors.iter().copied().filter(|s| keep(s)).collect(),
            owner: self.owner.clone(),
        }
    }
}

/// Drop every selector matching one of `keys` from a plain list.
///
/// Keys are signatures or `0x` selector literals. A plain list has no ABI
/// to resolve bare names against, so those are ignored like any other
/// unresolvable key.
#[must_use]
pub fn remove_selectors<S: AsRef<str>>(selectors: &[Selector], keys: &[S]) -> Vec<Selector> {
    let targets: BTreeSet<Selector> = keys
        .iter()
        .filter_map(|k| FunctionKey::parse(k.as_ref()))
        .filter_map(|k| k.selector())
        .collect();
    selectors
        .iter()
        .copied()
        .filter(|s| !targets.contains(s))
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::selector;

    fn facet() -> Arc<ContractAbi> {
        Arc::new(
            ContractAbi::new(
                "TwinHandlerFacet",
                &[
                    "init(bytes)",
                    "initialize()",
                    "createTwin(uint256)",
                    "removeTwin(uint256)",
                    "getTwin(uint256)",
                ],
            )
            .unwrap(),
        )
    }

    #[test]
    fn excluded_initializer_is_never_routed() {
        let set = SelectorSet::from_abi(facet()).unwrap();
        assert_eq!(set.len(), 4);
        assert!(!set.contains(selector("init(bytes)").unwrap()));
        assert!(set.contains(selector("initialize()").unwrap()));
    }

    #[test]
    fn remove_then_get_is_empty() {
        let set = SelectorSet::from_abi(facet()).unwrap();
        let keys = ["createTwin(uint256)", "getTwin"];
        assert!(set.remove(&keys).get(&keys).is_empty());
    }

    #[test]
    fn get_keeps_declaration_order_and_owner() {
        let set = SelectorSet::from_abi(facet()).unwrap();
        let got = set.get(&["getTwin(uint256)", "createTwin(uint256)"]);
        assert_eq!(
            got.selectors(),
            &[
                selector("createTwin(uint256)").unwrap(),
                selector("getTwin(uint256)").unwrap()
            ]
        );
        assert_eq!(got.owner().name(), "TwinHandlerFacet");
    }

    #[test]
    fn unknown_keys_leave_set_unchanged() {
        let set = SelectorSet::from_abi(facet()).unwrap();
        let same = set.remove(&["nothing(uint8)", "missing", "(("]);
        assert_eq!(same, set);
    }

    #[test]
    fn remove_accepts_selector_literals() {
        let set = SelectorSet::from_abi(facet()).unwrap();
        let init = selector("initialize()").unwrap().to_string();
        let trimmed = set.remove(&[init]);
        assert_eq!(trimmed.len(), 3);
        assert!(!trimmed.contains(selector("initialize()").unwrap()));
    }

    #[test]
    fn chained_filters_compose() {
        let set = SelectorSet::from_abi(facet()).unwrap();
        let chained = set
            .remove(&["initialize()"])
            .remove(&["removeTwin(uint256)"])
            .get(&["createTwin(uint256)", "removeTwin(uint256)"]);
        assert_eq!(chained.selectors(), &[selector("createTwin(uint256)").unwrap()]);
        assert_eq!(chained.owner(), set.owner());
    }

    #[test]
    fn signature_of_reports_canonical_form() {
        let set = SelectorSet::from_abi(facet()).unwrap();
        let sel = selector("removeTwin(uint256)").unwrap();
        assert_eq!(set.signature_of(sel).as_deref(), Some("removeTwin(uint256)"));
        assert_eq!(set.remove(&["removeTwin"]).signature_of(sel), None);
    }

    #[test]
    fn remove_selectors_on_plain_list() {
        let list = vec![selector("a()").unwrap(), selector("b()").unwrap()];
        assert_eq!(remove_selectors(&list, &["a()"]), vec![selector("b()").unwrap()]);
    }

    #[test]
    fn remove_selectors_accepts_selector_literals() {
        let a = selector("a()").unwrap();
        let b = selector("b()").unwrap();
        let literal = a.to_string();
        assert_eq!(remove_selectors(&[a, b], &[literal.as_str()]), vec![b]);
        assert_eq!(remove_selectors(&[a, b], &["a", "(("]), vec![a, b]);
    }
}
