//! # Loupe Client
//!
//! Typed routing-table queries against a live diamond, built on
//! [`ExecutionEnvironment::call`]. Also hosts the preflight check run
//! before a cut is submitted.

use crate::environment::ExecutionEnvironment;
use crate::error::UpgradeError;
use facetcut_core::abi_codec::{
    decode_address, decode_address_array, decode_selector_array, encode_address, encode_selector,
};
use facetcut_core::{Address, FacetCut, FacetCutAction, Revert, Selector};
use std::collections::BTreeMap;

/// Read-only view of a diamond's routing table.
pub struct LoupeClient<'a, E: ?Sized> {
    env: &'a E,
    diamond: Address,
}

impl<'a, E: ExecutionEnvironment + ?Sized> LoupeClient<'a, E> {
    #[must_use]
    pub fn new(env: &'a E, diamond: Address) -> Self {
        Self { env, diamond }
    }

    /// The facet a selector is routed to, if any.
    pub async fn facet_address(&self, selector: Selector) -> Result<Option<Address>, UpgradeError> {
        let out = self
            .env
            .call(self.diamond, "facetAddress(bytes4)", &encode_selector(selector))
            .await?;
        let facet = decode_address(&out)?;
        Ok((facet != Address::ZERO).then_some(facet))
    }

    /// Facet addresses in routing order.
    pub async fn facet_addresses(&self) -> Result<Vec<Address>, UpgradeError> {
        let out = self.env.call(self.diamond, "facetAddresses()", &[]).await?;
        Ok(decode_address_array(&out)?)
    }

    /// Selectors routed to `facet`.
    pub async fn facet_function_selectors(
        &self,
        facet: Address,
    ) -> Result<Vec<Selector>, UpgradeError> {
        let out = self
            .env
            .call(
                self.diamond,
                "facetFunctionSelectors(address)",
                &encode_address(facet),
            )
            .await?;
        Ok(decode_selector_array(&out)?)
    }

    /// Every facet with its selectors.
    pub async fn facets(&self) -> Result<Vec<(Address, Vec<Selector>)>, UpgradeError> {
        let mut facets = Vec::new();
        for facet in self.facet_addresses().await? {
            let selectors = self.facet_function_selectors(facet).await?;
            facets.push((facet, selectors));
        }
        Ok(facets)
    }

    /// Check Add cuts against the live table and against each other.
    ///
    /// Replace and Remove cuts are left to the table owner. The owner's
    /// check at submission time stays authoritative.
    pub async fn preflight(&self, cuts: &[FacetCut]) -> Result<(), UpgradeError> {
        let mut claimed: BTreeMap<Selector, Address> = BTreeMap::new();
        for cut in cuts.iter().filter(|c| c.action == FacetCutAction::Add) {
            for &selector in &cut.selectors {
                let existing = match claimed.get(&selector) {
                    Some(owner) => Some(*owner),
                    None => self.facet_address(selector).await?,
                };
                match existing {
                    Some(existing) if existing != cut.facet_address => {
                        return Err(Revert::SelectorCollision {
                            selector,
                            existing,
                            proposed: cut.facet_address,
                        }
                        .into());
                    }
                    _ => {
                        claimed.insert(selector, cut.facet_address);
                    }
                }
            }
        }
        Ok(())
    }
}
