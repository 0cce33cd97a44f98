//! # Routing Table
//!
//! Deterministic model of the selector -> facet mapping kept by the
//! diamond. The authoritative table lives in the execution environment;
//! this type is what a simulated environment keeps and what tests assert
//! against.
//!
//! All mutation goes through [`RoutingTable::apply`], which stages every
//! cut on a copy and commits only if the whole batch is valid.

use crate::cut::{FacetCut, FacetCutAction};
use crate::error::Revert;
use crate::primitives::Selector;
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// ROUTING VIEW TRAIT
// =============================================================================

/// Read-only loupe over a routing table.
pub trait RoutingView {
    /// Every facet with its selectors, in the order facets were first routed.
    fn facets(&self) -> Vec<(Address, Vec<Selector>)>;

    /// The facet a selector is routed to.
    fn facet_address(&self, selector: Selector) -> Option<Address>;

    /// Facet addresses in routing order.
    fn facet_addresses(&self) -> Vec<Address>;

    /// Selectors routed to one facet.
    fn facet_function_selectors(&self, facet: Address) -> Vec<Selector>;

    /// Total number of routed selectors.
    fn selector_count(&self) -> usize;
}

// =============================================================================
// ROUTING TABLE
// =============================================================================

/// Serialized form: facets in order with their selectors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingSnapshot {
    pub facets: Vec<(Address, Vec<Selector>)>,
}

/// The selector -> facet mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RoutingSnapshot", into = "RoutingSnapshot")]
pub struct RoutingTable {
    /// selector -> owning facet
    routes: BTreeMap<Selector, Address>,

    /// facet -> its selectors in routing order
    by_facet: BTreeMap<Address, Vec<Selector>>,

    /// facets in the order they were first routed
    order: Vec<Address>,
}

impl RoutingTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a batch of cuts atomically.
    ///
    /// On error the table is left untouched.
    pub fn apply(&mut self, cuts: &[FacetCut]) -> Result<(), Revert> {
        let staged = self.staged(cuts)?;
        *self = staged;
        Ok(())
    }

    /// The table that `cuts` would produce, without committing it.
    pub fn staged(&self, cuts: &[FacetCut]) -> Result<Self, Revert> {
        let mut staged = self.clone();
        for (index, cut) in cuts.iter().enumerate() {
            staged.apply_one(index, cut)?;
        }
        Ok(staged)
    }

    fn apply_one(&mut self, index: usize, cut: &FacetCut) -> Result<(), Revert> {
        let invalid = |reason: String| Revert::InvalidCutAction { index, reason };

        if cut.selectors.is_empty() {
            return Err(invalid(format!("no selectors to {}", cut.action)));
        }
        if cut.action != FacetCutAction::Remove && cut.facet_address == Address::ZERO {
            return Err(invalid(format!(
                "cannot {} selectors for the zero address",
                cut.action
            )));
        }

        for &selector in &cut.selectors {
            let current = self.routes.get(&selector).copied();
            match cut.action {
                FacetCutAction::Add => match current {
                    Some(existing) if existing != cut.facet_address => {
                        return Err(Revert::SelectorCollision {
                            selector,
                            existing,
                            proposed: cut.facet_address,
                        });
                    }
                    Some(_) => {}
                    None => self.route(selector, cut.facet_address),
                },
                FacetCutAction::Replace => match current {
                    None => {
                        return Err(invalid(format!("cannot replace unrouted selector {selector}")));
                    }
                    Some(existing) if existing == cut.facet_address => {
                        return Err(invalid(format!(
                            "selector {selector} already routed to {existing}"
                        )));
                    }
                    Some(_) => {
                        self.unroute(selector);
                        self.route(selector, cut.facet_address);
                    }
                },
                FacetCutAction::Remove => {
                    if current.is_none() {
                        return Err(invalid(format!("cannot remove unrouted selector {selector}")));
                    }
                    self.unroute(selector);
                }
            }
        }
        Ok(())
    }

    fn route(&mut self, selector: Selector, facet: Address) {
        self.routes.insert(selector, facet);
        let selectors = self.by_facet.entry(facet).or_default();
        if selectors.is_empty() && !self.order.contains(&facet) {
            self.order.push(facet);
        }
        selectors.push(selector);
    }

    fn unroute(&mut self, selector: Selector) {
        let Some(facet) = self.routes.remove(&selector) else {
            return;
        };
        if let Some(selectors) = self.by_facet.get_mut(&facet) {
            selectors.retain(|s| *s != selector);
            if selectors.is_empty() {
                self.by_facet.remove(&facet);
                self.order.retain(|a| *a != facet);
            }
        }
    }
}

impl RoutingView for RoutingTable {
    fn facets(&self) -> Vec<(Address, Vec<Selector>)> {
        self.order
            .iter()
            .map(|a| (*a, self.facet_function_selectors(*a)))
            .collect()
    }

    fn facet_address(&self, selector: Selector) -> Option<Address> {
        self.routes.get(&selector).copied()
    }

    fn facet_addresses(&self) -> Vec<Address> {
        self.order.clone()
    }

    fn facet_function_selectors(&self, facet: Address) -> Vec<Selector> {
        self.by_facet.get(&facet).cloned().unwrap_or_default()
    }

    fn selector_count(&self) -> usize {
        self.routes.len()
    }
}

impl From<RoutingSnapshot> for RoutingTable {
    fn from(snapshot: RoutingSnapshot) -> Self {
        let mut table = Self::new();
        for (facet, selectors) in snapshot.facets {
            for selector in selectors {
                table.unroute(selector);
                table.route(selector, facet);
            }
        }
        table
    }
}

impl From<RoutingTable> for RoutingSnapshot {
    fn from(table: RoutingTable) -> Self {
        Self {
            facets: table.facets(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
