//! # facetcut-core
//!
//! The deterministic engine behind diamond upgrades.
//!
//! A diamond is one stable entry point whose calls are dispatched, by
//! 4-byte selector, to independently deployed facets. This crate:
//!
//! - derives selectors from function signatures ([`signature`])
//! - describes contract interfaces and their inheritance ([`contract`])
//! - filters per-facet selector sets ([`selector_set`])
//! - computes XOR interface identifiers ([`interface_id`])
//! - builds add / replace / remove cuts ([`cut`])
//! - assembles and validates the atomic upgrade payload ([`upgrade`])
//! - models the routing table the payload is applied to ([`routing`])
//! - keeps retry bookkeeping between attempts ([`attempt`])
//!
//! No async, no I/O, no logging. The app crate owns those concerns.

pub mod abi_codec;
pub mod attempt;
pub mod contract;
pub mod cut;
pub mod error;
pub mod interface_id;
pub mod primitives;
pub mod routing;
pub mod selector_set;
pub mod signature;
pub mod upgrade;

pub use abi_codec::{InitArg, encode_call};
pub use attempt::AttemptState;
pub use contract::{ContractAbi, ContractRegistry, FunctionFragment, Mutability};
pub use cut::{
    Facet, FacetCut, FacetCutAction, add_cut, find_address_position, remove_cut, replace_cut,
};
pub use error::{FacetError, Revert};
pub use interface_id::{InterfaceIdCalculator, interface_id};
pub use primitives::{
    EXCLUDED_INITIALIZER, FACET_INITIALIZER_NAME, InterfaceId, PROTOCOL_INITIALIZATION_FACET,
    SELECTOR_LEN, Selector,
};
pub use routing::{RoutingTable, RoutingView};
pub use selector_set::{FacetRef, SelectorSet, remove_selectors};
pub use signature::{FunctionKey, FunctionSignature, selector};
pub use upgrade::{Upgrade, VersionTag};

pub use alloy_primitives::Address;
