//! # Primitives
//!
//! Fixed-width identifiers and the constants shared across the engine.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Width of a selector and of an interface id, in bytes.
pub const SELECTOR_LEN: usize = 4;

/// Signature of the facet initializer contract's entry point.
///
/// It is invoked directly as init calldata and never routed.
pub const EXCLUDED_INITIALIZER: &str = "init(bytes)";

/// Name of the per-facet initializer function.
pub const FACET_INITIALIZER_NAME: &str = "initialize";

/// Default name of the facet that receives the upgrade's init call.
pub const PROTOCOL_INITIALIZATION_FACET: &str = "ProtocolInitializationFacet";

// =============================================================================
// SELECTOR
// =============================================================================

/// The 4-byte dispatch identifier of one function signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Selector(pub [u8; SELECTOR_LEN]);

impl Selector {
    /// Build a selector from its raw bytes.
    #[must_use]
    pub const fn new(bytes: [u8; SELECTOR_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; SELECTOR_LEN] {
        &self.0
    }

    /// Big-endian integer view, used for XOR folding.
    #[must_use]
    pub const fn to_u32(self) -> u32 {
        u32::from_be_bytes(self.0)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Selector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_fixed4(s).map(Self)
    }
}

impl Serialize for Selector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.collect_str(self)
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Selector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let text = String::deserialize(deserializer)?;
            text.parse().map_err(serde::de::Error::custom)
        } else {
            <[u8; SELECTOR_LEN]>::deserialize(deserializer).map(Self)
        }
    }
}

// =============================================================================
// INTERFACE ID
// =============================================================================

/// Aggregate capability identifier: the XOR of a type's own selectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct InterfaceId(pub [u8; SELECTOR_LEN]);

impl InterfaceId {
    /// Sentinel for a type with no functions of its own.
    pub const ZERO: Self = Self([0; SELECTOR_LEN]);

    /// Build from the folded integer form.
    ///
    /// A zero fold is mapped onto [`InterfaceId::ZERO`] explicitly.
    #[must_use]
    pub const fn from_u32(value: u32) -> Self {
        if value == 0 {
            return Self::ZERO;
        }
        Self(value.to_be_bytes())
    }

    /// Folded integer form.
    #[must_use]
    pub const fn to_u32(self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    /// True for the zero sentinel.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl From<Selector> for InterfaceId {
    fn from(selector: Selector) -> Self {
        Self::from_u32(selector.to_u32())
    }
}

impl fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for InterfaceId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_fixed4(s).map(Self)
    }
}

impl Serialize for InterfaceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for InterfaceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

fn parse_fixed4(s: &str) -> Result<[u8; SELECTOR_LEN], String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .ok_or_else(|| format!("`{s}` is missing the 0x prefix"))?;
    let bytes = hex::decode(digits).map_err(|e| format!("`{s}`: {e}"))?;
    <[u8; SELECTOR_LEN]>::try_from(bytes.as_slice())
        .map_err(|_| format!("`{s}` is {} bytes, expected {SELECTOR_LEN}", bytes.len()))
}

// =============================================================================
// TESTS
// =============================================================================
