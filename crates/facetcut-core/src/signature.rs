//! # Selector Codec
//!
//! Canonical function signatures and the selectors derived from them.
//!
//! A selector is the first four bytes of the Keccak-256 hash of the
//! canonical signature `name(type1,type2,...)`. Input is parsed with
//! `alloy-json-abi` (leading `function`, parameter names, data locations,
//! modifiers and return lists are accepted) and every parameter is
//! resolved to a [`DynSolType`], so aliases such as `uint` collapse to
//! their canonical spelling and two spellings of the same function always
//! produce the same selector.

use crate::error::FacetError;
use crate::primitives::{SELECTOR_LEN, Selector};
use alloy_dyn_abi::{DynSolType, Specifier};
use alloy_json_abi::Function;
use alloy_primitives::keccak256;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Derive the selector of a canonical signature string.
///
/// The input is hashed as-is. Use [`FunctionSignature::parse`] first when
/// the spelling is not known to be canonical.
#[must_use]
pub fn selector_of_canonical(canonical: &str) -> Selector {
    let hash = keccak256(canonical.as_bytes());
    let mut out = [0u8; SELECTOR_LEN];
    out.copy_from_slice(&hash[..SELECTOR_LEN]);
    Selector(out)
}

/// Parse any accepted spelling and derive its selector.
pub fn selector(signature: &str) -> Result<Selector, FacetError> {
    Ok(FunctionSignature::parse(signature)?.selector())
}

// =============================================================================
// FUNCTION SIGNATURE
// =============================================================================

/// A parsed, canonical function signature.
///
/// Equality, ordering and hashing follow the canonical string.
#[derive(Debug, Clone)]
pub struct FunctionSignature {
    name: String,
    params: Vec<DynSolType>,
    canonical: String,
}

impl FunctionSignature {
    /// Parse a signature, normalizing it to canonical form.
    pub fn parse(input: &str) -> Result<Self, FacetError> {
        let function =
            Function::parse(input.trim()).map_err(|e| FacetError::signature(input, e.to_string()))?;
        let params = function
            .inputs
            .iter()
            .map(|param| param.resolve())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| FacetError::signature(input, e.to_string()))?;
        Ok(Self::new(function.name, params))
    }

    fn new(name: String, params: Vec<DynSolType>) -> Self {
        let types: Vec<_> = params.iter().map(DynSolType::sol_type_name).collect();
        let canonical = format!("{}({})", name, types.join(","));
        Self {
            name,
            params,
            canonical,
        }
    }

    /// Function name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolved parameter types in order.
    #[must_use]
    pub fn params(&self) -> &[DynSolType] {
        &self.params
    }

    /// Canonical `name(type,...)` form.
    #[must_use]
    pub fn canonical(&self) -> String {
        self.canonical.clone()
    }

    /// Selector of the canonical form.
    #[must_use]
    pub fn selector(&self) -> Selector {
        selector_of_canonical(&self.canonical)
    }
}

impl PartialEq for FunctionSignature {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for FunctionSignature {}

impl PartialOrd for FunctionSignature {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FunctionSignature {
    fn cmp(&self, other: &Self) -> Ordering {
        self.canonical.cmp(&other.canonical)
    }
}

impl Hash for FunctionSignature {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl fmt::Display for FunctionSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl FromStr for FunctionSignature {
    type Err = FacetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for FunctionSignature {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.canonical)
    }
}

impl<'de> Deserialize<'de> for FunctionSignature {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// FUNCTION KEY
// =============================================================================

/// A reference to a function used when filtering selector sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionKey {
    /// A full signature.
    Signature(FunctionSignature),
    /// A literal `0x`-prefixed selector.
    Selector(Selector),
    /// A bare function name, resolved against the owning ABI.
    Name(String),
}

impl FunctionKey {
    /// Classify a user-supplied key. Returns `None` for unusable input.
    #[must_use]
    pub fn parse(key: &str) -> Option<Self> {
        let key = key.trim();
        if key.starts_with("0x") || key.starts_with("0X") {
            return key.parse().ok().map(Self::Selector);
        }
        if key.contains('(') {
            return FunctionSignature::parse(key).ok().map(Self::Signature);
        }
        is_identifier(key).then(|| Self::Name(key.to_string()))
    }

    /// The selector this key names without consulting an ABI.
    ///
    /// Bare names need the owning ABI and yield `None`.
    #[must_use]
    pub fn selector(&self) -> Option<Selector> {
        match self {
            Self::Signature(signature) => Some(signature.selector()),
            Self::Selector(selector) => Some(*selector),
            Self::Name(_) => None,
        }
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

// =============================================================================
// TESTS
// =============================================================================
