//! # Upgrade Payload
//!
//! The single atomic submission: ordered cuts, an optional init target,
//! per-facet init calldata and a fixed-width version tag.

use crate::cut::{FacetCut, FacetCutAction};
use crate::error::{FacetError, Revert};
use crate::primitives::Selector;
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Width of the version field.
pub const VERSION_TAG_LEN: usize = 32;

// =============================================================================
// VERSION TAG
// =============================================================================

/// A short UTF-8 string stored in a zero-padded 32-byte field.
///
/// At most 31 bytes, so the field always ends in a zero byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionTag([u8; VERSION_TAG_LEN]);

impl VersionTag {
    /// Encode `tag` into the fixed field.
    pub fn new(tag: &str) -> Result<Self, FacetError> {
        let bytes = tag.as_bytes();
        if bytes.len() >= VERSION_TAG_LEN {
            return Err(FacetError::InvalidVersionTag {
                tag: tag.to_string(),
                reason: format!("longer than {} bytes", VERSION_TAG_LEN - 1),
            });
        }
        if bytes.contains(&0) {
            return Err(FacetError::InvalidVersionTag {
                tag: tag.to_string(),
                reason: "contains a NUL byte".to_string(),
            });
        }
        let mut field = [0u8; VERSION_TAG_LEN];
        field[..bytes.len()].copy_from_slice(bytes);
        Ok(Self(field))
    }

    /// Raw field.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; VERSION_TAG_LEN] {
        &self.0
    }

    /// Decoded text, without padding.
    #[must_use]
    pub fn as_str(&self) -> &str {
        let end = self.0.iter().position(|b| *b == 0).unwrap_or(VERSION_TAG_LEN);
        std::str::from_utf8(&self.0[..end]).unwrap_or_default()
    }
}

impl fmt::Display for VersionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VersionTag {
    type Err = FacetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Serialize for VersionTag {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for VersionTag {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::new(&text).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// UPGRADE
// =============================================================================

/// One atomic routing-table update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Upgrade {
    pub cuts: Vec<FacetCut>,
    pub init_target: Option<Address>,
    pub init_calldata: BTreeMap<Address, Vec<u8>>,
    pub version: VersionTag,
}

impl Upgrade {
    /// An upgrade with no init call.
    #[must_use]
    pub fn new(cuts: Vec<FacetCut>, version: VersionTag) -> Self {
        Self {
            cuts,
            init_target: None,
            init_calldata: BTreeMap::new(),
            version,
        }
    }

    /// Route the init call through `target` with the given per-facet payloads.
    #[must_use]
    pub fn with_init(mut self, target: Address, calldata: BTreeMap<Address, Vec<u8>>) -> Self {
        self.init_target = Some(target);
        self.init_calldata = calldata;
        self
    }

    /// Structural checks that need no routing state.
    ///
    /// Ownership conflicts, including two cuts adding the same selector,
    /// depend on routing state and are left to the table owner.
    pub fn validate(&self) -> Result<(), Revert> {
        for (index, cut) in self.cuts.iter().enumerate() {
            if cut.selectors.is_empty() {
                return Err(Revert::InvalidCutAction {
                    index,
                    reason: format!("no selectors to {}", cut.action),
                });
            }
            if cut.action != FacetCutAction::Remove && cut.facet_address == Address::ZERO {
                return Err(Revert::InvalidCutAction {
                    index,
                    reason: format!("cannot {} selectors for the zero address", cut.action),
                });
            }
            let mut within = BTreeSet::new();
            for selector in &cut.selectors {
                if !within.insert(*selector) {
                    return Err(Revert::InvalidCutAction {
                        index,
                        reason: format!("selector {selector} listed twice"),
                    });
                }
            }
        }

        if self.init_target.is_none() && !self.init_calldata.is_empty() {
            return Err(Revert::InvalidCutAction {
                index: self.cuts.len(),
                reason: "init calldata given without an init target".to_string(),
            });
        }
        Ok(())
    }

    /// Every selector touched by the upgrade.
    #[must_use]
    pub fn selectors(&self) -> BTreeSet<Selector> {
        self.cuts
            .iter()
            .flat_map(|c| c.selectors.iter().copied())
            .collect()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::selector;

    fn add(byte: u8, sigs: &[&str]) -> FacetCut {
        FacetCut::new(
            Address::repeat_byte(byte),
            FacetCutAction::Add,
            sigs.iter().map(|s| selector(s).unwrap()).collect(),
        )
    }

    #[test]
    fn version_tag_is_zero_padded() {
        let tag = VersionTag::new("2.2.0").unwrap();
        assert_eq!(&tag.as_bytes()[..5], b"2.2.0");
        assert!(tag.as_bytes()[5..].iter().all(|b| *b == 0));
        assert_eq!(tag.to_string(), "2.2.0");
    }

    #[test]
    fn version_tag_length_limit() {
        assert!(VersionTag::new(&"v".repeat(31)).is_ok());
        assert!(matches!(
            VersionTag::new(&"v".repeat(32)),
            Err(FacetError::InvalidVersionTag { .. })
        ));
    }

    #[test]
    fn valid_upgrade_passes() {
        let version = VersionTag::new("1.0.0").unwrap();
        let upgrade = Upgrade::new(vec![add(1, &["f1()", "f2()"]), add(2, &["f3()"])], version);
        assert_eq!(upgrade.validate(), Ok(()));
        assert_eq!(upgrade.selectors().len(), 3);
    }

    #[test]
    fn empty_cut_is_invalid() {
        let version = VersionTag::new("1.0.0").unwrap();
        let upgrade = Upgrade::new(vec![add(1, &[])], version);
        assert!(matches!(
            upgrade.validate(),
            Err(Revert::InvalidCutAction { index: 0, .. })
        ));
    }

    #[test]
    fn zero_address_add_is_invalid() {
        let version = VersionTag::new("1.0.0").unwrap();
        let mut cut = add(1, &["f()"]);
        cut.facet_address = Address::ZERO;
        assert!(Upgrade::new(vec![cut.clone()], version).validate().is_err());

        cut.action = FacetCutAction::Remove;
        assert_eq!(Upgrade::new(vec![cut], version).validate(), Ok(()));
    }

    #[test]
    fn calldata_without_target_is_invalid() {
        let version = VersionTag::new("1.0.0").unwrap();
        let mut upgrade = Upgrade::new(vec![add(1, &["f()"])], version);
        upgrade
            .init_calldata
            .insert(Address::repeat_byte(1), vec![1, 2, 3, 4]);
        assert!(upgrade.validate().is_err());
    }

    #[test]
    fn json_shape() {
        let version = VersionTag::new("1.0.0").unwrap();
        let upgrade = Upgrade::new(vec![add(1, &["f()"])], version);
        let json = serde_json::to_value(&upgrade).unwrap();
        assert_eq!(json["version"], "1.0.0");
        assert_eq!(json["cuts"][0]["action"], "Add");
    }
}
