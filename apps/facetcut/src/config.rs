//! # Configuration Files
//!
//! - upgrade plan (JSON): which facets to deploy, their initializer
//!   arguments and how to submit the cut
//! - artifacts (JSON): the contract registry
//! - simulated chain (JSON): persisted [`ChainState`]
//! - attempt state (binary): [`AttemptState`] between retries

use crate::simulated::ChainState;
use facetcut_core::{
    Address, AttemptState, ContractAbi, ContractRegistry, FacetError, InitArg,
    PROTOCOL_INITIALIZATION_FACET, VersionTag,
};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

// =============================================================================
// ERRORS
// =============================================================================

/// Failure to read or write a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse {}: {source}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    #[error(transparent)]
    Facet(#[from] FacetError),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ConfigError + '_ {
    move |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn json_error(path: &Path) -> impl FnOnce(serde_json::Error) -> ConfigError + '_ {
    move |source| ConfigError::Json {
        path: path.to_path_buf(),
        source,
    }
}

// =============================================================================
// UPGRADE PLAN
// =============================================================================

/// One facet to deploy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetPlan {
    pub name: String,
    /// Arguments of the facet's `initialize` function.
    #[serde(default)]
    pub args: Vec<InitArg>,
}

impl FacetPlan {
    #[must_use]
    pub fn new(name: impl Into<String>, args: Vec<InitArg>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

/// Everything one upgrade needs besides the artifacts.
///
/// `facets` accepts either a list of `{ "name", "args" }` objects or an
/// object mapping facet name to argument list; both keep file order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradePlan {
    #[serde(deserialize_with = "deserialize_facets")]
    pub facets: Vec<FacetPlan>,

    /// Version recorded by the upgrade.
    pub version: String,

    /// Confirmations to wait for.
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,

    /// Submit the cut; otherwise only deploy.
    #[serde(default = "default_true")]
    pub do_cut: bool,

    /// Check Add cuts against the live table before submitting.
    #[serde(default = "default_true")]
    pub preflight: bool,

    /// Facet receiving the init call. It gets no cut of its own.
    #[serde(default = "default_protocol_initialization_facet")]
    pub protocol_initialization_facet: String,

    /// Already deployed init facet, used instead of deploying one.
    #[serde(default)]
    pub protocol_initialization_facet_address: Option<Address>,
}

fn default_confirmations() -> u64 {
    1
}

fn default_true() -> bool {
    true
}

fn default_protocol_initialization_facet() -> String {
    PROTOCOL_INITIALIZATION_FACET.to_string()
}

fn deserialize_facets<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<FacetPlan>, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Object(map) => map
            .into_iter()
            .map(|(name, args)| {
                let args = serde_json::from_value(args).map_err(D::Error::custom)?;
                Ok::<_, D::Error>(FacetPlan { name, args })
            })
            .collect(),
        list => serde_json::from_value(list).map_err(D::Error::custom),
    }
}

impl UpgradePlan {
    /// A plan with default settings.
    #[must_use]
    pub fn new(facets: Vec<FacetPlan>, version: impl Into<String>) -> Self {
        Self {
            facets,
            version: version.into(),
            confirmations: default_confirmations(),
            do_cut: true,
            preflight: true,
            protocol_initialization_facet: default_protocol_initialization_facet(),
            protocol_initialization_facet_address: None,
        }
    }

    /// The version as a fixed-width tag.
    pub fn version_tag(&self) -> Result<VersionTag, FacetError> {
        VersionTag::new(&self.version)
    }

    /// True if `name` is the init facet.
    #[must_use]
    pub fn is_protocol_initialization_facet(&self, name: &str) -> bool {
        name == self.protocol_initialization_facet
    }

    /// Checks that need no registry.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = BTreeSet::new();
        for facet in &self.facets {
            if !seen.insert(facet.name.as_str()) {
                return Err(ConfigError::InvalidPlan(format!(
                    "facet `{}` listed twice",
                    facet.name
                )));
            }
        }
        self.version_tag()?;
        Ok(())
    }
}

/// Read and validate an upgrade plan.
pub fn load_plan(path: &Path) -> Result<UpgradePlan, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(io_error(path))?;
    let plan: UpgradePlan = serde_json::from_str(&text).map_err(json_error(path))?;
    plan.validate()?;
    Ok(plan)
}

// =============================================================================
// ARTIFACTS
// =============================================================================

/// Contract interfaces as stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtifactsFile {
    pub contracts: Vec<ContractAbi>,
}

/// Read an artifacts file into a registry.
pub fn load_artifacts(path: &Path) -> Result<ContractRegistry, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(io_error(path))?;
    let file: ArtifactsFile = serde_json::from_str(&text).map_err(json_error(path))?;
    Ok(ContractRegistry::from_contracts(file.contracts))
}

// =============================================================================
// SIMULATED CHAIN
// =============================================================================

pub fn load_chain(path: &Path) -> Result<ChainState, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(io_error(path))?;
    serde_json::from_str(&text).map_err(json_error(path))
}

pub fn save_chain(path: &Path, state: &ChainState) -> Result<(), ConfigError> {
    let text = serde_json::to_string_pretty(state).map_err(json_error(path))?;
    std::fs::write(path, text).map_err(io_error(path))
}

// =============================================================================
// ATTEMPT STATE
// =============================================================================

/// Load the attempt record, or start a fresh one if the file is missing.
pub fn load_or_create_attempt(path: &Path) -> Result<AttemptState, ConfigError> {
    if !path.exists() {
        return Ok(AttemptState::new());
    }
    let bytes = std::fs::read(path).map_err(io_error(path))?;
    Ok(AttemptState::from_bytes(&bytes)?)
}

pub fn save_attempt(path: &Path, state: &AttemptState) -> Result<(), ConfigError> {
    std::fs::write(path, state.to_bytes()?).map_err(io_error(path))
}

// =============================================================================
// TESTS
// =============================================================================
