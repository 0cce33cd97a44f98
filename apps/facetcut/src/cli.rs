//! # CLI Commands
//!
//! One function per subcommand. Each returns the text to print so the
//! commands can be driven directly from tests.
//!
//! Chain-touching commands run against a simulated chain persisted as
//! JSON, which is written back whether or not the command succeeds.

use crate::config::{
    ConfigError, load_artifacts, load_chain, load_or_create_attempt, load_plan, save_attempt,
    save_chain,
};
use crate::coordinator::{UpgradeCoordinator, UpgradeFailure};
use crate::environment::Receipt;
use crate::error::UpgradeError;
use crate::loupe::LoupeClient;
use crate::simulated::{ChainState, SimulatedEnvironment};
use facetcut_core::{
    Address, AttemptState, ContractAbi, ContractRegistry, Facet, FacetCut, FacetCutAction, FacetError,
    FunctionKey, InterfaceIdCalculator, Selector, SelectorSet, Upgrade, VersionTag, add_cut,
    remove_cut, remove_selectors, replace_cut,
};
use serde::Serialize;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Facet(#[from] FacetError),

    #[error(transparent)]
    Upgrade(#[from] UpgradeFailure),

    #[error(transparent)]
    Query(#[from] UpgradeError),

    #[error("cannot render output: {0}")]
    Output(#[from] serde_json::Error),

    #[error("{0}")]
    Usage(String),
}

// =============================================================================
// OUTPUT RECORDS
// =============================================================================

#[derive(Serialize)]
struct SelectorEntry {
    selector: Selector,
    signature: Option<String>,
}

#[derive(Serialize)]
struct FacetEntry {
    facet: Address,
    selectors: Vec<Selector>,
}

#[derive(Serialize)]
struct CutReport<'a> {
    cut: &'a FacetCut,
    receipt: &'a Receipt,
}

fn to_json<T: Serialize>(value: &T) -> Result<String, CliError> {
    Ok(serde_json::to_string_pretty(value)?)
}

fn owned_refs(items: &[String]) -> Vec<&str> {
    items.iter().map(String::as_str).collect()
}

// =============================================================================
// OFFLINE COMMANDS
// =============================================================================

/// Routable selectors of a contract, minus `omit`.
pub fn cmd_selectors(artifacts: &Path, contract: &str, omit: &[String]) -> Result<String, CliError> {
    let registry = load_artifacts(artifacts)?;
    let set = SelectorSet::from_abi(registry.get(contract)?.clone())?.remove(omit);
    let entries: Vec<_> = set
        .selectors()
        .iter()
        .map(|s| SelectorEntry {
            selector: *s,
            signature: set.signature_of(*s),
        })
        .collect();
    to_json(&entries)
}

/// ERC-165 identifier of an interface.
pub fn cmd_interface_id(
    artifacts: &Path,
    contract: &str,
    skip_base_check: bool,
) -> Result<String, CliError> {
    let registry = load_artifacts(artifacts)?;
    let id = InterfaceIdCalculator::new(&registry).interface_id_with(contract, skip_base_check)?;
    Ok(id.to_string())
}

/// The cut a contract deployed at `address` would produce.
pub fn cmd_cut(
    artifacts: &Path,
    contract: &str,
    action: FacetCutAction,
    address: Address,
    omit: &[String],
) -> Result<String, CliError> {
    let registry = load_artifacts(artifacts)?;
    let facet = Facet::new(registry.get(contract)?.clone(), address);
    let cut = match action {
        FacetCutAction::Add => add_cut(&facet, omit)?,
        FacetCutAction::Replace => replace_cut(&facet, omit)?,
        FacetCutAction::Remove => remove_cut(&facet, omit)?,
    };
    to_json(&cut)
}

/// State-modifying functions of several facets, as signatures or hashes.
pub fn cmd_state_modifying(
    artifacts: &Path,
    contracts: &[String],
    omit: &[String],
    hashes: bool,
) -> Result<String, CliError> {
    let registry = load_artifacts(artifacts)?;
    let names = owned_refs(contracts);
    let omit = owned_refs(omit);
    if hashes {
        let hashes: Vec<String> = registry
            .state_modifying_function_hashes(&names, &omit)?
            .iter()
            .map(ToString::to_string)
            .collect();
        to_json(&hashes)
    } else {
        to_json(&registry.state_modifying_functions(&names, &omit)?)
    }
}

// =============================================================================
// CHAIN COMMANDS
// =============================================================================

/// Create a simulated chain with an empty diamond owned by `owner`.
pub fn cmd_init_chain(chain: &Path, owner: Address, force: bool) -> Result<String, CliError> {
    if chain.exists() && !force {
        return Err(CliError::Usage(format!(
            "{} already exists (use --force to overwrite)",
            chain.display()
        )));
    }
    let state = ChainState::new(owner);
    save_chain(chain, &state)?;
    info!(diamond = %state.diamond(), %owner, "simulated chain created");
    Ok(state.diamond().to_string())
}

/// Run one attempt of an upgrade plan.
///
/// Deployment progress is written to `state` so that a failed attempt can
/// be retried; the file is removed once the upgrade is done.
pub async fn cmd_upgrade<C>(
    artifacts: &Path,
    plan: &Path,
    chain: &Path,
    state: &Path,
    cancel: C,
) -> Result<String, CliError>
where
    C: Future<Output = ()>,
{
    let registry = Arc::new(load_artifacts(artifacts)?);
    let plan = load_plan(plan)?;
    let env = Arc::new(SimulatedEnvironment::from_state(load_chain(chain)?));
    let diamond = env.diamond().await;
    let mut attempt = load_or_create_attempt(state)?;

    let mut coordinator = UpgradeCoordinator::new(env.clone(), registry, diamond);
    let result = coordinator.run_until(&plan, &mut attempt, cancel).await;

    save_chain(chain, &env.snapshot().await)?;
    let outcome = settle_attempt(state, &attempt, result)?;
    to_json(&outcome)
}

/// Drop the attempt file after a success, keep it after a failure.
fn settle_attempt<T>(
    state: &Path,
    attempt: &AttemptState,
    result: Result<T, UpgradeFailure>,
) -> Result<T, CliError> {
    match result {
        Ok(outcome) => {
            if state.exists() {
                std::fs::remove_file(state).map_err(|source| ConfigError::Io {
                    path: state.to_path_buf(),
                    source,
                })?;
            }
            Ok(outcome)
        }
        Err(failure) => {
            save_attempt(state, attempt)?;
            Err(failure.into())
        }
    }
}

/// Deploy a new version of a contract and re-route its selectors to it.
///
/// The new facet is recorded in `state` until the replacement succeeds, so
/// a retry does not deploy it again.
pub async fn cmd_replace<C>(
    artifacts: &Path,
    chain: &Path,
    state: &Path,
    contract: &str,
    omit: &[String],
    version: &str,
    cancel: C,
) -> Result<String, CliError>
where
    C: Future<Output = ()>,
{
    let registry = Arc::new(load_artifacts(artifacts)?);
    let version = VersionTag::new(version)?;
    let env = Arc::new(SimulatedEnvironment::from_state(load_chain(chain)?));
    let diamond = env.diamond().await;
    let mut attempt = load_or_create_attempt(state)?;

    let mut coordinator = UpgradeCoordinator::new(env.clone(), registry, diamond);
    let result = coordinator
        .replace_facet(contract, omit, version, 1, &mut attempt, cancel)
        .await;

    save_chain(chain, &env.snapshot().await)?;
    let outcome = settle_attempt(state, &attempt, result)?;
    to_json(&outcome)
}

/// Unroute every selector of the facet at `facet`, except `keep`.
pub async fn cmd_remove<C>(
    chain: &Path,
    facet: Address,
    keep: &[String],
    version: &str,
    cancel: C,
) -> Result<String, CliError>
where
    C: Future<Output = ()>,
{
    let version = VersionTag::new(version)?;
    let env = Arc::new(SimulatedEnvironment::from_state(load_chain(chain)?));
    let diamond = env.diamond().await;

    let routed = LoupeClient::new(&*env, diamond)
        .facet_function_selectors(facet)
        .await?;
    if routed.is_empty() {
        return Err(CliError::Usage(format!("{facet} has no routed selectors")));
    }
    let snapshot = env.snapshot().await;
    let kept = keep
        .iter()
        .map(|key| resolve_kept(snapshot.abi_at(facet), key).map(|s| s.to_string()))
        .collect::<Result<Vec<_>, _>>()?;
    let selectors = remove_selectors(&routed, &kept);
    if selectors.is_empty() {
        return Err(CliError::Usage(format!(
            "every routed selector of {facet} is kept, nothing to remove"
        )));
    }
    let cut = FacetCut::new(facet, FacetCutAction::Remove, selectors);

    let registry = Arc::new(ContractRegistry::new());
    let result = submit(env.clone(), registry, diamond, cut.clone(), version, cancel).await;
    save_chain(chain, &env.snapshot().await)?;
    to_json(&CutReport {
        cut: &cut,
        receipt: &result?,
    })
}

/// Resolve a `--keep` entry, refusing anything that names no selector.
fn resolve_kept(abi: Option<&ContractAbi>, key: &str) -> Result<Selector, CliError> {
    let parsed = FunctionKey::parse(key).ok_or_else(|| {
        CliError::Usage(format!("`{key}` is not a signature, selector or function name"))
    })?;
    let resolved = match abi {
        Some(abi) => abi.resolve(&parsed),
        None => parsed.selector(),
    };
    resolved.ok_or_else(|| {
        CliError::Usage(format!("`{key}` does not name a unique function of the facet"))
    })
}

async fn submit<C>(
    env: Arc<SimulatedEnvironment>,
    registry: Arc<ContractRegistry>,
    diamond: Address,
    cut: FacetCut,
    version: VersionTag,
    cancel: C,
) -> Result<Receipt, CliError>
where
    C: Future<Output = ()>,
{
    let mut coordinator = UpgradeCoordinator::new(env, registry, diamond);
    Ok(coordinator
        .submit_upgrade(Upgrade::new(vec![cut], version), 1, false, cancel)
        .await?)
}

/// Every facet of the diamond with its selectors.
pub async fn cmd_loupe(chain: &Path) -> Result<String, CliError> {
    let env = SimulatedEnvironment::from_state(load_chain(chain)?);
    let diamond = env.diamond().await;
    let facets: Vec<_> = LoupeClient::new(&env, diamond)
        .facets()
        .await?
        .into_iter()
        .map(|(facet, selectors)| FacetEntry { facet, selectors })
        .collect();
    to_json(&facets)
}
