//! # Upgrade Coordinator
//!
//! The state machine of one upgrade attempt:
//!
//! ```text
//! Planning -> Deploying -> Cutting -> Confirming -> Done
//!     \           \           \           \
//!      +-----------+-----------+-----------+--> Failed
//! ```
//!
//! Facets are deployed concurrently. Every successful deployment is written
//! to the caller's [`AttemptState`] before the attempt can fail, so a retry
//! with the same record only deploys what is still missing. The cut is
//! submitted once and never retried here.

use crate::config::UpgradePlan;
use crate::environment::{
    DeployRequest, EnvError, ExecutionEnvironment, Receipt, TransactionPayload,
};
use crate::error::UpgradeError;
use crate::loupe::LoupeClient;
use facetcut_core::{
    Address, AttemptState, ContractAbi, ContractRegistry, FACET_INITIALIZER_NAME, Facet, FacetCut,
    Upgrade, VersionTag, add_cut, encode_call, replace_cut,
};
use futures::future::join_all;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

// =============================================================================
// PHASES AND RESULTS
// =============================================================================

/// Where an attempt stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpgradePhase {
    Planning,
    Deploying,
    Cutting,
    Confirming,
    Done,
    Failed,
}

impl UpgradePhase {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for UpgradePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Planning => "planning",
            Self::Deploying => "deploying",
            Self::Cutting => "cutting",
            Self::Confirming => "confirming",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A facet as it stands after the deploy phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployedFacet {
    pub name: String,
    pub address: Address,
    /// The Add cut for this facet; `None` for the init facet.
    pub cut: Option<FacetCut>,
    /// True when the address came from an earlier attempt.
    pub reused: bool,
}

/// Result of a completed attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpgradeOutcome {
    pub attempt: u32,
    pub deployed_facets: Vec<DeployedFacet>,
    pub protocol_initialization_facet: Option<Address>,
    /// `None` when the plan only deploys.
    pub receipt: Option<Receipt>,
}

/// Result of a completed facet replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplaceOutcome {
    pub attempt: u32,
    pub cut: FacetCut,
    /// True when the new facet came from an earlier attempt.
    pub reused: bool,
    pub receipt: Receipt,
}

/// A failed attempt and the phase it failed in.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("upgrade failed while {phase}: {error}")]
pub struct UpgradeFailure {
    pub phase: UpgradePhase,
    #[source]
    pub error: UpgradeError,
}

/// A plan entry resolved against the registry.
struct PlannedFacet {
    name: String,
    abi: Arc<ContractAbi>,
    calldata: Option<Vec<u8>>,
    /// Signatures kept out of the facet's cut.
    omit: Vec<String>,
    protocol_initialization: bool,
}

// =============================================================================
// COORDINATOR
// =============================================================================

/// Drives upgrades of one diamond.
pub struct UpgradeCoordinator<E: ?Sized> {
    env: Arc<E>,
    registry: Arc<ContractRegistry>,
    diamond: Address,
    phase: UpgradePhase,
    history: Vec<UpgradePhase>,
}

impl<E: ExecutionEnvironment + ?Sized> UpgradeCoordinator<E> {
    #[must_use]
    pub fn new(env: Arc<E>, registry: Arc<ContractRegistry>, diamond: Address) -> Self {
        Self {
            env,
            registry,
            diamond,
            phase: UpgradePhase::Planning,
            history: vec![UpgradePhase::Planning],
        }
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> UpgradePhase {
        self.phase
    }

    /// Phases visited by the last run.
    #[must_use]
    pub fn history(&self) -> &[UpgradePhase] {
        &self.history
    }

    /// Run one attempt of `plan`, waiting for confirmations without a
    /// cancellation signal.
    pub async fn run(
        &mut self,
        plan: &UpgradePlan,
        attempt: &mut AttemptState,
    ) -> Result<UpgradeOutcome, UpgradeFailure> {
        self.run_until(plan, attempt, std::future::pending()).await
    }

    /// Run one attempt of `plan`. Completion of `cancel` stops the
    /// confirmation wait.
    pub async fn run_until<C>(
        &mut self,
        plan: &UpgradePlan,
        attempt: &mut AttemptState,
        cancel: C,
    ) -> Result<UpgradeOutcome, UpgradeFailure>
    where
        C: Future<Output = ()>,
    {
        self.reset();
        match self.execute(plan, attempt, cancel).await {
            Ok(outcome) => Ok(outcome),
            Err(error) => Err(self.fail(error)),
        }
    }

    /// Submit a prebuilt upgrade and wait for it.
    ///
    /// Used for Replace and Remove upgrades, whose facets are already known.
    pub async fn submit_upgrade<C>(
        &mut self,
        upgrade: Upgrade,
        confirmations: u64,
        preflight: bool,
        cancel: C,
    ) -> Result<Receipt, UpgradeFailure>
    where
        C: Future<Output = ()>,
    {
        self.reset();
        match self
            .cut_and_confirm(upgrade, confirmations, preflight, cancel)
            .await
        {
            Ok(receipt) => {
                self.advance(UpgradePhase::Done);
                Ok(receipt)
            }
            Err(error) => Err(self.fail(error)),
        }
    }

    /// Deploy a new version of `name` and re-route its selectors to it.
    ///
    /// The deployment is recorded in `attempt`, so a retry after a failed
    /// submission reuses the same facet.
    pub async fn replace_facet<C, S>(
        &mut self,
        name: &str,
        omit: &[S],
        version: VersionTag,
        confirmations: u64,
        attempt: &mut AttemptState,
        cancel: C,
    ) -> Result<ReplaceOutcome, UpgradeFailure>
    where
        C: Future<Output = ()>,
        S: AsRef<str>,
    {
        self.reset();
        match self
            .execute_replace(name, omit, version, confirmations, attempt, cancel)
            .await
        {
            Ok(outcome) => Ok(outcome),
            Err(error) => Err(self.fail(error)),
        }
    }

    async fn execute_replace<C, S>(
        &mut self,
        name: &str,
        omit: &[S],
        version: VersionTag,
        confirmations: u64,
        attempt: &mut AttemptState,
        cancel: C,
    ) -> Result<ReplaceOutcome, UpgradeError>
    where
        C: Future<Output = ()>,
        S: AsRef<str>,
    {
        let abi = self.registry.get(name)?.clone();

        self.advance(UpgradePhase::Deploying);
        let number = attempt.begin_attempt();
        let recorded = attempt.address_of(name);
        let address = match recorded {
            Some(address) => {
                debug!(facet = name, %address, "reusing facet from an earlier attempt");
                address
            }
            None => {
                let address = self
                    .env
                    .deploy(DeployRequest::new(abi.clone()))
                    .await
                    .map_err(|error| UpgradeError::DeploymentFailed {
                        facet: name.to_string(),
                        reason: deploy_reason(error),
                    })?;
                debug!(facet = name, %address, "facet deployed");
                attempt.record_deployment(name, address);
                address
            }
        };

        let cut = replace_cut(&Facet::new(abi, address), omit)?;
        let upgrade = Upgrade::new(vec![cut.clone()], version);
        let receipt = self
            .cut_and_confirm(upgrade, confirmations, false, cancel)
            .await?;
        self.advance(UpgradePhase::Done);
        Ok(ReplaceOutcome {
            attempt: number,
            cut,
            reused: recorded.is_some(),
            receipt,
        })
    }

    async fn execute<C>(
        &mut self,
        plan: &UpgradePlan,
        attempt: &mut AttemptState,
        cancel: C,
    ) -> Result<UpgradeOutcome, UpgradeError>
    where
        C: Future<Output = ()>,
    {
        let version = plan.version_tag()?;
        let planned = self.plan(plan)?;

        self.advance(UpgradePhase::Deploying);
        let number = attempt.begin_attempt();
        info!(
            attempt = number,
            facets = planned.len(),
            already_deployed = attempt.deployed_count(),
            "starting upgrade attempt"
        );
        if let Some(address) = plan.protocol_initialization_facet_address {
            attempt.set_protocol_initialization_facet(address);
        }
        let fresh = self.deploy_missing(&planned, attempt).await?;

        let mut deployed_facets = Vec::with_capacity(planned.len());
        let mut cuts = Vec::new();
        let mut calldata = BTreeMap::new();
        for facet in &planned {
            let recorded = attempt.address_of(&facet.name);
            let address = if facet.protocol_initialization {
                attempt.protocol_initialization_facet().or(recorded)
            } else {
                recorded
            }
            .ok_or_else(|| {
                UpgradeError::Environment(format!("no address recorded for `{}`", facet.name))
            })?;

            let cut = if facet.protocol_initialization {
                attempt.set_protocol_initialization_facet(address);
                None
            } else {
                let deployed = Facet::new(facet.abi.clone(), address)
                    .with_init_payload(facet.calldata.clone().unwrap_or_default());
                let cut = add_cut(&deployed, &facet.omit)?;
                debug!(
                    facet = %facet.name,
                    %address,
                    selectors = cut.selectors.len(),
                    "built add cut"
                );
                if let Some(payload) = deployed.init_payload() {
                    calldata.insert(address, payload.to_vec());
                }
                cuts.push(cut.clone());
                Some(cut)
            };

            deployed_facets.push(DeployedFacet {
                name: facet.name.clone(),
                address,
                cut,
                reused: !fresh.contains(facet.name.as_str()),
            });
        }

        let mut outcome = UpgradeOutcome {
            attempt: number,
            deployed_facets,
            protocol_initialization_facet: attempt.protocol_initialization_facet(),
            receipt: None,
        };

        if !plan.do_cut {
            info!("cut disabled, stopping after deployment");
            self.advance(UpgradePhase::Done);
            return Ok(outcome);
        }

        let mut upgrade = Upgrade::new(cuts, version);
        if let Some(target) = outcome.protocol_initialization_facet {
            upgrade = upgrade.with_init(target, calldata);
        }
        let receipt = self
            .cut_and_confirm(upgrade, plan.confirmations, plan.preflight, cancel)
            .await?;
        self.advance(UpgradePhase::Done);
        outcome.receipt = Some(receipt);
        Ok(outcome)
    }

    /// Resolve and check every plan entry.
    fn plan(&self, plan: &UpgradePlan) -> Result<Vec<PlannedFacet>, UpgradeError> {
        let mut names = BTreeSet::new();
        let mut planned = Vec::with_capacity(plan.facets.len());

        for entry in &plan.facets {
            if !names.insert(entry.name.as_str()) {
                return Err(UpgradeError::Planning(format!(
                    "facet `{}` listed twice",
                    entry.name
                )));
            }
            let abi = self.registry.get(&entry.name)?.clone();
            let protocol_initialization = plan.is_protocol_initialization_facet(&entry.name);

            if protocol_initialization {
                if !entry.args.is_empty() {
                    warn!(facet = %entry.name, "ignoring arguments of the init facet");
                }
                planned.push(PlannedFacet {
                    name: entry.name.clone(),
                    abi,
                    calldata: None,
                    omit: Vec::new(),
                    protocol_initialization,
                });
                continue;
            }

            let overloads = abi
                .functions
                .iter()
                .filter(|f| f.signature.name() == FACET_INITIALIZER_NAME)
                .count();
            if overloads > 1 {
                return Err(UpgradeError::Planning(format!(
                    "`{}` declares {overloads} `{FACET_INITIALIZER_NAME}` functions",
                    entry.name
                )));
            }

            let (calldata, omit) = match abi.initializer() {
                Some(initializer) => (
                    Some(encode_call(&initializer.signature, &entry.args)?),
                    vec![initializer.signature.canonical()],
                ),
                None if entry.args.is_empty() => (None, Vec::new()),
                None => {
                    return Err(UpgradeError::Planning(format!(
                        "`{}` has no `{FACET_INITIALIZER_NAME}` function but {} argument(s) were given",
                        entry.name,
                        entry.args.len()
                    )));
                }
            };

            planned.push(PlannedFacet {
                name: entry.name.clone(),
                abi,
                calldata,
                omit,
                protocol_initialization,
            });
        }

        let has_init_facet = plan.protocol_initialization_facet_address.is_some()
            || planned.iter().any(|p| p.protocol_initialization);
        if plan.do_cut && !has_init_facet && planned.iter().any(|p| p.calldata.is_some()) {
            return Err(UpgradeError::Planning(format!(
                "facets with an initializer need `{}`",
                plan.protocol_initialization_facet
            )));
        }

        debug!(facets = planned.len(), "plan accepted");
        Ok(planned)
    }

    /// Deploy every planned facet without a recorded address.
    ///
    /// Returns the names deployed by this call.
    async fn deploy_missing(
        &self,
        planned: &[PlannedFacet],
        attempt: &mut AttemptState,
    ) -> Result<BTreeSet<String>, UpgradeError> {
        let pending: Vec<&PlannedFacet> = planned
            .iter()
            .filter(|p| !attempt.is_deployed(&p.name))
            .filter(|p| {
                !(p.protocol_initialization && attempt.protocol_initialization_facet().is_some())
            })
            .collect();
        for facet in planned.iter().filter(|p| attempt.is_deployed(&p.name)) {
            debug!(facet = %facet.name, "reusing facet from an earlier attempt");
        }

        let env = &self.env;
        let results = join_all(pending.iter().map(|&facet| async move {
            let result = env.deploy(DeployRequest::new(facet.abi.clone())).await;
            (facet.name.as_str(), result)
        }))
        .await;

        let mut fresh = BTreeSet::new();
        let mut failure = None;
        for (name, result) in results {
            match result {
                Ok(address) => {
                    debug!(facet = name, %address, "facet deployed");
                    attempt.record_deployment(name, address);
                    fresh.insert(name.to_string());
                }
                Err(error) => {
                    warn!(facet = name, %error, "facet deployment failed");
                    failure.get_or_insert(UpgradeError::DeploymentFailed {
                        facet: name.to_string(),
                        reason: deploy_reason(error),
                    });
                }
            }
        }

        match failure {
            Some(error) => Err(error),
            None => Ok(fresh),
        }
    }

    async fn cut_and_confirm<C>(
        &mut self,
        upgrade: Upgrade,
        confirmations: u64,
        preflight: bool,
        cancel: C,
    ) -> Result<Receipt, UpgradeError>
    where
        C: Future<Output = ()>,
    {
        self.advance(UpgradePhase::Cutting);
        upgrade.validate()?;

        if preflight {
            let loupe = LoupeClient::new(&*self.env, self.diamond);
            if let Err(error) = loupe.preflight(&upgrade.cuts).await {
                warn!(%error, "preflight rejected the cut");
                return Err(error);
            }
        }

        info!(
            cuts = upgrade.cuts.len(),
            selectors = upgrade.selectors().len(),
            version = %upgrade.version,
            "submitting diamond cut"
        );
        let tx = self
            .env
            .submit(TransactionPayload::DiamondCut {
                diamond: self.diamond,
                upgrade,
            })
            .await?;

        self.advance(UpgradePhase::Confirming);
        info!(%tx, confirmations, "waiting for confirmations");
        let receipt = tokio::select! {
            result = self.env.wait_for_confirmations(tx, confirmations) => result?,
            () = cancel => {
                warn!(%tx, "confirmation wait cancelled, outcome unknown");
                return Err(UpgradeError::ConfirmationCancelled { tx });
            }
        };
        info!(%tx, block = receipt.block_number, "diamond cut confirmed");
        Ok(receipt)
    }

    fn advance(&mut self, next: UpgradePhase) {
        info!(from = %self.phase, to = %next, "upgrade phase");
        self.phase = next;
        self.history.push(next);
    }

    fn reset(&mut self) {
        self.phase = UpgradePhase::Planning;
        self.history = vec![UpgradePhase::Planning];
    }

    fn fail(&mut self, error: UpgradeError) -> UpgradeFailure {
        let phase = self.phase;
        warn!(%phase, %error, retryable = error.is_retryable(), "upgrade attempt failed");
        self.advance(UpgradePhase::Failed);
        UpgradeFailure { phase, error }
    }
}

fn deploy_reason(error: EnvError) -> String {
    match error {
        EnvError::Transport(reason) => reason,
        EnvError::Reverted(revert) => revert.to_string(),
        other => other.to_string(),
    }
}

// =============================================================================
// TESTS
// =============================================================================
