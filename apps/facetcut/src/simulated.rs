//! # Simulated Environment
//!
//! An in-process chain holding one diamond. Deployments get CREATE-style
//! addresses, the routing table is a [`RoutingTable`], and a diamond-cut
//! submission is executed atomically: cuts and init call are staged on a
//! copy of the table and committed only if everything succeeds.
//!
//! The whole chain serializes to JSON so that successive CLI runs share
//! one table. Fault injection (failed deployments, reverting initializers)
//! is process-local and never persisted.

use crate::environment::{
    DeployRequest, EnvError, ExecutionEnvironment, Receipt, TransactionPayload, TxHandle,
};
use async_trait::async_trait;
use facetcut_core::abi_codec::{
    decode_address, decode_selector, encode_address, encode_address_array, encode_selector_array,
};
use facetcut_core::{
    Address, ContractAbi, FunctionSignature, Revert, RoutingTable, RoutingView, SELECTOR_LEN,
    Upgrade, VersionTag,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

// =============================================================================
// CHAIN STATE
// =============================================================================

/// Outcome of one submitted transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TxRecord {
    block: u64,
    outcome: Result<Option<VersionTag>, Revert>,
}

/// Persistent state of the simulated chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainState {
    deployer: Address,
    owner: Address,
    sender: Address,
    diamond: Address,
    nonce: u64,
    block: u64,
    next_tx: u64,
    /// address -> deployed contract
    code: BTreeMap<Address, ContractAbi>,
    table: RoutingTable,
    version: Option<VersionTag>,
    transactions: BTreeMap<u64, TxRecord>,
    /// contract name -> number of deployments
    deployments: BTreeMap<String, u32>,
}

impl ChainState {
    /// A chain where `owner` deployed the diamond and holds the upgrade role.
    #[must_use]
    pub fn new(owner: Address) -> Self {
        Self {
            deployer: owner,
            owner,
            sender: owner,
            diamond: owner.create(0),
            nonce: 1,
            block: 1,
            next_tx: 1,
            code: BTreeMap::new(),
            table: RoutingTable::new(),
            version: None,
            transactions: BTreeMap::new(),
            deployments: BTreeMap::new(),
        }
    }

    /// The diamond address.
    #[must_use]
    pub fn diamond(&self) -> Address {
        self.diamond
    }

    /// Holder of the upgrade role.
    #[must_use]
    pub fn owner(&self) -> Address {
        self.owner
    }

    /// Account submitting transactions.
    #[must_use]
    pub fn sender(&self) -> Address {
        self.sender
    }

    /// The diamond's routing table.
    #[must_use]
    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    /// Version recorded by the last successful upgrade.
    #[must_use]
    pub fn version(&self) -> Option<&VersionTag> {
        self.version.as_ref()
    }

    /// Name of the contract deployed at `address`.
    #[must_use]
    pub fn contract_at(&self, address: Address) -> Option<&str> {
        self.code.get(&address).map(|abi| abi.name.as_str())
    }

    /// Interface of the contract deployed at `address`.
    #[must_use]
    pub fn abi_at(&self, address: Address) -> Option<&ContractAbi> {
        self.code.get(&address)
    }

    /// Execute a diamond cut. Returns the recorded version on success.
    fn execute_cut(
        &mut self,
        upgrade: &Upgrade,
        init_faults: &BTreeMap<String, String>,
    ) -> Result<Option<VersionTag>, Revert> {
        if self.sender != self.owner {
            return Err(Revert::UnauthorizedUpgrader {
                sender: self.sender,
            });
        }
        upgrade.validate()?;
        let staged = self.table.staged(&upgrade.cuts)?;

        if let Some(target) = upgrade.init_target {
            self.run_initializers(target, upgrade, init_faults)?;
        }

        self.table = staged;
        self.version = Some(upgrade.version);
        Ok(self.version)
    }

    fn run_initializers(
        &self,
        target: Address,
        upgrade: &Upgrade,
        init_faults: &BTreeMap<String, String>,
    ) -> Result<(), Revert> {
        let reverted = |reason: String| Revert::InitializationReverted { reason };

        let Some(initializer) = self.code.get(&target) else {
            return Err(reverted(format!("init target {target} has no code")));
        };
        if let Some(reason) = init_faults.get(&initializer.name) {
            return Err(reverted(reason.clone()));
        }

        for (facet, calldata) in &upgrade.init_calldata {
            let Some(abi) = self.code.get(facet) else {
                return Err(reverted(format!("facet {facet} has no code")));
            };
            let expected = abi.initializer().map(|f| f.selector());
            let called = calldata.get(..SELECTOR_LEN);
            match (expected, called) {
                (Some(expected), Some(called)) if called == expected.as_bytes() => {}
                _ => {
                    return Err(reverted(format!(
                        "{} does not accept the initializer call",
                        abi.name
                    )));
                }
            }
            if let Some(reason) = init_faults.get(&abi.name) {
                return Err(reverted(reason.clone()));
            }
        }
        Ok(())
    }

    /// Answer a loupe query on the diamond.
    fn diamond_call(&self, canonical: &str, args: &[u8]) -> Result<Vec<u8>, EnvError> {
        let malformed = |e: facetcut_core::FacetError| EnvError::Reverted(Revert::Other(e.to_string()));
        match canonical {
            "facetAddress(bytes4)" => {
                let selector = decode_selector(args).map_err(malformed)?;
                let facet = self.table.facet_address(selector).unwrap_or(Address::ZERO);
                Ok(encode_address(facet))
            }
            "facetAddresses()" => Ok(encode_address_array(&self.table.facet_addresses())),
            "facetFunctionSelectors(address)" => {
                let facet = decode_address(args).map_err(malformed)?;
                Ok(encode_selector_array(
                    &self.table.facet_function_selectors(facet),
                ))
            }
            "owner()" => Ok(encode_address(self.owner)),
            other => {
                let selector = facetcut_core::signature::selector_of_canonical(other);
                if self.table.facet_address(selector).is_some() {
                    Ok(Vec::new())
                } else {
                    Err(EnvError::Reverted(Revert::Other(
                        "Diamond: Function does not exist".to_string(),
                    )))
                }
            }
        }
    }
}

// =============================================================================
// FAULT INJECTION
// =============================================================================

#[derive(Debug, Default)]
struct Faults {
    /// contract name -> reason, consumed by the next deployment
    deploy: BTreeMap<String, String>,
    /// contract name -> revert reason of its initializer
    init: BTreeMap<String, String>,
}

// =============================================================================
// SIMULATED ENVIRONMENT
// =============================================================================

/// In-process [`ExecutionEnvironment`].
#[derive(Debug)]
pub struct SimulatedEnvironment {
    state: Mutex<ChainState>,
    faults: Mutex<Faults>,
    block_time: Option<Duration>,
}

impl SimulatedEnvironment {
    /// A fresh chain owned by `owner`.
    #[must_use]
    pub fn new(owner: Address) -> Self {
        Self::from_state(ChainState::new(owner))
    }

    /// Resume a persisted chain.
    #[must_use]
    pub fn from_state(state: ChainState) -> Self {
        Self {
            state: Mutex::new(state),
            faults: Mutex::new(Faults::default()),
            block_time: None,
        }
    }

    /// Mine one block per `block_time` while waiting for confirmations.
    ///
    /// Without it, confirmation waits return immediately.
    #[must_use]
    pub fn with_block_time(mut self, block_time: Duration) -> Self {
        self.block_time = Some(block_time);
        self
    }

    /// Copy of the current chain state.
    pub async fn snapshot(&self) -> ChainState {
        self.state.lock().await.clone()
    }

    /// The diamond address.
    pub async fn diamond(&self) -> Address {
        self.state.lock().await.diamond
    }

    /// Copy of the diamond's routing table.
    pub async fn routing_table(&self) -> RoutingTable {
        self.state.lock().await.table.clone()
    }

    /// Version recorded by the last successful upgrade.
    pub async fn version(&self) -> Option<VersionTag> {
        self.state.lock().await.version
    }

    /// How many times a contract was deployed.
    pub async fn deployments_of(&self, name: &str) -> u32 {
        self.state
            .lock()
            .await
            .deployments
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    /// Submit subsequent transactions from `sender`.
    pub async fn set_sender(&self, sender: Address) {
        self.state.lock().await.sender = sender;
    }

    /// Make the next deployment of `name` fail with `reason`.
    pub async fn fail_next_deploy(&self, name: impl Into<String>, reason: impl Into<String>) {
        self.faults
            .lock()
            .await
            .deploy
            .insert(name.into(), reason.into());
    }

    /// Make the initializer of `name` revert with `reason`.
    pub async fn revert_initializer(&self, name: impl Into<String>, reason: impl Into<String>) {
        self.faults
            .lock()
            .await
            .init
            .insert(name.into(), reason.into());
    }
}

#[async_trait]
impl ExecutionEnvironment for SimulatedEnvironment {
    async fn deploy(&self, request: DeployRequest) -> Result<Address, EnvError> {
        let name = request.contract.name.clone();
        if let Some(reason) = self.faults.lock().await.deploy.remove(&name) {
            return Err(EnvError::Transport(reason));
        }

        let mut state = self.state.lock().await;
        let address = state.deployer.create(state.nonce);
        state.nonce += 1;
        state.block += 1;
        state.code.insert(address, (*request.contract).clone());
        *state.deployments.entry(name.clone()).or_default() += 1;
        debug!(contract = %name, %address, "deployed");
        Ok(address)
    }

    async fn call(
        &self,
        address: Address,
        signature: &str,
        args: &[u8],
    ) -> Result<Vec<u8>, EnvError> {
        let canonical = FunctionSignature::parse(signature)
            .map_err(|e| EnvError::Transport(e.to_string()))?
            .canonical();

        let state = self.state.lock().await;
        if address == state.diamond {
            return state.diamond_call(&canonical, args);
        }
        match state.code.get(&address) {
            Some(_) => Ok(Vec::new()),
            None => Err(EnvError::Transport(format!("no code at {address}"))),
        }
    }

    async fn submit(&self, payload: TransactionPayload) -> Result<TxHandle, EnvError> {
        let TransactionPayload::DiamondCut { diamond, upgrade } = payload;
        let init_faults = self.faults.lock().await.init.clone();

        let mut state = self.state.lock().await;
        if diamond != state.diamond {
            return Err(EnvError::Transport(format!("no diamond at {diamond}")));
        }

        let outcome = state.execute_cut(&upgrade, &init_faults);
        state.block += 1;
        let tx = TxHandle(state.next_tx);
        state.next_tx += 1;
        let block = state.block;
        debug!(%tx, block, ok = outcome.is_ok(), "diamond cut executed");
        state.transactions.insert(tx.0, TxRecord { block, outcome });
        Ok(tx)
    }

    async fn wait_for_confirmations(
        &self,
        tx: TxHandle,
        confirmations: u64,
    ) -> Result<Receipt, EnvError> {
        loop {
            {
                let mut state = self.state.lock().await;
                let record = state
                    .transactions
                    .get(&tx.0)
                    .cloned()
                    .ok_or(EnvError::UnknownTransaction(tx))?;
                let version = record.outcome.map_err(EnvError::Reverted)?;

                let last = record
                    .block
                    .checked_add(confirmations.saturating_sub(1))
                    .ok_or_else(|| {
                        EnvError::Transport(format!("{confirmations} confirmations cannot be reached"))
                    })?;
                let seen = state.block.saturating_sub(record.block).saturating_add(1);
                if seen >= confirmations {
                    return Ok(Receipt {
                        tx,
                        block_number: record.block,
                        confirmations: seen,
                        version,
                    });
                }
                if self.block_time.is_none() {
                    state.block = last;
                    continue;
                }
            }
            if let Some(block_time) = self.block_time {
                tokio::time::sleep(block_time).await;
                self.state.lock().await.block += 1;
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use facetcut_core::abi_codec::encode_selector;
    use facetcut_core::{Facet, FacetCutAction, add_cut, selector};
    use std::sync::Arc;

    const NONE: [&str; 0] = [];

    fn owner() -> Address {
        Address::repeat_byte(0x11)
    }

    fn abi(name: &str, sigs: &[&str]) -> Arc<ContractAbi> {
        Arc::new(ContractAbi::new(name, sigs).unwrap())
    }

    fn version() -> VersionTag {
        VersionTag::new("1.0.0").unwrap()
    }

    async fn deploy(env: &SimulatedEnvironment, abi: &Arc<ContractAbi>) -> Facet {
        let address = env.deploy(DeployRequest::new(abi.clone())).await.unwrap();
        Facet::new(abi.clone(), address)
    }

    async fn cut(env: &SimulatedEnvironment, upgrade: Upgrade) -> Result<Receipt, EnvError> {
        let diamond = env.diamond().await;
        let tx = env
            .submit(TransactionPayload::DiamondCut { diamond, upgrade })
            .await?;
        env.wait_for_confirmations(tx, 1).await
    }

    #[tokio::test]
    async fn deployments_get_distinct_addresses() {
        let env = SimulatedEnvironment::new(owner());
        let a = abi("A", &["f1()"]);
        let first = env.deploy(DeployRequest::new(a.clone())).await.unwrap();
        let second = env.deploy(DeployRequest::new(a)).await.unwrap();
        assert_ne!(first, second);
        assert_ne!(first, env.diamond().await);
        assert_eq!(env.deployments_of("A").await, 2);
    }

    #[tokio::test]
    async fn injected_deploy_failure_is_one_shot() {
        let env = SimulatedEnvironment::new(owner());
        env.fail_next_deploy("A", "out of gas").await;
        let a = abi("A", &["f1()"]);
        assert_eq!(
            env.deploy(DeployRequest::new(a.clone())).await,
            Err(EnvError::Transport("out of gas".into()))
        );
        assert!(env.deploy(DeployRequest::new(a)).await.is_ok());
    }

    #[tokio::test]
    async fn successful_cut_records_routes_and_version() {
        let env = SimulatedEnvironment::new(owner());
        let a = deploy(&env, &abi("A", &["f1()", "f2()"])).await;
        let receipt = cut(&env, Upgrade::new(vec![add_cut(&a, &NONE).unwrap()], version()))
            .await
            .unwrap();

        assert_eq!(receipt.version, Some(version()));
        let table = env.routing_table().await;
        assert_eq!(table.facet_address(selector("f1()").unwrap()), Some(a.address));
        assert_eq!(env.version().await, Some(version()));
    }

    #[tokio::test]
    async fn unauthorized_sender_changes_nothing() {
        let env = SimulatedEnvironment::new(owner());
        let a = deploy(&env, &abi("A", &["f1()"])).await;
        let intruder = Address::repeat_byte(0x66);
        env.set_sender(intruder).await;

        let result = cut(&env, Upgrade::new(vec![add_cut(&a, &NONE).unwrap()], version())).await;
        assert_eq!(
            result,
            Err(EnvError::Reverted(Revert::UnauthorizedUpgrader { sender: intruder }))
        );
        assert_eq!(env.routing_table().await, RoutingTable::new());
        assert_eq!(env.version().await, None);
    }

    #[tokio::test]
    async fn reverting_initializer_rolls_back_the_cuts() {
        let env = SimulatedEnvironment::new(owner());
        let init = deploy(&env, &abi("ProtocolInitializationFacet", &["initialize(bytes32)"])).await;
        let a = deploy(&env, &abi("A", &["initialize(uint256)", "f1()"])).await;
        env.revert_initializer("A", "already initialized").await;

        let calldata = {
            let mut call = selector("initialize(uint256)").unwrap().as_bytes().to_vec();
            call.extend_from_slice(&[0u8; 32]);
            call
        };
        let upgrade = Upgrade::new(vec![add_cut(&a, &["initialize(uint256)"]).unwrap()], version())
            .with_init(init.address, BTreeMap::from([(a.address, calldata)]));

        let result = cut(&env, upgrade).await;
        assert_eq!(
            result,
            Err(EnvError::Reverted(Revert::InitializationReverted {
                reason: "already initialized".into()
            }))
        );
        assert_eq!(env.routing_table().await, RoutingTable::new());
    }

    #[tokio::test]
    async fn init_call_with_wrong_selector_reverts() {
        let env = SimulatedEnvironment::new(owner());
        let init = deploy(&env, &abi("ProtocolInitializationFacet", &["initialize(bytes32)"])).await;
        let a = deploy(&env, &abi("A", &["initialize(uint256)", "f1()"])).await;

        let upgrade = Upgrade::new(vec![add_cut(&a, &NONE).unwrap()], version())
            .with_init(init.address, BTreeMap::from([(a.address, vec![0xde, 0xad, 0xbe, 0xef])]));
        assert!(matches!(
            cut(&env, upgrade).await,
            Err(EnvError::Reverted(Revert::InitializationReverted { .. }))
        ));
    }

    #[tokio::test]
    async fn loupe_calls_answer_from_the_table() {
        let env = SimulatedEnvironment::new(owner());
        let a = deploy(&env, &abi("A", &["f1()"])).await;
        cut(&env, Upgrade::new(vec![add_cut(&a, &NONE).unwrap()], version()))
            .await
            .unwrap();

        let diamond = env.diamond().await;
        let out = env
            .call(
                diamond,
                "facetAddress(bytes4)",
                &encode_selector(selector("f1()").unwrap()),
            )
            .await
            .unwrap();
        assert_eq!(decode_address(&out).unwrap(), a.address);

        assert!(env.call(diamond, "f1()", &[]).await.is_ok());
        assert!(matches!(
            env.call(diamond, "nope()", &[]).await,
            Err(EnvError::Reverted(Revert::Other(_)))
        ));
    }

    #[tokio::test]
    async fn chain_state_survives_json() {
        let env = SimulatedEnvironment::new(owner());
        let a = deploy(&env, &abi("A", &["f1()", "f2()"])).await;
        let tx_cut = add_cut(&a, &NONE).unwrap();
        assert_eq!(tx_cut.action, FacetCutAction::Add);
        cut(&env, Upgrade::new(vec![tx_cut], version())).await.unwrap();

        let json = serde_json::to_string(&env.snapshot().await).unwrap();
        let state: ChainState = serde_json::from_str(&json).unwrap();
        assert_eq!(state.table(), &env.routing_table().await);
        assert_eq!(state.contract_at(a.address), Some("A"));
        assert_eq!(state.version(), Some(&version()));

        let resumed = SimulatedEnvironment::from_state(state);
        let b = resumed
            .deploy(DeployRequest::new(abi("B", &["f3()"])))
            .await
            .unwrap();
        assert_ne!(b, a.address);
    }

    #[tokio::test]
    async fn unreachable_confirmation_count_is_an_error() {
        let env = SimulatedEnvironment::new(owner());
        let a = deploy(&env, &abi("A", &["f1()"])).await;
        let diamond = env.diamond().await;
        let upgrade = Upgrade::new(vec![add_cut(&a, &NONE).unwrap()], version());
        let tx = env
            .submit(TransactionPayload::DiamondCut { diamond, upgrade })
            .await
            .unwrap();

        assert!(matches!(
            env.wait_for_confirmations(tx, u64::MAX).await,
            Err(EnvError::Transport(_))
        ));
        let receipt = env.wait_for_confirmations(tx, 3).await.unwrap();
        assert_eq!(receipt.confirmations, 3);
    }

    #[tokio::test]
    async fn unknown_transaction_is_reported() {
        let env = SimulatedEnvironment::new(owner());
        assert_eq!(
            env.wait_for_confirmations(TxHandle(42), 1).await,
            Err(EnvError::UnknownTransaction(TxHandle(42)))
        );
    }
}
