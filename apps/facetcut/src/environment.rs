//! # Execution Environment
//!
//! The remote surface an upgrade talks to: contract deployment, read-only
//! calls, transaction submission and confirmation. The environment owns
//! the authoritative routing table; everything the coordinator knows about
//! it comes back through this trait.

use async_trait::async_trait;
use facetcut_core::{Address, ContractAbi, Revert, Upgrade, VersionTag};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Opaque handle of a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxHandle(pub u64);

impl fmt::Display for TxHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx#{}", self.0)
    }
}

/// A contract to deploy.
#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub contract: Arc<ContractAbi>,
    pub constructor_args: Vec<u8>,
}

impl DeployRequest {
    /// Deploy `contract` with no constructor arguments.
    #[must_use]
    pub fn new(contract: Arc<ContractAbi>) -> Self {
        Self {
            contract,
            constructor_args: Vec::new(),
        }
    }
}

/// What a transaction does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionPayload {
    /// One atomic routing-table update against `diamond`.
    DiamondCut { diamond: Address, upgrade: Upgrade },
}

/// A confirmed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx: TxHandle,
    /// Block the transaction was included in.
    pub block_number: u64,
    /// Confirmations observed when the wait returned.
    pub confirmations: u64,
    /// Version recorded by the transaction, if any.
    pub version: Option<VersionTag>,
}

/// Environment-level failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EnvError {
    /// The transaction or call reverted.
    #[error("reverted: {0}")]
    Reverted(Revert),

    /// The environment could not be reached or refused the request.
    #[error("transport failure: {0}")]
    Transport(String),

    /// No transaction with this handle was ever submitted.
    #[error("unknown transaction {0}")]
    UnknownTransaction(TxHandle),
}

/// The remote surface.
///
/// Implementations must be safe to share across the concurrent
/// deployments of one attempt.
#[async_trait]
pub trait ExecutionEnvironment: Send + Sync {
    /// Deploy a contract and return its assigned address.
    async fn deploy(&self, request: DeployRequest) -> Result<Address, EnvError>;

    /// Read-only call of `signature` on `address` with ABI-encoded `args`.
    async fn call(&self, address: Address, signature: &str, args: &[u8])
    -> Result<Vec<u8>, EnvError>;

    /// Submit a transaction. A revert is reported by the confirmation wait.
    async fn submit(&self, payload: TransactionPayload) -> Result<TxHandle, EnvError>;

    /// Wait until `tx` has `confirmations` confirmations.
    async fn wait_for_confirmations(
        &self,
        tx: TxHandle,
        confirmations: u64,
    ) -> Result<Receipt, EnvError>;
}

#[async_trait]
impl<E: ExecutionEnvironment + ?Sized> ExecutionEnvironment for Arc<E> {
    async fn deploy(&self, request: DeployRequest) -> Result<Address, EnvError> {
        (**self).deploy(request).await
    }

    async fn call(
        &self,
        address: Address,
        signature: &str,
        args: &[u8],
    ) -> Result<Vec<u8>, EnvError> {
        (**self).call(address, signature, args).await
    }

    async fn submit(&self, payload: TransactionPayload) -> Result<TxHandle, EnvError> {
        (**self).submit(payload).await
    }

    async fn wait_for_confirmations(
        &self,
        tx: TxHandle,
        confirmations: u64,
    ) -> Result<Receipt, EnvError> {
        (**self).wait_for_confirmations(tx, confirmations).await
    }
}
