//! # facetcut Library
//!
//! This library exposes the facetcut modules for testing and integration.
//!
//! The main binary uses these modules through the `main.rs` entry point.

pub mod cli;
pub mod config;
pub mod coordinator;
pub mod environment;
pub mod error;
pub mod loupe;
pub mod simulated;

pub use coordinator::{
    ReplaceOutcome, UpgradeCoordinator, UpgradeFailure, UpgradeOutcome, UpgradePhase,
};
pub use environment::{ExecutionEnvironment, Receipt, TxHandle};
pub use error::UpgradeError;

// Re-export facetcut_core for convenience
pub use facetcut_core;
