//! facetcut - diamond facet upgrade tool

use clap::{Parser, Subcommand, ValueEnum};
use facetcut::cli::{
    CliError, cmd_cut, cmd_init_chain, cmd_interface_id, cmd_loupe, cmd_remove, cmd_replace,
    cmd_selectors, cmd_state_modifying, cmd_upgrade,
};
use facetcut_core::{Address, FacetCutAction};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// facetcut - diamond facet upgrade tool
#[derive(Parser, Debug)]
#[command(name = "facetcut")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    // === Offline ===
    /// List the routable selectors of a contract
    Selectors {
        /// Artifacts file
        #[arg(short, long)]
        artifacts: PathBuf,
        /// Contract name
        contract: String,
        /// Signatures, selectors or names to leave out
        #[arg(long)]
        omit: Vec<String>,
    },

    /// Compute the ERC-165 interface id of an interface
    InterfaceId {
        #[arg(short, long)]
        artifacts: PathBuf,
        contract: String,
        /// Do not cancel inherited selectors
        #[arg(long)]
        skip_base_check: bool,
    },

    /// Build a cut for a contract at an address
    Cut {
        #[arg(short, long)]
        artifacts: PathBuf,
        contract: String,
        /// Facet address
        #[arg(long)]
        address: Address,
        #[arg(long, value_enum, default_value_t = CutAction::Add)]
        action: CutAction,
        #[arg(long)]
        omit: Vec<String>,
    },

    /// List state-modifying functions of facets
    StateModifying {
        #[arg(short, long)]
        artifacts: PathBuf,
        /// Contract names
        #[arg(required = true)]
        contracts: Vec<String>,
        #[arg(long)]
        omit: Vec<String>,
        /// Print Keccak-256 hashes instead of signatures
        #[arg(long)]
        hashes: bool,
    },

    // === Simulated chain ===
    /// Create a simulated chain with an empty diamond
    InitChain {
        /// Chain file
        #[arg(short, long)]
        chain: PathBuf,
        /// Diamond owner
        #[arg(long)]
        owner: Address,
        /// Overwrite an existing chain file
        #[arg(long)]
        force: bool,
    },

    /// Deploy facets and cut them into the diamond
    Upgrade {
        #[arg(short, long)]
        artifacts: PathBuf,
        /// Upgrade plan
        #[arg(short, long)]
        plan: PathBuf,
        #[arg(short, long)]
        chain: PathBuf,
        /// Attempt state, kept between retries
        #[arg(long, default_value = "facetcut.attempt")]
        state: PathBuf,
    },

    /// Deploy a new version of a facet and replace its selectors
    Replace {
        #[arg(short, long)]
        artifacts: PathBuf,
        #[arg(short, long)]
        chain: PathBuf,
        contract: String,
        #[arg(long)]
        omit: Vec<String>,
        #[arg(long)]
        version: String,
        /// Attempt state, kept between retries
        #[arg(long, default_value = "facetcut-replace.attempt")]
        state: PathBuf,
    },

    /// Remove a facet's selectors from the diamond
    Remove {
        #[arg(short, long)]
        chain: PathBuf,
        /// Facet address
        facet: Address,
        /// Signatures to keep routed
        #[arg(long)]
        keep: Vec<String>,
        #[arg(long)]
        version: String,
    },

    /// Show the diamond's facets and selectors
    Loupe {
        #[arg(short, long)]
        chain: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CutAction {
    Add,
    Replace,
    Remove,
}

impl From<CutAction> for FacetCutAction {
    fn from(action: CutAction) -> Self {
        match action {
            CutAction::Add => Self::Add,
            CutAction::Replace => Self::Replace,
            CutAction::Remove => Self::Remove,
        }
    }
}

/// Resolves on Ctrl-C. Never resolves if the signal cannot be watched.
async fn interrupted() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

async fn run(command: Commands) -> Result<String, CliError> {
    match command {
        Commands::Selectors {
            artifacts,
            contract,
            omit,
        } => cmd_selectors(&artifacts, &contract, &omit),
        Commands::InterfaceId {
            artifacts,
            contract,
            skip_base_check,
        } => cmd_interface_id(&artifacts, &contract, skip_base_check),
        Commands::Cut {
            artifacts,
            contract,
            address,
            action,
            omit,
        } => cmd_cut(&artifacts, &contract, action.into(), address, &omit),
        Commands::StateModifying {
            artifacts,
            contracts,
            omit,
            hashes,
        } => cmd_state_modifying(&artifacts, &contracts, &omit, hashes),
        Commands::InitChain {
            chain,
            owner,
            force,
        } => cmd_init_chain(&chain, owner, force),
        Commands::Upgrade {
            artifacts,
            plan,
            chain,
            state,
        } => cmd_upgrade(&artifacts, &plan, &chain, &state, interrupted()).await,
        Commands::Replace {
            artifacts,
            chain,
            contract,
            omit,
            version,
            state,
        } => {
            cmd_replace(
                &artifacts,
                &chain,
                &state,
                &contract,
                &omit,
                &version,
                interrupted(),
            )
            .await
        }
        Commands::Remove {
            chain,
            facet,
            keep,
            version,
        } => cmd_remove(&chain, facet, &keep, &version, interrupted()).await,
        Commands::Loupe { chain } => cmd_loupe(&chain).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli.command).await {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}
