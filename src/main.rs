//! EMBER (EMB) Node
//!
//! Opens the persistent stores, reconstructs the block tree, starts
//! the sync/forge controller and keeps running until Ctrl+C. Shutdown
//! commits and closes the storage; only a storage-open failure at boot
//! is fatal.

use std::process::ExitCode;
use std::sync::{Arc, RwLock};

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ember_core::config::NodeConfig;
use ember_core::consensus::NxtConsensus;
use ember_core::node::{Controller, GenesisInfo, SystemTimeSource, TimeSource};
use ember_core::p2p::{ChannelNetwork, Network, PeerBook};
use ember_core::storage::{BlockTree, MerkleTree};
use ember_core::wallet::{Wallet, WalletSeed};

/// EMBER proof-of-stake node
#[derive(Debug, Parser)]
#[command(name = "ember-node", version, about)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    /// Override the data directory
    #[arg(long)]
    data_dir: Option<std::path::PathBuf>,

    /// Forge even when no peers are known
    #[arg(long)]
    offline_generation: bool,

    /// Forge with the published development accounts
    #[arg(long)]
    dev_accounts: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match NodeConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                error!("cannot load config {}: {e}", path.display());
                return ExitCode::from(1);
            }
        },
        None => NodeConfig::default(),
    };
    if let Some(data_dir) = cli.data_dir {
        config.tree_dir = data_dir;
    }
    if cli.offline_generation {
        config.offline_generation = true;
    }

    let genesis = GenesisInfo::new();
    info!(
        chain = ember_core::constants::CHAIN_FULL_NAME,
        genesis = %genesis.id,
        base_target = genesis.base_target,
        allocations = genesis.allocation_total,
        "starting node"
    );

    // Storage open failure is the one unrecoverable boot error
    let db = match sled::open(&config.tree_dir) {
        Ok(db) => db,
        Err(e) => {
            error!("cannot open storage at {}: {e}", config.tree_dir.display());
            return ExitCode::from(1);
        }
    };
    let tree = match BlockTree::open(&db, NxtConsensus) {
        Ok(tree) => tree,
        Err(e) => {
            error!("cannot reconstruct block tree: {e}");
            return ExitCode::from(1);
        }
    };

    // Authenticate the configured dataset, if any
    if let Some(dataset) = &config.dataset_file {
        match MerkleTree::from_file(&db, dataset, config.segment_size) {
            Ok(segments) => info!(
                root = %segments.root_hash(),
                leaves = segments.leaf_count(),
                "authenticated segment store ready"
            ),
            Err(e) => warn!("cannot build segment store from {}: {e}", dataset.display()),
        }
    }

    let wallet = if cli.dev_accounts {
        let seed = WalletSeed {
            keys: ember_core::node::genesis_accounts()
                .iter()
                .map(|(key, _)| key.to_bytes())
                .collect(),
        };
        match Wallet::from_seed(&seed) {
            Ok(wallet) => {
                info!(accounts = wallet.len(), "forging with development accounts");
                wallet
            }
            Err(e) => {
                warn!("cannot restore development accounts: {e}");
                Wallet::new()
            }
        }
    } else {
        Wallet::new()
    };

    // The transport drains this channel; until one is wired up the
    // node logs and drops its outbound traffic.
    let (outbound_tx, mut outbound_rx) = tokio::sync::mpsc::unbounded_channel();
    let book = Arc::new(RwLock::new(PeerBook::new()));
    let network = Arc::new(ChannelNetwork::new(outbound_tx, book));
    tokio::spawn(async move {
        while let Some(outbound) = outbound_rx.recv().await {
            tracing::trace!(
                to = ?outbound.to,
                command = outbound.message.command(),
                "outbound message dropped: no transport attached"
            );
        }
    });

    let time = Arc::new(SystemTimeSource);
    let (controller, handle, mailbox) = match Controller::new(
        config,
        tree,
        wallet,
        network as Arc<dyn Network>,
        time as Arc<dyn TimeSource>,
    ) {
        Ok(parts) => parts,
        Err(e) => {
            error!("cannot seed chain: {e}");
            return ExitCode::from(1);
        }
    };

    let runner = tokio::spawn(controller.run(mailbox));

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => warn!("cannot listen for shutdown signal: {e}"),
    }

    // The controller commits and closes the tree on its way out
    handle.shutdown();
    if let Err(e) = runner.await {
        warn!("controller task failed: {e}");
    }

    info!("node stopped");
    ExitCode::SUCCESS
}
