//! Sync/forge controller
//!
//! A single-threaded actor around the block tree. Messages arrive
//! through one mailbox and are processed to completion one at a time,
//! so tree mutations are totally ordered. A one-second tick polls the
//! network for the best peer score; the answer drives the three-state
//! machine:
//!
//! - a peer score above ours moves us to Syncing and requests blocks,
//! - a peer score at or below ours moves us to Generating,
//! - no peers means Offline, unless offline generation is enabled.
//!
//! Forging runs off the loop on a snapshot and posts its result back
//! as a message. State changes never cancel an attempt in flight; a
//! stale result simply fails validation against the current tree.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::config::NodeConfig;
use crate::consensus::{BalanceSource, Block, BlockId, ConsensusRules, NxtConsensus};
use crate::forging::{attempt, ForgeContext, ForgeResult};
use crate::p2p::{BlockMessage, Message, Network};
use crate::storage::{AppendError, BlockTree, Ledger, MemoryPool};
use crate::validation::Transaction;
use crate::wallet::Wallet;

use super::{genesis_block, TimeSource};

/// Controller states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Offline,
    Syncing,
    Generating,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Offline => "offline",
            Status::Syncing => "syncing",
            Status::Generating => "generating",
        }
    }
}

/// A snapshot of the chain tip
#[derive(Debug, Clone)]
pub struct ChainInfo {
    pub height: u32,
    pub score: u128,
    pub tip: BlockId,
}

/// Messages the controller processes, one at a time
#[derive(Debug)]
pub enum NodeMessage {
    /// The network-wide best chain score; `None` when no peers answered
    MaxChainScore(Option<u128>),
    /// An incoming or locally forged block; a `None` source is local
    NewBlock(Box<Block>, Option<SocketAddr>),
    /// A transaction submitted for inclusion
    NewTransaction(Box<Transaction>),
    /// Reply with the current state name
    GetStatus(oneshot::Sender<&'static str>),
    /// Reply with the chain tip summary
    GetChainInfo(oneshot::Sender<ChainInfo>),
    /// A forging attempt finished without a block
    ForgeIdle,
    /// Stop the actor loop
    Shutdown,
}

/// Cloneable front door to a running controller
#[derive(Clone)]
pub struct NodeHandle {
    sender: mpsc::UnboundedSender<NodeMessage>,
}

impl NodeHandle {
    /// Enqueue a message; false when the controller is gone
    pub fn submit(&self, message: NodeMessage) -> bool {
        self.sender.send(message).is_ok()
    }

    /// Current state name
    pub async fn status(&self) -> Option<&'static str> {
        let (reply, answer) = oneshot::channel();
        if !self.submit(NodeMessage::GetStatus(reply)) {
            return None;
        }
        answer.await.ok()
    }

    /// Chain tip summary
    pub async fn chain_info(&self) -> Option<ChainInfo> {
        let (reply, answer) = oneshot::channel();
        if !self.submit(NodeMessage::GetChainInfo(reply)) {
            return None;
        }
        answer.await.ok()
    }

    /// Ask the controller to stop
    pub fn shutdown(&self) {
        let _ = self.sender.send(NodeMessage::Shutdown);
    }
}

/// The sync/forge state machine. Owns the tree, the balance sheet,
/// the pool and the wallet; everything else reaches them through the
/// mailbox.
pub struct Controller {
    config: NodeConfig,
    rules: NxtConsensus,
    tree: BlockTree<NxtConsensus>,
    ledger: Ledger,
    pool: MemoryPool,
    wallet: Wallet,
    network: Arc<dyn Network>,
    time: Arc<dyn TimeSource>,
    status: Status,
    mailbox: mpsc::UnboundedSender<NodeMessage>,
    forge_in_flight: bool,
}

impl Controller {
    /// Build a controller over an opened tree. An empty tree is seeded
    /// with genesis; the balance sheet is replayed from the best chain.
    pub fn new(
        config: NodeConfig,
        mut tree: BlockTree<NxtConsensus>,
        wallet: Wallet,
        network: Arc<dyn Network>,
        time: Arc<dyn TimeSource>,
    ) -> Result<(Self, NodeHandle, mpsc::UnboundedReceiver<NodeMessage>), AppendError> {
        if tree.is_empty() {
            info!("seeding empty tree with genesis");
            tree.append(genesis_block())?;
        }

        let mut ledger = Ledger::new();
        {
            let chain: Vec<&Block> = tree.best_chain().collect();
            ledger.replay(chain.into_iter().rev());
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        let handle = NodeHandle {
            sender: sender.clone(),
        };

        let controller = Self {
            config,
            rules: NxtConsensus,
            tree,
            ledger,
            pool: MemoryPool::new(),
            wallet,
            network,
            time,
            status: Status::Offline,
            mailbox: sender,
            forge_in_flight: false,
        };

        Ok((controller, handle, receiver))
    }

    /// Run the actor loop until shutdown. The tick polls peers for
    /// their best score once a second; everything else arrives through
    /// the mailbox.
    pub async fn run(mut self, mut mailbox: mpsc::UnboundedReceiver<NodeMessage>) {
        let mut tick = interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.network.broadcast(Message::GetMaxChainScore);
                }
                message = mailbox.recv() => {
                    match message {
                        Some(message) => {
                            if !self.handle(message) {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }

        if let Err(e) = self.tree.commit() {
            warn!("final commit failed: {e}");
        }
        if let Err(e) = self.tree.close() {
            warn!("storage close failed: {e}");
        }
        info!("controller stopped");
    }

    /// Process one message; false stops the loop
    fn handle(&mut self, message: NodeMessage) -> bool {
        match message {
            NodeMessage::MaxChainScore(score) => self.handle_max_chain_score(score),
            NodeMessage::NewBlock(block, source) => self.handle_new_block(*block, source),
            NodeMessage::NewTransaction(tx) => self.handle_new_transaction(*tx),
            NodeMessage::GetStatus(reply) => {
                let _ = reply.send(self.status.as_str());
            }
            NodeMessage::GetChainInfo(reply) => {
                let _ = reply.send(ChainInfo {
                    height: self.tree.height(),
                    score: self.tree.score(),
                    tip: self
                        .tree
                        .last_block()
                        .map(|block| block.id())
                        .unwrap_or(BlockId::zero()),
                });
            }
            NodeMessage::ForgeIdle => {
                self.forge_in_flight = false;
            }
            NodeMessage::Shutdown => return false,
        }
        true
    }

    fn handle_max_chain_score(&mut self, score: Option<u128>) {
        match score {
            Some(peer_score) if peer_score > self.tree.score() => {
                self.set_status(Status::Syncing);
                let ids = self.tree.last_signatures(self.config.max_blocks_chunks);
                match self.network.best_peer() {
                    Some(peer) => self.network.send(peer.address, Message::GetSignatures(ids)),
                    None => debug!("behind the network but no best peer known"),
                }
            }
            Some(_) => {
                self.set_status(Status::Generating);
                self.schedule_forging();
            }
            None if self.config.offline_generation => {
                self.set_status(Status::Generating);
                self.schedule_forging();
            }
            None => self.set_status(Status::Offline),
        }
    }

    fn handle_new_block(&mut self, block: Block, source: Option<SocketAddr>) {
        if source.is_none() {
            self.forge_in_flight = false;
        }
        if self.status == Status::Offline {
            debug!("ignoring block while offline");
            return;
        }

        let id = block.id();

        if !block.verify_signature() {
            warn!(block = %id, "discarding block with invalid signature");
            return;
        }

        if !block.is_genesis() {
            if let Some(parent) = self.tree.block(&block.parent_id).cloned() {
                if let Err(e) = self.rules.validate(&block, &parent, &self.ledger) {
                    warn!(block = %id, "discarding block: {e}");
                    return;
                }
            }
            if !self.ledger.covers_block(&block) {
                warn!(block = %id, "discarding block with underfunded payment");
                return;
            }
        }

        match self.tree.append(block.clone()) {
            Ok(()) => {
                self.ledger.apply_block(&block);
                self.pool.remove_committed(&block.transactions);
                let height = self.tree.height();
                info!(block = %id, height, score = self.tree.score(), "block accepted");

                if source.is_none() {
                    self.network
                        .broadcast(Message::Block(BlockMessage { height, block }));
                }
            }
            Err(AppendError::AlreadyPresent(_)) => {
                debug!(block = %id, "duplicate block ignored");
            }
            Err(AppendError::ParentMissing(parent_id)) => {
                warn!(block = %id, parent = %parent_id, "parent unknown, requesting blocks");
                let ids = self.tree.last_signatures(self.config.max_blocks_chunks);
                if let Some(peer) = self.network.best_peer() {
                    self.network.send(peer.address, Message::GetSignatures(ids));
                }
            }
            Err(e) => {
                warn!(block = %id, "discarding block: {e}");
            }
        }
    }

    fn handle_new_transaction(&mut self, tx: Transaction) {
        if !self.ledger.covers(&tx) {
            debug!("transaction refused: sender cannot cover amount and fee");
            return;
        }
        let now = self.time.now_millis();
        if let Err(e) = self.pool.put(tx, now) {
            debug!("transaction refused: {e}");
        }
    }

    fn set_status(&mut self, status: Status) {
        if self.status != status {
            info!(from = self.status.as_str(), to = status.as_str(), "state change");
            self.status = status;
        }
    }

    /// Kick off one forging attempt on a snapshot of the tip, unless
    /// one is already in flight. The worker sleeps the configured
    /// delay, draws every account's lottery and posts the outcome back
    /// to the mailbox.
    fn schedule_forging(&mut self) {
        if self.status != Status::Generating || self.forge_in_flight {
            return;
        }
        let Some(parent) = self.tree.last_block().cloned() else {
            return;
        };
        let accounts = match self.wallet.forging_accounts() {
            Ok(accounts) => accounts
                .iter()
                .map(|keypair| {
                    let balance = self.ledger.effective_balance(&keypair.public_key);
                    (keypair.private_key().clone(), balance)
                })
                .collect(),
            Err(e) => {
                debug!("forging unavailable: {e}");
                return;
            }
        };

        let now = self.time.now_millis();
        // Pack only what the senders can still afford, in order;
        // balances may have moved since pool admission
        let mut funds = self.ledger.clone();
        let transactions: Vec<Transaction> = self
            .pool
            .eligible(now, self.config.max_transactions_per_block)
            .into_iter()
            .filter(|tx| funds.admit(tx))
            .collect();

        let context = ForgeContext {
            parent,
            accounts,
            transactions,
        };
        let delay = self.config.block_generation_delay();
        let mailbox = self.mailbox.clone();
        let time = Arc::clone(&self.time);

        self.forge_in_flight = true;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let message = match attempt(&context, time.now_millis()) {
                ForgeResult::Forged(block) => NodeMessage::NewBlock(Box::new(block), None),
                ForgeResult::Idle => NodeMessage::ForgeIdle,
            };
            let _ = mailbox.send(message);
        });
    }

    /// Chain tip height
    pub fn height(&self) -> u32 {
        self.tree.height()
    }

    /// Chain tip cumulative score
    pub fn score(&self) -> u128 {
        self.tree.score()
    }

    /// Current state
    pub fn status(&self) -> Status {
        self.status
    }
}
