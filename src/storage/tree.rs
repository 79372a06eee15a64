//! Block tree / fork store
//!
//! A persistent tree of blocks rooted at genesis, keyed by block id.
//! Every node carries the cumulative score of its root path; the leaf
//! with the highest cumulative score is the chain tip. On equal scores
//! the earlier arrival keeps the tip: a later sibling must strictly
//! exceed the incumbent to move it.
//!
//! Appends flush through the keyed store with one commit per append;
//! a failed commit rolls the in-memory insertion back so memory and
//! disk never disagree.

use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, info};

use crate::consensus::{Block, BlockId, ConsensusRules};
use crate::crypto::PublicKey;
use serde::{Deserialize, Serialize};

use super::{KvStore, StorageError};

const BLOCKS_TREE: &str = "blocks";
const META_TREE: &str = "metadata";
const META_KEY: &str = "chain";

/// Append failures
#[derive(Debug, Error)]
pub enum AppendError {
    #[error("parent {0} not in tree")]
    ParentMissing(BlockId),
    #[error("block {0} already present")]
    AlreadyPresent(BlockId),
    #[error("invalid block signature")]
    InvalidSignature,
    #[error("consensus rejected: {0}")]
    ConsensusRejected(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// A stored node: the block plus its position in the tree
#[derive(Debug, Clone)]
pub struct TreeNode {
    pub block: Block,
    pub cumulative_score: u128,
    pub height: u32,
    /// Child ids in arrival order
    pub children: Vec<BlockId>,
}

/// Tip record persisted alongside the blocks
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChainMeta {
    best_leaf: BlockId,
    height: u32,
    cumulative_score: u128,
}

/// The fork store. Owns every stored block; external components hold
/// ids. Parametric over the consensus rules only through the per-block
/// score hook.
pub struct BlockTree<R: ConsensusRules> {
    rules: R,
    nodes: HashMap<BlockId, TreeNode>,
    best_leaf: Option<BlockId>,
    blocks: KvStore<BlockId, Vec<u8>>,
    meta: KvStore<String, ChainMeta>,
}

impl<R: ConsensusRules> BlockTree<R> {
    /// Open the tree, reconstructing the in-memory index from every
    /// stored block.
    pub fn open(db: &sled::Db, rules: R) -> Result<Self, StorageError> {
        let blocks: KvStore<BlockId, Vec<u8>> = KvStore::open(db, BLOCKS_TREE)?;
        let meta = KvStore::open(db, META_TREE)?;

        let mut tree = Self {
            rules,
            nodes: HashMap::new(),
            best_leaf: None,
            blocks,
            meta,
        };
        tree.reload()?;
        Ok(tree)
    }

    fn reload(&mut self) -> Result<(), StorageError> {
        let mut stored: Vec<Block> = self
            .blocks
            .values()
            .filter_map(|bytes| Block::from_bytes(&bytes).ok())
            .collect();
        if stored.is_empty() {
            return Ok(());
        }

        // Deterministic child order across restarts
        stored.sort_by_key(|b| (b.timestamp, b.signature.0));

        let mut by_parent: HashMap<BlockId, Vec<Block>> = HashMap::new();
        let mut genesis = None;
        for block in stored {
            if block.is_genesis() {
                genesis = Some(block);
            } else {
                by_parent.entry(block.parent_id).or_default().push(block);
            }
        }

        let Some(genesis) = genesis else {
            return Ok(());
        };

        let genesis_id = genesis.id();
        let genesis_score = self.rules.block_score(&genesis);
        self.nodes.insert(
            genesis_id,
            TreeNode {
                block: genesis,
                cumulative_score: genesis_score,
                height: 1,
                children: Vec::new(),
            },
        );
        self.best_leaf = Some(genesis_id);

        let mut frontier = vec![genesis_id];
        while let Some(parent_id) = frontier.pop() {
            let Some(children) = by_parent.remove(&parent_id) else {
                continue;
            };
            let (parent_score, parent_height) = {
                let parent = &self.nodes[&parent_id];
                (parent.cumulative_score, parent.height)
            };
            for child in children {
                let child_id = child.id();
                let score = parent_score + self.rules.block_score(&child);
                let node = TreeNode {
                    block: child,
                    cumulative_score: score,
                    height: parent_height + 1,
                    children: Vec::new(),
                };
                self.nodes.insert(child_id, node);
                self.nodes
                    .get_mut(&parent_id)
                    .expect("parent inserted before child")
                    .children
                    .push(child_id);

                if score > self.score() {
                    self.best_leaf = Some(child_id);
                }
                frontier.push(child_id);
            }
        }

        // A stored tip record wins over the recomputed one when it still
        // resolves; arrival order is not recoverable from the store.
        if let Some(meta) = self.meta.get(&META_KEY.to_string()) {
            if self.nodes.contains_key(&meta.best_leaf) {
                self.best_leaf = Some(meta.best_leaf);
            }
        }

        info!(
            blocks = self.nodes.len(),
            height = self.height(),
            "block tree reconstructed"
        );
        Ok(())
    }

    /// Insert a block under its declared parent.
    ///
    /// Checks identity, parentage, signature, timestamp order and the
    /// balance-independent consensus data (retarget equality and
    /// generation-signature chaining), then persists and moves the tip
    /// when the new cumulative score strictly exceeds the incumbent's.
    /// The stake-weighted hit check needs the balance sheet and stays
    /// with the controller.
    pub fn append(&mut self, block: Block) -> Result<(), AppendError> {
        let id = block.id();

        if self.nodes.contains_key(&id) {
            debug!(block = %id, "append of known block ignored");
            return Err(AppendError::AlreadyPresent(id));
        }

        let (cumulative_score, height, parent_id) = if self.nodes.is_empty() {
            if !block.is_genesis() {
                return Err(AppendError::ParentMissing(block.parent_id));
            }
            (self.rules.block_score(&block), 1, None)
        } else {
            let parent = self
                .nodes
                .get(&block.parent_id)
                .ok_or(AppendError::ParentMissing(block.parent_id))?;

            if !block.verify_signature() {
                return Err(AppendError::InvalidSignature);
            }
            if block.timestamp <= parent.block.timestamp {
                return Err(AppendError::ConsensusRejected(format!(
                    "timestamp {} does not exceed parent's {}",
                    block.timestamp, parent.block.timestamp
                )));
            }
            self.rules
                .validate_data(&block, &parent.block)
                .map_err(|e| AppendError::ConsensusRejected(e.to_string()))?;

            (
                parent.cumulative_score + self.rules.block_score(&block),
                parent.height + 1,
                Some(block.parent_id),
            )
        };

        let previous_best = self.best_leaf;

        self.blocks.set(&id, &block.to_bytes());
        self.nodes.insert(
            id,
            TreeNode {
                block,
                cumulative_score,
                height,
                children: Vec::new(),
            },
        );
        if let Some(parent_id) = parent_id {
            self.nodes
                .get_mut(&parent_id)
                .expect("parent checked above")
                .children
                .push(id);
        }

        if self.best_leaf.is_none() || cumulative_score > self.score() {
            self.best_leaf = Some(id);
            info!(block = %id, height, score = cumulative_score, "chain tip moved");
        }

        let meta = ChainMeta {
            best_leaf: self.best_leaf.expect("tree is non-empty"),
            height: self.height(),
            cumulative_score: self.score(),
        };
        self.meta.set(&META_KEY.to_string(), &meta);

        if let Err(e) = self.blocks.commit().and_then(|_| self.meta.commit()) {
            // Roll the insertion back so memory matches disk
            self.nodes.remove(&id);
            if let Some(parent_id) = parent_id {
                if let Some(parent) = self.nodes.get_mut(&parent_id) {
                    parent.children.retain(|child| child != &id);
                }
            }
            self.best_leaf = previous_best;
            self.blocks.remove(&id);
            return Err(AppendError::Storage(e));
        }

        Ok(())
    }

    /// Height of the best leaf; genesis is 1, an empty tree is 0
    pub fn height(&self) -> u32 {
        self.best_node().map(|node| node.height).unwrap_or(0)
    }

    /// Cumulative score of the best leaf
    pub fn score(&self) -> u128 {
        self.best_node()
            .map(|node| node.cumulative_score)
            .unwrap_or(0)
    }

    /// The block at the tip of the best chain
    pub fn last_block(&self) -> Option<&Block> {
        self.best_node().map(|node| &node.block)
    }

    fn best_node(&self) -> Option<&TreeNode> {
        self.best_leaf.and_then(|id| self.nodes.get(&id))
    }

    /// Membership by id
    pub fn contains(&self, id: &BlockId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Membership by block identity
    pub fn contains_block(&self, block: &Block) -> bool {
        self.contains(&block.id())
    }

    /// Look up a block by id
    pub fn block(&self, id: &BlockId) -> Option<&Block> {
        self.nodes.get(id).map(|node| &node.block)
    }

    /// The parent of a block, if the block is known and not the root
    pub fn parent(&self, block: &Block) -> Option<&Block> {
        let node = self.nodes.get(&block.id())?;
        if node.block.is_genesis() {
            return None;
        }
        self.block(&node.block.parent_id)
    }

    /// Children of a block in arrival order
    pub fn children(&self, block: &Block) -> Vec<&Block> {
        match self.nodes.get(&block.id()) {
            Some(node) => node
                .children
                .iter()
                .filter_map(|id| self.block(id))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Height of a block, if known
    pub fn height_of(&self, block: &Block) -> Option<u32> {
        self.nodes.get(&block.id()).map(|node| node.height)
    }

    /// The block on the best chain at the given height
    pub fn block_at(&self, height: u32) -> Option<&Block> {
        if height == 0 {
            return None;
        }
        let mut node = self.best_node()?;
        while node.height > height {
            node = self.nodes.get(&node.block.parent_id)?;
        }
        if node.height == height {
            Some(&node.block)
        } else {
            None
        }
    }

    /// Best-chain blocks forged by the given generator, tip first
    pub fn generated_by(&self, generator: &PublicKey) -> Vec<&Block> {
        self.best_chain()
            .filter(|block| &block.generator == generator)
            .collect()
    }

    /// Mean timestamp gap over the last `count` ancestors of `block`.
    /// `None` when the chain below `block` is shorter than `count`.
    pub fn average_delay(&self, block: &Block, count: u32) -> Option<u64> {
        if count == 0 {
            return None;
        }
        let mut node = self.nodes.get(&block.id())?;
        let newest = node.block.timestamp;
        for _ in 0..count {
            node = self.nodes.get(&node.block.parent_id)?;
        }
        Some((newest - node.block.timestamp) / count as u64)
    }

    /// The most recent `count` block ids on the best chain, tip first
    pub fn last_signatures(&self, count: usize) -> Vec<BlockId> {
        self.best_chain().take(count).map(|block| block.id()).collect()
    }

    /// Iterate the best chain from the tip toward genesis
    pub fn best_chain(&self) -> BestChainIter<'_, R> {
        BestChainIter {
            tree: self,
            next: self.best_leaf,
        }
    }

    /// Flush all dirty state
    pub fn commit(&self) -> Result<(), StorageError> {
        self.blocks.commit()?;
        self.meta.commit()
    }

    /// Flush and release; safe to call more than once
    pub fn close(&self) -> Result<(), StorageError> {
        self.blocks.close()?;
        self.meta.close()
    }

    /// Number of stored blocks across all branches
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Iterator over the best chain, tip first
pub struct BestChainIter<'a, R: ConsensusRules> {
    tree: &'a BlockTree<R>,
    next: Option<BlockId>,
}

impl<'a, R: ConsensusRules> Iterator for BestChainIter<'a, R> {
    type Item = &'a Block;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.tree.nodes.get(&self.next?)?;
        self.next = if node.block.is_genesis() {
            None
        } else {
            Some(node.block.parent_id)
        };
        Some(&node.block)
    }
}
