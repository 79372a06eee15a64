//! Property-based and adversarial tests for the EMBER node core
//!
//! These tests verify the serialization, Merkle, consensus and fork
//! choice invariants under random inputs and attack scenarios.

use proptest::prelude::*;

use ember_core::consensus::{
    Block, BlockId, ConsensusData, ConsensusRules, NxtConsensus,
};
use ember_core::constants::{GENESIS_BASE_TARGET, MAX_BASE_TARGET};
use ember_core::crypto::{hash_bytes, PrivateKey};
use ember_core::node::{genesis_accounts, genesis_block};
use ember_core::storage::{AppendError, BlockTree, MerkleTree};
use ember_core::validation::{GenesisTransaction, PaymentTransaction, Transaction};

fn keypair(seed: u8) -> PrivateKey {
    PrivateKey::from_bytes(&[seed.max(1); 32]).unwrap()
}

/// A signed child whose consensus data follows the retarget rules, so
/// the fork store accepts it. The offset steers the score: 500 ms
/// halves the base target (doubling the score), 2000 ms keeps it.
fn signed_child(parent: &Block, seed: u8, ts_offset: u64) -> Block {
    let forger = keypair(seed);
    let timestamp = parent.timestamp + ts_offset;
    Block::forge(
        timestamp,
        parent.id(),
        ConsensusData {
            base_target: NxtConsensus::next_base_target(
                parent.consensus.base_target,
                parent.timestamp,
                timestamp,
            ),
            generation_signature: NxtConsensus::generation_signature(
                &parent.consensus.generation_signature,
                &forger.public_key(),
            ),
        },
        vec![],
        &forger,
    )
}

/// A signed block with a chosen base target, for score arithmetic
/// outside the fork store
fn scored_block(base_target: u64, seed: u8) -> Block {
    let forger = keypair(seed);
    Block::forge(
        1,
        BlockId([seed; 64]),
        ConsensusData {
            base_target,
            generation_signature: hash_bytes(&[seed]),
        },
        vec![],
        &forger,
    )
}

// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================

proptest! {
    /// Serialization round-trip: parsing a serialized block restores
    /// every field, byte-exact signatures included
    #[test]
    fn prop_block_roundtrip(
        seed in 1u8..255,
        timestamp in 1u64..=u64::MAX / 2,
        base_target in 1u64..MAX_BASE_TARGET,
        amount in 0u64..1_000_000,
        fee in 1u64..1_000,
    ) {
        let forger = keypair(seed);
        let txs = vec![
            Transaction::Genesis(GenesisTransaction::new(
                keypair(seed ^ 0x55).public_key().address(),
                amount,
                timestamp,
            )),
            Transaction::Payment(PaymentTransaction::new(
                &keypair(seed ^ 0xAA),
                forger.public_key().address(),
                amount,
                fee,
                timestamp,
            )),
        ];
        let block = Block::forge(
            timestamp,
            BlockId([seed; 64]),
            ConsensusData { base_target, generation_signature: hash_bytes(&[seed]) },
            txs,
            &forger,
        );

        let recovered = Block::from_bytes(&block.to_bytes()).unwrap();
        prop_assert_eq!(recovered.version, block.version);
        prop_assert_eq!(recovered.timestamp, block.timestamp);
        prop_assert_eq!(recovered.parent_id, block.parent_id);
        prop_assert_eq!(recovered.consensus, block.consensus);
        prop_assert_eq!(&recovered.transactions, &block.transactions);
        prop_assert_eq!(recovered.generator, block.generator);
        prop_assert_eq!(recovered.signature.0.as_slice(), block.signature.0.as_slice());
        prop_assert!(recovered.verify_signature());
    }

    /// Transaction round-trip preserves order-independent identity
    #[test]
    fn prop_transaction_roundtrip(
        seed in 1u8..255,
        amount in 0u64..u64::MAX / 2,
        fee in 1u64..u64::MAX / 4,
        timestamp in 0u64..u64::MAX / 2,
    ) {
        let tx = Transaction::Payment(PaymentTransaction::new(
            &keypair(seed),
            keypair(seed ^ 0x0F).public_key().address(),
            amount,
            fee,
            timestamp,
        ));
        let recovered = Transaction::from_bytes(&tx.to_bytes()).unwrap();
        prop_assert_eq!(&recovered, &tx);
        prop_assert!(recovered.verify_signature());
    }

    /// Retarget bounds: the next base target stays within halving and
    /// doubling of the previous one, and inside the global range
    #[test]
    fn prop_retarget_bounds(
        prev in 2u64..MAX_BASE_TARGET,
        parent_ts in 0u64..u64::MAX / 2,
        delta in 0u64..86_400_000,
    ) {
        let next = NxtConsensus::next_base_target(prev, parent_ts, parent_ts + delta);

        prop_assert!(next >= (prev / 2).max(1));
        prop_assert!(next <= prev.saturating_mul(2).min(MAX_BASE_TARGET));
        prop_assert!(next >= 1);
        prop_assert!(next <= MAX_BASE_TARGET);
    }

    /// Hit determinism: the hit depends only on the parent generation
    /// signature and the generator key
    #[test]
    fn prop_hit_deterministic(seed in 1u8..255, gs_seed in 0u8..255, bt in 1u64..MAX_BASE_TARGET) {
        let generator = keypair(seed).public_key();
        let a = ConsensusData { base_target: 1, generation_signature: hash_bytes(&[gs_seed]) };
        let b = ConsensusData { base_target: bt, generation_signature: hash_bytes(&[gs_seed]) };

        prop_assert_eq!(NxtConsensus::hit(&a, &generator), NxtConsensus::hit(&b, &generator));
        prop_assert_eq!(NxtConsensus::hit(&a, &generator), NxtConsensus::hit(&a, &generator));
    }

    /// Block score is the 64-bit range divided by the base target
    #[test]
    fn prop_block_score(base_target in 1u64..MAX_BASE_TARGET, seed in 1u8..255) {
        let block = scored_block(base_target, seed);
        prop_assert_eq!(
            NxtConsensus.block_score(&block),
            (1u128 << 64) / base_target as u128
        );
    }
}

proptest! {
    // Disk-backed cases are slower; keep the sample small
    #![proptest_config(ProptestConfig::with_cases(12))]

    /// Merkle soundness: every index in range yields a verifying proof
    #[test]
    fn prop_merkle_soundness(segments in 1usize..12, pattern in any::<u8>()) {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path()).unwrap();

        let data: Vec<u8> = (0..segments * 64)
            .map(|i| (i as u8).wrapping_mul(pattern))
            .collect();
        let tree = MerkleTree::from_data(&db, &data, 64).unwrap();

        for index in 0..segments as u64 {
            let block = tree.by_index(index).unwrap();
            prop_assert!(block.check(index, &tree.root_hash()));
        }
    }
}

// ============================================================================
// ADVERSARIAL AND END-TO-END TESTS
// ============================================================================

/// Appending genesis to an empty tree yields height 1 and the genesis
/// score.
#[test]
fn test_genesis_append_score() {
    let dir = tempfile::tempdir().unwrap();
    let db = sled::open(dir.path()).unwrap();
    let mut tree = BlockTree::open(&db, NxtConsensus).unwrap();

    tree.append(genesis_block()).unwrap();

    assert_eq!(tree.height(), 1);
    assert_eq!(tree.score(), (1u128 << 64) / GENESIS_BASE_TARGET as u128);
}

/// A block forged on genesis carries a bounded base target and the
/// chained generation signature.
#[test]
fn test_forged_block_consensus_fields() {
    let genesis = genesis_block();
    let accounts = genesis_accounts();
    let (account, balance) = &accounts[0];
    // After a minute the 4-billion-token stake's target exceeds any
    // 64-bit hit, so eligibility is certain
    let timestamp = genesis.timestamp + 60_000;

    let block =
        NxtConsensus::generate_next_block(&genesis, account, *balance, timestamp, vec![])
            .expect("development stake forges after a long delay");

    assert!(block.consensus.base_target >= GENESIS_BASE_TARGET / 2);
    assert!(block.consensus.base_target <= GENESIS_BASE_TARGET * 2);

    let mut concat = Vec::with_capacity(64);
    concat.extend_from_slice(&genesis.consensus.generation_signature.0);
    concat.extend_from_slice(&account.public_key().0);
    assert_eq!(block.consensus.generation_signature, hash_bytes(&concat));
}

/// Equal-score siblings: the first appended block keeps the tip.
#[test]
fn test_equal_score_siblings_fifo() {
    let dir = tempfile::tempdir().unwrap();
    let db = sled::open(dir.path()).unwrap();
    let mut tree = BlockTree::open(&db, NxtConsensus).unwrap();

    let genesis = genesis_block();
    tree.append(genesis.clone()).unwrap();

    // Same offset, same base target, same score; different forgers
    let first = signed_child(&genesis, 1, 2_000);
    let second = signed_child(&genesis, 2, 2_000);
    tree.append(first.clone()).unwrap();
    tree.append(second).unwrap();

    assert_eq!(tree.last_block().unwrap(), &first);
}

/// Merkle tree over 7 segments of 1024 bytes: padded to 8 leaves,
/// inner and padding proofs both verify.
#[test]
fn test_merkle_seven_segments() {
    let dir = tempfile::tempdir().unwrap();
    let db = sled::open(dir.path()).unwrap();

    let data: Vec<u8> = (0..7 * 1024).map(|i| (i % 251) as u8).collect();
    let tree = MerkleTree::from_data(&db, &data, 1024).unwrap();

    let inner = tree.by_index(3).unwrap();
    assert!(inner.check(3, &tree.root_hash()));

    let padding = tree.by_index(7).expect("padding index resolves");
    assert!(padding.check(7, &tree.root_hash()));
}

/// A block with an unknown random parent is rejected and the tree is
/// untouched.
#[test]
fn test_unknown_parent_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let db = sled::open(dir.path()).unwrap();
    let mut tree = BlockTree::open(&db, NxtConsensus).unwrap();

    let genesis = genesis_block();
    tree.append(genesis.clone()).unwrap();
    let score = tree.score();

    let forger = keypair(5);
    let mut parent_bytes = [0u8; 64];
    for (i, byte) in parent_bytes.iter_mut().enumerate() {
        *byte = (i as u8).wrapping_mul(151).wrapping_add(3);
    }
    let stray = Block::forge(
        genesis.timestamp + 2_000,
        BlockId(parent_bytes),
        ConsensusData {
            base_target: 40_000,
            generation_signature: hash_bytes(b"stray"),
        },
        vec![],
        &forger,
    );

    assert!(matches!(
        tree.append(stray),
        Err(AppendError::ParentMissing(_))
    ));
    assert_eq!(tree.score(), score);
}

/// The fork store itself rejects consensus data that violates the
/// retarget bounds, without any balance sheet in sight.
#[test]
fn test_append_enforces_retarget_bounds() {
    let dir = tempfile::tempdir().unwrap();
    let db = sled::open(dir.path()).unwrap();
    let mut tree = BlockTree::open(&db, NxtConsensus).unwrap();

    let genesis = genesis_block();
    tree.append(genesis.clone()).unwrap();
    let score = tree.score();

    // Far below the floor of genesis_base_target / 2
    let forger = keypair(9);
    let cheap = Block::forge(
        genesis.timestamp + 2_000,
        genesis.id(),
        ConsensusData {
            base_target: 40_000,
            generation_signature: NxtConsensus::generation_signature(
                &genesis.consensus.generation_signature,
                &forger.public_key(),
            ),
        },
        vec![],
        &forger,
    );

    assert!(matches!(
        tree.append(cheap),
        Err(AppendError::ConsensusRejected(_))
    ));
    assert_eq!(tree.score(), score);
    assert_eq!(tree.height(), 1);
}

/// Among forged candidates the smaller base target (higher score)
/// wins the round.
#[test]
fn test_candidate_selection_prefers_higher_score() {
    let low = scored_block(30_000, 1);
    let high = scored_block(20_000, 2);

    let winner = ember_core::forging::select_best(vec![low, high.clone()]).unwrap();
    assert_eq!(winner, high);
}

/// Deep fork arbitration: a two-block branch outweighs a single
/// higher-score block.
#[test]
fn test_deeper_branch_wins() {
    let dir = tempfile::tempdir().unwrap();
    let db = sled::open(dir.path()).unwrap();
    let mut tree = BlockTree::open(&db, NxtConsensus).unwrap();

    let genesis = genesis_block();
    tree.append(genesis.clone()).unwrap();

    // One fast block (double score) against an on-schedule block whose
    // fast child pushes the branch past it
    let short = signed_child(&genesis, 1, 500);
    tree.append(short.clone()).unwrap();
    assert_eq!(tree.last_block().unwrap(), &short);

    let long_a = signed_child(&genesis, 2, 2_000);
    let long_b = signed_child(&long_a, 3, 500);
    tree.append(long_a).unwrap();
    assert_eq!(tree.last_block().unwrap(), &short);

    tree.append(long_b.clone()).unwrap();
    assert_eq!(tree.last_block().unwrap(), &long_b);
    assert_eq!(tree.height(), 3);
}

/// Tampering with any serialized header field breaks either parsing
/// or signature verification.
#[test]
fn test_serialized_tampering_detected() {
    let genesis = genesis_block();
    let block = signed_child(&genesis, 7, 2_000);
    let bytes = block.to_bytes();

    // Flip one byte in the timestamp field
    let mut tampered = bytes.clone();
    tampered[5] ^= 0x01;
    match Block::from_bytes(&tampered) {
        Ok(parsed) => assert!(!parsed.verify_signature()),
        Err(_) => {}
    }

    // Flip one byte of the signature
    let mut tampered = bytes;
    let last = tampered.len() - 1;
    tampered[last] ^= 0x01;
    match Block::from_bytes(&tampered) {
        Ok(parsed) => assert!(!parsed.verify_signature()),
        Err(_) => {}
    }
}

/// Replaying the stored tree after a restart restores height, score
/// and tip.
#[test]
fn test_restart_restores_chain() {
    let dir = tempfile::tempdir().unwrap();
    let genesis = genesis_block();
    let a = signed_child(&genesis, 1, 2_000);
    let b = signed_child(&a, 2, 500);

    let (height, score, tip);
    {
        let db = sled::open(dir.path()).unwrap();
        let mut tree = BlockTree::open(&db, NxtConsensus).unwrap();
        tree.append(genesis.clone()).unwrap();
        tree.append(a).unwrap();
        tree.append(b).unwrap();
        height = tree.height();
        score = tree.score();
        tip = tree.last_block().unwrap().id();
        tree.commit().unwrap();
        tree.close().unwrap();
    }

    let db = sled::open(dir.path()).unwrap();
    let tree = BlockTree::open(&db, NxtConsensus).unwrap();
    assert_eq!(tree.height(), height);
    assert_eq!(tree.score(), score);
    assert_eq!(tree.last_block().unwrap().id(), tip);
}
