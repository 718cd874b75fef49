//! Block types for the DAG.

use super::transaction::Transaction;
use super::{sha256, Address, Hash};
use serde::{Deserialize, Serialize};

/// GHOSTDAG classification of a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BlockColor {
    /// Admitted to the blue set.
    Blue,

    /// Outside the blue set at the current coloring.
    Red,

    /// Not yet classified (only before the first coloring pass).
    Pending,
}

/// A block in the DAG.
///
/// # Invariants
/// - `hash` is a deterministic function of
///   (parents, timestamp, nonce, transactions_root, miner, state_root)
/// - `dag_depth = 1 + max(parent depths)` for non-genesis, else 0
/// - parents are distinct and resolve within the same DAG instance
/// - immutable once appended, except (`color`, `blue_score`) which are derived
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Content hash.
    pub hash: Hash,

    /// Parent block hashes (empty only for genesis).
    pub parent_hashes: Vec<Hash>,

    /// Creation timestamp (milliseconds).
    #[serde(with = "super::hex_u64")]
    pub timestamp: u64,

    /// Block producer.
    pub miner: Address,

    /// Difficulty (informational; no proof-of-work here).
    #[serde(with = "super::hex_u64")]
    pub difficulty: u64,

    /// State root after executing this block's transactions.
    pub state_root: Hash,

    /// Merkle-style commitment over the transaction hashes.
    pub transactions_root: Hash,

    /// Nonce (informational).
    #[serde(with = "super::hex_u64")]
    pub nonce: u64,

    /// Transactions carried by this block, in execution order.
    pub transactions: Vec<Transaction>,

    /// Blue/red classification (derived, recomputed after every append).
    pub color: BlockColor,

    /// Longest-parent-chain depth from genesis.
    pub dag_depth: u64,

    /// Number of blue ancestors (derived).
    pub blue_score: u64,
}

impl Block {
    /// The node's genesis block. Fixed identity for the process lifetime.
    pub fn genesis() -> Self {
        let transactions_root = Hash::ZERO;
        let hash = Self::compute_hash(
            &[],
            0,
            0,
            &transactions_root,
            &Address::ZERO,
            &Hash::ZERO,
        );
        Self {
            hash,
            parent_hashes: vec![],
            timestamp: 0,
            miner: Address::ZERO,
            difficulty: 0,
            state_root: Hash::ZERO,
            transactions_root,
            nonce: 0,
            transactions: vec![],
            color: BlockColor::Blue,
            dag_depth: 0,
            blue_score: 0,
        }
    }

    /// Build a block produced by the miner. Depth, color, and blue score
    /// are assigned by the DAG on append; the hash covers the state root,
    /// so this must run after execution.
    pub fn new(
        parent_hashes: Vec<Hash>,
        timestamp: u64,
        miner: Address,
        state_root: Hash,
        nonce: u64,
        transactions: Vec<Transaction>,
    ) -> Self {
        let transactions_root = Self::compute_transactions_root(&transactions);
        let hash = Self::compute_hash(
            &parent_hashes,
            timestamp,
            nonce,
            &transactions_root,
            &miner,
            &state_root,
        );
        Self {
            hash,
            parent_hashes,
            timestamp,
            miner,
            difficulty: 1,
            state_root,
            transactions_root,
            nonce,
            transactions,
            color: BlockColor::Pending,
            dag_depth: 0,
            blue_score: 0,
        }
    }

    /// Deterministic block hash over the identity-bearing fields.
    pub fn compute_hash(
        parent_hashes: &[Hash],
        timestamp: u64,
        nonce: u64,
        transactions_root: &Hash,
        miner: &Address,
        state_root: &Hash,
    ) -> Hash {
        let mut input = Vec::with_capacity(32 * parent_hashes.len() + 112);
        for parent in parent_hashes {
            input.extend_from_slice(parent.as_bytes());
        }
        input.extend_from_slice(&timestamp.to_le_bytes());
        input.extend_from_slice(&nonce.to_le_bytes());
        input.extend_from_slice(transactions_root.as_bytes());
        input.extend_from_slice(miner.as_bytes());
        input.extend_from_slice(state_root.as_bytes());
        Hash(sha256(&input))
    }

    /// Pairwise-fold commitment over transaction hashes.
    pub fn compute_transactions_root(transactions: &[Transaction]) -> Hash {
        if transactions.is_empty() {
            return Hash::ZERO;
        }
        let mut layer: Vec<[u8; 32]> = transactions.iter().map(|tx| tx.hash.0).collect();
        while layer.len() > 1 {
            let mut next = Vec::with_capacity(layer.len().div_ceil(2));
            for pair in layer.chunks(2) {
                let mut combined = [0u8; 64];
                combined[..32].copy_from_slice(&pair[0]);
                // Odd tail hashes with itself.
                combined[32..].copy_from_slice(pair.get(1).unwrap_or(&pair[0]));
                next.push(sha256(&combined));
            }
            layer = next;
        }
        Hash(layer[0])
    }

    pub fn is_genesis(&self) -> bool {
        self.parent_hashes.is_empty()
    }

    pub fn is_blue(&self) -> bool {
        self.color == BlockColor::Blue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::U256;

    fn make_tx(id: u8) -> Transaction {
        Transaction::new(
            Address([id; 20]),
            Some(Address([0xBB; 20])),
            U256::from_u64(1),
            vec![],
            0,
            21000,
            U256::from_u64(1_000_000_000),
        )
    }

    #[test]
    fn test_genesis_is_stable() {
        let a = Block::genesis();
        let b = Block::genesis();
        assert_eq!(a.hash, b.hash);
        assert!(a.is_genesis());
        assert!(a.is_blue());
        assert_eq!(a.dag_depth, 0);
    }

    #[test]
    fn test_hash_covers_state_root() {
        let parents = vec![Block::genesis().hash];
        let a = Block::new(
            parents.clone(),
            1000,
            Address::ZERO,
            Hash([1; 32]),
            0,
            vec![],
        );
        let b = Block::new(parents, 1000, Address::ZERO, Hash([2; 32]), 0, vec![]);
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn test_transactions_root_determinism() {
        let txs = vec![make_tx(1), make_tx(2), make_tx(3)];
        let a = Block::compute_transactions_root(&txs);
        let b = Block::compute_transactions_root(&txs);
        assert_eq!(a, b);
        assert_ne!(a, Hash::ZERO);

        // Order matters.
        let reversed = vec![make_tx(3), make_tx(2), make_tx(1)];
        assert_ne!(Block::compute_transactions_root(&reversed), a);
    }

    #[test]
    fn test_serde_wire_shape() {
        let block = Block::genesis();
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["timestamp"], "0x0");
        assert_eq!(json["color"], "blue");
        assert!(json["parentHashes"].as_array().unwrap().is_empty());
    }
}
