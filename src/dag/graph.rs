//! DAG storage and traversal.
//!
//! Blocks are append-only. Each block receives a dense insertion index;
//! since every parent must already exist, a block's ancestors always carry
//! smaller indices, so past cones are stored as per-block bitsets and
//! anticone queries reduce to word-wise set arithmetic.

use crate::types::block::{Block, BlockColor};
use crate::types::Hash;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// GHOSTDAG parameters.
#[derive(Clone, Copy, Debug)]
pub struct GhostdagParams {
    /// Anticone-size bound for blue admission.
    pub k: u64,

    /// Healthy blue-fraction floor reported by `get_stats`.
    pub blue_threshold: f64,
}

impl Default for GhostdagParams {
    fn default() -> Self {
        Self {
            k: 18,
            blue_threshold: 0.5,
        }
    }
}

/// Result of a block append.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddOutcome {
    /// Block inserted and coloring recomputed.
    Added,

    /// Identical hash already present; no-op.
    AlreadyPresent,
}

/// Block append failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DagError {
    #[error("missing parent: {0}")]
    MissingParent(Hash),

    #[error("non-genesis block has no parents")]
    NoParents,
}

/// Aggregate DAG statistics.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DagStats {
    pub total_blocks: usize,
    pub blue_count: usize,
    pub red_count: usize,
    pub tip_count: usize,
    pub max_depth: u64,
    pub blue_fraction: f64,
    pub healthy: bool,
}

/// Set of block indices, packed 64 per word.
#[derive(Clone, Debug, Default)]
pub(crate) struct IndexSet {
    words: Vec<u64>,
}

impl IndexSet {
    pub(crate) fn new() -> Self {
        Self { words: Vec::new() }
    }

    pub(crate) fn insert(&mut self, index: usize) {
        let word = index / 64;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1 << (index % 64);
    }

    pub(crate) fn contains(&self, index: usize) -> bool {
        self.words
            .get(index / 64)
            .map(|w| w >> (index % 64) & 1 == 1)
            .unwrap_or(false)
    }

    pub(crate) fn union_with(&mut self, other: &IndexSet) {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (dst, src) in self.words.iter_mut().zip(&other.words) {
            *dst |= src;
        }
    }

    /// Iterate set indices in ascending order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(wi, &word)| {
            (0..64usize)
                .filter(move |bit| word >> bit & 1 == 1)
                .map(move |bit| wi * 64 + bit)
        })
    }
}

/// The block DAG.
///
/// Single-writer for appends; the coloring pass runs inside `add_block`, so
/// readers only ever observe a fully-colored graph.
pub struct DagGraph {
    /// Blocks by hash.
    pub(crate) blocks: HashMap<Hash, Block>,

    /// Dense insertion index per hash.
    pub(crate) index: HashMap<Hash, usize>,

    /// Hash per insertion index.
    pub(crate) order: Vec<Hash>,

    /// Past cone per insertion index (ancestors only, never the block itself).
    pub(crate) past: Vec<IndexSet>,

    /// Children edges: parent hash -> child hashes.
    pub(crate) children: HashMap<Hash, HashSet<Hash>>,

    /// Blocks with no children.
    pub(crate) tips: HashSet<Hash>,

    pub(crate) genesis_hash: Hash,

    pub(crate) max_depth: u64,

    pub(crate) params: GhostdagParams,
}

impl DagGraph {
    /// Create a DAG holding only the genesis block.
    pub fn new(params: GhostdagParams) -> Self {
        let genesis = Block::genesis();
        let genesis_hash = genesis.hash;

        let mut blocks = HashMap::new();
        blocks.insert(genesis_hash, genesis);

        let mut index = HashMap::new();
        index.insert(genesis_hash, 0);

        let mut tips = HashSet::new();
        tips.insert(genesis_hash);

        let mut children = HashMap::new();
        children.insert(genesis_hash, HashSet::new());

        Self {
            blocks,
            index,
            order: vec![genesis_hash],
            past: vec![IndexSet::new()],
            children,
            tips,
            genesis_hash,
            max_depth: 0,
            params,
        }
    }

    /// Append a block.
    ///
    /// Accepts iff every parent resolves and the hash is novel. On
    /// acceptance the depth is derived, tip bookkeeping updated, and the
    /// coloring pass rerun. Repeated identical hashes are no-ops.
    pub fn add_block(&mut self, mut block: Block) -> Result<AddOutcome, DagError> {
        if self.blocks.contains_key(&block.hash) {
            return Ok(AddOutcome::AlreadyPresent);
        }
        if block.parent_hashes.is_empty() {
            return Err(DagError::NoParents);
        }
        // A block naming itself as parent cannot resolve: it does not exist yet.
        for parent in &block.parent_hashes {
            if !self.blocks.contains_key(parent) {
                return Err(DagError::MissingParent(*parent));
            }
        }

        let depth = 1 + block
            .parent_hashes
            .iter()
            .map(|p| self.blocks[p].dag_depth)
            .max()
            .expect("parents checked non-empty");
        block.dag_depth = depth;
        block.color = BlockColor::Pending;
        self.max_depth = self.max_depth.max(depth);

        let idx = self.order.len();
        let mut past = IndexSet::new();
        for parent in &block.parent_hashes {
            let parent_idx = self.index[parent];
            past.insert(parent_idx);
            past.union_with(&self.past[parent_idx]);

            self.children
                .entry(*parent)
                .or_default()
                .insert(block.hash);
            self.tips.remove(parent);
        }

        let hash = block.hash;
        self.index.insert(hash, idx);
        self.order.push(hash);
        self.past.push(past);
        self.children.entry(hash).or_default();
        self.tips.insert(hash);
        self.blocks.insert(hash, block);

        self.recolor();

        Ok(AddOutcome::Added)
    }

    pub fn get_block(&self, hash: &Hash) -> Option<&Block> {
        self.blocks.get(hash)
    }

    /// All blocks in insertion order.
    pub fn get_all_blocks(&self) -> Vec<&Block> {
        self.order.iter().map(|h| &self.blocks[h]).collect()
    }

    /// Child hashes of a block, insertion-ordered. None for unknown hashes.
    pub fn get_children(&self, hash: &Hash) -> Option<Vec<Hash>> {
        let set = self.children.get(hash)?;
        let mut out: Vec<Hash> = set.iter().copied().collect();
        out.sort_by_key(|h| self.index[h]);
        Some(out)
    }

    /// Current tips, insertion-ordered. Always non-empty.
    pub fn get_tips(&self) -> Vec<Hash> {
        let mut out: Vec<Hash> = self.tips.iter().copied().collect();
        out.sort_by_key(|h| self.index[h]);
        out
    }

    pub fn get_genesis_hash(&self) -> Hash {
        self.genesis_hash
    }

    pub fn get_max_depth(&self) -> u64 {
        self.max_depth
    }

    pub fn get_block_count(&self) -> usize {
        self.blocks.len()
    }

    /// The past cone of a block, excluding the block itself.
    pub fn ancestors(&self, hash: &Hash) -> Option<Vec<Hash>> {
        let idx = *self.index.get(hash)?;
        Some(self.past[idx].iter().map(|i| self.order[i]).collect())
    }

    /// The future cone of a block, excluding the block itself.
    pub fn descendants(&self, hash: &Hash) -> Option<Vec<Hash>> {
        let idx = *self.index.get(hash)?;
        Some(
            (idx + 1..self.order.len())
                .filter(|&j| self.past[j].contains(idx))
                .map(|j| self.order[j])
                .collect(),
        )
    }

    /// Blocks that are neither ancestors nor descendants of the given block.
    pub fn anticone(&self, hash: &Hash) -> Option<Vec<Hash>> {
        let idx = *self.index.get(hash)?;
        let past = &self.past[idx];
        Some(
            (0..self.order.len())
                .filter(|&j| j != idx && !past.contains(j) && !self.past[j].contains(idx))
                .map(|j| self.order[j])
                .collect(),
        )
    }

    /// Whether a block is blue. None for unknown hashes.
    pub fn is_blue(&self, hash: &Hash) -> Option<bool> {
        self.blocks.get(hash).map(Block::is_blue)
    }

    pub fn get_blue_blocks(&self) -> Vec<&Block> {
        self.order
            .iter()
            .map(|h| &self.blocks[h])
            .filter(|b| b.color == BlockColor::Blue)
            .collect()
    }

    pub fn get_red_blocks(&self) -> Vec<&Block> {
        self.order
            .iter()
            .map(|h| &self.blocks[h])
            .filter(|b| b.color == BlockColor::Red)
            .collect()
    }

    pub fn get_stats(&self) -> DagStats {
        let total = self.blocks.len();
        let blue = self
            .blocks
            .values()
            .filter(|b| b.color == BlockColor::Blue)
            .count();
        let red = total - blue;
        let blue_fraction = if total == 0 {
            0.0
        } else {
            blue as f64 / total as f64
        };
        DagStats {
            total_blocks: total,
            blue_count: blue,
            red_count: red,
            tip_count: self.tips.len(),
            max_depth: self.max_depth,
            blue_fraction,
            healthy: blue_fraction >= self.params.blue_threshold,
        }
    }
}

impl Default for DagGraph {
    fn default() -> Self {
        Self::new(GhostdagParams::default())
    }
}
