//! Transaction mempool.
//!
//! Bounded, hash-keyed pool. No semantic validation happens at admission;
//! bad nonces and balances surface at execution time as failed receipts.

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::time::Instant;

use crate::types::transaction::Transaction;
use crate::types::{Address, Hash};

/// A transaction held in the pool.
#[derive(Clone, Debug)]
pub struct PoolEntry {
    /// The transaction itself
    pub transaction: Transaction,

    /// When it was admitted
    pub added_at: Instant,

    /// How many mining rounds have considered it
    pub attempts: u32,

    /// Admission sequence, used as the stable ordering tie-break
    seq: u64,
}

/// Mempool errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("transaction already known")]
    Duplicate,

    #[error("mempool is full")]
    Full,
}

struct PoolInner {
    entries: HashMap<Hash, PoolEntry>,

    /// Every hash ever admitted, kept across removal so an included
    /// transaction cannot be resubmitted and mined twice.
    known: HashSet<Hash>,

    next_seq: u64,
}

/// Bounded transaction pool.
///
/// When full, admission competes on gas price: the lowest-priced
/// transaction — incoming included — loses. Tie-break on (price, hash) is
/// arbitrary but deterministic.
pub struct Mempool {
    inner: RwLock<PoolInner>,
    max_size: usize,
}

impl Mempool {
    pub fn new(max_size: usize) -> Self {
        Self {
            inner: RwLock::new(PoolInner {
                entries: HashMap::new(),
                known: HashSet::new(),
                next_seq: 0,
            }),
            max_size,
        }
    }

    /// Admit a transaction.
    ///
    /// Rejects duplicates by hash. When the pool is full, the entry with
    /// the lowest gas price is evicted to make room — unless the incoming
    /// transaction itself is priced at or below that minimum, in which
    /// case the newcomer is refused.
    pub fn add(&self, tx: Transaction) -> Result<(), PoolError> {
        let mut inner = self.inner.write();

        if inner.known.contains(&tx.hash) {
            return Err(PoolError::Duplicate);
        }

        if inner.entries.len() >= self.max_size {
            let lowest = inner
                .entries
                .values()
                .map(|e| (e.transaction.gas_price, e.transaction.hash))
                .min()
                .expect("pool is non-empty when full");
            if tx.gas_price <= lowest.0 {
                return Err(PoolError::Full);
            }
            inner.entries.remove(&lowest.1);
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.known.insert(tx.hash);
        inner.entries.insert(
            tx.hash,
            PoolEntry {
                transaction: tx,
                added_at: Instant::now(),
                attempts: 0,
                seq,
            },
        );
        Ok(())
    }

    /// Remove a transaction, returning it if present. The hash stays in
    /// the known set, so the same content is not accepted again.
    pub fn remove(&self, hash: &Hash) -> Option<Transaction> {
        self.inner
            .write()
            .entries
            .remove(hash)
            .map(|e| e.transaction)
    }

    pub fn get(&self, hash: &Hash) -> Option<Transaction> {
        self.inner
            .read()
            .entries
            .get(hash)
            .map(|e| e.transaction.clone())
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.inner.read().entries.contains_key(hash)
    }

    /// All held transactions in admission order.
    pub fn all(&self) -> Vec<Transaction> {
        let inner = self.inner.read();
        let mut entries: Vec<&PoolEntry> = inner.entries.values().collect();
        entries.sort_by_key(|e| e.seq);
        entries.iter().map(|e| e.transaction.clone()).collect()
    }

    /// Transactions ordered by gas price descending; ties keep admission
    /// order (stable sort).
    pub fn by_gas_price(&self, limit: Option<usize>) -> Vec<Transaction> {
        let inner = self.inner.read();
        let mut entries: Vec<&PoolEntry> = inner.entries.values().collect();
        entries.sort_by_key(|e| e.seq);
        entries.sort_by(|a, b| b.transaction.gas_price.cmp(&a.transaction.gas_price));
        entries
            .into_iter()
            .take(limit.unwrap_or(usize::MAX))
            .map(|e| e.transaction.clone())
            .collect()
    }

    /// Alias of `by_gas_price`: the miner's view of what to include next.
    pub fn pending(&self, limit: Option<usize>) -> Vec<Transaction> {
        self.by_gas_price(limit)
    }

    pub fn size(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }

    /// Drop everything, including the duplicate-tracking known set.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.entries.clear();
        inner.known.clear();
    }

    /// Transactions from one sender, admission-ordered.
    pub fn by_sender(&self, sender: &Address) -> Vec<Transaction> {
        let inner = self.inner.read();
        let mut entries: Vec<&PoolEntry> = inner
            .entries
            .values()
            .filter(|e| e.transaction.from == *sender)
            .collect();
        entries.sort_by_key(|e| e.seq);
        entries.iter().map(|e| e.transaction.clone()).collect()
    }

    /// Bump the consideration counter. Returns the new count if present.
    pub fn increment_attempt(&self, hash: &Hash) -> Option<u32> {
        let mut inner = self.inner.write();
        let entry = inner.entries.get_mut(hash)?;
        entry.attempts += 1;
        Some(entry.attempts)
    }
}

impl Default for Mempool {
    fn default() -> Self {
        Self::new(1000)
    }
}
