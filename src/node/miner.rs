//! Round-driven parallel block producer.
//!
//! Every round snapshots the DAG tips once, builds `parallelism` blocks
//! against that snapshot, executes their transactions, and only then
//! appends the whole batch. Appending after the loop is what makes the
//! round a true fan-out: blocks produced within one round never chain on
//! each other.

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config::MiningConfig;
use super::mempool::Mempool;
use crate::dag::DagGraph;
use crate::evm::EvmExecutor;
use crate::types::block::Block;
use crate::types::event::NodeEvent;
use crate::types::transaction::Receipt;
use crate::types::Hash;

/// Transactions drawn from the mempool per block.
const TXS_PER_BLOCK: usize = 10;

struct MinerTask {
    handle: JoinHandle<()>,
    stop: watch::Sender<bool>,
}

/// The block producer.
pub struct Miner {
    config: RwLock<MiningConfig>,
    dag: Arc<RwLock<DagGraph>>,
    mempool: Arc<Mempool>,
    executor: Arc<RwLock<EvmExecutor>>,

    /// Receipt index: written only by mining rounds, read by RPC handlers.
    receipts: DashMap<Hash, Receipt>,

    events: broadcast::Sender<NodeEvent>,
    task: Mutex<Option<MinerTask>>,

    /// Monotonic block nonce; keeps sibling blocks with identical contents
    /// from hashing identically.
    nonce_counter: AtomicU64,
}

impl Miner {
    pub fn new(
        config: MiningConfig,
        dag: Arc<RwLock<DagGraph>>,
        mempool: Arc<Mempool>,
        executor: Arc<RwLock<EvmExecutor>>,
        events: broadcast::Sender<NodeEvent>,
    ) -> Self {
        Self {
            config: RwLock::new(config),
            dag,
            mempool,
            executor,
            receipts: DashMap::new(),
            events,
            task: Mutex::new(None),
            nonce_counter: AtomicU64::new(0),
        }
    }

    /// Begin producing rounds: one immediately, then one per block time.
    /// No-op when already running.
    pub fn start(self: &Arc<Self>) {
        let mut task = self.task.lock();
        if task.is_some() {
            debug!("miner already running");
            return;
        }

        let block_time = self.config.read().block_time_ms;
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let miner = Arc::clone(self);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(block_time));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => miner.mine_round(),
                    _ = stop_rx.changed() => break,
                }
            }
        });

        *task = Some(MinerTask {
            handle,
            stop: stop_tx,
        });
        info!(block_time_ms = block_time, "miner started");
        let _ = self.events.send(NodeEvent::MiningStarted);
    }

    /// Stop producing rounds. An in-flight round completes fully before
    /// this returns. No-op when already stopped.
    pub async fn stop(&self) {
        let task = self.task.lock().take();
        let Some(task) = task else {
            debug!("miner already stopped");
            return;
        };

        let _ = task.stop.send(true);
        if let Err(e) = task.handle.await {
            if !e.is_cancelled() {
                error!("miner task failed: {e}");
            }
        }
        info!("miner stopped");
        let _ = self.events.send(NodeEvent::MiningStopped);
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().is_some()
    }

    /// Swap the mining configuration; restarts the timer when running.
    pub async fn update_config(self: &Arc<Self>, config: MiningConfig) {
        let was_running = self.is_running();
        if was_running {
            self.stop().await;
        }
        *self.config.write() = config;
        if was_running {
            self.start();
        }
    }

    pub fn config(&self) -> MiningConfig {
        self.config.read().clone()
    }

    pub fn get_receipt(&self, hash: &Hash) -> Option<Receipt> {
        self.receipts.get(hash).map(|r| r.value().clone())
    }

    pub fn get_all_receipts(&self) -> Vec<Receipt> {
        self.receipts.iter().map(|r| r.value().clone()).collect()
    }

    /// Produce one round of blocks.
    ///
    /// Tips are snapshotted once; each block index selects a rotated
    /// parent subset from that snapshot, so a multi-tip DAG fans out
    /// rather than chaining linearly within the round.
    pub fn mine_round(&self) {
        let config = self.config.read().clone();

        let (tips, tip_depths, base_timestamp) = {
            let dag = self.dag.read();
            let tips = dag.get_tips();
            let depths: Vec<u64> = tips
                .iter()
                .map(|t| dag.get_block(t).map(|b| b.dag_depth).unwrap_or(0))
                .collect();
            (tips, depths, now_millis())
        };

        if tips.is_empty() {
            error!("DAG has no tips; genesis invariant broken");
            return;
        }

        let mut sealed: Vec<Block> = Vec::with_capacity(config.parallelism);
        let mut round_receipts: Vec<Receipt> = Vec::new();
        let mut included: std::collections::HashSet<Hash> = std::collections::HashSet::new();

        {
            let mut executor = self.executor.write();

            for block_index in 0..config.parallelism {
                let parents = select_parents(&tips, block_index, config.max_parents);
                let depth = 1 + parents
                    .iter()
                    .map(|p| {
                        tips.iter()
                            .position(|t| t == p)
                            .map(|i| tip_depths[i])
                            .unwrap_or(0)
                    })
                    .max()
                    .unwrap_or(0);

                // The pool is not drained until the round commits, so
                // blocks later in the round must skip what earlier ones
                // already claimed.
                let transactions: Vec<_> = self
                    .mempool
                    .pending(None)
                    .into_iter()
                    .filter(|tx| !included.contains(&tx.hash))
                    .take(TXS_PER_BLOCK)
                    .collect();

                executor.set_block_env(depth, base_timestamp, config.miner_address);
                executor.reset_cumulative_gas();

                let mut block_receipts = Vec::with_capacity(transactions.len());
                for tx in &transactions {
                    self.mempool.increment_attempt(&tx.hash);
                    // Failed executions still occupy their slot and get a
                    // receipt; the block hash is patched in after sealing.
                    let execution = executor.execute(tx, Hash::ZERO);
                    block_receipts.push(execution.receipt);
                    included.insert(tx.hash);
                }

                let state_root = executor.get_state_root();
                let nonce = self.nonce_counter.fetch_add(1, Ordering::SeqCst);
                let block = Block::new(
                    parents,
                    base_timestamp,
                    config.miner_address,
                    state_root,
                    nonce,
                    transactions,
                );

                for receipt in &mut block_receipts {
                    receipt.block_hash = block.hash;
                }
                round_receipts.extend(block_receipts);
                sealed.push(block);
            }
        }

        // Append the whole round in block-index order; every append reruns
        // the coloring pass, so the last one reflects the full round.
        let mut committed: Vec<Hash> = Vec::with_capacity(sealed.len());
        {
            let mut dag = self.dag.write();
            for block in sealed {
                let hash = block.hash;
                match dag.add_block(block) {
                    Ok(_) => committed.push(hash),
                    Err(e) => error!(block = %hash, "failed to append mined block: {e}"),
                }
            }
        }

        // Inclusion is final only once the carrying block is in the DAG:
        // record the receipt and drop the transaction from the pool.
        for receipt in round_receipts {
            if committed.contains(&receipt.block_hash) {
                self.mempool.remove(&receipt.transaction_hash);
                self.receipts.insert(receipt.transaction_hash, receipt);
            }
        }

        // Events carry the block as colored by the final pass.
        let dag = self.dag.read();
        for hash in &committed {
            if let Some(block) = dag.get_block(hash) {
                let _ = self.events.send(NodeEvent::BlockMined(block.clone()));
            }
        }
        drop(dag);

        debug!(blocks = committed.len(), "round committed");
    }
}

/// Select parents for the block at `index` within a round.
///
/// Rotating the starting tip by the block index gives sibling blocks
/// overlapping-but-distinct parent subsets, so a round over two or more
/// tips forms a genuine fan-out.
pub fn select_parents(tips: &[Hash], index: usize, max_parents: usize) -> Vec<Hash> {
    match tips.len() {
        0 => {
            warn!("parent selection over empty tip set");
            Vec::new()
        }
        1 => vec![tips[0]],
        len => {
            let n = max_parents.min(len);
            let start = index % len;
            let mut parents = Vec::with_capacity(n);
            for j in 0..n {
                let tip = tips[(start + j) % len];
                if !parents.contains(&tip) {
                    parents.push(tip);
                }
            }
            parents
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::GhostdagParams;
    use crate::types::transaction::ReceiptStatus;
    use crate::types::units::parse_ether;
    use crate::types::{Address, U256};

    fn test_miner(parallelism: usize, max_parents: usize) -> Arc<Miner> {
        let dag = Arc::new(RwLock::new(DagGraph::new(GhostdagParams::default())));
        let mempool = Arc::new(Mempool::new(1000));
        let executor = Arc::new(RwLock::new(EvmExecutor::new(1337)));
        let (events, _) = broadcast::channel(256);
        Arc::new(Miner::new(
            MiningConfig {
                parallelism,
                block_time_ms: 50,
                max_parents,
                miner_address: Address([0xEE; 20]),
            },
            dag,
            mempool,
            executor,
            events,
        ))
    }

    #[test]
    fn test_select_parents_single_tip() {
        let tips = vec![Hash([1; 32])];
        assert_eq!(select_parents(&tips, 0, 3), tips);
        assert_eq!(select_parents(&tips, 2, 3), tips);
    }

    #[test]
    fn test_select_parents_rotates_by_index() {
        let tips: Vec<Hash> = (1..=3).map(|i| Hash([i; 32])).collect();

        assert_eq!(
            select_parents(&tips, 0, 2),
            vec![tips[0], tips[1]]
        );
        assert_eq!(
            select_parents(&tips, 1, 2),
            vec![tips[1], tips[2]]
        );
        assert_eq!(
            select_parents(&tips, 2, 2),
            vec![tips[2], tips[0]]
        );
        // Wraps past the tip count.
        assert_eq!(
            select_parents(&tips, 3, 2),
            vec![tips[0], tips[1]]
        );
    }

    #[test]
    fn test_select_parents_caps_at_tip_count() {
        let tips: Vec<Hash> = (1..=2).map(|i| Hash([i; 32])).collect();
        let parents = select_parents(&tips, 0, 5);
        assert_eq!(parents.len(), 2);
    }

    #[test]
    fn test_first_round_fans_out_from_genesis() {
        let miner = test_miner(3, 3);
        miner.mine_round();

        let dag = miner.dag.read();
        assert_eq!(dag.get_block_count(), 4);
        assert_eq!(dag.get_max_depth(), 1);
        assert_eq!(dag.get_tips().len(), 3);
        // Every new block hangs off genesis alone.
        let genesis = dag.get_genesis_hash();
        for block in dag.get_all_blocks() {
            if !block.is_genesis() {
                assert_eq!(block.parent_hashes, vec![genesis]);
            }
        }
    }

    #[test]
    fn test_second_round_references_prior_tips() {
        let miner = test_miner(3, 3);
        miner.mine_round();
        let first_tips: std::collections::HashSet<Hash> =
            miner.dag.read().get_tips().into_iter().collect();

        miner.mine_round();

        let dag = miner.dag.read();
        assert_eq!(dag.get_block_count(), 7);
        assert_eq!(dag.get_max_depth(), 2);
        for block in dag.get_all_blocks() {
            if block.dag_depth == 2 {
                assert_eq!(block.parent_hashes.len(), 3);
                for parent in &block.parent_hashes {
                    assert!(first_tips.contains(parent));
                }
            }
        }
    }

    #[test]
    fn test_round_executes_and_removes_transactions() {
        let miner = test_miner(2, 3);
        let sender = Address([0xAA; 20]);
        miner
            .executor
            .write()
            .set_balance(sender, parse_ether("100").unwrap());

        let tx = crate::types::transaction::Transaction::new(
            sender,
            Some(Address([0xBB; 20])),
            parse_ether("1").unwrap(),
            vec![],
            0,
            100_000,
            U256::from_u64(1_000_000_000),
        );
        let tx_hash = tx.hash;
        miner.mempool.add(tx).unwrap();

        miner.mine_round();

        // Removed from the pool, exactly one receipt, tx in exactly one block.
        assert_eq!(miner.mempool.size(), 0);
        let receipt = miner.get_receipt(&tx_hash).expect("receipt recorded");
        assert_eq!(receipt.status, ReceiptStatus::Success);

        let dag = miner.dag.read();
        let carriers: Vec<_> = dag
            .get_all_blocks()
            .into_iter()
            .filter(|b| b.transactions.iter().any(|t| t.hash == tx_hash))
            .collect();
        assert_eq!(carriers.len(), 1);
        assert_eq!(carriers[0].hash, receipt.block_hash);
    }

    #[test]
    fn test_failed_transaction_still_included_with_receipt() {
        let miner = test_miner(1, 3);
        // Unfunded sender: execution fails, inclusion still happens.
        let tx = crate::types::transaction::Transaction::new(
            Address([0xAB; 20]),
            Some(Address([0xBC; 20])),
            parse_ether("5").unwrap(),
            vec![],
            0,
            50_000,
            U256::from_u64(1_000_000_000),
        );
        let tx_hash = tx.hash;
        miner.mempool.add(tx).unwrap();

        miner.mine_round();

        let receipt = miner.get_receipt(&tx_hash).expect("failed tx still gets a receipt");
        assert_eq!(receipt.status, ReceiptStatus::Failed);
        assert_eq!(receipt.gas_used, 50_000);
        assert_eq!(miner.mempool.size(), 0);
    }

    #[tokio::test]
    async fn test_start_stop_idempotent() {
        let miner = test_miner(1, 1);
        assert!(!miner.is_running());

        miner.start();
        assert!(miner.is_running());
        miner.start(); // no-op
        assert!(miner.is_running());

        miner.stop().await;
        assert!(!miner.is_running());
        miner.stop().await; // no-op
        assert!(!miner.is_running());
    }

    #[tokio::test]
    async fn test_timer_produces_rounds() {
        let miner = test_miner(2, 2);
        let mut events = miner.events.subscribe();

        miner.start();
        // The immediate round fires without waiting a full block time.
        let mut mined = 0;
        while mined < 2 {
            match tokio::time::timeout(Duration::from_secs(5), events.recv()).await {
                Ok(Ok(NodeEvent::BlockMined(_))) => mined += 1,
                Ok(Ok(_)) => {}
                other => panic!("expected mined blocks, got {other:?}"),
            }
        }
        miner.stop().await;

        assert!(miner.dag.read().get_block_count() >= 3);
    }

    #[tokio::test]
    async fn test_update_config_applies() {
        let miner = test_miner(1, 1);
        let mut config = miner.config();
        config.parallelism = 4;
        miner.update_config(config).await;
        assert_eq!(miner.config().parallelism, 4);

        miner.mine_round();
        assert_eq!(miner.dag.read().get_block_count(), 5);
    }
}
