//! The development node: owns every component and sequences lifecycle.

use parking_lot::{Mutex, RwLock};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::config::{ConfigError, NodeConfig};
use super::mempool::{Mempool, PoolError};
use super::miner::Miner;
use super::{rpc, ws};
use crate::dag::{DagGraph, GhostdagParams};
use crate::evm::EvmExecutor;
use crate::types::event::NodeEvent;
use crate::types::transaction::Transaction;
use crate::types::units::parse_ether;
use crate::types::{Address, Hash};

/// Broadcast channel capacity; slow subscribers past this lag are dropped.
const EVENT_CAPACITY: usize = 1024;

/// Node lifecycle failures.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        source: std::io::Error,
    },
}

/// The local BlockDAG development node.
///
/// Owns the DAG, mempool, executor, miner, and both servers. External
/// callers route through here; every mutation of shared state funnels
/// through the component locks this struct hands out.
pub struct DevNode {
    config: NodeConfig,
    dag: Arc<RwLock<DagGraph>>,
    mempool: Arc<Mempool>,
    executor: Arc<RwLock<EvmExecutor>>,
    miner: Arc<Miner>,
    events: broadcast::Sender<NodeEvent>,
    dev_accounts: Vec<Address>,
    running: AtomicBool,
    server_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl DevNode {
    /// Build a node from configuration. Validation failures are fatal.
    pub fn new(config: NodeConfig) -> Result<Arc<Self>, NodeError> {
        config.validate()?;

        let dag = Arc::new(RwLock::new(DagGraph::new(GhostdagParams {
            k: config.ghostdag.k,
            blue_threshold: config.ghostdag.blue_threshold,
        })));
        let mempool = Arc::new(Mempool::new(config.mempool.max_size));

        let mut executor = EvmExecutor::new(config.chain.chain_id);
        let dev_accounts = derive_dev_accounts(config.accounts.seed, config.accounts.count);
        let balance = parse_ether(&config.accounts.balance_ether)
            .expect("balance validated with the config");
        for account in &dev_accounts {
            executor.set_balance(*account, balance);
        }
        let executor = Arc::new(RwLock::new(executor));

        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let miner = Arc::new(Miner::new(
            config.mining.clone(),
            Arc::clone(&dag),
            Arc::clone(&mempool),
            Arc::clone(&executor),
            events.clone(),
        ));

        Ok(Arc::new(Self {
            config,
            dag,
            mempool,
            executor,
            miner,
            events,
            dev_accounts,
            running: AtomicBool::new(false),
            server_tasks: Mutex::new(Vec::new()),
        }))
    }

    /// Start the servers, then the miner. No-op when already running.
    pub async fn start(self: &Arc<Self>) -> Result<(), NodeError> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("node already running");
            return Ok(());
        }

        let rpc_task = rpc::start_rpc_server(Arc::clone(self), self.config.rpc.listen_addr).await?;
        let ws_task = ws::start_ws_server(Arc::clone(self), self.config.rpc.ws_addr).await?;
        {
            let mut tasks = self.server_tasks.lock();
            tasks.push(rpc_task);
            tasks.push(ws_task);
        }

        self.miner.start();

        info!(
            rpc = %self.config.rpc.listen_addr,
            ws = %self.config.rpc.ws_addr,
            chain_id = self.config.chain.chain_id,
            "node started"
        );
        let _ = self.events.send(NodeEvent::NodeStarted);
        Ok(())
    }

    /// Stop the miner, then the servers. No-op when already stopped.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("node already stopped");
            return;
        }

        self.miner.stop().await;

        for task in self.server_tasks.lock().drain(..) {
            task.abort();
        }

        info!("node stopped");
        let _ = self.events.send(NodeEvent::NodeStopped);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Forward a transaction to the mempool. Emits `TransactionAdded`
    /// only if the pool accepted it.
    pub fn add_transaction(&self, tx: Transaction) -> Result<Hash, PoolError> {
        let hash = tx.hash;
        self.mempool.add(tx.clone())?;
        let _ = self.events.send(NodeEvent::TransactionAdded(tx));
        Ok(hash)
    }

    /// Imperatively mine `count` blocks: starts the miner when idle, waits
    /// for the events, and stops the miner again if this call started it.
    pub async fn mine_blocks(&self, count: usize) -> Vec<Hash> {
        let mut rx = self.events.subscribe();
        let started_here = !self.miner.is_running();
        if started_here {
            self.miner.start();
        }

        let mut mined = Vec::with_capacity(count);
        while mined.len() < count {
            match rx.recv().await {
                Ok(NodeEvent::BlockMined(block)) => mined.push(block.hash),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "mine_blocks waiter lagged behind events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }

        if started_here {
            self.miner.stop().await;
        }
        mined
    }

    // Component handles.

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn chain_id(&self) -> u64 {
        self.config.chain.chain_id
    }

    pub fn dag(&self) -> &Arc<RwLock<DagGraph>> {
        &self.dag
    }

    pub fn mempool(&self) -> &Arc<Mempool> {
        &self.mempool
    }

    pub fn executor(&self) -> &Arc<RwLock<EvmExecutor>> {
        &self.executor
    }

    pub fn miner(&self) -> &Arc<Miner> {
        &self.miner
    }

    pub fn dev_accounts(&self) -> &[Address] {
        &self.dev_accounts
    }

    /// Subscribe to the node's event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.events.subscribe()
    }
}

/// Derive deterministic, pre-funded development account addresses.
fn derive_dev_accounts(seed: u64, count: usize) -> Vec<Address> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let mut bytes = [0u8; 20];
            rng.fill_bytes(&mut bytes);
            Address(bytes)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::U256;

    fn test_node() -> Arc<DevNode> {
        let mut config = NodeConfig::default();
        // Long enough that mine_blocks stops the miner before a second
        // round sneaks in.
        config.mining.block_time_ms = 300;
        // Port 0 keeps parallel tests from colliding.
        config.rpc.listen_addr = "127.0.0.1:0".parse().unwrap();
        config.rpc.ws_addr = "127.0.0.1:0".parse().unwrap();
        DevNode::new(config).unwrap()
    }

    fn make_tx(nonce: u64, from: Address) -> Transaction {
        Transaction::new(
            from,
            Some(Address([0xCC; 20])),
            U256::from_u64(1),
            vec![],
            nonce,
            21000,
            U256::from_u64(1_000_000_000),
        )
    }

    #[test]
    fn test_invalid_config_is_fatal() {
        let mut config = NodeConfig::default();
        config.ghostdag.k = 0;
        assert!(matches!(
            DevNode::new(config),
            Err(NodeError::Config(ConfigError::InvalidK))
        ));
    }

    #[test]
    fn test_dev_accounts_are_deterministic_and_funded() {
        let node_a = test_node();
        let node_b = test_node();
        assert_eq!(node_a.dev_accounts(), node_b.dev_accounts());
        assert_eq!(node_a.dev_accounts().len(), 10);

        let balance = parse_ether("10000").unwrap();
        let executor = node_a.executor().read();
        for account in node_a.dev_accounts() {
            assert_eq!(executor.get_balance(account), balance);
        }
    }

    #[test]
    fn test_add_transaction_emits_event_iff_accepted() {
        let node = test_node();
        let mut rx = node.subscribe();

        let tx = make_tx(0, node.dev_accounts()[0]);
        let hash = node.add_transaction(tx.clone()).unwrap();
        assert_eq!(hash, tx.hash);
        assert!(matches!(
            rx.try_recv(),
            Ok(NodeEvent::TransactionAdded(t)) if t.hash == hash
        ));

        // Duplicate rejected, no event.
        assert_eq!(node.add_transaction(tx), Err(PoolError::Duplicate));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_mine_blocks_starts_and_stops_idle_miner() {
        let node = test_node();
        assert!(!node.miner().is_running());

        let mined = node.mine_blocks(3).await;
        assert_eq!(mined.len(), 3);
        assert!(!node.miner().is_running());
        assert_eq!(node.dag().read().get_block_count(), 4);
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let node = test_node();

        node.start().await.unwrap();
        assert!(node.is_running());
        assert!(node.miner().is_running());

        // Double start is a no-op.
        node.start().await.unwrap();

        node.stop().await;
        assert!(!node.is_running());
        assert!(!node.miner().is_running());

        // Double stop is a no-op.
        node.stop().await;
    }

    #[tokio::test]
    async fn test_block_appended_before_event() {
        let node = test_node();
        let mut rx = node.subscribe();
        node.miner().start();

        // Every BlockMined must already be resolvable in the DAG.
        let mut seen = 0;
        while seen < 4 {
            if let Ok(NodeEvent::BlockMined(block)) = rx.recv().await {
                assert!(node.dag().read().get_block(&block.hash).is_some());
                seen += 1;
            }
        }
        node.miner().stop().await;
    }
}
