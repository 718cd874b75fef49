use std::sync::Arc;

use braidnode::node::{DevNode, NodeConfig};
use braidnode::types::transaction::Transaction;
use braidnode::types::{Address, U256};

/// A node bound to ephemeral ports.
pub struct TestNode {
    pub node: Arc<DevNode>,
}

impl TestNode {
    /// Build a node without starting servers or miner. Scenario tests
    /// drive rounds through `mine_blocks`, so nothing mines in the
    /// background and block counts stay deterministic.
    pub fn create() -> Self {
        Self::create_with(|_| {})
    }

    /// Build an idle node after applying a configuration tweak.
    pub fn create_with(tweak: impl FnOnce(&mut NodeConfig)) -> Self {
        let mut config = NodeConfig::default();
        // A round lands immediately on start; the gap to the next one
        // leaves mine_blocks room to stop the miner first.
        config.mining.block_time_ms = 500;
        // Ephemeral ports keep parallel test binaries from colliding.
        config.rpc.listen_addr = "127.0.0.1:0".parse().unwrap();
        config.rpc.ws_addr = "127.0.0.1:0".parse().unwrap();
        tweak(&mut config);

        let node = DevNode::new(config).expect("valid test config");
        Self { node }
    }

    /// Build and fully start a node (servers, then miner).
    pub async fn start_with(tweak: impl FnOnce(&mut NodeConfig)) -> Self {
        let this = Self::create_with(tweak);
        this.node.start().await.expect("node starts");
        this
    }

    pub async fn stop(&self) {
        self.node.stop().await;
    }
}

/// A value transfer between two addresses at 1 gwei.
pub fn transfer(from: Address, to: Address, value: U256, nonce: u64) -> Transaction {
    Transaction::new(
        from,
        Some(to),
        value,
        vec![],
        nonce,
        100_000,
        U256::from_u64(1_000_000_000),
    )
}
