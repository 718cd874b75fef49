//! Node lifecycle and data events.
//!
//! Published on the orchestrator's broadcast channel; consumed by the
//! WebSocket server and by `mine_blocks`-style waiters.

use super::block::Block;
use super::transaction::Transaction;
use serde::{Deserialize, Serialize};

/// An event emitted by the node.
///
/// A block is appended to the DAG strictly before its `BlockMined` event is
/// emitted; `TransactionAdded` is emitted only after the mempool accepted.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum NodeEvent {
    /// Node finished starting.
    NodeStarted,

    /// Node finished stopping.
    NodeStopped,

    /// The miner began producing rounds.
    MiningStarted,

    /// The miner stopped.
    MiningStopped,

    /// A block was committed to the DAG.
    BlockMined(Block),

    /// A transaction was admitted to the mempool.
    TransactionAdded(Transaction),
}

impl NodeEvent {
    /// Wire tag used by the WebSocket stream.
    pub fn kind(&self) -> &'static str {
        match self {
            NodeEvent::NodeStarted => "nodeStarted",
            NodeEvent::NodeStopped => "nodeStopped",
            NodeEvent::MiningStarted => "miningStarted",
            NodeEvent::MiningStopped => "miningStopped",
            NodeEvent::BlockMined(_) => "blockMined",
            NodeEvent::TransactionAdded(_) => "transactionAdded",
        }
    }
}
