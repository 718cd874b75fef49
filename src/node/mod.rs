//! The development node.
//!
//! Combines the DAG, mempool, executor, and miner into a runnable node
//! with a JSON-RPC surface and a WebSocket event stream.

pub mod config;
pub mod mempool;
pub mod miner;
pub mod node;
pub mod rpc;
pub mod ws;

pub use config::{ConfigError, NodeConfig};
pub use mempool::{Mempool, PoolError};
pub use miner::Miner;
pub use node::{DevNode, NodeError};
