//! braidnode — a local BlockDAG development node.
//!
//! An in-process engine that accepts transactions, produces several blocks
//! per round referencing multiple parents, executes them on an
//! EVM-compatible virtual machine, and orders the DAG with a
//! GHOSTDAG-style blue/red classification. Exposes an Ethereum-compatible
//! JSON-RPC surface with DAG-aware methods and a WebSocket event stream.

pub mod dag;
pub mod evm;
pub mod node;
pub mod types;

// Re-export core types for convenience
pub use dag::{DagGraph, GhostdagParams};
pub use evm::{EvmExecutor, VmError};
pub use node::{DevNode, Mempool, Miner, NodeConfig};
pub use types::{Address, Hash, U256};
