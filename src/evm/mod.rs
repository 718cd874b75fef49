//! EVM-compatible execution engine.
//!
//! World state, bytecode interpretation, and the transaction executor the
//! miner and RPC boundary drive.

pub mod executor;
pub mod interpreter;
pub mod state;

pub use executor::{EvmExecutor, Execution};
pub use interpreter::{BlockEnv, VmError};
pub use state::WorldState;
