//! Block DAG storage, traversal, and GHOSTDAG coloring.

pub mod coloring;
pub mod graph;

pub use graph::{AddOutcome, DagError, DagGraph, DagStats, GhostdagParams};
