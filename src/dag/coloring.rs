//! GHOSTDAG blue/red classification.
//!
//! The pass recomputes the coloring from scratch after every append:
//!
//! 1. every block starts red, genesis is blue;
//! 2. non-genesis blocks are visited in ascending (depth, hash) order —
//!    the hash tie-break keeps the result deterministic;
//! 3. a candidate joins the blue set iff at most `k` currently-blue blocks
//!    sit in its anticone;
//! 4. every block's blue score is its count of blue ancestors.
//!
//! Quadratic overall, which the past-cone bitsets keep cheap at dev-node
//! scale. Rerunning the pass on an unchanged graph reproduces the same
//! coloring.

use super::graph::DagGraph;
use crate::types::block::BlockColor;

impl DagGraph {
    /// Recompute colors and blue scores for the whole graph.
    pub(crate) fn recolor(&mut self) {
        let n = self.order.len();

        // Genesis is index 0 and unconditionally blue.
        let mut blue = vec![false; n];
        blue[0] = true;
        let mut blue_indices = vec![0usize];

        // Candidates in ascending (depth, hash) order.
        let mut candidates: Vec<usize> = (1..n).collect();
        candidates.sort_by(|&a, &b| {
            let (ba, bb) = (&self.blocks[&self.order[a]], &self.blocks[&self.order[b]]);
            ba.dag_depth
                .cmp(&bb.dag_depth)
                .then_with(|| ba.hash.cmp(&bb.hash))
        });

        for idx in candidates {
            let anticone_blues = blue_indices
                .iter()
                .filter(|&&b| !self.past[idx].contains(b) && !self.past[b].contains(idx))
                .count() as u64;

            if anticone_blues <= self.params.k {
                blue[idx] = true;
                blue_indices.push(idx);
            }
        }

        for idx in 0..n {
            let score = self.past[idx].iter().filter(|&a| blue[a]).count() as u64;
            let block = self
                .blocks
                .get_mut(&self.order[idx])
                .expect("order and blocks stay in sync");
            block.color = if blue[idx] {
                BlockColor::Blue
            } else {
                BlockColor::Red
            };
            block.blue_score = score;
        }
    }
}
