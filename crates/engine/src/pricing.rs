//! Per-run credit pricing.

use blocks::BlockKind;

use crate::Graph;

/// Credits debited once per run, operation `workflow-run`.
pub const RUN_PRICE: i64 = 1;
pub const RUN_OPERATION: &str = "workflow-run";

/// Pre-flight cost of a run: the run price plus every priced node in the
/// graph.  Nodes that may later be gated off still count here; the check is
/// a ceiling, not a forecast.
pub fn run_cost(graph: &Graph) -> i64 {
    let blocks: i64 = graph
        .nodes
        .iter()
        .filter_map(|node| BlockKind::parse(&node.block_id).and_then(BlockKind::price))
        .sum();
    RUN_PRICE + blocks
}
