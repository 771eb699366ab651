//! Graph validation — run this at publish time AND at every run start.
//!
//! Rules enforced:
//! 1. Node IDs must be unique within the graph.
//! 2. Aliases must be unique within the graph.
//! 3. Every edge must reference existing node IDs (both source and target).
//! 4. Nodes whose handler requires a connector must have one bound.
//! 5. The directed graph must be acyclic (topological sort must succeed).
//!
//! Returns the node IDs in topological execution order on success.  Ties
//! are broken lexicographically by node ID so runs are deterministic.

use std::collections::{BTreeSet, HashMap, HashSet};

use blocks::BlockKind;

use crate::{EngineError, Graph};

/// Validate the graph and return nodes in deterministic execution order.
pub fn validate_graph(graph: &Graph) -> Result<Vec<String>, EngineError> {
    // -----------------------------------------------------------------------
    // 1. Node IDs and aliases are unique
    // -----------------------------------------------------------------------
    let mut seen_ids: HashSet<&str> = HashSet::new();
    let mut seen_aliases: HashSet<&str> = HashSet::new();
    for node in &graph.nodes {
        if !seen_ids.insert(node.id.as_str()) {
            return Err(EngineError::GraphInvalid(format!(
                "duplicate node id '{}'",
                node.id
            )));
        }
        if let Some(alias) = node.alias.as_deref() {
            if !seen_aliases.insert(alias) {
                return Err(EngineError::GraphInvalid(format!(
                    "duplicate alias '{alias}'"
                )));
            }
        }
    }

    // -----------------------------------------------------------------------
    // 2. Edge endpoints exist
    // -----------------------------------------------------------------------
    for edge in &graph.edges {
        for (side, node_id) in [("source", &edge.source), ("target", &edge.target)] {
            if !seen_ids.contains(node_id.as_str()) {
                return Err(EngineError::GraphInvalid(format!(
                    "edge '{}' references unknown {side} node '{node_id}'",
                    edge.id
                )));
            }
        }
    }

    // -----------------------------------------------------------------------
    // 3. Connector-requiring blocks have one bound
    // -----------------------------------------------------------------------
    for node in &graph.nodes {
        if let Some(kind) = BlockKind::parse(&node.block_id) {
            if kind.requires_connector() && node.connector.is_none() {
                return Err(EngineError::GraphInvalid(format!(
                    "node '{}' ({}) requires a connector",
                    node.id, node.block_id
                )));
            }
        }
    }

    // -----------------------------------------------------------------------
    // 4. Topological sort (Kahn's algorithm, ordered ready set)
    // -----------------------------------------------------------------------
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut in_degree: HashMap<&str, usize> = HashMap::new();

    for node in &graph.nodes {
        adjacency.entry(node.id.as_str()).or_default();
        in_degree.entry(node.id.as_str()).or_insert(0);
    }

    for edge in &graph.edges {
        adjacency
            .entry(edge.source.as_str())
            .or_default()
            .push(edge.target.as_str());
        *in_degree.entry(edge.target.as_str()).or_insert(0) += 1;
    }

    // The ready set is a BTreeSet so equal-depth nodes pop in lexicographic
    // order — execution order must be deterministic across runs.
    let mut ready: BTreeSet<&str> = in_degree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(&id, _)| id)
        .collect();

    let mut sorted: Vec<String> = Vec::with_capacity(graph.nodes.len());

    while let Some(&node_id) = ready.iter().next() {
        ready.remove(node_id);
        sorted.push(node_id.to_owned());

        if let Some(neighbours) = adjacency.get(node_id) {
            for &neighbour in neighbours {
                let deg = in_degree.entry(neighbour).or_insert(0);
                *deg -= 1;
                if *deg == 0 {
                    ready.insert(neighbour);
                }
            }
        }
    }

    // If we didn't visit every node the graph contains a cycle.
    if sorted.len() != graph.nodes.len() {
        return Err(EngineError::GraphInvalid("graph contains a cycle".into()));
    }

    Ok(sorted)
}
