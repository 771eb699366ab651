//! Workflow graph domain model.
//!
//! These types are the source of truth for what a workflow graph looks like
//! in memory.  They deserialize from the JSON `graph` document persisted on
//! a workflow record.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::EngineError;

/// A single configured block in the graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    /// Unique identifier within this graph (referenced by edges).
    pub id: String,
    /// Catalog key, e.g. `payload-input`, `zcash-send`.
    pub block_id: String,
    /// Parsed, registry-validated block configuration.
    #[serde(default)]
    pub data: serde_json::Value,
    /// Key under which this node's output is exposed to later nodes.
    #[serde(default)]
    pub alias: Option<String>,
    /// Stored external-service configuration bound to this node.
    #[serde(default)]
    pub connector: Option<Uuid>,
}

/// Directed edge from one node to another; the target depends on the
/// source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    /// Output port on the source (branching blocks select one).
    #[serde(default)]
    pub source_handle: Option<String>,
    /// Input port on the target (multi-input blocks name their inputs).
    #[serde(default)]
    pub target_handle: Option<String>,
}

/// A complete workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Graph {
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub edges: Vec<GraphEdge>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Graph {
    /// Parse the persisted graph document.  Persisted graphs are never
    /// trusted; [`crate::validate_graph`] runs again at every run start.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, EngineError> {
        serde_json::from_value(value.clone())
            .map_err(|e| EngineError::GraphInvalid(format!("graph does not parse: {e}")))
    }
}
