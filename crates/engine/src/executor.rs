//! The run executor.
//!
//! `Executor::execute(run_id)` loads the run and its workflow, validates
//! the graph, walks the nodes in deterministic topological order threading
//! memory between them, debits credits, and finalizes the run record.
//!
//! Safe to invoke concurrently for distinct runs, and safe to re-invoke
//! for the same run: terminal runs short-circuit, which is the idempotency
//! net under the queue's at-least-once delivery.

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use blocks::{path, BlockContext, BlockKind, BlockRegistry};
use store::models::{RunRecord, WorkflowRecord};
use store::repository::{connectors, ledger, runs, workflows};
use store::{SecretBox, Store, StoreError};

use crate::pricing::{run_cost, RUN_OPERATION, RUN_PRICE};
use crate::{validate_graph, EngineError, Graph, GraphEdge, GraphNode};

/// Stateless orchestrator for run execution.  Construct once and share
/// behind an `Arc`; all state lives in the store and the per-call stack.
pub struct Executor {
    store: Store,
    secret_box: SecretBox,
    registry: BlockRegistry,
}

impl Executor {
    pub fn new(store: Store, secret_box: SecretBox, registry: BlockRegistry) -> Self {
        Self {
            store,
            secret_box,
            registry,
        }
    }

    /// Execute one run to a terminal state (or a retryable failure).
    ///
    /// Fatal failures are persisted on the run before returning; retryable
    /// failures record the attempt's error and leave finalization to the
    /// queue once attempts are exhausted.
    #[instrument(skip_all, fields(run_id = %run_id))]
    pub async fn execute(&self, run_id: Uuid) -> Result<Value, EngineError> {
        let existing = runs::get(&self.store, run_id)?;
        if existing.status.is_terminal() {
            info!(status = %existing.status, "run already terminal, skipping");
            return Ok(existing.result.unwrap_or(Value::Null));
        }

        let run = runs::mark_running(&self.store, run_id)?;

        match self.run_graph(&run).await {
            Ok(result) => {
                runs::finish_success(&self.store, run_id, result.clone())?;
                info!("run succeeded");
                Ok(result)
            }
            Err(err) => {
                warn!(kind = err.kind().as_str(), "run attempt failed: {err}");
                let run_error = err.to_run_error();
                let persisted = if err.retryable() {
                    runs::record_error(&self.store, run_id, run_error)
                } else {
                    runs::finish_failure(&self.store, run_id, run_error)
                };
                if let Err(store_err) = persisted {
                    warn!("failed to persist run error: {store_err}");
                }
                Err(err)
            }
        }
    }

    async fn run_graph(&self, run: &RunRecord) -> Result<Value, EngineError> {
        let workflow = workflows::get(&self.store, run.workflow_id)?;

        let graph = self.load_graph(&workflow)?;

        // Pre-flight credit check: fail before any debit happens.
        let cost = run_cost(&graph);
        let balance = ledger::balance(&self.store, &workflow.tenant)?;
        if balance < cost {
            return Err(EngineError::InsufficientCredits {
                needed: cost,
                balance,
            });
        }

        let order = validate_graph(&graph)?;
        info!(nodes = order.len(), "graph validated");

        match ledger::debit(&self.store, &workflow.tenant, RUN_PRICE, Some(RUN_OPERATION)) {
            Ok(_) => {}
            Err(StoreError::InsufficientCredits { balance, .. }) => {
                return Err(EngineError::InsufficientCredits {
                    needed: cost,
                    balance,
                })
            }
            Err(other) => return Err(other.into()),
        }

        self.walk(run, &workflow, &graph, &order).await
    }

    fn load_graph(&self, workflow: &WorkflowRecord) -> Result<Graph, EngineError> {
        if workflow.graph.is_null() {
            return Err(EngineError::GraphMissing);
        }
        let graph = Graph::from_value(&workflow.graph)?;
        if graph.nodes.is_empty() {
            return Err(EngineError::GraphMissing);
        }
        Ok(graph)
    }

    async fn walk(
        &self,
        run: &RunRecord,
        workflow: &WorkflowRecord,
        graph: &Graph,
        order: &[String],
    ) -> Result<Value, EngineError> {
        let node_map: HashMap<&str, &GraphNode> =
            graph.nodes.iter().map(|n| (n.id.as_str(), n)).collect();
        let mut incoming: HashMap<&str, Vec<&GraphEdge>> = HashMap::new();
        for edge in &graph.edges {
            incoming.entry(edge.target.as_str()).or_default().push(edge);
        }

        let mut memory: Map<String, Value> = Map::new();
        memory.insert("payload".to_owned(), run.payload.clone());

        // Per-node bookkeeping for gating and binding.
        let mut bindings: HashMap<String, String> = HashMap::new();
        let mut selected: HashMap<String, Option<String>> = HashMap::new();
        let mut skipped: HashSet<String> = HashSet::new();

        let mut attestations: Map<String, Value> = Map::new();
        let mut globals: Map<String, Value> = Map::new();
        let mut last_binding: Option<String> = None;

        for node_id in order {
            let node = node_map[node_id.as_str()];
            let edges_in = incoming.get(node_id.as_str()).cloned().unwrap_or_default();

            if self.branch_gated(&edges_in, &selected, &skipped)
                || self.run_if_gated(node, &memory)
            {
                info!(node = %node.id, "node gated off");
                skipped.insert(node.id.clone());
                continue;
            }

            let resolved = resolve_config(node, &memory)?;

            let inputs = collect_inputs(&edges_in, &bindings, &memory);

            let kind =
                BlockKind::parse(&node.block_id).ok_or_else(|| EngineError::UnknownBlock {
                    node_id: node.id.clone(),
                    block_id: node.block_id.clone(),
                })?;
            let handler = self
                .registry
                .get(kind)
                .ok_or_else(|| EngineError::UnknownBlock {
                    node_id: node.id.clone(),
                    block_id: node.block_id.clone(),
                })?;

            let connector_config = match node.connector {
                Some(id) => {
                    Some(connectors::get_decrypted(&self.store, &self.secret_box, id)?.config)
                }
                None => None,
            };

            let ctx = BlockContext {
                run_id: run.id,
                node_id: &node.id,
                config: &resolved,
                payload: &run.payload,
                memory: &memory,
                inputs: &inputs,
                connector: connector_config.as_ref(),
            };

            let output = handler
                .execute(&ctx)
                .await
                .map_err(|e| EngineError::from_block_error(&node.id, e))?;

            if let Some(price) = kind.price() {
                match ledger::debit(&self.store, &workflow.tenant, price, Some(kind.as_str())) {
                    Ok(_) => {}
                    Err(StoreError::InsufficientCredits { .. }) => {
                        return Err(EngineError::CreditExhausted {
                            node_id: node.id.clone(),
                        })
                    }
                    Err(other) => return Err(other.into()),
                }
            }

            // Bind the output: responseAlias (actions) > alias > node id.
            let binding = if kind.is_action() {
                resolved
                    .get("responseAlias")
                    .and_then(Value::as_str)
                    .map(str::to_owned)
            } else {
                None
            }
            .or_else(|| node.alias.clone())
            .unwrap_or_else(|| node.id.clone());

            memory.insert(binding.clone(), output.value);
            if let Some(attestation) = output.attestation {
                attestations.insert(binding.clone(), attestation);
            }
            globals.extend(output.globals);
            selected.insert(node.id.clone(), output.selected_handle);
            bindings.insert(node.id.clone(), binding.clone());
            last_binding = Some(binding);
        }

        let mut result = Map::new();
        if let Some(binding) = &last_binding {
            result.insert(
                "final".to_owned(),
                memory.get(binding).cloned().unwrap_or(Value::Null),
            );
        }
        result.insert("outputs".to_owned(), Value::Object(memory));
        result.extend(globals);
        if !attestations.is_empty() {
            result.insert("attestations".to_owned(), Value::Object(attestations));
        }
        Ok(Value::Object(result))
    }

    /// A node is gated off when any incoming branch edge was not selected
    /// by its source — including sources that were themselves skipped.
    fn branch_gated(
        &self,
        edges_in: &[&GraphEdge],
        selected: &HashMap<String, Option<String>>,
        skipped: &HashSet<String>,
    ) -> bool {
        edges_in.iter().any(|edge| {
            let Some(handle) = edge.source_handle.as_deref() else {
                return false;
            };
            if skipped.contains(&edge.source) {
                return true;
            }
            match selected.get(&edge.source) {
                // Sources without branch selection pass every handle.
                Some(None) | None => false,
                Some(Some(chosen)) => chosen != handle,
            }
        })
    }

    /// Run-if gate: skip unless `runIfPath` resolves to `runIfEquals`.
    /// An unresolvable path counts as "not equal".
    fn run_if_gated(&self, node: &GraphNode, memory: &Map<String, Value>) -> bool {
        let (Some(run_if_path), Some(expected)) = (
            node.data.get("runIfPath").and_then(Value::as_str),
            node.data.get("runIfEquals"),
        ) else {
            return false;
        };

        path::lookup(memory, run_if_path) != Some(expected)
    }
}

/// Path-valued config keys (`*Path`, `path`, `sourcePath`) are dereferenced
/// against memory; everything else passes through verbatim.  A present but
/// unresolvable path is a fatal configuration error.
fn resolve_config(node: &GraphNode, memory: &Map<String, Value>) -> Result<Value, EngineError> {
    let Some(config) = node.data.as_object() else {
        return Ok(node.data.clone());
    };

    let mut resolved = config.clone();
    for (key, value) in resolved.iter_mut() {
        if !is_path_key(key) {
            continue;
        }
        let Some(path_str) = value.as_str() else {
            continue;
        };
        match path::lookup(memory, path_str) {
            Some(found) => *value = found.clone(),
            None => {
                return Err(EngineError::ConfigInvalid {
                    node_id: node.id.clone(),
                    message: format!("path '{path_str}' in '{key}' did not resolve"),
                })
            }
        }
    }
    Ok(Value::Object(resolved))
}

/// Config keys the engine treats as paths.  Run-if keys are evaluated by
/// the gate, not rewritten here.
fn is_path_key(key: &str) -> bool {
    if key.starts_with("runIf") {
        return false;
    }
    key == "path" || key == "sourcePath" || key.ends_with("Path")
}

/// Incoming edge outputs keyed by handle, for multi-input blocks.
fn collect_inputs(
    edges_in: &[&GraphEdge],
    bindings: &HashMap<String, String>,
    memory: &Map<String, Value>,
) -> HashMap<String, Value> {
    let mut inputs = HashMap::new();
    for edge in edges_in {
        let Some(binding) = bindings.get(&edge.source) else {
            continue;
        };
        let Some(value) = memory.get(binding) else {
            continue;
        };
        let handle = edge
            .target_handle
            .clone()
            .or_else(|| edge.source_handle.clone())
            .unwrap_or_else(|| "input".to_owned());
        inputs.insert(handle, value.clone());
    }
    inputs
}
