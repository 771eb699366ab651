//! Record structs that map 1-to-1 onto store documents.
//!
//! These are *persistence* models — they carry no domain behaviour.
//! The workflow graph domain types live in the `engine` crate; a
//! `WorkflowRecord` carries the graph as raw JSON the same way the
//! definition travels over the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// workflows
// ---------------------------------------------------------------------------

/// Lifecycle of a workflow definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Draft,
    Published,
    Paused,
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Published => write!(f, "published"),
            Self::Paused => write!(f, "paused"),
        }
    }
}

/// A persisted workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub id: Uuid,
    pub tenant: String,
    pub name: String,
    pub status: WorkflowStatus,
    /// Trigger bound to this workflow, if any.
    pub trigger_id: Option<Uuid>,
    /// Dataset bound to this workflow, if any.
    pub dataset_id: Option<Uuid>,
    /// Full JSON graph (nodes, edges, metadata) as submitted by the builder.
    pub graph: serde_json::Value,
    /// Monotonically increasing definition version.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// runs
// ---------------------------------------------------------------------------

/// Possible statuses for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    /// Terminal runs are never mutated again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Structured failure carried on a failed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunError {
    /// Stable error kind, e.g. `graph_invalid`, `handler_transient`.
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    pub retryable: bool,
}

/// One execution of a workflow, persisted from creation through terminal
/// status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub trigger_id: Option<Uuid>,
    /// Trigger payload the run started from.
    pub payload: serde_json::Value,
    pub status: RunStatus,
    /// Terminal result: per-node output map plus optional global fields.
    pub result: Option<serde_json::Value>,
    pub error: Option<RunError>,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// triggers
// ---------------------------------------------------------------------------

/// Event-source family of a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerType {
    Webhook,
    /// Code-forge webhook carrying an HMAC signature header.
    ForgeWebhook,
    Cron,
    ChainMemoWatch,
    HttpPoll,
    SocialPost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerStatus {
    Active,
    Inactive,
}

/// A persisted trigger definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerRecord {
    pub id: Uuid,
    pub tenant: String,
    pub trigger_type: TriggerType,
    /// Parsed, registry-validated trigger configuration.
    pub config: serde_json::Value,
    pub connector_id: Option<Uuid>,
    pub status: TriggerStatus,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// connectors
// ---------------------------------------------------------------------------

/// A stored external-service configuration.  Secret-named fields inside
/// `config` are encrypted at rest (see [`crate::secrets`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorRecord {
    pub id: Uuid,
    pub tenant: String,
    pub connector_type: String,
    pub config: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// ledger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerEntryType {
    Debit,
    Credit,
}

/// One append-only credit ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub tenant: String,
    pub seq: u64,
    pub entry_type: LedgerEntryType,
    pub amount: i64,
    /// Operation that was billed, e.g. `workflow-run`, `nilai-llm`.
    pub operation: Option<String>,
    /// Running balance after this entry was applied.
    pub balance_after: i64,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// jobs
// ---------------------------------------------------------------------------

/// Possible statuses for a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Succeeded,
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A durable queue job delivering a run id to a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub run_id: Uuid,
    pub status: JobStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    /// The job is invisible to workers until this instant.
    pub available_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_error: Option<String>,
}
