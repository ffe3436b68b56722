//! Workflow, run, run-log, and paused-conversation entities (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Visibility of a published workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Private,
    Public,
}

/// An authored graph. Editing creates a new draft `WorkflowVersion`;
/// published versions are immutable (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub name: String,
    pub description: String,
    pub visibility: Visibility,
    /// The version id currently live for triggering/resuming.
    pub active_version_id: String,
}

/// Node kinds recognized by the engine (spec §4.D).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Trigger,
    Action,
    Add,
}

/// How a trigger node is fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Webhook,
    Keywords,
    Manual,
    Resume,
}

/// A single node in the workflow graph.
///
/// Nodes are addressed by id only; edges are a separate list (spec Design
/// Notes §9: "never materialize parent/child back-pointers").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowNode {
    pub id: String,
    pub name: String,
    pub kind: NodeKind,
    /// Present when `kind == Trigger`.
    #[serde(default)]
    pub trigger_type: Option<TriggerType>,
    /// Present when `kind == Action`; identifies the handler in the action
    /// registry (e.g. `whatsapp/send-message`, `whatsapp/ask-question`).
    #[serde(default)]
    pub action_type: Option<String>,
    /// Action-specific configuration (message text, variable key, keyword
    /// list, HTTP target, ...). Opaque to the engine; interpreted by the
    /// matching action handler.
    #[serde(default)]
    pub config: serde_json::Value,
}

/// An edge between two node ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEdge {
    pub from: String,
    pub to: String,
}

/// An immutable published (or draft) version of a workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowVersion {
    pub id: String,
    pub workflow_id: String,
    pub nodes: Vec<WorkflowNode>,
    pub edges: Vec<WorkflowEdge>,
    /// Per-step retry policy (spec §4.D item 6 / §6 `workflow_execution_config`).
    pub execution_config: ExecutionConfig,
}

/// Per-step retry/timeout policy (spec §4.D item 6).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExecutionConfig {
    pub retry_count: u32,
    pub retry_delay_ms: u64,
    pub timeout_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            retry_count: 0,
            retry_delay_ms: 0,
            timeout_ms: 30_000,
        }
    }
}

impl ExecutionConfig {
    /// Clamp a caller-supplied config to the bounds spec §4.D item 6 allows.
    #[must_use]
    pub fn clamped(mut self) -> Self {
        self.retry_count = self.retry_count.min(10);
        self.retry_delay_ms = self.retry_delay_ms.min(60_000);
        self.timeout_ms = self.timeout_ms.min(60_000);
        self
    }
}

/// Terminal/non-terminal status of a `WorkflowRun` (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Running,
    Waiting,
    Success,
    Failed,
    Skipped,
    Error,
}

impl RunStatus {
    /// Terminal statuses never transition further.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Success | RunStatus::Failed | RunStatus::Skipped | RunStatus::Error
        )
    }
}

/// One execution of a workflow (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: String,
    pub workflow_id: String,
    pub version_id: String,
    pub status: RunStatus,
    pub trigger_type: TriggerType,
    pub input: serde_json::Value,
    pub output: serde_json::Value,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Status of a single node attempt (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Running,
    Success,
    Error,
}

/// Append-only per-node-attempt log row (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRunLog {
    pub id: String,
    pub run_id: String,
    pub node_id: String,
    pub node_name: String,
    pub node_type: NodeKind,
    pub status: StepStatus,
    pub input: serde_json::Value,
    pub output: serde_json::Value,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Status of a paused-run suspension record (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Waiting,
    Completed,
}

/// A paused run's suspension record (spec §3).
///
/// Invariant enforced by the Persistence Gateway: at most one `Waiting`
/// conversation per `(workflow_id, phone)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConversation {
    pub id: String,
    pub workflow_id: String,
    pub run_id: String,
    pub phone: String,
    pub status: ConversationStatus,
    pub resume_node_id: String,
    pub variable_key: String,
    pub variables: HashMap<String, serde_json::Value>,
}
