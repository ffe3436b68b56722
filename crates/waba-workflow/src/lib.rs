//! The Workflow Engine (spec §4.D).

pub mod actions;
pub mod engine;
pub mod graph;
pub mod template;

pub use actions::{Action, ActionContext, ActionOutcome, ActionRegistry, PauseIntent};
pub use engine::{default_execution_config, ResumeRequest, RunOutcome, RunRequest, WorkflowEngine};
pub use graph::{reachable_order, successors, trigger_node, validate_workflow_schema};
